//! Process lifecycle: power-on, power-off and reconciliation.
//!
//! A brick is off, or running with a process handle (and possibly a console
//! connection). Power-on checks configuration and links, powering on the
//! bricks it depends on, then spawns the synthesized command line. Power-off
//! terminates the process and waits for it. Processes that exit on their own
//! are picked up by [`Factory::reap`].

pub mod console;
pub mod live;

use crate::brick::{mgmt_path, pidfile_path, Brick, BrickId, BrickKind, PlugRef};
use crate::cmdline::tunnel_key_path;
use crate::errors::{BrickError, Result};
use crate::factory::Factory;
use console::Console;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

/// Starts external processes.
///
/// The factory only ever spawns through this trait, so the process layer can
/// be swapped (e.g. to record command lines).
pub trait Launcher {
    fn launch(&self, argv: &[String]) -> io::Result<Child>;
}

/// Spawns the argument vector as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, argv: &[String]) -> io::Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

/// Handle on a running brick process
#[derive(Debug)]
pub struct BrickProcess {
    child: Child,
    pub pid: u32,
    /// Started through the privilege-escalation program
    pub privileged: bool,
    /// Where a privileged process records its real pid
    pub pidfile: Option<PathBuf>,
}

impl BrickProcess {
    pub fn new(child: Child, privileged: bool, pidfile: Option<PathBuf>) -> Self {
        Self {
            pid: child.id(),
            child,
            privileged,
            pidfile,
        }
    }

    /// Exit status if the process has terminated
    pub fn try_exit(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Cannot poll process {}: {}", self.pid, e);
                None
            }
        }
    }

    /// Ask the process to stop.
    ///
    /// A privileged process is signalled through the escalation program with
    /// the pid it recorded in its pidfile; failing that it keeps running and
    /// the error is returned. An unprivileged process that cannot be sent
    /// SIGTERM is killed outright.
    fn terminate(&mut self, sudo: &str) -> io::Result<()> {
        if let (Some(pidfile), true) = (&self.pidfile, self.privileged) {
            let pid = read_pidfile(pidfile)?.to_string();
            let status = Command::new(sudo)
                .args(["kill", "-TERM", pid.as_str()])
                .status()?;
            if !status.success() {
                return Err(io::Error::other(format!(
                    "{} kill {} failed ({})",
                    sudo, pid, status
                )));
            }
            return Ok(());
        }

        let sent = match Command::new("kill")
            .arg("-TERM")
            .arg(self.pid.to_string())
            .status()
        {
            Ok(s) if s.success() => true,
            Ok(s) => {
                error!("can not stop process {} (exit status: {})", self.pid, s);
                false
            }
            Err(e) => {
                error!("can not send SIGTERM to {}: {}", self.pid, e);
                false
            }
        };
        if !sent {
            self.child.kill()?;
        }
        Ok(())
    }

    /// Block until the process has exited
    fn wait_for_exit(&mut self, poll: Duration) {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Process {} exited with {}", self.pid, status);
                    return;
                }
                Ok(None) => thread::sleep(poll),
                Err(e) => {
                    warn!("Cannot wait for process {}: {}", self.pid, e);
                    return;
                }
            }
        }
    }
}

impl Factory {
    /// Power on a brick, and first every brick it is linked to.
    ///
    /// Fails with `BadConfig` when the brick is not configured, with
    /// `NotConnected` when a plug has no socket and with `Linkloop` when a
    /// link cannot be brought up. A running brick is left as it is.
    pub fn poweron(&mut self, id: BrickId) -> Result<()> {
        let mut visited = HashSet::new();
        self.poweron_inner(id, &mut visited)
    }

    pub(crate) fn poweron_inner(
        &mut self,
        id: BrickId,
        visited: &mut HashSet<PlugRef>,
    ) -> Result<()> {
        let name = self.get_brick(id)?.name.clone();
        if !self.configured(id) {
            return Err(BrickError::BadConfig(name));
        }
        if !self.get_brick(id)?.properly_connected() {
            return Err(BrickError::NotConnected(name));
        }
        if !self.check_links_inner(id, visited)? {
            return Err(BrickError::Linkloop(name));
        }
        self.start_process(id)
    }

    fn start_process(&mut self, id: BrickId) -> Result<()> {
        let brick = self.get_brick(id)?;
        if brick.is_running() {
            return Ok(());
        }
        let kind = brick.kind;
        let name = brick.name.clone();

        if matches!(kind, BrickKind::TunnelListen | BrickKind::TunnelConnect) {
            let password = brick.cfg.get_string("password");
            write_tunnel_key(&tunnel_key_path(&self.settings, &name), &password)?;
        }

        let synth = self.spawn_command_line(id)?;
        info!("Starting: '{}'", synth.argv.join(" "));
        let child = match self.launcher.launch(&synth.argv) {
            Ok(child) => child,
            Err(e) => {
                self.release_locks(&synth.new_locks);
                return Err(e.into());
            }
        };

        let privileged = kind.needs_sudo();
        let pidfile = privileged.then(|| pidfile_path(&self.settings, &name));
        let process = BrickProcess::new(child, privileged, pidfile);
        info!("{} started with pid {}", name, process.pid);

        let console = if kind.has_console() {
            let path = mgmt_path(&self.settings, &name);
            match Console::connect_with_retries(
                &path,
                self.settings.console_connect_retries,
                self.settings.console_retry_interval,
                self.settings.console_idle_timeout,
            ) {
                Ok(console) => Some(console),
                Err(e) => {
                    warn!("{}: no management console at {:?}: {}", name, path, e);
                    None
                }
            }
        } else {
            None
        };

        let brick = self.get_brick_mut(id)?;
        brick.process = Some(process);
        brick.console = console;
        self.post_poweron(id);
        Ok(())
    }

    fn post_poweron(&mut self, id: BrickId) {
        let Some(brick) = self.bricks.get_mut(&id) else {
            return;
        };
        brick.active = true;
        brick.dirty = true;
        let event = brick.cfg.get_string("pon_vbevent");

        if brick.kind == BrickKind::Tap {
            let commands = tap_address_commands(brick);
            for command in commands {
                run_privileged(&self.settings.sudo, &command);
            }
        }

        self.arm_hook(&event);
    }

    /// Stop a brick's process and wait for it to exit; no-op when off
    pub fn poweroff(&mut self, id: BrickId) -> Result<()> {
        let sudo = self.settings.sudo.clone();
        let poll = self.settings.poweroff_poll_interval;
        let brick = self.get_brick_mut(id)?;
        let Some(mut process) = brick.process.take() else {
            return Ok(());
        };
        info!("Shutting down {}", brick.name);

        if process.try_exit().is_none() {
            if let Err(e) = process.terminate(&sudo) {
                error!("can not stop {}: {}", brick.name, e);
                brick.process = Some(process);
                return Err(e.into());
            }
        }
        process.wait_for_exit(poll);

        self.finish_poweroff(id);
        Ok(())
    }

    /// Bookkeeping once a process is gone, however it ended
    fn finish_poweroff(&mut self, id: BrickId) {
        let Some(brick) = self.bricks.get_mut(&id) else {
            return;
        };
        brick.process = None;
        brick.need_restart_to_apply_changes = false;
        brick.console = None;
        brick.active = false;
        brick.dirty = true;
        let name = brick.name.clone();
        let event = brick.cfg.get_string("poff_vbevent");

        self.images.release_all(id);
        info!("{} stopped", name);
        self.arm_hook(&event);
    }

    /// Arm the event named by a power hook, if any
    fn arm_hook(&mut self, event: &str) {
        if event.is_empty() {
            return;
        }
        if self.event(event).is_none() {
            warn!("Power hook names unknown event {}", event);
            return;
        }
        if let Err(e) = self.poweron_event(event) {
            warn!("Cannot arm event {}: {}", event, e);
        }
    }

    /// Reconcile bricks whose process exited outside of a power-off.
    ///
    /// Their handles are cleared and their disk locks released. Returns the
    /// reaped bricks.
    pub fn reap(&mut self) -> Vec<BrickId> {
        let mut exited = Vec::new();
        for brick in self.bricks.values_mut() {
            if let Some(status) = brick.process.as_mut().and_then(BrickProcess::try_exit) {
                warn!("{} exited unexpectedly ({})", brick.name, status);
                exited.push(brick.id);
            }
        }
        for id in &exited {
            self.finish_poweroff(*id);
        }
        exited
    }

    /// Number of bricks with a live process handle
    pub fn running_count(&self) -> usize {
        self.bricks.values().filter(|b| b.is_running()).count()
    }

    /// Send a raw command to a running brick's console and return the response
    pub fn send_console(&mut self, id: BrickId, command: &str) -> Result<String> {
        let settings = self.settings.clone();
        let brick = self.get_brick_mut(id)?;
        if !brick.is_running() {
            return Err(BrickError::NotConnected(format!("{} is not running", brick.name)));
        }
        if brick.console.is_none() {
            let path = mgmt_path(&settings, &brick.name);
            brick.console = Some(Console::connect_with_retries(
                &path,
                1,
                settings.console_retry_interval,
                settings.console_idle_timeout,
            )?);
        }
        match brick.console.as_mut() {
            Some(console) => Ok(console.exchange(command)?),
            None => Err(BrickError::NotConnected(brick.name.clone())),
        }
    }

    pub(crate) fn send_live(&mut self, id: BrickId, command: &str) -> Result<()> {
        let response = self.send_console(id, command)?;
        info!("Live update '{}': {}", command.trim_end(), response.trim_end());
        Ok(())
    }
}

/// Pid written by a privileged process with `-P <pidfile>`
fn read_pidfile(path: &Path) -> io::Result<u32> {
    let text = std::fs::read_to_string(path)?;
    text.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no pid in {}", path.display()),
        )
    })
}

/// Address configuration run after a tap comes up
fn tap_address_commands(brick: &Brick) -> Vec<String> {
    let cfg = &brick.cfg;
    match cfg.get_string("mode").as_str() {
        "dhcp" => vec![format!("dhclient {}", brick.name)],
        "manual" => {
            let mut commands = vec![format!(
                "/sbin/ifconfig {} {} netmask {}",
                brick.name,
                cfg.get_string("ip"),
                cfg.get_string("nm")
            )];
            let gw = cfg.get_string("gw");
            if !gw.is_empty() {
                commands.push(format!("/sbin/route add default gw {} dev {}", gw, brick.name));
            }
            commands
        }
        _ => Vec::new(),
    }
}

fn run_privileged(sudo: &str, command: &str) {
    match Command::new(sudo).arg(command).status() {
        Ok(status) if status.success() => debug!("'{}' done", command),
        Ok(status) => error!("'{}' failed ({})", command, status),
        Err(e) => error!("Cannot run '{}': {}", command, e),
    }
}

/// Derive the tunnel key from the password (`sha1sum` of `password\n`)
fn write_tunnel_key(path: &Path, password: &str) -> io::Result<()> {
    let mut child = Command::new("sha1sum")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(format!("{}\n", password).as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("sha1sum exited with {}", output.status),
        ));
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, output.stdout)?;
    debug!("Tunnel key written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_address_commands() {
        let mut brick = Brick::new(BrickId(1), "tap0", BrickKind::Tap);
        assert!(tap_address_commands(&brick).is_empty());

        brick.cfg.set("mode=manual");
        brick.cfg.set("gw=10.0.0.254");
        assert_eq!(
            tap_address_commands(&brick),
            vec![
                "/sbin/ifconfig tap0 10.0.0.1 netmask 255.255.255.0",
                "/sbin/route add default gw 10.0.0.254 dev tap0",
            ]
        );

        brick.cfg.set("mode=dhcp");
        assert_eq!(tap_address_commands(&brick), vec!["dhclient tap0"]);
    }

    #[test]
    fn test_tunnel_key_is_sha1_of_password_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunnel_t.key");
        write_tunnel_key(&path, "secret").unwrap();
        let key = std::fs::read_to_string(&path).unwrap();
        assert_eq!(key, "fc683cd9ed1990ca2ea10b84e5e6fba048c24929  -\n");
    }

    #[test]
    fn test_system_launcher_rejects_empty_argv() {
        let err = SystemLauncher.launch(&[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
