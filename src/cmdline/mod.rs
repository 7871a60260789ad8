//! Command-line synthesis.
//!
//! Every variant starts from the same table-driven synthesizer
//! ([`build_cmd_line`]); wires, wirefilters, tunnels and machines wrap it in
//! richer argument vectors. Bricks needing elevated privileges are wrapped in
//! the configured privilege-escalation program.

pub mod vm;
pub mod wirefilter;

use crate::brick::{pidfile_path, Brick, BrickId, BrickKind, SwitchSource};
use crate::config_bag::PRESENT;
use crate::errors::Result;
use crate::factory::Factory;
use crate::images::DiskOwner;
use crate::settings::Settings;
use crate::utils::resolve_program;
use log::debug;
use std::path::PathBuf;

/// Key file read by the tunnel daemon
pub fn tunnel_key_path(settings: &Settings, name: &str) -> PathBuf {
    settings.workspace.join(format!("tunnel_{}.key", name))
}

/// Translate a brick's switch table into arguments.
///
/// Descriptive entries (`#`) are skipped. A value equal to the "present"
/// marker emits the bare switch; any other non-empty value emits the switch
/// followed by the value, or the value alone for positional entries (`*`).
pub fn build_cmd_line(brick: &Brick, settings: &Settings) -> Vec<String> {
    let mut res = Vec::new();
    for entry in brick.kind.switches() {
        if entry.is_descriptive() {
            continue;
        }
        let value = match entry.source {
            SwitchSource::Key(key) => brick.cfg.get_string(key),
            SwitchSource::Computed(f) => f(brick, settings),
        };
        if value == PRESENT {
            res.push(entry.switch.to_string());
        } else if !value.is_empty() {
            if !entry.is_positional() {
                res.push(entry.switch.to_string());
            }
            res.push(value);
        }
    }
    res
}

/// Arguments plus the disk locks newly taken to produce them
pub(crate) struct Synthesized {
    pub argv: Vec<String>,
    pub new_locks: Vec<(PathBuf, DiskOwner)>,
}

impl Factory {
    /// Absolute path of the program a brick runs
    pub fn program_path(&self, brick: &Brick) -> String {
        let settings = &self.settings;
        match brick.kind {
            BrickKind::VirtualMachine => {
                let argv0 = brick.cfg.get_string("argv0");
                let program = if brick.cfg.get_bool("kvm") {
                    "kvm".to_string()
                } else if !argv0.is_empty() {
                    argv0
                } else {
                    "qemu".to_string()
                };
                resolve_program(&settings.qemupath, &program)
            }
            kind => resolve_program(&settings.vdepath, kind.program()),
        }
    }

    /// Full argument vector, program first.
    ///
    /// For machines this resolves disks, which may create overlays and take
    /// image locks.
    pub(crate) fn synthesize(&mut self, id: BrickId) -> Result<Synthesized> {
        let brick = self.get_brick(id)?;
        let prog = self.program_path(brick);
        let settings = &self.settings;
        let kind = brick.kind;

        let argv = match kind {
            BrickKind::Switch | BrickKind::Tap => {
                let mut res = vec![prog];
                res.extend(build_cmd_line(brick, settings));
                res
            }
            BrickKind::Wire => {
                let plug = resolve_program(&settings.vdepath, "vde_plug");
                vec![
                    prog,
                    plug.clone(),
                    brick.cfg.get_string("sock0"),
                    "=".to_string(),
                    plug,
                    brick.cfg.get_string("sock1"),
                ]
            }
            BrickKind::Wirefilter => wirefilter::args(brick, settings, prog),
            BrickKind::TunnelListen | BrickKind::TunnelConnect => {
                let mut res = vec![
                    prog,
                    "-P".to_string(),
                    tunnel_key_path(settings, &brick.name).display().to_string(),
                ];
                res.extend(build_cmd_line(brick, settings));
                res
            }
            BrickKind::VirtualMachine => return self.vm_args(id, prog),
        };

        Ok(Synthesized {
            argv,
            new_locks: Vec::new(),
        })
    }

    /// The argv actually spawned, with privilege escalation applied.
    ///
    /// A privileged command is handed to the escalation program as a single
    /// argument, followed by `-P <pidfile>` so the real pid can be read back.
    pub(crate) fn spawn_command_line(&mut self, id: BrickId) -> Result<Synthesized> {
        let mut synth = self.synthesize(id)?;
        let brick = self.get_brick(id)?;
        if brick.kind.needs_sudo() {
            let pidfile = pidfile_path(&self.settings, &brick.name);
            let joined = format!("{} -P {}", synth.argv.join(" "), pidfile.display());
            synth.argv = vec![self.settings.sudo.clone(), joined];
        }
        debug!("{}: command line {:?}", brick.name, synth.argv);
        Ok(synth)
    }

    /// The command line a brick would be started with.
    ///
    /// Disk locks taken only for this preview are given back unless the brick
    /// is running.
    pub fn command_line(&mut self, id: BrickId) -> Result<Vec<String>> {
        let synth = self.spawn_command_line(id)?;
        if !self.get_brick(id)?.is_running() {
            self.release_locks(&synth.new_locks);
        }
        Ok(synth.argv)
    }
}
