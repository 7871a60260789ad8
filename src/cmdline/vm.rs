//! Virtual machine argument vector, including disk resolution.

use super::{build_cmd_line, Synthesized};
use crate::brick::disk::DISK_DEVICES;
use crate::brick::{mgmt_path, Brick, BrickId, PlugMode};
use crate::errors::Result;
use crate::factory::Factory;
use crate::images::DiskOwner;
use crate::settings::Settings;
use log::{debug, warn};
use std::path::PathBuf;

/// Second monitor, left free for interactive use
pub fn cons_mgmt_path(settings: &Settings, name: &str) -> PathBuf {
    settings.workspace.join(format!("{}_cons.mgmt", name))
}

impl Factory {
    pub(crate) fn vm_args(&mut self, id: BrickId, prog: String) -> Result<Synthesized> {
        let mut new_locks = Vec::new();
        match self.vm_disk_args(id, &mut new_locks) {
            Ok(disk_args) => {
                let brick = self.get_brick(id)?;
                Ok(Synthesized {
                    argv: self.assemble_vm_args(brick, prog, disk_args),
                    new_locks,
                })
            }
            Err(e) => {
                self.release_locks(&new_locks);
                Err(e)
            }
        }
    }

    /// Resolve each populated disk slot to its real file.
    ///
    /// Copy-on-write disks get a private overlay. Direct disks take the
    /// image's exclusive lock unless the machine runs in snapshot mode. Locks
    /// taken so far are recorded in `new_locks` so a failure can undo them.
    fn vm_disk_args(
        &mut self,
        id: BrickId,
        new_locks: &mut Vec<(PathBuf, DiskOwner)>,
    ) -> Result<Vec<String>> {
        let mut res = Vec::new();

        for dev in DISK_DEVICES {
            let brick = self.get_brick_mut(id)?;
            let base = brick.cfg.get_string(&format!("base{}", dev));
            if base.is_empty() {
                continue;
            }
            let cow = brick.cfg.get_bool(&format!("private{}", dev));
            let snapshot = brick.cfg.get_bool("snapshot");
            let name = brick.name.clone();
            let Some(disk) = brick.cfg.get_disk_mut(dev) else {
                warn!("{}: no disk object for {}", name, dev);
                continue;
            };
            disk.base = base.clone();
            disk.cow = cow;
            let disk = disk.clone();

            let base_path = self.images.resolve_base(&base);
            let real = if cow {
                disk.ensure_overlay(
                    &name,
                    &self.settings.baseimages,
                    &base_path,
                    &self.settings.qemu_img,
                )?
            } else {
                if !snapshot {
                    let owner = DiskOwner { vm: id, device: dev };
                    if self.images.acquire_path(&base_path, owner)? {
                        new_locks.push((base_path.clone(), owner));
                    }
                }
                base_path
            };

            debug!("{}: {} -> {:?}", name, dev, real);
            res.extend(disk.args(&real));
        }
        Ok(res)
    }

    fn assemble_vm_args(&self, brick: &Brick, prog: String, disk_args: Vec<String>) -> Vec<String> {
        let settings = &self.settings;
        let cfg = &brick.cfg;
        let mut res = vec![prog];

        if !cfg.get_bool("kvm") {
            for (switch, key) in [("-M", "machine"), ("-cpu", "cpu")] {
                let value = cfg.get_string(key);
                if !value.is_empty() {
                    res.push(switch.to_string());
                    res.push(value);
                }
            }
        }

        res.extend(build_cmd_line(brick, settings));
        res.extend(disk_args);

        let kernel = cfg.get_string("kernel");
        let kernel_on = cfg.get_bool("kernelenbl") && !kernel.is_empty();
        if kernel_on {
            res.extend(["-kernel".to_string(), kernel]);
        }
        let initrd = cfg.get_string("initrd");
        if cfg.get_bool("initrdenbl") && !initrd.is_empty() {
            res.extend(["-initrd".to_string(), initrd]);
        }
        let kopt = cfg.get_string("kopt");
        if kernel_on && !kopt.is_empty() {
            res.extend(["-append".to_string(), kopt]);
        }

        if cfg.get_bool("gdb") {
            res.extend(["-gdb".to_string(), format!("tcp::{}", cfg.get_string("gdbport"))]);
        }
        if cfg.get_bool("vnc") {
            res.extend(["-vnc".to_string(), format!(":{}", cfg.get_string("vncN"))]);
        }
        if cfg.get_bool("vga") {
            res.extend(["-vga".to_string(), "std".to_string()]);
        }

        res.extend(["-name".to_string(), brick.name.clone()]);

        if brick.plugs.is_empty() && brick.socks.is_empty() {
            res.extend(["-net".to_string(), "none".to_string()]);
        } else {
            for plug in &brick.plugs {
                let Some(nic) = plug.nic.as_ref() else {
                    continue;
                };
                res.push("-net".to_string());
                res.push(format!(
                    "nic,model={},vlan={},macaddr={}",
                    nic.model, nic.vlan, nic.mac
                ));
                match plug.mode {
                    PlugMode::HostOnly => {
                        res.extend(["-net".to_string(), "user".to_string()]);
                    }
                    PlugMode::Vde => {
                        if let Some(sock) = plug.sock.and_then(|s| self.sock(s)) {
                            res.push("-net".to_string());
                            res.push(format!("vde,vlan={},sock={}", nic.vlan, sock.trimmed_path()));
                        }
                    }
                }
            }
            for sock in brick.socks.iter().filter_map(|s| self.sock(*s)) {
                let Some(nic) = sock.nic.as_ref() else {
                    continue;
                };
                res.push("-net".to_string());
                res.push(format!(
                    "nic,model={},vlan={},macaddr={}",
                    nic.model, nic.vlan, nic.mac
                ));
                res.push("-net".to_string());
                res.push(format!("vde,vlan={},sock={}", nic.vlan, sock.path));
            }
        }

        let cdrom = if cfg.get_bool("cdromen") {
            cfg.get_string("cdrom")
        } else if cfg.get_bool("deviceen") {
            cfg.get_string("device")
        } else {
            String::new()
        };
        if !cdrom.is_empty() {
            res.extend(["-cdrom".to_string(), cdrom]);
        }

        if cfg.get_bool("rtc") {
            res.extend(["-rtc".to_string(), "base=localtime".to_string()]);
        }
        let keyboard = cfg.get_string("keyboard");
        if keyboard.len() == 2 {
            res.extend(["-k".to_string(), keyboard]);
        }
        if cfg.get_bool("kvmsm") {
            res.extend(["-kvm-shadow-memory".to_string(), cfg.get_string("kvmsmem")]);
        }
        if cfg.get_bool("serial") {
            let serial = settings.workspace.join(format!("{}_serial", brick.name));
            res.extend([
                "-serial".to_string(),
                format!("unix:{},server,nowait", serial.display()),
            ]);
        }

        // Two monitors: the first backs the internal console
        for (id, path) in [
            ("mon", mgmt_path(settings, &brick.name)),
            ("mon_cons", cons_mgmt_path(settings, &brick.name)),
        ] {
            res.push("-chardev".to_string());
            res.push(format!("socket,id={},path={},server,nowait", id, path.display()));
            res.push("-mon".to_string());
            res.push(format!("chardev={}", id));
        }

        res
    }

    /// Give back locks taken during a synthesis that did not lead to a process
    pub(crate) fn release_locks(&mut self, locks: &[(PathBuf, DiskOwner)]) {
        for (path, owner) in locks {
            if let Err(e) = self.images.release_path(path, *owner) {
                warn!("Cannot release {:?}: {}", path, e);
            }
        }
    }
}
