//! Connection graph: plugs attaching to sockets.
//!
//! A socket keeps the ordered list of plugs attached to it; a plug keeps the
//! id of at most one socket. Both sides are updated together here so the two
//! views never disagree.

pub mod loops;

use crate::brick::{vm_sock_nickname, vm_sock_path, BrickId, BrickKind, Nic, Plug, PlugId, PlugMode, PlugRef, SockId};
use crate::errors::{BrickError, Result};
use crate::factory::Factory;
use crate::utils::random_mac;
use log::{debug, info, warn};

/// NIC model given to machine interfaces created without one
pub const DEFAULT_NIC_MODEL: &str = "rtl8139";

/// What a new machine plug attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugTarget {
    Unplugged,
    Sock(SockId),
    /// The emulator's user-mode network
    HostOnly,
}

impl Factory {
    /// Attach a plug to a socket.
    ///
    /// Returns `false` when no socket is given or it does not exist; the plug
    /// is then left as it was. A plug already attached elsewhere is moved.
    pub fn connect_plug(&mut self, brick: BrickId, plug: PlugId, sock: Option<SockId>) -> bool {
        let Some(sock) = sock else {
            return false;
        };
        if self.sock(sock).is_none() {
            return false;
        }
        let Some(current) = self
            .bricks
            .get(&brick)
            .and_then(|b| b.plug(plug))
            .map(|p| p.sock)
        else {
            return false;
        };
        if current.is_some() && current != Some(sock) {
            self.detach(PlugRef { brick, plug });
        }

        if let Some(target) = self.sock_mut(sock) {
            target.plugs.push(PlugRef { brick, plug });
        }
        if let Some(b) = self.bricks.get_mut(&brick) {
            if let Some(p) = b.plug_mut(plug) {
                p.sock = Some(sock);
            }
            if b.is_running() {
                b.need_restart_to_apply_changes = true;
            }
        }
        self.on_config_changed(brick);
        true
    }

    /// Remove the plug from its socket's list and clear its reference
    pub fn disconnect_plug(&mut self, brick: BrickId, plug: PlugId) {
        self.detach(PlugRef { brick, plug });
        if let Some(b) = self.bricks.get_mut(&brick) {
            if b.is_running() {
                b.need_restart_to_apply_changes = true;
            }
        }
        self.on_config_changed(brick);
    }

    fn detach(&mut self, pref: PlugRef) {
        let Some(plug) = self
            .bricks
            .get_mut(&pref.brick)
            .and_then(|b| b.plug_mut(pref.plug))
        else {
            return;
        };
        if let Some(sid) = plug.sock.take() {
            if let Some(sock) = self.sock_mut(sid) {
                sock.plugs.retain(|p| *p != pref);
            }
        }
    }

    /// Connect a brick to the socket named `nickname`.
    ///
    /// Machines grow a new interface for the link; other bricks use their
    /// first free plug. Returns `false` when nothing could be connected.
    pub fn connect_to(&mut self, brick: BrickId, nickname: &str) -> Result<bool> {
        if nickname.is_empty() {
            return Ok(false);
        }
        let Some(sock) = self.sock_by_nickname(nickname) else {
            warn!("cannot find socket {}", nickname);
            return Ok(false);
        };

        let b = self.get_brick(brick)?;
        if b.kind == BrickKind::VirtualMachine {
            self.add_plug(brick, PlugTarget::Sock(sock), None)?;
            return Ok(true);
        }

        let free = b.plugs.iter().find(|p| !p.configured()).map(|p| p.id);
        match free {
            Some(plug) => Ok(self.connect_plug(brick, plug, Some(sock))),
            None => {
                debug!("{}: no free plug for {}", b.name, nickname);
                Ok(false)
            }
        }
    }

    /// Detach every plug of a brick
    pub fn disconnect(&mut self, brick: BrickId) {
        let plugs: Vec<PlugId> = match self.bricks.get(&brick) {
            Some(b) => b.plugs.iter().filter(|p| p.sock.is_some()).map(|p| p.id).collect(),
            None => return,
        };
        for plug in plugs {
            self.detach(PlugRef { brick, plug });
        }
        self.on_config_changed(brick);
    }

    /// Ports left on a switch socket: `numports` minus attached plugs.
    ///
    /// Over-subscription is not prevented, so the result may be negative.
    /// Sockets not served by a switch have no port count and give `None`.
    pub fn free_ports(&self, sock: SockId) -> Option<i64> {
        let s = self.sock(sock)?;
        let server = self.bricks.get(&s.brick)?;
        if server.kind != BrickKind::Switch {
            return None;
        }
        let numports = server
            .cfg
            .get_string("numports")
            .trim()
            .parse::<i64>()
            .unwrap_or(0);
        Some(numports - s.plugs.len() as i64)
    }

    fn next_vlan(&self, vm: BrickId) -> Result<u32> {
        let b = self.get_brick(vm)?;
        if b.kind != BrickKind::VirtualMachine {
            return Err(BrickError::UnmanagedType(format!(
                "{} has no dynamic interfaces",
                b.type_tag()
            )));
        }
        Ok((b.plugs.len() + b.socks.len()) as u32)
    }

    /// Add an interface plug to a machine.
    ///
    /// Without an explicit NIC the next free vlan, a random MAC and the
    /// default model are used.
    pub fn add_plug(&mut self, vm: BrickId, target: PlugTarget, nic: Option<Nic>) -> Result<PlugId> {
        let vlan = self.next_vlan(vm)?;
        let nic = nic.unwrap_or_else(|| Nic {
            model: DEFAULT_NIC_MODEL.to_string(),
            mac: random_mac(),
            vlan,
        });

        let id = PlugId(self.alloc_id());
        let mut plug = Plug::new(id);
        plug.nic = Some(nic);
        if target == PlugTarget::HostOnly {
            plug.mode = PlugMode::HostOnly;
        }

        let b = self.get_brick_mut(vm)?;
        b.plugs.push(plug);
        b.dirty = true;

        if let PlugTarget::Sock(sock) = target {
            self.connect_plug(vm, id, Some(sock));
        }
        Ok(id)
    }

    /// Add a served socket to a machine; other bricks may plug into it
    pub fn add_sock(&mut self, vm: BrickId, nic: Option<Nic>) -> Result<SockId> {
        let vlan = self.next_vlan(vm)?;
        let nic = nic.unwrap_or_else(|| Nic {
            model: DEFAULT_NIC_MODEL.to_string(),
            mac: random_mac(),
            vlan,
        });
        let name = self.get_brick(vm)?.name.clone();
        let path = vm_sock_path(&self.settings, &name, nic.vlan);
        let nickname = vm_sock_nickname(&name, nic.vlan);
        Ok(self.new_sock(vm, path, nickname, Some(nic)))
    }

    /// Remove the machine interface on `vlan` and renumber the ones above it
    pub fn remove_nic(&mut self, vm: BrickId, vlan: u32) -> Result<()> {
        let b = self.get_brick(vm)?;
        let name = b.name.clone();
        let has_vlan = |nic: Option<&Nic>| nic.is_some_and(|n| n.vlan == vlan);

        let plugs: Vec<PlugId> = b
            .plugs
            .iter()
            .filter(|p| has_vlan(p.nic.as_ref()))
            .map(|p| p.id)
            .collect();
        let socks: Vec<SockId> = b
            .socks
            .iter()
            .copied()
            .filter(|s| has_vlan(self.sock(*s).and_then(|s| s.nic.as_ref())))
            .collect();

        for plug in &plugs {
            self.detach(PlugRef { brick: vm, plug: *plug });
        }
        let mut touched = Vec::new();
        for sid in &socks {
            let attached = self.sock(*sid).map(|s| s.plugs.clone()).unwrap_or_default();
            for pref in attached {
                self.detach(pref);
                touched.push(pref.brick);
            }
        }
        self.socks.retain(|s| !socks.contains(&s.id));

        let b = self.get_brick_mut(vm)?;
        b.plugs.retain(|p| !plugs.contains(&p.id));
        b.socks.retain(|s| !socks.contains(s));
        for plug in &mut b.plugs {
            if let Some(nic) = plug.nic.as_mut() {
                if nic.vlan > vlan {
                    nic.vlan -= 1;
                }
            }
        }
        b.dirty = true;
        let own_socks = b.socks.clone();

        for sid in own_socks {
            let Some(old) = self.sock(sid).and_then(|s| s.nic.as_ref()).map(|n| n.vlan) else {
                continue;
            };
            if old <= vlan {
                continue;
            }
            let path = vm_sock_path(&self.settings, &name, old - 1);
            if let Some(sock) = self.sock_mut(sid) {
                sock.path = path;
                sock.nickname = vm_sock_nickname(&name, old - 1);
                if let Some(nic) = sock.nic.as_mut() {
                    nic.vlan = old - 1;
                }
            }
        }

        for other in touched {
            self.on_config_changed(other);
        }
        self.refresh_dependents(vm);
        info!("{}: interface eth{} removed", name, vlan);
        Ok(())
    }

    /// Brick name serving each plug of `brick`, `None` for unplugged ones
    pub fn link_map(&self, brick: BrickId) -> Vec<Option<String>> {
        self.bricks
            .get(&brick)
            .map(|b| {
                b.plugs
                    .iter()
                    .map(|p| self.peer_name(p).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
