//! Entity model: bricks, plugs, sockets.
//!
//! Bricks own their plugs. Sockets are owned by the factory's flat socket
//! index and point back at the brick that serves them; plugs and sockets
//! refer to each other by id, never by ownership.

pub mod disk;
pub mod types;

use crate::config_bag::ConfigBag;
use crate::lifecycle::console::Console;
use crate::lifecycle::BrickProcess;
use crate::settings::Settings;
use crate::utils::is_writable_dir;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use types::{BrickKind, SwitchSource, SwitchSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BrickId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SockId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlugId(pub u64);

/// Fully qualified plug reference, as stored in a socket's plug list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlugRef {
    pub brick: BrickId,
    pub plug: PlugId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugMode {
    /// Attaches to a socket
    Vde,
    /// Machine NIC wired to the emulator's user-mode network; needs no socket
    HostOnly,
}

/// NIC parameters carried by machine plugs and sockets
#[derive(Debug, Clone, PartialEq)]
pub struct Nic {
    pub model: String,
    pub mac: String,
    pub vlan: u32,
}

#[derive(Debug, Clone)]
pub struct Plug {
    pub id: PlugId,
    pub sock: Option<SockId>,
    pub mode: PlugMode,
    pub nic: Option<Nic>,
}

impl Plug {
    pub fn new(id: PlugId) -> Self {
        Self {
            id,
            sock: None,
            mode: PlugMode::Vde,
            nic: None,
        }
    }

    pub fn configured(&self) -> bool {
        self.mode == PlugMode::HostOnly || self.sock.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Sock {
    pub id: SockId,
    pub brick: BrickId,
    /// Rendezvous path handed to the external processes
    pub path: String,
    /// Name used by `connect` commands and link records
    pub nickname: String,
    /// Plugs attached to this socket, in connection order
    pub plugs: Vec<PlugRef>,
    pub nic: Option<Nic>,
}

impl Sock {
    /// Rendezvous path without the `[]` directory marker
    pub fn trimmed_path(&self) -> &str {
        self.path.trim_end_matches("[]")
    }

    /// The directory that will contain the socket is writable
    pub fn has_valid_path(&self) -> bool {
        match Path::new(self.trimmed_path()).parent() {
            Some(dir) => is_writable_dir(dir),
            None => false,
        }
    }
}

/// Brick status as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrickState {
    Running,
    Disconnected,
    Off,
}

impl fmt::Display for BrickState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrickState::Running => "running",
            BrickState::Disconnected => "disconnected",
            BrickState::Off => "off",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Brick {
    pub id: BrickId,
    pub name: String,
    pub kind: BrickKind,
    pub cfg: ConfigBag,
    pub plugs: Vec<Plug>,
    /// Sockets served by this brick, in creation order
    pub socks: Vec<SockId>,
    pub process: Option<BrickProcess>,
    pub console: Option<Console>,
    pub active: bool,
    pub need_restart_to_apply_changes: bool,
    /// Set on every change; cleared by whoever renders the brick
    pub dirty: bool,
}

impl Brick {
    pub fn new(id: BrickId, name: &str, kind: BrickKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            cfg: kind.default_config(),
            plugs: Vec::new(),
            socks: Vec::new(),
            process: None,
            console: None,
            active: false,
            need_restart_to_apply_changes: false,
            dirty: true,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.pid)
    }

    pub fn plug(&self, id: PlugId) -> Option<&Plug> {
        self.plugs.iter().find(|p| p.id == id)
    }

    pub fn plug_mut(&mut self, id: PlugId) -> Option<&mut Plug> {
        self.plugs.iter_mut().find(|p| p.id == id)
    }

    /// Every plug has a socket (or needs none)
    pub fn properly_connected(&self) -> bool {
        self.plugs.iter().all(Plug::configured)
    }
}

/// Control socket path of a switch
pub fn ctl_path(settings: &Settings, name: &str) -> PathBuf {
    settings.workspace.join(format!("{}.ctl", name))
}

/// Management console socket path
pub fn mgmt_path(settings: &Settings, name: &str) -> PathBuf {
    settings.workspace.join(format!("{}.mgmt", name))
}

/// Pidfile written by privileged processes (`-P <pidfile>`)
pub fn pidfile_path(settings: &Settings, name: &str) -> PathBuf {
    settings.workspace.join(format!("{}.pid", name))
}

/// Socket path of a machine's served NIC
pub fn vm_sock_path(settings: &Settings, vm_name: &str, vlan: u32) -> String {
    format!(
        "{}[]",
        settings
            .workspace
            .join(format!("{}_sock_eth{}", vm_name, vlan))
            .display()
    )
}

pub fn vm_sock_nickname(vm_name: &str, vlan: u32) -> String {
    format!("{}_sock_eth{}", vm_name, vlan)
}

pub fn switch_port_nickname(switch_name: &str) -> String {
    format!("{}_port", switch_name)
}
