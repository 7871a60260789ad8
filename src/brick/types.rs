//! Brick variant definitions.
//!
//! Each variant declares its type tag, its default parameters, and the table
//! that maps command-line switches to parameters or computed values.

use crate::brick::disk::{Disk, DISK_DEVICES};
use crate::brick::{ctl_path, mgmt_path, Brick};
use crate::config_bag::ConfigBag;
use crate::settings::Settings;
use serde::Serialize;

/// The closed set of brick variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrickKind {
    /// VDE switch
    Switch,
    /// Plain cable between two sockets
    Wire,
    /// Cable with link shaping (delay, loss, bandwidth, noise, ...)
    Wirefilter,
    /// Host tap interface plugged into a socket
    Tap,
    /// Encrypted tunnel endpoint waiting for a peer
    TunnelListen,
    /// Encrypted tunnel endpoint dialing a peer
    TunnelConnect,
    /// QEMU/KVM machine with dynamic NICs and disks
    VirtualMachine,
}

/// Where a switch takes its value from
#[derive(Clone, Copy)]
pub enum SwitchSource {
    /// Parameter looked up in the brick's configuration
    Key(&'static str),
    /// Value computed at call time
    Computed(fn(&Brick, &Settings) -> String),
}

/// One entry of a variant's switch table.
///
/// A switch starting with `#` is descriptive only and never emitted; one
/// starting with `*` is positional, so only its value is emitted.
#[derive(Clone, Copy)]
pub struct SwitchSpec {
    pub switch: &'static str,
    pub source: SwitchSource,
}

impl SwitchSpec {
    pub fn is_descriptive(&self) -> bool {
        self.switch.starts_with('#')
    }

    pub fn is_positional(&self) -> bool {
        self.switch.starts_with('*')
    }
}

const fn key(switch: &'static str, key: &'static str) -> SwitchSpec {
    SwitchSpec {
        switch,
        source: SwitchSource::Key(key),
    }
}

const fn computed(switch: &'static str, f: fn(&Brick, &Settings) -> String) -> SwitchSpec {
    SwitchSpec {
        switch,
        source: SwitchSource::Computed(f),
    }
}

fn ctl_of(brick: &Brick, settings: &Settings) -> String {
    ctl_path(settings, &brick.name).display().to_string()
}

fn mgmt_of(brick: &Brick, settings: &Settings) -> String {
    mgmt_path(settings, &brick.name).display().to_string()
}

fn name_of(brick: &Brick, _settings: &Settings) -> String {
    brick.name.clone()
}

const SWITCH_SWITCHES: &[SwitchSpec] = &[
    computed("-s", ctl_of),
    computed("-M", mgmt_of),
    key("-x", "hub"),
    key("-n", "numports"),
    key("-F", "fstp"),
    key("--macaddr", "macaddr"),
    key("-m", "mode"),
    key("-g", "group"),
    key("--priority", "priority"),
    key("--mgmtmode", "mgmtmode"),
    key("--mgmtgroup", "mgmtgroup"),
];

const WIRE_SWITCHES: &[SwitchSpec] = &[key("#sock left", "sock0"), key("#sock right", "sock1")];

const WIREFILTER_SWITCHES: &[SwitchSpec] = &[
    key("-d", "delay"),
    key("-l", "loss"),
    key("-L", "lostburst"),
    key("-D", "dup"),
    key("-b", "bandwidth"),
    key("-s", "speed"),
    key("-c", "chanbufsize"),
    key("-n", "noise"),
    key("-m", "mtu"),
    key("-N", "nofifo"),
    computed("-M", mgmt_of),
];

const TAP_SWITCHES: &[SwitchSpec] = &[key("-s", "sock"), computed("*tap", name_of)];

const TUNNEL_LISTEN_SWITCHES: &[SwitchSpec] = &[
    key("-s", "sock"),
    key("#password", "password"),
    key("-p", "port"),
];

const TUNNEL_CONNECT_SWITCHES: &[SwitchSpec] = &[
    key("-s", "sock"),
    key("#password", "password"),
    key("-p", "localport"),
    key("-c", "host"),
    key("#port", "port"),
];

const VM_SWITCHES: &[SwitchSpec] = &[
    key("#argv0", "argv0"),
    key("#M", "machine"),
    key("#cpu", "cpu"),
    key("-smp", "smp"),
    key("-m", "ram"),
    key("-boot", "boot"),
    key("#basefda", "basefda"),
    key("#basefdb", "basefdb"),
    key("#basehda", "basehda"),
    key("#basehdb", "basehdb"),
    key("#basehdc", "basehdc"),
    key("#basehdd", "basehdd"),
    key("#basemtdblock", "basemtdblock"),
    key("#privatehda", "privatehda"),
    key("#privatehdb", "privatehdb"),
    key("#privatehdc", "privatehdc"),
    key("#privatehdd", "privatehdd"),
    key("#privatefda", "privatefda"),
    key("#privatefdb", "privatefdb"),
    key("#privatemtdblock", "privatemtdblock"),
    key("#cdrom", "cdrom"),
    key("#device", "device"),
    key("#cdromen", "cdromen"),
    key("#deviceen", "deviceen"),
    key("#keyboard", "keyboard"),
    key("-soundhw", "soundhw"),
    key("-usb", "usbmode"),
    key("-nographic", "novga"),
    key("-snapshot", "snapshot"),
    key("#vga", "vga"),
    key("#vncN", "vncN"),
    key("#vnc", "vnc"),
    key("-sdl", "sdl"),
    key("-portrait", "portrait"),
    key("-win2k-hack", "win2k"),
    key("-no-acpi", "noacpi"),
    key("#kernel", "kernel"),
    key("#kernelenbl", "kernelenbl"),
    key("#append", "kopt"),
    key("#initrd", "initrd"),
    key("#initrdenbl", "initrdenbl"),
    key("#gdb_e", "gdb"),
    key("#gdb_port", "gdbport"),
    key("#kvm", "kvm"),
    key("-loadvm", "loadvm"),
    key("#rtc", "rtc"),
    key("-tdf", "tdf"),
    key("#kvmsm", "kvmsm"),
    key("#kvmsmem", "kvmsmem"),
    key("#serial", "serial"),
];

const VM_FLAGS: &[&str] = &[
    "snapshot", "kvm", "novga", "vga", "vnc", "usbmode", "sdl", "portrait", "win2k", "noacpi",
    "rtc", "kernelenbl", "initrdenbl", "cdromen", "deviceen", "gdb", "kvmsm", "serial", "tdf",
];

const VM_TEXT: &[(&str, &str)] = &[
    ("argv0", "i386"),
    ("machine", ""),
    ("cpu", ""),
    ("smp", ""),
    ("ram", "64"),
    ("vncN", "1"),
    ("boot", ""),
    ("cdrom", ""),
    ("device", ""),
    ("soundhw", ""),
    ("kernel", ""),
    ("initrd", ""),
    ("gdbport", ""),
    ("kopt", ""),
    ("icon", ""),
    ("keyboard", ""),
    ("kvmsmem", ""),
    ("loadvm", ""),
];

const WIREFILTER_DIRECTIONAL: &[&str] = &[
    "delay", "loss", "lostburst", "dup", "speed", "bandwidth", "chanbufsize", "noise", "mtu",
];

impl BrickKind {
    /// Tag written in project file section headers
    pub fn type_tag(&self) -> &'static str {
        match self {
            BrickKind::Switch => "Switch",
            BrickKind::Wire => "Wire",
            BrickKind::Wirefilter => "Wirefilter",
            BrickKind::Tap => "Tap",
            BrickKind::TunnelListen => "TunnelListen",
            BrickKind::TunnelConnect => "TunnelConnect",
            BrickKind::VirtualMachine => "Qemu",
        }
    }

    /// Parse a type name, accepting the short aliases used on command lines
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "switch" | "Switch" => Some(BrickKind::Switch),
            "wire" | "Wire" | "Cable" => Some(BrickKind::Wire),
            "wirefilter" | "Wirefilter" => Some(BrickKind::Wirefilter),
            "tap" | "Tap" => Some(BrickKind::Tap),
            "tunnell" | "TunnelListen" => Some(BrickKind::TunnelListen),
            "tunnelc" | "TunnelConnect" => Some(BrickKind::TunnelConnect),
            "vm" | "Qemu" | "VirtualMachine" => Some(BrickKind::VirtualMachine),
            _ => None,
        }
    }

    /// External program (relative to `vdepath`); machines resolve theirs from config
    pub fn program(&self) -> &'static str {
        match self {
            BrickKind::Switch => "vde_switch",
            BrickKind::Wire => "dpipe",
            BrickKind::Wirefilter => "wirefilter",
            BrickKind::Tap => "vde_plug2tap",
            BrickKind::TunnelListen | BrickKind::TunnelConnect => "vde_cryptcab",
            BrickKind::VirtualMachine => "qemu",
        }
    }

    /// Whether the process must be started through the privilege-escalation program
    pub fn needs_sudo(&self) -> bool {
        matches!(self, BrickKind::Tap)
    }

    /// Whether the process exposes a management console socket
    pub fn has_console(&self) -> bool {
        matches!(
            self,
            BrickKind::Switch | BrickKind::Wirefilter | BrickKind::VirtualMachine
        )
    }

    /// Number of plugs created with the brick; machines add theirs on demand
    pub fn fixed_plugs(&self) -> usize {
        match self {
            BrickKind::Wire | BrickKind::Wirefilter => 2,
            BrickKind::Tap | BrickKind::TunnelListen | BrickKind::TunnelConnect => 1,
            BrickKind::Switch | BrickKind::VirtualMachine => 0,
        }
    }

    pub fn switches(&self) -> &'static [SwitchSpec] {
        match self {
            BrickKind::Switch => SWITCH_SWITCHES,
            BrickKind::Wire => WIRE_SWITCHES,
            BrickKind::Wirefilter => WIREFILTER_SWITCHES,
            BrickKind::Tap => TAP_SWITCHES,
            BrickKind::TunnelListen => TUNNEL_LISTEN_SWITCHES,
            BrickKind::TunnelConnect => TUNNEL_CONNECT_SWITCHES,
            BrickKind::VirtualMachine => VM_SWITCHES,
        }
    }

    /// Parameters every new brick of this kind starts with
    pub fn default_config(&self) -> ConfigBag {
        let mut cfg = ConfigBag::new();
        cfg.set_text("pon_vbevent", "");
        cfg.set_text("poff_vbevent", "");

        match self {
            BrickKind::Switch => {
                cfg.set_text("numports", "32");
                cfg.set_flag("hub", false);
                cfg.set_flag("fstp", false);
            }
            BrickKind::Wire => {
                cfg.set_text("sock0", "");
                cfg.set_text("sock1", "");
            }
            BrickKind::Wirefilter => {
                cfg.set_text("sock0", "");
                cfg.set_text("sock1", "");
                cfg.set_flag("nofifo", false);
                for param in WIREFILTER_DIRECTIONAL {
                    cfg.set_text(param, "");
                    cfg.set_text(&format!("{}LR", param), "");
                    cfg.set_text(&format!("{}RL", param), "");
                }
                for param in ["speed", "bandwidth"] {
                    for dir in ["LR", "RL"] {
                        cfg.set_text(&format!("{}{}unit", param, dir), "");
                        cfg.set_text(&format!("{}{}distribution", param, dir), "");
                    }
                }
            }
            BrickKind::Tap => {
                cfg.set_text("sock", "");
                cfg.set_text("ip", "10.0.0.1");
                cfg.set_text("nm", "255.255.255.0");
                cfg.set_text("gw", "");
                cfg.set_text("mode", "off");
            }
            BrickKind::TunnelListen => {
                cfg.set_text("sock", "");
                cfg.set_text("password", "");
                cfg.set_text("port", "7667");
            }
            BrickKind::TunnelConnect => {
                cfg.set_text("sock", "");
                cfg.set_text("password", "");
                cfg.set_text("host", "");
                cfg.set_text("localport", "10771");
                cfg.set_text("port", "7667");
            }
            BrickKind::VirtualMachine => {
                for (k, v) in VM_TEXT {
                    cfg.set_text(k, *v);
                }
                for flag in VM_FLAGS {
                    cfg.set_flag(flag, false);
                }
                for dev in DISK_DEVICES {
                    cfg.set_text(&format!("base{}", dev), "");
                    cfg.set_flag(&format!("private{}", dev), false);
                    cfg.set_owned(dev, Disk::new(dev));
                }
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for kind in [
            BrickKind::Switch,
            BrickKind::Wire,
            BrickKind::Wirefilter,
            BrickKind::Tap,
            BrickKind::TunnelListen,
            BrickKind::TunnelConnect,
            BrickKind::VirtualMachine,
        ] {
            assert_eq!(BrickKind::from_type_name(kind.type_tag()), Some(kind));
        }
        assert_eq!(BrickKind::from_type_name("Cable"), Some(BrickKind::Wire));
        assert_eq!(BrickKind::from_type_name("Event"), None);
    }

    #[test]
    fn test_vm_defaults_own_disks() {
        let cfg = BrickKind::VirtualMachine.default_config();
        for dev in DISK_DEVICES {
            assert!(cfg.get_disk(dev).is_some(), "missing disk {}", dev);
        }
        assert_eq!(cfg.get_string("ram"), "64");
        assert!(!cfg.get_bool("snapshot"));
    }

    #[test]
    fn test_switch_table_markers() {
        let wire = BrickKind::Wire.switches();
        assert!(wire.iter().all(SwitchSpec::is_descriptive));
        assert!(BrickKind::Tap.switches().iter().any(SwitchSpec::is_positional));
    }
}
