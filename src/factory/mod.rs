//! The factory: owner of every brick, event, socket and image.
//!
//! Bricks live in an id-keyed arena ordered by creation. Sockets sit in a flat
//! index so `connect` commands and link records can find them by nickname.
//! Behaviour is split across modules, each adding an `impl Factory` block:
//! connections in `graph`, argument vectors in `cmdline`, processes in
//! `lifecycle`, project files in `persistence`.

pub mod commands;

use crate::brick::{
    ctl_path, switch_port_nickname, vm_sock_nickname, vm_sock_path, Brick, BrickId, BrickKind,
    BrickState, Nic, Plug, PlugId, Sock, SockId,
};
use crate::errors::{BrickError, Result};
use crate::event::Event;
use crate::images::ImageRegistry;
use crate::lifecycle::{live, Launcher, SystemLauncher};
use crate::settings::Settings;
use crate::utils::valid_name;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct Factory {
    pub settings: Settings,
    pub(crate) bricks: BTreeMap<BrickId, Brick>,
    pub(crate) events: Vec<Event>,
    pub(crate) socks: Vec<Sock>,
    pub images: ImageRegistry,
    pub(crate) launcher: Box<dyn Launcher>,
    next_id: u64,
}

impl Factory {
    /// Factory spawning real processes
    pub fn new(settings: Settings) -> Self {
        Self::with_launcher(settings, Box::new(SystemLauncher))
    }

    pub fn with_launcher(settings: Settings, launcher: Box<dyn Launcher>) -> Self {
        Self {
            settings,
            bricks: BTreeMap::new(),
            events: Vec::new(),
            socks: Vec::new(),
            images: ImageRegistry::new(),
            launcher,
            next_id: 1,
        }
    }

    pub(crate) fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- lookups -------------------------------------------------------

    pub fn bricks(&self) -> impl Iterator<Item = &Brick> {
        self.bricks.values()
    }

    pub fn brick(&self, id: BrickId) -> Option<&Brick> {
        self.bricks.get(&id)
    }

    pub fn brick_mut(&mut self, id: BrickId) -> Option<&mut Brick> {
        self.bricks.get_mut(&id)
    }

    pub fn brick_id(&self, name: &str) -> Option<BrickId> {
        self.bricks.values().find(|b| b.name == name).map(|b| b.id)
    }

    pub fn brick_by_name(&self, name: &str) -> Option<&Brick> {
        self.bricks.values().find(|b| b.name == name)
    }

    /// Like [`Factory::brick_id`], failing with `NotFound`
    pub fn lookup_brick(&self, name: &str) -> Result<BrickId> {
        self.brick_id(name)
            .ok_or_else(|| BrickError::NotFound(name.to_string()))
    }

    pub(crate) fn get_brick(&self, id: BrickId) -> Result<&Brick> {
        self.bricks
            .get(&id)
            .ok_or_else(|| BrickError::NotFound(format!("brick {:?}", id)))
    }

    pub(crate) fn get_brick_mut(&mut self, id: BrickId) -> Result<&mut Brick> {
        self.bricks
            .get_mut(&id)
            .ok_or_else(|| BrickError::NotFound(format!("brick {:?}", id)))
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn event_mut(&mut self, name: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.name == name)
    }

    pub fn socks(&self) -> &[Sock] {
        &self.socks
    }

    pub fn sock(&self, id: SockId) -> Option<&Sock> {
        self.socks.iter().find(|s| s.id == id)
    }

    pub(crate) fn sock_mut(&mut self, id: SockId) -> Option<&mut Sock> {
        self.socks.iter_mut().find(|s| s.id == id)
    }

    pub fn sock_by_nickname(&self, nickname: &str) -> Option<SockId> {
        self.socks
            .iter()
            .find(|s| s.nickname == nickname)
            .map(|s| s.id)
    }

    // ---- names ---------------------------------------------------------

    /// Names are unique across bricks and events combined
    pub fn is_name_free(&self, name: &str) -> bool {
        self.brick_id(name).is_none() && self.event(name).is_none()
    }

    /// First free name obtained by appending `_new` to `base`
    pub fn next_valid_name(&self, base: &str) -> Option<String> {
        let mut name = valid_name(base)?;
        while !self.is_name_free(&name) {
            name.push_str("_new");
        }
        Some(name)
    }

    fn checked_name(&self, raw: &str) -> Result<String> {
        let name = valid_name(raw).ok_or_else(|| BrickError::InvalidName(raw.to_string()))?;
        if !self.is_name_free(&name) {
            return Err(BrickError::InvalidName(name));
        }
        Ok(name)
    }

    // ---- creation ------------------------------------------------------

    /// Create a brick of the given type; accepts the short type aliases
    pub fn new_brick(&mut self, type_name: &str, name: &str) -> Result<BrickId> {
        let kind = BrickKind::from_type_name(type_name)
            .ok_or_else(|| BrickError::UnmanagedType(type_name.to_string()))?;
        let name = self.checked_name(name)?;

        let id = BrickId(self.alloc_id());
        let mut brick = Brick::new(id, &name, kind);
        for _ in 0..kind.fixed_plugs() {
            brick.plugs.push(Plug::new(PlugId(self.alloc_id())));
        }
        self.bricks.insert(id, brick);

        if kind == BrickKind::Switch {
            let path = ctl_path(&self.settings, &name).display().to_string();
            self.new_sock(id, path, switch_port_nickname(&name), None);
        }

        self.on_config_changed(id);
        debug!("new {} {} OK", kind.type_tag(), name);
        Ok(id)
    }

    /// Register a socket served by `brick`
    pub(crate) fn new_sock(
        &mut self,
        brick: BrickId,
        path: String,
        nickname: String,
        nic: Option<Nic>,
    ) -> SockId {
        let id = SockId(self.alloc_id());
        self.socks.push(Sock {
            id,
            brick,
            path,
            nickname,
            plugs: Vec::new(),
            nic,
        });
        if let Some(b) = self.bricks.get_mut(&brick) {
            b.socks.push(id);
            b.dirty = true;
        }
        id
    }

    pub fn new_event(&mut self, name: &str) -> Result<()> {
        let name = self.checked_name(name)?;
        debug!("new event {} OK", name);
        self.events.push(Event::new(&name));
        Ok(())
    }

    /// Register a named disk image
    pub fn new_image(&mut self, name: &str, path: impl Into<PathBuf>) -> Result<()> {
        let name = valid_name(name).ok_or_else(|| BrickError::InvalidName(name.to_string()))?;
        if self.images.contains(&name) {
            return Err(BrickError::InvalidName(name));
        }
        self.images.add(&name, path);
        Ok(())
    }

    // ---- naming --------------------------------------------------------

    pub fn rename_brick(&mut self, id: BrickId, new_name: &str) -> Result<()> {
        let new_name = self.checked_name(new_name)?;
        let brick = self.get_brick_mut(id)?;
        info!("Renaming brick {} to {}", brick.name, new_name);
        brick.name = new_name.clone();
        if brick.is_running() {
            brick.need_restart_to_apply_changes = true;
        }
        let kind = brick.kind;
        let own_socks = brick.socks.clone();

        for sid in own_socks {
            let nic_vlan = self.sock(sid).and_then(|s| s.nic.as_ref()).map(|n| n.vlan);
            let settings = &self.settings;
            let (path, nickname) = match (kind, nic_vlan) {
                (BrickKind::VirtualMachine, Some(vlan)) => (
                    Some(vm_sock_path(settings, &new_name, vlan)),
                    vm_sock_nickname(&new_name, vlan),
                ),
                _ => (None, switch_port_nickname(&new_name)),
            };
            if let Some(sock) = self.sock_mut(sid) {
                if let Some(path) = path {
                    sock.path = path;
                }
                sock.nickname = nickname;
            }
        }

        self.on_config_changed(id);
        self.refresh_dependents(id);
        Ok(())
    }

    pub fn rename_event(&mut self, old: &str, new_name: &str) -> Result<()> {
        let new_name = self.checked_name(new_name)?;
        let event = self
            .event_mut(old)
            .ok_or_else(|| BrickError::NotFound(old.to_string()))?;
        info!("Renaming event {} to {}", event.name, new_name);
        event.name = new_name;
        event.dirty = true;
        Ok(())
    }

    /// Copy a brick's configuration under a `Copy_of_` name; links are not copied
    pub fn dup_brick(&mut self, id: BrickId) -> Result<BrickId> {
        let (kind, name, cfg) = {
            let brick = self.get_brick(id)?;
            (brick.kind, brick.name.clone(), brick.cfg.clone())
        };
        let new_name = self
            .next_valid_name(&format!("Copy_of_{}", name))
            .ok_or_else(|| BrickError::InvalidName(name.clone()))?;

        let new_id = self.new_brick(kind.type_tag(), &new_name)?;
        self.get_brick_mut(new_id)?.cfg = cfg;
        self.on_config_changed(new_id);
        Ok(new_id)
    }

    pub fn dup_event(&mut self, name: &str) -> Result<String> {
        let source = self
            .event(name)
            .cloned()
            .ok_or_else(|| BrickError::NotFound(name.to_string()))?;
        let new_name = self
            .next_valid_name(&format!("Copy_of_{}", name))
            .ok_or_else(|| BrickError::InvalidName(name.to_string()))?;

        self.new_event(&new_name)?;
        if let Some(event) = self.event_mut(&new_name) {
            event.cfg = source.cfg;
            event.actions = source.actions;
        }
        Ok(new_name)
    }

    // ---- removal -------------------------------------------------------

    /// Power off and delete a brick, cutting every link that touches it
    pub fn del_brick(&mut self, id: BrickId) -> Result<()> {
        self.poweroff(id)?;

        let brick = self.get_brick(id)?;
        let name = brick.name.clone();
        let own_socks = brick.socks.clone();
        let plug_ids: Vec<PlugId> = brick.plugs.iter().map(|p| p.id).collect();

        for plug in plug_ids {
            self.disconnect_plug(id, plug);
        }

        let mut touched = Vec::new();
        for sid in &own_socks {
            let attached = self
                .sock(*sid)
                .map(|s| s.plugs.clone())
                .unwrap_or_default();
            for pref in attached {
                if let Some(plug) = self
                    .bricks
                    .get_mut(&pref.brick)
                    .and_then(|b| b.plug_mut(pref.plug))
                {
                    plug.sock = None;
                }
                touched.push(pref.brick);
            }
        }
        self.socks.retain(|s| !own_socks.contains(&s.id));

        for other in touched {
            if other != id {
                self.on_config_changed(other);
            }
        }

        self.images.release_all(id);
        self.bricks.remove(&id);
        info!("Brick {} removed", name);
        Ok(())
    }

    pub fn del_event(&mut self, name: &str) -> Result<()> {
        let idx = self
            .events
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| BrickError::NotFound(name.to_string()))?;
        self.events[idx].poweroff();
        self.events.remove(idx);
        info!("Event {} removed", name);
        Ok(())
    }

    /// Remove a brick or an event by name
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if let Some(id) = self.brick_id(name) {
            return self.del_brick(id);
        }
        if self.event(name).is_some() {
            return self.del_event(name);
        }
        if self.images.contains(name) {
            return Err(BrickError::UnmanagedType(format!("Image {}", name)));
        }
        Err(BrickError::NotFound(name.to_string()))
    }

    // ---- configuration -------------------------------------------------

    /// Apply `key=value` assignments to a brick.
    ///
    /// On a running brick, keys with a live callback are pushed to the
    /// process over its console; any other key marks the brick as needing a
    /// restart.
    pub fn configure_brick<S: AsRef<str>>(&mut self, id: BrickId, attrs: &[S]) -> Result<()> {
        let brick = self.get_brick_mut(id)?;
        let mut live_commands = Vec::new();

        for attr in attrs {
            let attr = attr.as_ref();
            if !brick.cfg.set(attr) {
                warn!("{}: ignoring malformed parameter '{}'", brick.name, attr);
                continue;
            }
            if !brick.is_running() {
                continue;
            }
            let Some((key, _)) = attr.split_once('=') else {
                continue;
            };
            let key = key.trim();
            match live::live_command(brick.kind, key, &brick.cfg.get_string(key)) {
                Some(command) => live_commands.push(command),
                None => brick.need_restart_to_apply_changes = true,
            }
        }
        brick.dirty = true;

        for command in live_commands {
            if let Err(e) = self.send_live(id, &command) {
                warn!("Live update '{}' failed: {}", command.trim_end(), e);
                self.get_brick_mut(id)?.need_restart_to_apply_changes = true;
            }
        }

        self.on_config_changed(id);
        Ok(())
    }

    /// Recompute the parameters derived from links and names
    pub(crate) fn on_config_changed(&mut self, id: BrickId) {
        let Some(brick) = self.bricks.get(&id) else {
            return;
        };
        let kind = brick.kind;
        let plug_paths: Vec<String> = brick
            .plugs
            .iter()
            .map(|p| {
                p.sock
                    .and_then(|s| self.sock(s))
                    .map(|s| s.trimmed_path().to_string())
                    .unwrap_or_default()
            })
            .collect();

        if kind == BrickKind::Switch {
            let ctl = ctl_path(&self.settings, &brick.name).display().to_string();
            let own_socks = brick.socks.clone();
            for sid in own_socks {
                if let Some(sock) = self.sock_mut(sid) {
                    sock.path = ctl.clone();
                }
            }
        }

        let Some(brick) = self.bricks.get_mut(&id) else {
            return;
        };
        let path = |i: usize| plug_paths.get(i).cloned().unwrap_or_default();
        match kind {
            BrickKind::Wire | BrickKind::Wirefilter => {
                brick.cfg.set_text("sock0", path(0));
                brick.cfg.set_text("sock1", path(1));
            }
            BrickKind::Tap | BrickKind::TunnelListen => {
                brick.cfg.set_text("sock", path(0));
            }
            BrickKind::TunnelConnect => {
                brick.cfg.set_text("sock", path(0));
                let host = brick.cfg.get_string("host");
                let port = brick.cfg.get_string("port");
                if !host.is_empty() && !port.is_empty() {
                    let bare = host.split(':').next().unwrap_or_default();
                    brick.cfg.set_text("host", format!("{}:{}", bare, port));
                }
            }
            BrickKind::Switch | BrickKind::VirtualMachine => {}
        }
        brick.dirty = true;
    }

    /// Refresh every brick plugged into one of `id`'s sockets
    pub(crate) fn refresh_dependents(&mut self, id: BrickId) {
        let dependents: Vec<BrickId> = self
            .socks
            .iter()
            .filter(|s| s.brick == id)
            .flat_map(|s| s.plugs.iter().map(|p| p.brick))
            .filter(|b| *b != id)
            .collect();
        for other in dependents {
            self.on_config_changed(other);
        }
    }

    /// Whether the brick has everything it needs to be powered on
    pub fn configured(&self, id: BrickId) -> bool {
        let Some(brick) = self.bricks.get(&id) else {
            return false;
        };
        let all_plugged = !brick.plugs.is_empty() && brick.plugs.iter().all(|p| p.sock.is_some());
        match brick.kind {
            BrickKind::Switch => brick
                .socks
                .first()
                .and_then(|s| self.sock(*s))
                .is_some_and(Sock::has_valid_path),
            BrickKind::Wire | BrickKind::Wirefilter | BrickKind::Tap | BrickKind::TunnelListen => {
                all_plugged
            }
            BrickKind::TunnelConnect => all_plugged && !brick.cfg.get_string("host").is_empty(),
            BrickKind::VirtualMachine => brick.properly_connected(),
        }
    }

    pub fn get_state(&self, id: BrickId) -> Option<BrickState> {
        let brick = self.bricks.get(&id)?;
        Some(if brick.is_running() {
            BrickState::Running
        } else if !brick.properly_connected() {
            BrickState::Disconnected
        } else {
            BrickState::Off
        })
    }

    /// Name of the brick serving the socket a plug is attached to
    pub(crate) fn peer_name(&self, plug: &Plug) -> Option<&str> {
        let sock = self.sock(plug.sock?)?;
        self.bricks.get(&sock.brick).map(|b| b.name.as_str())
    }

    /// Human-readable parameters
    pub fn describe(&self, id: BrickId) -> String {
        let Some(brick) = self.bricks.get(&id) else {
            return String::new();
        };
        let first_peer = brick.plugs.first().and_then(|p| self.peer_name(p));

        match brick.kind {
            BrickKind::Switch => {
                let mut text = format!("Ports:{}", brick.cfg.get_string("numports"));
                if brick.cfg.get_bool("fstp") {
                    text.push_str(", FSTP");
                }
                if brick.cfg.get_bool("hub") {
                    text.push_str(", HUB");
                }
                for sid in &brick.socks {
                    if let Some(free) = self.free_ports(*sid).filter(|f| *f < 0) {
                        text.push_str(&format!(", OVERCOMMITTED by {}", -free));
                    }
                }
                text
            }
            BrickKind::Wire | BrickKind::Wirefilter => {
                let side = |i: usize| {
                    brick
                        .plugs
                        .get(i)
                        .and_then(|p| self.peer_name(p))
                        .unwrap_or("disconnected")
                };
                if brick.plugs.iter().all(|p| p.sock.is_some()) {
                    format!("Configured to connect {} to {}", side(0), side(1))
                } else {
                    format!(
                        "Not yet configured. Left plug is {} and right plug is {}",
                        side(0),
                        side(1)
                    )
                }
            }
            BrickKind::Tap => match first_peer {
                Some(peer) => format!("plugged to {}", peer),
                None => "disconnected".to_string(),
            },
            BrickKind::TunnelListen => match first_peer {
                Some(peer) => format!(
                    "plugged to {}, listening to udp: {}",
                    peer,
                    brick.cfg.get_string("port")
                ),
                None => "disconnected".to_string(),
            },
            BrickKind::TunnelConnect => match first_peer {
                Some(peer) => format!(
                    "plugged to {}, connecting to udp://{}",
                    peer,
                    brick.cfg.get_string("host")
                ),
                None => "disconnected".to_string(),
            },
            BrickKind::VirtualMachine => {
                let mut text = format!(
                    "command: {}, ram: {}",
                    self.program_path(brick),
                    brick.cfg.get_string("ram")
                );
                for plug in &brick.plugs {
                    let vlan = plug.nic.as_ref().map(|n| n.vlan).unwrap_or_default();
                    if plug.mode == crate::brick::PlugMode::HostOnly {
                        text.push_str(&format!(", eth {}: Host", vlan));
                    } else if let Some(sock) = plug.sock.and_then(|s| self.sock(s)) {
                        text.push_str(&format!(", eth {}: {}", vlan, sock.nickname));
                    }
                }
                text
            }
        }
    }

    /// Running processes as `(pid, type tag, name)`
    pub fn proclist(&self) -> Vec<(u32, &'static str, &str)> {
        self.bricks
            .values()
            .filter_map(|b| b.pid().map(|pid| (pid, b.type_tag(), b.name.as_str())))
            .collect()
    }

    /// Disarm every event and stop every running brick
    pub fn quit(&mut self) {
        for event in &mut self.events {
            event.poweroff();
        }
        let running: Vec<BrickId> = self
            .bricks
            .values()
            .filter(|b| b.is_running())
            .map(|b| b.id)
            .collect();
        for id in running {
            if let Err(e) = self.poweroff(id) {
                error!("Failed to stop brick {:?}: {}", id, e);
            }
        }
        info!("Engine: Bye!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> (tempfile::TempDir, Factory) {
        let dir = tempfile::tempdir().unwrap();
        let factory = Factory::new(Settings::with_workspace(dir.path()));
        (dir, factory)
    }

    #[test]
    fn test_new_brick_aliases_and_plugs() {
        let (_dir, mut factory) = factory();
        let sw = factory.new_brick("switch", "sw1").unwrap();
        let wire = factory.new_brick("Cable", "w1").unwrap();
        let tap = factory.new_brick("tap", "tap0").unwrap();

        assert_eq!(factory.brick(sw).unwrap().socks.len(), 1);
        assert_eq!(factory.brick(wire).unwrap().plugs.len(), 2);
        assert_eq!(factory.brick(tap).unwrap().plugs.len(), 1);
        assert!(factory.sock_by_nickname("sw1_port").is_some());

        let err = factory.new_brick("router", "r1").unwrap_err();
        assert!(matches!(err, BrickError::UnmanagedType(_)));
    }

    #[test]
    fn test_names_are_shared_between_bricks_and_events() {
        let (_dir, mut factory) = factory();
        factory.new_brick("switch", "sw1").unwrap();
        assert!(matches!(
            factory.new_event("sw1"),
            Err(BrickError::InvalidName(_))
        ));
        assert!(matches!(
            factory.new_brick("vm", "9lives"),
            Err(BrickError::InvalidName(_))
        ));
        assert_eq!(factory.bricks().count(), 1);
        assert!(factory.events().is_empty());
    }

    #[test]
    fn test_next_valid_name_appends_suffix() {
        let (_dir, mut factory) = factory();
        factory.new_event("Copy_of_ev").unwrap();
        assert_eq!(
            factory.next_valid_name("Copy_of_ev").as_deref(),
            Some("Copy_of_ev_new")
        );
    }

    #[test]
    fn test_rename_switch_updates_port() {
        let (_dir, mut factory) = factory();
        let sw = factory.new_brick("switch", "sw1").unwrap();
        factory.rename_brick(sw, "core").unwrap();

        let sock = factory.sock(factory.brick(sw).unwrap().socks[0]).unwrap();
        assert_eq!(sock.nickname, "core_port");
        assert!(sock.path.ends_with("core.ctl"));
    }

    #[test]
    fn test_dup_brick_copies_config_not_links() {
        let (_dir, mut factory) = factory();
        let sw = factory.new_brick("switch", "sw1").unwrap();
        let wire = factory.new_brick("wire", "w1").unwrap();
        factory.connect_to(wire, "sw1_port").unwrap();
        factory.configure_brick(sw, &["numports=8"]).unwrap();

        let copy = factory.dup_brick(sw).unwrap();
        assert_eq!(factory.brick(copy).unwrap().name, "Copy_of_sw1");
        assert_eq!(factory.brick(copy).unwrap().cfg.get_string("numports"), "8");

        let wire_copy = factory.dup_brick(wire).unwrap();
        let copied = factory.brick(wire_copy).unwrap();
        assert!(copied.plugs.iter().all(|p| p.sock.is_none()));
        assert_eq!(copied.cfg.get_string("sock0"), "");
    }

    #[test]
    fn test_tunnel_connect_host_normalized() {
        let (_dir, mut factory) = factory();
        let tc = factory.new_brick("tunnelc", "tc").unwrap();
        factory
            .configure_brick(tc, &["host=10.0.0.2:1234", "port=9000"])
            .unwrap();
        assert_eq!(
            factory.brick(tc).unwrap().cfg.get_string("host"),
            "10.0.0.2:9000"
        );
        // Not plugged yet
        assert!(!factory.configured(tc));
    }

    #[test]
    fn test_del_brick_detaches_plugs() {
        let (_dir, mut factory) = factory();
        let sw = factory.new_brick("switch", "sw1").unwrap();
        let tap = factory.new_brick("tap", "tap0").unwrap();
        factory.connect_to(tap, "sw1_port").unwrap();
        assert!(factory.configured(tap));

        factory.remove("sw1").unwrap();
        assert!(factory.brick(sw).is_none());
        assert!(factory.socks().is_empty());
        let tap_brick = factory.brick(tap).unwrap();
        assert!(tap_brick.plugs[0].sock.is_none());
        assert_eq!(tap_brick.cfg.get_string("sock"), "");
        assert_eq!(factory.get_state(tap), Some(BrickState::Disconnected));
    }

    #[test]
    fn test_remove_image_is_unmanaged() {
        let (_dir, mut factory) = factory();
        factory.new_image("debian", "/images/debian.img").unwrap();
        assert!(matches!(
            factory.remove("debian"),
            Err(BrickError::UnmanagedType(_))
        ));
        assert!(matches!(
            factory.remove("ghost"),
            Err(BrickError::NotFound(_))
        ));
    }

    #[test]
    fn test_describe_switch_and_wire() {
        let (_dir, mut factory) = factory();
        let sw = factory.new_brick("switch", "sw1").unwrap();
        factory.configure_brick(sw, &["numports=4", "hub=*"]).unwrap();
        assert_eq!(factory.describe(sw), "Ports:4, HUB");

        let wire = factory.new_brick("wire", "w1").unwrap();
        assert_eq!(
            factory.describe(wire),
            "Not yet configured. Left plug is disconnected and right plug is disconnected"
        );
    }
}
