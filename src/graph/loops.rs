//! Link probing with loop detection.
//!
//! Checking a plug powers on the brick at the other end, requires it to be
//! running, then checks that brick's own plugs in turn. The plugs on the
//! current probe path are kept in a call-local set; meeting one again means
//! the topology loops back on itself.

use crate::brick::{BrickId, PlugMode, PlugRef};
use crate::errors::{BrickError, Result};
use crate::factory::Factory;
use log::{debug, warn};
use std::collections::HashSet;

impl Factory {
    /// Every plug of `id` leads to a powered, fully connected chain.
    ///
    /// Bricks at the other end of each link are powered on as a side effect.
    pub fn check_links(&mut self, id: BrickId) -> Result<bool> {
        let mut visited = HashSet::new();
        self.check_links_inner(id, &mut visited)
    }

    pub(crate) fn check_links_inner(
        &mut self,
        id: BrickId,
        visited: &mut HashSet<PlugRef>,
    ) -> Result<bool> {
        let plugs: Vec<PlugRef> = self
            .get_brick(id)?
            .plugs
            .iter()
            .map(|p| PlugRef { brick: id, plug: p.id })
            .collect();

        for pref in plugs {
            if !self.plug_connected(pref, visited)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Probe a single plug
    pub fn connected(&mut self, pref: PlugRef) -> Result<bool> {
        let mut visited = HashSet::new();
        self.plug_connected(pref, &mut visited)
    }

    /// Depth-first probe from one plug.
    ///
    /// A plug met twice on the same path is a loop: the probe answers `false`,
    /// or fails with `NotConnected` when `error_on_loop` is set. The plug is
    /// taken off the path again on every exit.
    pub(crate) fn plug_connected(
        &mut self,
        pref: PlugRef,
        visited: &mut HashSet<PlugRef>,
    ) -> Result<bool> {
        let Some(plug) = self.bricks.get(&pref.brick).and_then(|b| b.plug(pref.plug)) else {
            return Ok(false);
        };
        if plug.mode == PlugMode::HostOnly {
            return Ok(true);
        }

        if visited.contains(&pref) {
            if self.settings.error_on_loop {
                warn!("Network loop detected at plug {:?}", pref);
                return Err(BrickError::NotConnected("Network loop detected!".to_string()));
            }
            debug!("Network loop detected at plug {:?}", pref);
            return Ok(false);
        }

        let Some(remote) = plug.sock.and_then(|s| self.sock(s)).map(|s| s.brick) else {
            return Ok(false);
        };

        visited.insert(pref);
        let result = self.probe_remote(remote, visited);
        visited.remove(&pref);
        result
    }

    fn probe_remote(&mut self, remote: BrickId, visited: &mut HashSet<PlugRef>) -> Result<bool> {
        self.poweron_inner(remote, visited)?;
        if !self.brick(remote).is_some_and(|b| b.is_running()) {
            return Ok(false);
        }
        self.check_links_inner(remote, visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PlugTarget;
    use crate::settings::Settings;

    #[test]
    fn test_plug_without_sock_is_not_connected() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = Factory::new(Settings::with_workspace(dir.path()));
        let wire = factory.new_brick("wire", "w1").unwrap();
        let plug = factory.brick(wire).unwrap().plugs[0].id;

        assert!(!factory.connected(PlugRef { brick: wire, plug }).unwrap());
        assert!(!factory.check_links(wire).unwrap());
    }

    #[test]
    fn test_host_only_plug_needs_no_remote() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = Factory::new(Settings::with_workspace(dir.path()));
        let vm = factory.new_brick("vm", "vm1").unwrap();
        let plug = factory.add_plug(vm, PlugTarget::HostOnly, None).unwrap();

        assert!(factory.connected(PlugRef { brick: vm, plug }).unwrap());
        assert!(factory.check_links(vm).unwrap());
        assert_eq!(factory.running_count(), 0);
    }

    #[test]
    fn test_plug_into_own_sock_is_a_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = Factory::new(Settings::with_workspace(dir.path()));
        let vm = factory.new_brick("vm", "vm1").unwrap();
        let sock = factory.add_sock(vm, None).unwrap();
        let plug = factory.add_plug(vm, PlugTarget::Sock(sock), None).unwrap();
        let pref = PlugRef { brick: vm, plug };

        let err = factory.connected(pref).unwrap_err();
        assert!(matches!(err, BrickError::Linkloop(_)));

        factory.settings.error_on_loop = true;
        let err = factory.connected(pref).unwrap_err();
        assert!(matches!(err, BrickError::NotConnected(_)));
        assert_eq!(factory.running_count(), 0);
    }
}
