//! Non-interactive command dispatcher and event firing.
//!
//! Topology actions stored in events are plain command lines such as
//! `new switch sw2`, `sw2 config numports=8` or `vm1 on`. They are executed
//! here, on the control thread, when an event fires.

use super::Factory;
use crate::errors::{BrickError, Result};
use crate::event::{Action, ActionKind};
use log::{error, info, warn};
use std::process::Command;
use std::time::Instant;

impl Factory {
    /// Execute one command line.
    ///
    /// Grammar: `new <type> <name>`, or `<name> <verb> [args...]` where verb
    /// is one of `on`, `off`, `remove`, `config`, `connect`, `disconnect`.
    pub fn execute(&mut self, line: &str) -> Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, rest)) = tokens.split_first() else {
            return Ok(());
        };

        if head == "new" {
            return match rest {
                [kind, name] if kind.eq_ignore_ascii_case("event") => self.new_event(name),
                [kind, name] => self.new_brick(kind, name).map(|_| ()),
                _ => Err(BrickError::InvalidCommand(line.to_string())),
            };
        }

        let Some((&verb, args)) = rest.split_first() else {
            return Err(BrickError::InvalidCommand(line.to_string()));
        };

        if let Some(id) = self.brick_id(head) {
            return match (verb, args) {
                ("on", []) => self.poweron(id),
                ("off", []) => self.poweroff(id),
                ("remove", []) => self.del_brick(id),
                ("config", attrs) => self.configure_brick(id, attrs),
                ("connect", [nickname]) => {
                    if self.connect_to(id, nickname)? {
                        info!("{}: connection ok", head);
                    } else {
                        warn!("{}: connection to {} failed", head, nickname);
                    }
                    Ok(())
                }
                ("disconnect", []) => {
                    self.disconnect(id);
                    Ok(())
                }
                _ => Err(BrickError::InvalidCommand(line.to_string())),
            };
        }

        if self.event(head).is_some() {
            return match (verb, args) {
                ("on", []) => self.poweron_event(head),
                ("off", []) => {
                    if let Some(event) = self.event_mut(head) {
                        event.poweroff();
                    }
                    Ok(())
                }
                ("remove", []) => self.del_event(head),
                ("config", tokens) => match self.event_mut(head) {
                    Some(event) => event.configure(tokens),
                    None => Err(BrickError::NotFound(head.to_string())),
                },
                // Events take no part in the plug/socket graph
                ("connect", _) | ("disconnect", []) => Ok(()),
                _ => Err(BrickError::InvalidCommand(line.to_string())),
            };
        }

        Err(BrickError::NotFound(head.to_string()))
    }

    /// Arm an event by name
    pub fn poweron_event(&mut self, name: &str) -> Result<()> {
        let event = self
            .event_mut(name)
            .ok_or_else(|| BrickError::NotFound(name.to_string()))?;
        event.poweron(Instant::now())?;
        info!("Event {} armed, firing in {:?}", name, event.delay());
        Ok(())
    }

    /// Fire every event whose delay has elapsed at `now`.
    ///
    /// Returns the number of events fired. A failing action is logged and
    /// the remaining actions still run.
    pub fn fire_due_events(&mut self, now: Instant) -> usize {
        let mut due: Vec<(String, Vec<Action>)> = Vec::new();
        for event in &mut self.events {
            if event.is_due(now) {
                due.push((event.name.clone(), event.take_due_actions()));
            }
        }

        for (name, actions) in &due {
            info!("Event {} fired", name);
            for action in actions {
                match action.kind {
                    ActionKind::Internal => {
                        if let Err(e) = self.execute(&action.text) {
                            error!("Event {}: '{}' failed: {}", name, action.text, e);
                        }
                    }
                    ActionKind::External => run_shell(name, &action.text),
                }
            }
        }
        due.len()
    }

    /// Events currently armed
    pub fn armed_events(&self) -> usize {
        self.events.iter().filter(|e| e.active).count()
    }
}

fn run_shell(event: &str, text: &str) {
    match Command::new("sh").arg("-c").arg(text).status() {
        Ok(status) if status.success() => info!("Event {}: '{}' done", event, text),
        Ok(status) => warn!("Event {}: '{}' exited with {}", event, text, status),
        Err(e) => error!("Event {}: cannot run '{}': {}", event, text, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::time::Duration;

    fn factory() -> (tempfile::TempDir, Factory) {
        let dir = tempfile::tempdir().unwrap();
        let factory = Factory::new(Settings::with_workspace(dir.path()));
        (dir, factory)
    }

    #[test]
    fn test_execute_new_config_connect() {
        let (_dir, mut factory) = factory();
        factory.execute("new switch sw1").unwrap();
        factory.execute("new tap tap0").unwrap();
        factory.execute("sw1 config numports=4").unwrap();
        factory.execute("tap0 connect sw1_port").unwrap();

        let sw = factory.brick_by_name("sw1").unwrap();
        assert_eq!(sw.cfg.get_string("numports"), "4");
        let tap = factory.lookup_brick("tap0").unwrap();
        assert!(factory.configured(tap));

        factory.execute("tap0 disconnect").unwrap();
        assert!(!factory.configured(tap));
    }

    #[test]
    fn test_execute_rejects_unknown() {
        let (_dir, mut factory) = factory();
        assert!(factory.execute("").is_ok());
        assert!(matches!(
            factory.execute("ghost on"),
            Err(BrickError::NotFound(_))
        ));
        factory.execute("new switch sw1").unwrap();
        assert!(matches!(
            factory.execute("sw1 explode"),
            Err(BrickError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_due_event_runs_topology_actions() {
        let (_dir, mut factory) = factory();
        factory.execute("new event ev").unwrap();
        factory.execute("ev config delay=1").unwrap();
        factory
            .execute("ev config add new switch sw9 add sw9 config numports=3")
            .unwrap();

        let start = Instant::now();
        factory.event_mut("ev").unwrap().poweron(start).unwrap();
        assert_eq!(factory.fire_due_events(start), 0);
        assert_eq!(factory.fire_due_events(start + Duration::from_secs(1)), 1);

        let sw = factory.brick_by_name("sw9").unwrap();
        assert_eq!(sw.cfg.get_string("numports"), "3");
        assert_eq!(factory.armed_events(), 0);
    }

    #[test]
    fn test_due_event_runs_shell_actions() {
        let (dir, mut factory) = factory();
        let marker = dir.path().join("fired");
        factory.new_event("ev").unwrap();
        let event = factory.event_mut("ev").unwrap();
        event.configure(&["delay=1"]).unwrap();
        event
            .configure(&["addsh", "touch", marker.to_str().unwrap()])
            .unwrap();

        let start = Instant::now();
        event.poweron(start).unwrap();
        factory.fire_due_events(start + Duration::from_secs(2));
        assert!(marker.exists());
    }
}
