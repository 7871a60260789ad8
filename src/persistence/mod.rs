//! Project files.
//!
//! Saving writes images, events and bricks as sections, then one record per
//! machine socket and one per plug. Loading is a single forward scan:
//! parameters are buffered and applied in one configure call when the next
//! section or record starts, and socket and link records are resolved only
//! once every section has been read. A malformed line or a record naming a
//! missing brick or socket is logged and skipped.

pub mod backup;
pub mod parser;

use crate::brick::{BrickId, BrickKind, Nic, PlugMode};
use crate::errors::Result;
use crate::event::{parse_action_list, Event};
use crate::factory::Factory;
use crate::graph::{PlugTarget, DEFAULT_NIC_MODEL};
use crate::utils::random_mac;
use log::{debug, info, warn};
use parser::{parse_line, LinkKind, LinkRecord, Record};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// What a load created and what it had to skip
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub images: usize,
    pub events: usize,
    pub bricks: usize,
    pub socks: usize,
    pub links: usize,
    pub skipped: usize,
    /// An interrupted save was detected and its backup put back first
    pub recovered_backup: bool,
}

/// Section currently receiving parameters
enum Target {
    None,
    Image(String),
    Event(String),
    Brick(BrickId),
}

impl Factory {
    /// Write the project to `path`, replacing any previous file safely
    pub fn save(&self, path: &Path) -> Result<()> {
        info!("Saving project to {:?}", path);
        backup::write_atomically(path, |out| self.save_to(out))?;
        Ok(())
    }

    pub fn save_to(&self, out: &mut dyn Write) -> io::Result<()> {
        for image in self.images.persistent() {
            writeln!(out, "[Image:{}]", image.name)?;
            writeln!(out, "path={}", image.path.display())?;
            writeln!(out)?;
        }

        for event in &self.events {
            write_event(out, event)?;
        }

        let mut records = Vec::new();
        let mut links = Vec::new();
        for brick in self.bricks.values() {
            writeln!(out, "[{}:{}]", brick.type_tag(), brick.name)?;
            for (key, value) in brick.cfg.scalars() {
                writeln!(out, "{}={}", key, value)?;
            }
            writeln!(out)?;

            let is_vm = brick.kind == BrickKind::VirtualMachine;
            if is_vm {
                for sock in brick.socks.iter().filter_map(|s| self.sock(*s)) {
                    let nic = sock.nic.clone().unwrap_or_else(default_nic);
                    records.push(LinkRecord {
                        kind: LinkKind::Sock,
                        owner: brick.name.clone(),
                        sockname: sock.nickname.clone(),
                        model: nic.model,
                        mac: nic.mac,
                        vlan: Some(nic.vlan),
                    });
                }
            }

            for plug in &brick.plugs {
                let sockname = plug
                    .sock
                    .and_then(|s| self.sock(s))
                    .map(|s| s.nickname.clone())
                    .unwrap_or_default();
                if is_vm {
                    let nic = plug.nic.clone().unwrap_or_else(default_nic);
                    let kind = match plug.mode {
                        PlugMode::HostOnly => LinkKind::UserLink,
                        PlugMode::Vde => LinkKind::Link,
                    };
                    links.push(LinkRecord {
                        kind,
                        owner: brick.name.clone(),
                        sockname,
                        model: nic.model,
                        mac: nic.mac,
                        vlan: Some(nic.vlan),
                    });
                } else if !sockname.is_empty() {
                    links.push(LinkRecord {
                        kind: LinkKind::Link,
                        owner: brick.name.clone(),
                        sockname,
                        model: String::new(),
                        mac: String::new(),
                        vlan: None,
                    });
                }
            }
        }

        for record in records.iter().chain(&links) {
            writeln!(out, "{}", record.to_line())?;
        }
        Ok(())
    }

    /// Load a project file into this factory.
    ///
    /// A backup left by an interrupted save is restored first.
    pub fn restore(&mut self, path: &Path) -> Result<RestoreReport> {
        let recovered = backup::restore_backup(path)?;
        info!("Opening project {:?}", path);
        let file = fs::File::open(path)?;
        let mut report = self.restore_from(BufReader::new(file))?;
        report.recovered_backup = recovered;
        Ok(report)
    }

    pub fn restore_from<R: BufRead>(&mut self, input: R) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut target = Target::None;
        let mut params: Vec<String> = Vec::new();
        let mut deferred: Vec<LinkRecord> = Vec::new();

        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let record = match parse_line(&line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("line {}: {}, skipping '{}'", idx + 1, e, line);
                    report.skipped += 1;
                    continue;
                }
            };

            match record {
                Record::Param(param) => {
                    if matches!(target, Target::None) {
                        warn!("line {}: parameter outside any section, skipping", idx + 1);
                        report.skipped += 1;
                    } else {
                        params.push(param);
                    }
                }
                Record::Section { kind, name } => {
                    self.apply_params(&target, &mut params, &mut report);
                    target = self.open_section(&kind, &name, &mut report);
                }
                Record::Link(link) => {
                    self.apply_params(&target, &mut params, &mut report);
                    target = Target::None;
                    deferred.push(link);
                }
            }
        }
        self.apply_params(&target, &mut params, &mut report);

        // Sockets first so links can name them
        let (socks, links): (Vec<_>, Vec<_>) =
            deferred.into_iter().partition(|r| r.kind == LinkKind::Sock);
        for record in socks.iter().chain(&links) {
            if self.restore_link(record)? {
                match record.kind {
                    LinkKind::Sock => report.socks += 1,
                    LinkKind::Link | LinkKind::UserLink => report.links += 1,
                }
            } else {
                report.skipped += 1;
            }
        }

        info!(
            "Project loaded: {} bricks, {} events, {} images, {} links ({} lines skipped)",
            report.bricks, report.events, report.images, report.links, report.skipped
        );
        Ok(report)
    }

    fn open_section(&mut self, kind: &str, name: &str, report: &mut RestoreReport) -> Target {
        match kind {
            "Image" => {
                debug!("Found disk image {}", name);
                Target::Image(name.to_string())
            }
            "Event" => match self.new_event(name) {
                Ok(()) => {
                    report.events += 1;
                    Target::Event(name.to_string())
                }
                Err(e) => {
                    warn!("Cannot create event {}: {}, skipping section", name, e);
                    report.skipped += 1;
                    Target::None
                }
            },
            _ => match self.new_brick(kind, name) {
                Ok(id) => {
                    report.bricks += 1;
                    Target::Brick(id)
                }
                Err(e) => {
                    warn!("Cannot create {} {}: {}, skipping section", kind, name, e);
                    report.skipped += 1;
                    Target::None
                }
            },
        }
    }

    /// Hand the buffered parameters to the section they belong to
    fn apply_params(&mut self, target: &Target, params: &mut Vec<String>, report: &mut RestoreReport) {
        let params = std::mem::take(params);
        match target {
            Target::None => {}
            Target::Image(name) => {
                if self.restore_image(name, &params) {
                    report.images += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Target::Event(name) => {
                if let Some(event) = self.event_mut(name) {
                    report.skipped += restore_event_params(event, &params);
                }
            }
            Target::Brick(id) => {
                if let Err(e) = self.configure_brick(*id, &params) {
                    warn!("Cannot configure brick: {}", e);
                    report.skipped += 1;
                }
            }
        }
    }

    fn restore_image(&mut self, name: &str, params: &[String]) -> bool {
        let path = params
            .iter()
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim() == "path")
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();

        if !self.is_name_free(name) || self.images.contains(name) {
            info!("Skipping disk image, name '{}' already in use", name);
            return false;
        }
        if fs::File::open(&path).is_err() {
            info!("Cannot access image file {:?}, skipping", path);
            return false;
        }
        match self.new_image(name, path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot register image {}: {}", name, e);
                false
            }
        }
    }

    /// Recreate one socket or link; `false` when it had to be dropped
    fn restore_link(&mut self, record: &LinkRecord) -> Result<bool> {
        let line = record.to_line();
        let Some(owner) = self.brick_id(&record.owner) else {
            warn!("Cannot find brick {}, skipping line {}", record.owner, line);
            return Ok(false);
        };
        let is_vm = self.get_brick(owner)?.kind == BrickKind::VirtualMachine;
        let nic = record_nic(record);

        match record.kind {
            LinkKind::Sock => {
                if !is_vm {
                    warn!("{} serves no dynamic sockets, skipping line {}", record.owner, line);
                    return Ok(false);
                }
                self.add_sock(owner, nic)?;
            }
            LinkKind::UserLink => {
                if !is_vm {
                    warn!("{} has no host-only interfaces, skipping line {}", record.owner, line);
                    return Ok(false);
                }
                self.add_plug(owner, PlugTarget::HostOnly, nic)?;
            }
            LinkKind::Link => {
                let sock = if record.sockname.is_empty() {
                    None
                } else {
                    match self.sock_by_nickname(&record.sockname) {
                        Some(sock) => Some(sock),
                        None => {
                            warn!("Cannot find sock {}, skipping line {}", record.sockname, line);
                            return Ok(false);
                        }
                    }
                };
                if is_vm {
                    let target = sock.map_or(PlugTarget::Unplugged, PlugTarget::Sock);
                    self.add_plug(owner, target, nic)?;
                } else if !self.connect_to(owner, &record.sockname)? {
                    warn!("{} has no free plug, skipping line {}", record.owner, line);
                    return Ok(false);
                }
            }
        }
        debug!("Added {} to {}", record.kind.keyword(), record.owner);
        Ok(true)
    }
}

fn write_event(out: &mut dyn Write, event: &Event) -> io::Result<()> {
    writeln!(out, "[Event:{}]", event.name)?;
    for (key, value) in event.cfg.scalars() {
        writeln!(out, "{}={}", key, value)?;
    }
    writeln!(out, "actions={}", event.actions_to_string())?;
    writeln!(out)
}

/// Apply event parameters; returns the number of entries that were dropped
fn restore_event_params(event: &mut Event, params: &[String]) -> usize {
    let mut skipped = 0;
    let mut plain = Vec::new();

    for param in params {
        let Some(list) = param.strip_prefix("actions=") else {
            plain.push(param.as_str());
            continue;
        };
        let Some(actions) = parse_action_list(list) else {
            warn!("Event {}: unreadable action list '{}'", event.name, list);
            skipped += 1;
            continue;
        };
        for action in actions {
            let tokens: Vec<&str> = action.split_whitespace().collect();
            if let Err(e) = event.configure(&tokens) {
                warn!("Event {}: {}", event.name, e);
                skipped += 1;
            }
        }
    }

    if let Err(e) = event.configure(&plain) {
        warn!("Event {}: {}", event.name, e);
        skipped += 1;
    }
    skipped
}

fn default_nic() -> Nic {
    Nic {
        model: DEFAULT_NIC_MODEL.to_string(),
        mac: random_mac(),
        vlan: 0,
    }
}

/// NIC described by a record, or `None` to let the machine pick one
fn record_nic(record: &LinkRecord) -> Option<Nic> {
    let vlan = record.vlan?;
    let model = if record.model.is_empty() {
        DEFAULT_NIC_MODEL.to_string()
    } else {
        record.model.clone()
    };
    let mac = if record.mac.is_empty() {
        random_mac()
    } else {
        record.mac.clone()
    };
    Some(Nic { model, mac, vlan })
}
