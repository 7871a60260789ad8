//! # Brickworks - virtual network topology engine
//!
//! This library models a virtual network made of "bricks" (VDE switches,
//! cables, link shapers, tunnels, taps and QEMU machines) and drives the
//! external processes that realize it.
//!
//! ## Overview
//!
//! A [`factory::Factory`] owns every brick, event, socket and disk image. Bricks
//! expose plugs that attach to sockets served by other bricks; powering a brick
//! on first checks that everything it is plugged into is reachable, starting
//! the bricks on the other side as needed, then synthesizes the process
//! command line from its configuration and spawns it.
//!
//! ## Key Features
//!
//! - **Connection Graph**: plugs and sockets with a cycle-safe reachability probe
//! - **Command Lines**: per-type argument vectors for `vde_switch`, `dpipe`,
//!   `wirefilter`, `vde_plug2tap`, `vde_cryptcab` and QEMU
//! - **Disk Locks**: a shared image is used directly by at most one machine
//!   disk; copy-on-write disks get private overlays
//! - **Timed Events**: delayed topology or shell actions
//! - **Project Files**: line-oriented save/restore with crash-safe replacement
//!
//! ## Architecture
//!
//! - `config_bag`: key/value parameters of bricks and events
//! - `brick`: entity model, per-type tables and disks
//! - `images`: shared disk images and their exclusive lock
//! - `event`: timed actions
//! - `factory`: the entity registry and command dispatcher
//! - `graph`: plug/socket wiring and loop detection
//! - `cmdline`: argument vector synthesis
//! - `lifecycle`: process spawn, reconcile and shutdown; management consoles
//! - `persistence`: project file format and backup protocol
//! - `settings` / `settings_loader`: engine settings from YAML
//! - `utils`: program resolution, names, MAC addresses
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use brickworks::factory::Factory;
//! use brickworks::settings_loader::load_or_default;
//! use std::path::Path;
//!
//! let settings = load_or_default(None)?;
//! let mut factory = Factory::new(settings);
//!
//! factory.new_brick("switch", "sw1")?;
//! let vm = factory.new_brick("vm", "vm1")?;
//! factory.connect_to(vm, "sw1_port")?;
//!
//! // Starts sw1 first, then the machine
//! factory.poweron(vm)?;
//! factory.save(Path::new("lab.vbl"))?;
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`errors::Result`]. Validation failures leave
//! state untouched; a failed power-on leaves no half-started process behind.

pub mod brick;
pub mod cmdline;
pub mod config_bag;
pub mod errors;
pub mod event;
pub mod factory;
pub mod graph;
pub mod images;
pub mod lifecycle;
pub mod persistence;
pub mod settings;
pub mod settings_loader;
pub mod utils;

pub use errors::{BrickError, Result};
pub use factory::Factory;
