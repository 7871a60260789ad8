use brickworks::factory::Factory;
use brickworks::settings_loader::{apply_overrides, load_or_default, SettingsOverrides};
use brickworks::utils::validate_program;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// Virtual network topology engine for VDE and QEMU
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project file describing the topology
    #[arg(short, long)]
    project: PathBuf,

    /// Engine settings YAML file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Directory for control sockets, consoles and pidfiles
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Report network loops as errors instead of refusing silently
    #[arg(long)]
    error_on_loop: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// List bricks, events and sockets
    List {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Describe one brick or event
    Show { name: String },
    /// Print the command line a brick would be started with
    Cmdline { name: String },
    /// Report configuration and connection problems without starting anything
    Check,
    /// Power on bricks and events, wait until everything stopped, then save
    Run {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Serialize)]
struct BrickRow<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    state: String,
    pid: Option<u32>,
    links: Vec<Option<String>>,
}

#[derive(Serialize)]
struct EventRow<'a> {
    name: &'a str,
    state: brickworks::event::EventState,
    delay: f64,
}

#[derive(Serialize)]
struct SockRow<'a> {
    nickname: &'a str,
    path: &'a str,
    free_ports: Option<i64>,
}

#[derive(Serialize)]
struct Listing<'a> {
    bricks: Vec<BrickRow<'a>>,
    events: Vec<EventRow<'a>>,
    socks: Vec<SockRow<'a>>,
}

fn listing(factory: &Factory) -> Listing<'_> {
    let bricks = factory
        .bricks()
        .map(|b| BrickRow {
            name: &b.name,
            kind: b.type_tag(),
            state: factory
                .get_state(b.id)
                .map(|s| s.to_string())
                .unwrap_or_default(),
            pid: b.pid(),
            links: factory.link_map(b.id),
        })
        .collect();
    let events = factory
        .events()
        .iter()
        .map(|e| EventRow {
            name: &e.name,
            state: e.state(),
            delay: e.delay().as_secs_f64(),
        })
        .collect();
    let socks = factory
        .socks()
        .iter()
        .map(|s| SockRow {
            nickname: &s.nickname,
            path: &s.path,
            free_ports: factory.free_ports(s.id),
        })
        .collect();
    Listing {
        bricks,
        events,
        socks,
    }
}

fn print_listing(factory: &Factory, json: bool) -> Result<()> {
    let listing = listing(factory);
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Bricks:");
    for b in &listing.bricks {
        println!("  {:<16} {:<14} {}", b.name, b.kind, b.state);
    }
    println!("Events:");
    for e in &listing.events {
        println!("  {:<16} delay {}s", e.name, e.delay);
    }
    println!("Sockets:");
    for s in &listing.socks {
        match s.free_ports {
            Some(free) => println!("  {:<24} {} free", s.nickname, free),
            None => println!("  {:<24} {}", s.nickname, s.path),
        }
    }
    Ok(())
}

/// Count of topology problems found; missing programs are only reported
fn check(factory: &Factory) -> usize {
    let mut problems = 0;
    for brick in factory.bricks() {
        if let Err(e) = validate_program(Path::new(&factory.program_path(brick))) {
            warn!("{}: {}", brick.name, e);
        }
        if !factory.configured(brick.id) {
            warn!("{}: not configured", brick.name);
            problems += 1;
        }
        if !brick.properly_connected() {
            warn!("{}: has unconnected plugs", brick.name);
            problems += 1;
        }
    }
    for sock in factory.socks() {
        if let Some(free) = factory.free_ports(sock.id).filter(|f| *f < 0) {
            warn!("{}: overcommitted by {}", sock.nickname, -free);
            problems += 1;
        }
    }
    for event in factory.events() {
        if !event.configured() {
            warn!("Event {}: not configured", event.name);
            problems += 1;
        }
    }
    problems
}

fn run(factory: &mut Factory, names: &[String]) -> Result<()> {
    for name in names {
        if let Some(id) = factory.brick_id(name) {
            factory
                .poweron(id)
                .wrap_err_with(|| format!("Failed to power on '{}'", name))?;
        } else if factory.event(name).is_some() {
            factory
                .poweron_event(name)
                .wrap_err_with(|| format!("Failed to start event '{}'", name))?;
        } else {
            bail!("No brick or event named '{}'", name);
        }
    }
    info!("{} processes running", factory.running_count());

    let poll = factory.settings.poweroff_poll_interval;
    while factory.running_count() > 0 || factory.armed_events() > 0 {
        thread::sleep(poll);
        for id in factory.reap() {
            if let Some(brick) = factory.brick(id) {
                info!("{} exited", brick.name);
            }
        }
        factory.fire_due_events(Instant::now());
    }

    factory.quit();
    Ok(())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut settings = load_or_default(args.settings.as_deref())?;
    let overrides = SettingsOverrides {
        workspace: args.workspace.clone(),
        error_on_loop: args.error_on_loop,
    };
    apply_overrides(&mut settings, &overrides)?;

    let mut factory = Factory::new(settings);
    if args.project.exists() {
        let report = factory
            .restore(&args.project)
            .wrap_err_with(|| format!("Failed to load project '{}'", args.project.display()))?;
        if report.recovered_backup {
            warn!("Project recovered from an interrupted save");
        }
    } else {
        info!("Project {:?} does not exist, starting empty", args.project);
    }

    match &args.command {
        Command::List { json } => print_listing(&factory, *json)?,
        Command::Show { name } => {
            if let Some(id) = factory.brick_id(name) {
                println!("{}", factory.describe(id));
            } else if let Some(event) = factory.event(name) {
                println!("{}", event.describe());
            } else {
                bail!("No brick or event named '{}'", name);
            }
        }
        Command::Cmdline { name } => {
            let id = factory.lookup_brick(name)?;
            let argv = factory.command_line(id)?;
            println!("{}", argv.join(" "));
        }
        Command::Check => {
            let problems = check(&factory);
            if problems > 0 {
                bail!("{} problem(s) found", problems);
            }
            info!("No problems found");
        }
        Command::Run { names } => {
            run(&mut factory, names)?;
            factory
                .save(&args.project)
                .wrap_err_with(|| format!("Failed to save project '{}'", args.project.display()))?;
            info!("Project saved to {:?}", args.project);
        }
    }

    Ok(())
}
