//! Shared fixtures for integration tests.

#![allow(dead_code)]

use brickworks::factory::Factory;
use brickworks::lifecycle::Launcher;
use brickworks::settings::Settings;
use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::time::Duration;

/// Records every command line and starts a stand-in process instead
pub struct RecordingLauncher {
    pub launched: Rc<RefCell<Vec<Vec<String>>>>,
    stand_in: Vec<String>,
}

impl RecordingLauncher {
    /// Stand-in that keeps running until stopped
    pub fn sleeping() -> Self {
        Self::with_stand_in(&["sleep", "30"])
    }

    pub fn with_stand_in(argv: &[&str]) -> Self {
        Self {
            launched: Rc::new(RefCell::new(Vec::new())),
            stand_in: argv.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, argv: &[String]) -> io::Result<Child> {
        self.launched.borrow_mut().push(argv.to_vec());
        Command::new(&self.stand_in[0])
            .args(&self.stand_in[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

/// Settings rooted at `workspace` with short console and poll timings
pub fn test_settings(workspace: &Path) -> Settings {
    let mut settings = Settings::with_workspace(workspace);
    settings.vdepath = "/opt/vde".to_string();
    settings.qemupath = "/opt/qemu".to_string();
    settings.console_connect_retries = 1;
    settings.console_retry_interval = Duration::from_millis(1);
    settings.console_idle_timeout = Duration::from_millis(10);
    settings.poweroff_poll_interval = Duration::from_millis(10);
    settings
}

/// Factory spawning stand-ins, with a handle on the recorded command lines
pub fn recording_factory(
    workspace: &Path,
    launcher: RecordingLauncher,
) -> (Factory, Rc<RefCell<Vec<Vec<String>>>>) {
    let launched = Rc::clone(&launcher.launched);
    let factory = Factory::with_launcher(test_settings(workspace), Box::new(launcher));
    (factory, launched)
}
