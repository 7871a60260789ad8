use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide settings.
///
/// Every field has a default, so an empty or partial YAML document is a valid
/// settings file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding control sockets, management consoles and pidfiles
    pub workspace: PathBuf,
    /// Directory of the VDE tools (vde_switch, wirefilter, dpipe, ...)
    pub vdepath: String,
    /// Directory of the machine emulators (qemu, kvm, qemu-system-*)
    pub qemupath: String,
    /// Directory where copy-on-write overlays are created
    pub baseimages: PathBuf,
    /// Privilege-escalation program; receives the whole command as one argument
    pub sudo: String,
    /// Tool used to create copy-on-write overlays
    pub qemu_img: String,
    /// Treat a loop found during the link probe as a hard `NotConnected` error
    pub error_on_loop: bool,
    /// Attempts made to reach a management console after spawn
    pub console_connect_retries: u32,
    #[serde(with = "humantime_serde")]
    pub console_retry_interval: Duration,
    /// Idle time after which a console response is considered complete
    #[serde(with = "humantime_serde")]
    pub console_idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poweroff_poll_interval: Duration,
}

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workspace.as_os_str().is_empty() {
            return Err(ValidationError::InvalidPath(
                "workspace cannot be empty".to_string(),
            ));
        }

        for (field, value) in [
            ("vdepath", &self.vdepath),
            ("qemupath", &self.qemupath),
            ("sudo", &self.sudo),
            ("qemu_img", &self.qemu_img),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidProgram(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        if self.console_connect_retries == 0 {
            return Err(ValidationError::InvalidConsole(
                "console_connect_retries must be at least 1".to_string(),
            ));
        }

        if self.poweroff_poll_interval.is_zero() {
            return Err(ValidationError::InvalidConsole(
                "poweroff_poll_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings rooted at `workspace`, with overlays under `workspace/images`
    pub fn with_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            baseimages: workspace.join("images"),
            workspace,
            ..Self::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let workspace = home.join(".brickworks");

        Self {
            baseimages: workspace.join("images"),
            workspace,
            vdepath: "/usr/bin".to_string(),
            qemupath: "/usr/bin".to_string(),
            sudo: "/usr/bin/gksu".to_string(),
            qemu_img: "/usr/bin/qemu-img".to_string(),
            error_on_loop: false,
            console_connect_retries: 10,
            console_retry_interval: Duration::from_millis(500),
            console_idle_timeout: Duration::from_millis(300),
            poweroff_poll_interval: Duration::from_millis(50),
        }
    }
}

/// Settings validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid path setting: {0}")]
    InvalidPath(String),
    #[error("Invalid program setting: {0}")]
    InvalidProgram(String),
    #[error("Invalid console setting: {0}")]
    InvalidConsole(String),
}
