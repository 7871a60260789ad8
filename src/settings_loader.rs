use crate::settings::Settings;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load and validate settings from a YAML file
pub fn load_settings(settings_path: &Path) -> Result<Settings> {
    info!("Loading settings from: {:?}", settings_path);

    let file = File::open(settings_path)
        .wrap_err_with(|| format!("Failed to open settings file '{}'", settings_path.display()))?;

    let settings: Settings = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse settings file '{}'", settings_path.display()))?;

    settings.validate()?;

    Ok(settings)
}

/// Load settings if a path was given, otherwise fall back to defaults
pub fn load_or_default(settings_path: Option<&Path>) -> Result<Settings> {
    match settings_path {
        Some(path) => load_settings(path),
        None => {
            info!("No settings file given, using defaults");
            Ok(Settings::default())
        }
    }
}

/// CLI arguments that take precedence over the settings file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub workspace: Option<PathBuf>,
    pub error_on_loop: bool,
}

/// Apply CLI overrides to loaded settings
pub fn apply_overrides(settings: &mut Settings, overrides: &SettingsOverrides) -> Result<()> {
    if let Some(workspace) = &overrides.workspace {
        info!("Workspace overridden to {:?}", workspace);
        // Overlays follow the workspace unless they were placed elsewhere explicitly
        if settings.baseimages == settings.workspace.join("images") {
            settings.baseimages = workspace.join("images");
        }
        settings.workspace = workspace.clone();
    }

    if overrides.error_on_loop && !settings.error_on_loop {
        info!("Network loops will be reported as errors");
        settings.error_on_loop = true;
    }

    settings.validate()?;

    if !settings.workspace.exists() {
        warn!(
            "Workspace {:?} does not exist yet; switches will not be considered configured",
            settings.workspace
        );
    }

    Ok(())
}
