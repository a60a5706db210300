pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Settings file names, in priority order
const SETTINGS_CANDIDATES: [&str; 2] = ["sealbucket.local.yaml", "sealbucket.yaml"];

/// Directory holding project-local settings and stack state
pub const PROJECT_DIR: &str = ".sealbucket";

/// Provider backing a stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Aws,
    Memory,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aws" => Ok(ProviderKind::Aws),
            "memory" => Ok(ProviderKind::Memory),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Aws => write!(f, "aws"),
            ProviderKind::Memory => write!(f, "memory"),
        }
    }
}

/// Settings for one stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    /// Stack name; selects the state file
    pub stack: String,

    /// Provider backing the stack
    pub provider: ProviderKind,

    /// AWS region (falls back to the AWS default chain)
    pub region: Option<String>,

    /// AWS shared-config profile
    pub profile: Option<String>,

    /// Logical resource names the memory provider rejects, for rehearsing
    /// failed runs offline
    pub fail_on: Vec<String>,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            stack: "dev".to_string(),
            provider: ProviderKind::Aws,
            region: None,
            profile: None,
            fail_on: Vec::new(),
        }
    }
}

impl StackSettings {
    /// Apply command-line / environment overrides
    pub fn with_overrides(
        mut self,
        stack: Option<String>,
        provider: Option<ProviderKind>,
    ) -> Result<Self> {
        if let Some(stack) = stack {
            self.stack = stack;
        }
        if let Some(provider) = provider {
            self.provider = provider;
        }
        validate_stack_name(&self.stack)?;
        Ok(self)
    }
}

/// Stack names end up in file names
fn validate_stack_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidStackName(name.to_string()))
    }
}

/// SealBucket's global config directory (`~/.config/sealbucket`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("sealbucket");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the settings file
///
/// Search order:
/// 1. `SEALBUCKET_CONFIG_PATH` (direct path)
/// 2. current directory: sealbucket.local.yaml, sealbucket.yaml
/// 3. `./.sealbucket/` with the same order
/// 4. `~/.config/sealbucket/sealbucket.yaml` (global settings)
///
/// Returns `None` when no file exists; the defaults apply in that case.
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var("SEALBUCKET_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!(
            "SEALBUCKET_CONFIG_PATH points to missing file {}",
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;

    for filename in &SETTINGS_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &SETTINGS_CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(Some(path));
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("sealbucket").join("sealbucket.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Read settings from a YAML file
pub fn load_from(path: &Path) -> Result<StackSettings> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(StackSettings::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Discover and load settings, falling back to defaults
pub fn load_settings() -> Result<StackSettings> {
    match find_settings_file()? {
        Some(path) => {
            tracing::debug!("Loading settings from {}", path.display());
            load_from(&path)
        }
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(StackSettings::default())
        }
    }
}
