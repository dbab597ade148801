use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// Smallest excerpt budget accepted by [`SidecarConfig::validate`].
pub const MIN_BUDGET: usize = 256;

const CONFIG_FILE: &str = "config.json";

/// Runtime configuration, passed explicitly into every component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SidecarConfig {
    /// Where briefings, insights and prompts live.
    pub data_dir: PathBuf,
    /// Root of the per-project transcript directories.
    pub projects_dir: PathBuf,
    /// Byte budget for the reduced transcript's excerpts.
    pub budget_bytes: usize,
    /// Upper bound for any single non-user excerpt.
    pub excerpt_cap_bytes: usize,
    /// Upper bound for the patch text handed to the model.
    pub diff_cap_bytes: usize,
    pub generation_timeout_secs: u64,
    pub model: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            data_dir: home.join(".config").join("sidecar"),
            projects_dir: home.join(".claude").join("projects"),
            budget_bytes: 24_000,
            excerpt_cap_bytes: 2_000,
            diff_cap_bytes: 32_000,
            generation_timeout_secs: 120,
            model: "haiku".to_string(),
        }
    }
}

impl SidecarConfig {
    /// Defaults rooted at `data_dir`, overridden by `<data_dir>/config.json` when present.
    pub fn load(data_dir: &Path) -> Result<Self, SidecarError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<SidecarConfig>(&raw)
                .map_err(|e| SidecarError::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SidecarConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Write `config.json` into the data dir.
    pub fn save(&self) -> Result<(), SidecarError> {
        fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(self.data_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SidecarError> {
        if self.budget_bytes < MIN_BUDGET {
            return Err(SidecarError::Config(format!(
                "budget_bytes must be at least {MIN_BUDGET}, got {}",
                self.budget_bytes
            )));
        }
        if self.excerpt_cap_bytes == 0 {
            return Err(SidecarError::Config("excerpt_cap_bytes must be positive".into()));
        }
        if self.generation_timeout_secs == 0 {
            return Err(SidecarError::Config(
                "generation_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn briefings_dir(&self) -> PathBuf {
        self.data_dir.join("briefings")
    }

    pub fn insights_path(&self) -> PathBuf {
        self.data_dir.join("insights.json")
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.data_dir.join("prompts.json")
    }
}

/// Default data dir, honoring nothing but `$HOME`.
pub fn default_data_dir() -> PathBuf {
    home_dir().join(".config").join("sidecar")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
