use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FinbotError, Result};
use crate::review::{validate_threshold, LowConfidencePolicy};
use crate::sources::{default_sources, SourceConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub confidence_threshold: f64,
    /// Rows dated before this year are left out of training.
    pub training_cutoff_year: i32,
    pub low_confidence_policy: LowConfidencePolicy,
    pub write_reports: bool,
    pub sources: Vec<SourceConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            confidence_threshold: 0.6,
            training_cutoff_year: 2017,
            low_confidence_policy: LowConfidencePolicy::default(),
            write_reports: true,
            sources: default_sources(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.confidence_threshold)?;
        if self.sources.is_empty() {
            return Err(FinbotError::Settings("no input sources configured".into()));
        }
        for source in &self.sources {
            source.pattern()?;
        }
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(Path::new(&self.data_dir))
    }
}

/// Where everything lives under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub ledger_dir: PathBuf,
    pub model_dir: PathBuf,
    pub input_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub checkpoint: PathBuf,
}

impl DataPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ledger_dir: root.join("data"),
            model_dir: root.join("model"),
            input_dir: root.join("input"),
            reports_dir: root.join("reports"),
            checkpoint: root.join("review_checkpoint.json"),
        }
    }

    pub fn create_all(&self) -> Result<()> {
        for dir in [&self.ledger_dir, &self.model_dir, &self.input_dir, &self.reports_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("finbot")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("finbot")
}

/// A missing settings file yields defaults; a present but unreadable one
/// is an error so a typo never silently resets the source table.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| FinbotError::Settings(format!("{}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| FinbotError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
