use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

pub const DEFAULT_STORAGE_PATH: &str = ".orgweave";
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioSettings {
    /// Directory holding the persisted chart snapshot.
    pub storage_path: PathBuf,
    pub autosave: bool,
    pub autosave_debounce_ms: u64,
}

impl StudioSettings {
    pub fn from_env() -> Result<Self> {
        // Load .env if present, but do not fail if file does not exist.
        let _ = dotenvy::dotenv();

        let storage_path = env::var("ORGWEAVE_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH));
        ensure!(
            !storage_path.as_os_str().is_empty(),
            "ORGWEAVE_STORAGE_PATH cannot be empty"
        );

        let autosave = parse_bool_env("ORGWEAVE_AUTOSAVE", true)?;

        let autosave_debounce_ms =
            parse_u64_env("ORGWEAVE_AUTOSAVE_DEBOUNCE_MS", DEFAULT_AUTOSAVE_DEBOUNCE_MS)?;
        ensure!(
            autosave_debounce_ms > 0,
            "ORGWEAVE_AUTOSAVE_DEBOUNCE_MS must be greater than 0"
        );

        Ok(Self {
            storage_path,
            autosave,
            autosave_debounce_ms,
        })
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<bool>()
            .with_context(|| format!("failed to parse {name} as bool")),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name} as u64")),
        Err(_) => Ok(default),
    }
}
