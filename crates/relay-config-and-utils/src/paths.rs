//! Where the relay tooling keeps its files.
//!
//! ```text
//! ~/.auth-relay/
//!   config.json
//!   logs/relay.jsonl
//! ```

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".auth-relay";

#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Rooted at the user's home directory.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(Self::with_base_dir(home.join(BASE_DIR_NAME)))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL sink shared by every relay process.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("relay.jsonl")
    }

    /// Create the base and logs directories.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
