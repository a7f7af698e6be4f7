//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `HWA_ROOT_FOLDER` environment variable
//! 3. `HWA_ROOT` environment variable
//! 4. TOML config file `root_folder`
//! 5. OS-dependent compiled default (fallback)
//!
//! A missing config file is normal and falls back to defaults. A config file
//! that exists but does not parse is an error: silently using the default
//! part type order would let the validator enforce the wrong rules.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ledger::snap::DEFAULT_PORTS_PER_BOARD;
use crate::ledger::PartTypeSequence;
use crate::{Error, Result};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "HWA_ROOT_FOLDER";
/// Alternative root folder environment variable
pub const ROOT_ENV: &str = "HWA_ROOT";
/// Ledger database file name inside the root folder
pub const DATABASE_FILE: &str = "hwa.db";

/// Contents of `hwa.toml`; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub part_types: Option<PartTypeSequence>,
    pub ports_per_board: Option<u32>,
    pub log_level: Option<String>,
    /// `[[board]]` file imported into board_config by `hwa-scan boards import`
    pub boards_file: Option<PathBuf>,
}

impl TomlConfig {
    /// Parse a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load the platform config file if there is one
    pub fn load_default() -> Result<Option<Self>> {
        match default_config_path() {
            Some(path) => {
                info!("Loading config file {}", path.display());
                Self::load(&path).map(Some)
            }
            None => {
                debug!("No config file found; using defaults");
                Ok(None)
            }
        }
    }
}

/// Values used when neither the environment nor a config file says otherwise
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub ports_per_board: u32,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            ports_per_board: DEFAULT_PORTS_PER_BOARD,
        }
    }
}

/// Resolves the root folder from CLI, environment, config file and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<&Path>) -> Self {
        self.cli_arg = path.map(Path::to_path_buf);
        self
    }

    pub fn with_config(mut self, config: Option<&TomlConfig>) -> Self {
        self.config_root = config.and_then(|c| c.root_folder.clone());
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = &self.config_root {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Everything a binary needs to open the ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub root_folder: PathBuf,
    pub part_types: PartTypeSequence,
    pub ports_per_board: u32,
    pub log_level: String,
    pub boards_file: Option<PathBuf>,
}

impl LedgerConfig {
    /// Resolve configuration for a binary
    ///
    /// `config_path` given explicitly must exist; otherwise the platform
    /// default location is tried and may be absent.
    pub fn resolve(cli_root: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let toml_config = match config_path {
            Some(path) => Some(TomlConfig::load(path)?),
            None => TomlConfig::load_default()?,
        };
        Self::from_parts(cli_root, toml_config)
    }

    pub fn from_parts(cli_root: Option<&Path>, toml_config: Option<TomlConfig>) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(cli_root)
            .with_config(toml_config.as_ref())
            .resolve();

        let toml_config = toml_config.unwrap_or_default();
        let ports_per_board = toml_config.ports_per_board.unwrap_or(defaults.ports_per_board);
        if ports_per_board == 0 {
            return Err(Error::Config("ports_per_board must be at least 1".to_string()));
        }

        Ok(Self {
            root_folder,
            part_types: toml_config.part_types.unwrap_or_default(),
            ports_per_board,
            log_level: toml_config.log_level.unwrap_or(defaults.log_level),
            boards_file: toml_config.boards_file,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

/// Platform config file location, if a file exists there
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("hwa").join("hwa.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/hwa/hwa.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/hwa (or /var/lib/hwa for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("hwa"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/hwa"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("hwa"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/hwa"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("hwa"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\hwa"))
    } else {
        PathBuf::from("./hwa_data")
    }
}
