//! Server settings.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed `FONTWATCH__` with `__` between nested keys, e.g.
//! `FONTWATCH__SERVER__PORT=9000` or `FONTWATCH__PROCESS__SECRET=...`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use fontwatch_git::FetchConfig;
use fontwatch_process::Secret;
use fontwatch_sources::{ApiSourceConfig, CsvSourceConfig};
use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::dispatch::DispatchConfig;
use crate::scheduler::PollConfig;

/// Default settings file, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "fontwatch.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    /// Root of the job log, reply logs and (unless `fetch` says otherwise)
    /// the git mirrors.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    pub fetch: Option<FetchConfig>,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/fontwatch")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessSettings {
    /// Key of every process ticket. Rotating it invalidates the pending
    /// answers of stored processes.
    pub secret: Option<Secret>,
}

/// One configured source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub id: String,
    #[serde(default)]
    pub whitelist: Option<Vec<String>>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Mode specific parameters, tagged by `mode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SourceKind {
    GitBranch {
        remote_name: String,
        remote_url: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
    GitPrs {
        remote_name: String,
        remote_url: String,
        #[serde(default = "default_branch")]
        base_branch: String,
        #[serde(default)]
        github_token: Option<String>,
    },
    Csv(CsvSourceConfig),
    Api(ApiSourceConfig),
}

fn default_branch() -> String {
    "main".to_string()
}

impl Settings {
    /// Loads `path` (or [`DEFAULT_SETTINGS_FILE`] if none) when it exists,
    /// then applies the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or(Path::new(DEFAULT_SETTINGS_FILE));
        Config::builder()
            .add_source(File::from(file).required(path.is_some()))
            .add_source(
                Environment::with_prefix("FONTWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The explicit fetch configuration or one rooted in `data_dir/git`.
    pub fn fetch_config(&self) -> Result<FetchConfig, &'static str> {
        match &self.fetch {
            Some(config) => Ok(config.clone()),
            None => FetchConfig::builder()
                .repositories_dir(self.data_dir.join("git"))
                .build(),
        }
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn replies_dir(&self) -> PathBuf {
        self.data_dir.join("replies")
    }
}
