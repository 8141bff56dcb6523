use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use envil_lang::SclangOptions;

use crate::segment::RewriteRule;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    hydra: HydraConfig,
    #[serde(default)]
    supercollider: SuperColliderConfig,
    #[serde(default)]
    environment: EnvironmentConfig,
}

#[derive(Deserialize, Default)]
struct HydraConfig {
    local_marker: Option<String>,
    file_host: Option<String>,
    file_port: Option<u16>,
    file_route: Option<String>,
    broadcast_host: Option<String>,
    broadcast_port: Option<u16>,
}

#[derive(Deserialize, Default)]
struct SuperColliderConfig {
    sclang: Option<PathBuf>,
    sclang_conf: Option<PathBuf>,
    boot_timeout_secs: Option<u64>,
    eval_timeout_secs: Option<u64>,
    boot_server_on_start: Option<bool>,
}

#[derive(Deserialize, Default)]
struct EnvironmentConfig {
    active_on_launch: Option<bool>,
}

/// Error loading an explicitly named config file.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Parse(e) => write!(f, "TOML error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    hydra: HydraConfig,
    supercollider: SuperColliderConfig,
    environment: EnvironmentConfig,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/envil/config.toml`, if present.
    ///
    /// A broken user file is logged and ignored.
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => config.overlay(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        config
    }

    /// Embedded defaults only.
    pub fn embedded() -> Self {
        let base = toml::from_str::<ConfigFile>(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Self {
            hydra: base.hydra,
            supercollider: base.supercollider,
            environment: base.environment,
        }
    }

    /// Embedded defaults overlaid with the given file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Embedded defaults overlaid with TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let user = toml::from_str::<ConfigFile>(contents)?;
        let mut config = Self::embedded();
        config.overlay(user);
        Ok(config)
    }

    fn overlay(&mut self, user: ConfigFile) {
        merge_hydra(&mut self.hydra, user.hydra);
        merge_supercollider(&mut self.supercollider, user.supercollider);
        merge(&mut self.environment.active_on_launch, user.environment.active_on_launch);
    }

    /// Base URL of the static file server, e.g. `http://localhost:3000/files/`.
    pub fn file_server_url(&self) -> String {
        let host = self.hydra.file_host.as_deref().unwrap_or("localhost");
        let port = self.hydra.file_port.unwrap_or(3000);
        let route = self.hydra.file_route.as_deref().unwrap_or("/files/");
        let route = route.trim_matches('/');
        if route.is_empty() {
            format!("http://{}:{}/", host, port)
        } else {
            format!("http://{}:{}/{}/", host, port, route)
        }
    }

    /// The local-resource rewrite applied to visual code.
    pub fn rewrite_rule(&self) -> RewriteRule {
        let marker = self.hydra.local_marker.as_deref().unwrap_or("local/files/");
        RewriteRule::new(marker, self.file_server_url())
    }

    /// `host:port` the broadcast server binds.
    pub fn broadcast_addr(&self) -> String {
        format!(
            "{}:{}",
            self.hydra.broadcast_host.as_deref().unwrap_or("127.0.0.1"),
            self.hydra.broadcast_port.unwrap_or(3001)
        )
    }

    pub fn sclang_options(&self) -> SclangOptions {
        let sc = &self.supercollider;
        SclangOptions {
            executable: sc.sclang.clone(),
            conf: sc.sclang_conf.clone(),
            boot_timeout: Duration::from_secs(sc.boot_timeout_secs.unwrap_or(10).max(1)),
            eval_timeout: sc.eval_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn boot_server_on_start(&self) -> bool {
        self.supercollider.boot_server_on_start.unwrap_or(true)
    }

    pub fn active_on_launch(&self) -> bool {
        self.environment.active_on_launch.unwrap_or(false)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("envil").join("config.toml"))
}

fn merge<T>(base: &mut Option<T>, user: Option<T>) {
    if user.is_some() {
        *base = user;
    }
}

fn merge_hydra(base: &mut HydraConfig, user: HydraConfig) {
    merge(&mut base.local_marker, user.local_marker);
    merge(&mut base.file_host, user.file_host);
    merge(&mut base.file_port, user.file_port);
    merge(&mut base.file_route, user.file_route);
    merge(&mut base.broadcast_host, user.broadcast_host);
    merge(&mut base.broadcast_port, user.broadcast_port);
}

fn merge_supercollider(base: &mut SuperColliderConfig, user: SuperColliderConfig) {
    merge(&mut base.sclang, user.sclang);
    merge(&mut base.sclang_conf, user.sclang_conf);
    merge(&mut base.boot_timeout_secs, user.boot_timeout_secs);
    merge(&mut base.eval_timeout_secs, user.eval_timeout_secs);
    merge(&mut base.boot_server_on_start, user.boot_server_on_start);
}
