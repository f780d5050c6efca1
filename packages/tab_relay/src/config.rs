use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::registry::{MAX_TAB_TTL, MIN_TAB_TTL};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Equivalent ways to configure:
//
//   config.toml:     [relay]
//                    tab_ttl_secs = 90
//
//   env var:         TAB_RELAY_RELAY__TAB_TTL_SECS=90   (double underscore = nesting)
//
//   PORT=8080 is also honored for the listen port, above config.toml and
//   TAB_RELAY_* but below the --port flag.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay tunables (lives under `[relay]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Tab liveness window refreshed by each heartbeat.
    #[serde(default = "default_tab_ttl_secs")]
    pub tab_ttl_secs: u64,
    /// Outbound frames buffered per connection before events are dropped.
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            tab_ttl_secs: default_tab_ttl_secs(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_tab_ttl_secs() -> u64 {
    60
}
fn default_send_channel_capacity() -> usize {
    100
}

/// Build a figment that layers: defaults → config.toml → TAB_RELAY_* env vars → PORT.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("TAB_RELAY_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub tab_ttl: Duration,
    pub send_channel_capacity: usize,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Self {
        let requested = Duration::from_secs(fc.tab_ttl_secs);
        let tab_ttl = requested.clamp(MIN_TAB_TTL, MAX_TAB_TTL);
        if tab_ttl != requested {
            warn!(
                "relay.tab_ttl_secs = {} is out of range, using {}s",
                fc.tab_ttl_secs,
                tab_ttl.as_secs()
            );
        }
        Self {
            tab_ttl,
            send_channel_capacity: fc.send_channel_capacity.max(1),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&RelayFileConfig::default())
    }
}

/// Resolve the listen address; CLI values win over the loaded file config.
pub fn listen_addr(
    fc: &ServerFileConfig,
    cli_host: Option<&str>,
    cli_port: Option<u16>,
) -> Result<SocketAddr> {
    let host = cli_host.unwrap_or(&fc.host);
    let port = cli_port.unwrap_or(fc.port);
    format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct DataDir {
    pub path: PathBuf,
}

impl DataDir {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let path = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".tab_relay"),
        };

        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create data directory: {:?}", path))?;

        info!("Data directory: {}", path.display());
        Ok(Self { path })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }
}
