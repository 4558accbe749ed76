//! Host configuration and state file locations.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use roundtable::SiteTable;
use roundtable_protocol::{CONTROLLER_LISTEN_HOST, CONTROLLER_LISTEN_PORT};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CDP_ENDPOINT: &str = "http://127.0.0.1:9222";
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 2000;

/// `~/.config/roundtable/config.json`. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
	pub listen_host: String,
	pub listen_port: u16,
	pub cdp_endpoint: String,
	pub discovery_interval_ms: u64,
	/// JSON array of site tables replacing the built-in ones by id.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sites_file: Option<PathBuf>,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			listen_host: CONTROLLER_LISTEN_HOST.to_string(),
			listen_port: CONTROLLER_LISTEN_PORT,
			cdp_endpoint: DEFAULT_CDP_ENDPOINT.to_string(),
			discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
			sites_file: None,
		}
	}
}

impl HostConfig {
	/// Reads `path`; a missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		match fs::read_to_string(path) {
			Ok(content) => serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display())),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
			Err(err) => Err(err).with_context(|| format!("Failed to read config file {}", path.display())),
		}
	}

	pub fn discovery_interval(&self) -> Duration {
		Duration::from_millis(self.discovery_interval_ms.max(100))
	}

	/// Websocket URL controllers connect to.
	pub fn controller_url(&self) -> String {
		format!("ws://{}:{}/controller", self.listen_host, self.listen_port)
	}

	pub fn sites(&self) -> Result<SiteTable> {
		let Some(path) = &self.sites_file else {
			return Ok(SiteTable::builtin());
		};
		let json = fs::read_to_string(path).with_context(|| format!("Failed to read sites file {}", path.display()))?;
		SiteTable::from_json(&json).with_context(|| format!("Invalid sites file {}", path.display()))
	}
}

/// Locations of the files the CLI reads and writes.
#[derive(Debug, Clone)]
pub struct StatePaths {
	pub config: PathBuf,
	/// Pairing state on the host side.
	pub host_state: PathBuf,
	/// Token of the command-line controller.
	pub client_state: PathBuf,
}

impl StatePaths {
	pub fn new() -> Self {
		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(dirs::config_dir)
			.unwrap_or_else(|| PathBuf::from("."));
		Self::in_dir(&config_home.join("roundtable"))
	}

	pub fn in_dir(dir: &Path) -> Self {
		Self {
			config: dir.join("config.json"),
			host_state: dir.join("state.json"),
			client_state: dir.join("client.json"),
		}
	}
}

impl Default for StatePaths {
	fn default() -> Self {
		Self::new()
	}
}
