mod controller;
mod serve;

use anyhow::Result;
use roundtable_runtime::JsonFileStore;

pub use self::controller::Session;
use crate::cli::{Cli, Commands, ConnArgs, ServeArgs};
use crate::config::{HostConfig, StatePaths};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let mut paths = StatePaths::new();
	if let Some(config) = cli.config {
		paths.config = config;
	}
	let config = HostConfig::load(&paths.config)?;

	match cli.command {
		Commands::Serve(args) => {
			let stdio = args.stdio;
			serve::run(apply_serve_args(config, args), &paths, stdio).await
		}
		Commands::Pair { code, conn } => {
			session(&config, &paths, &conn).await?.pair(code.as_deref()).await
		}
		Commands::Send { site, text, conn } => {
			session(&config, &paths, &conn).await?.send(site, &text.join(" ")).await
		}
		Commands::Status { conn } => session(&config, &paths, &conn).await?.status().await,
		Commands::Response { site, conn } => session(&config, &paths, &conn).await?.response(site).await,
		Commands::New { sites, conn } => {
			session(&config, &paths, &conn)
				.await?
				.new_conversation(sites)
				.await
		}
		Commands::Config => {
			println!("{}", serde_json::to_string_pretty(&config)?);
			Ok(())
		}
	}
}

/// Command-line flags win over the config file.
fn apply_serve_args(mut config: HostConfig, args: ServeArgs) -> HostConfig {
	if let Some(host) = args.host {
		config.listen_host = host;
	}
	if let Some(port) = args.port {
		config.listen_port = port;
	}
	if let Some(cdp) = args.cdp {
		config.cdp_endpoint = cdp;
	}
	if let Some(sites) = args.sites {
		config.sites_file = Some(sites);
	}
	config
}

async fn session(config: &HostConfig, paths: &StatePaths, conn: &ConnArgs) -> Result<Session> {
	let url = conn.url.clone().unwrap_or_else(|| config.controller_url());
	Session::connect(&url, JsonFileStore::open(&paths.client_state)).await
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	#[test]
	fn serve_flags_override_config() {
		let config = HostConfig {
			listen_port: 5000,
			cdp_endpoint: "http://10.0.0.2:9222".into(),
			..HostConfig::default()
		};
		let args = ServeArgs {
			port: Some(6000),
			sites: Some(PathBuf::from("sites.json")),
			..ServeArgs::default()
		};

		let merged = apply_serve_args(config, args);

		assert_eq!(merged.listen_port, 6000);
		assert_eq!(merged.cdp_endpoint, "http://10.0.0.2:9222");
		assert_eq!(merged.listen_host, "127.0.0.1");
		assert_eq!(merged.sites_file, Some(PathBuf::from("sites.json")));
	}
}
