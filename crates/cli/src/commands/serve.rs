use std::sync::Arc;

use anyhow::Result;
use roundtable_runtime::router::HEARTBEAT_INTERVAL;
use roundtable_runtime::{Host, HostOptions, JsonFileStore, MemoryStore, SystemClock};
use tracing::info;

use crate::cdp::TabWatcher;
use crate::config::{HostConfig, StatePaths};
use crate::{server, stdio};

pub async fn run(config: HostConfig, paths: &StatePaths, with_stdio: bool) -> Result<()> {
	let sites = config.sites()?;
	let host = Arc::new(Host::start(HostOptions {
		sites: sites.clone(),
		durable: Arc::new(JsonFileStore::open(&paths.host_state)),
		session: Arc::new(MemoryStore::new()),
		clock: Arc::new(SystemClock),
	}));

	let listener = server::bind(&config.listen_host, config.listen_port).await?;

	let mut codes = host.pairing().subscribe();
	tokio::spawn(async move {
		while codes.changed().await.is_ok() {
			let code = codes.borrow_and_update().clone();
			if let Some(code) = code {
				info!(target = "rt.pairing", "pairing code issued");
				eprintln!("Pairing code: {code}");
			}
		}
	});

	tokio::spawn(host.router().clone().run_heartbeat(HEARTBEAT_INTERVAL));

	let watcher = TabWatcher::new(host.clone(), sites, config.cdp_endpoint.clone(), config.discovery_interval());
	let watch_task = tokio::spawn(watcher.run());

	if with_stdio {
		let dispatcher = host.dispatcher();
		tokio::spawn(async move {
			if let Err(err) = stdio::serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await {
				tracing::warn!(target = "rt.stdio", error = %err, "stdio channel failed");
			}
		});
	}

	let result = tokio::select! {
		result = server::serve(listener, host.dispatcher()) => result,
		_ = tokio::signal::ctrl_c() => {
			info!(target = "rt.host", "shutting down");
			Ok(())
		}
	};
	watch_task.abort();
	result
}
