//! Finds chat tabs through the DevTools HTTP endpoint and keeps one agent
//! attached per tab.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use roundtable::SiteTable;
use roundtable_protocol::SiteId;
use roundtable_runtime::Host;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::connection::{CdpConnection, CdpEvent};
use super::page::CdpPage;
use super::script;

const LIST_TIMEOUT: Duration = Duration::from_secs(2);

/// One entry of `GET /json/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub url: String,
	pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
	/// Site of a page target we can attach to.
	pub fn chat_site(&self) -> Option<SiteId> {
		if self.kind != "page" || self.web_socket_debugger_url.is_none() {
			return None;
		}
		SiteId::from_url(&self.url)
	}
}

/// `http://host:port` (any path is ignored) to its target list URL.
pub fn list_url(endpoint: &str) -> Result<Url> {
	let base = Url::parse(endpoint).with_context(|| format!("Invalid DevTools endpoint {endpoint}"))?;
	Ok(base.join("/json/list")?)
}

pub async fn list_targets(http: &reqwest::Client, endpoint: &str) -> Result<Vec<TargetInfo>> {
	let list_url = list_url(endpoint)?;
	http.get(list_url.clone())
		.timeout(LIST_TIMEOUT)
		.send()
		.await
		.with_context(|| format!("Querying DevTools targets at {list_url}"))?
		.json::<Vec<TargetInfo>>()
		.await
		.context("Parsing DevTools target list")
}

/// Polls the target list and attaches or detaches tabs as they come and go.
pub struct TabWatcher {
	host: Arc<Host>,
	sites: SiteTable,
	http: reqwest::Client,
	endpoint: String,
	interval: Duration,
	tabs: HashMap<String, JoinHandle<()>>,
}

impl TabWatcher {
	pub fn new(host: Arc<Host>, sites: SiteTable, endpoint: impl Into<String>, interval: Duration) -> Self {
		Self {
			host,
			sites,
			http: reqwest::Client::new(),
			endpoint: endpoint.into(),
			interval,
			tabs: HashMap::new(),
		}
	}

	pub async fn run(mut self) {
		info!(target = "rt.cdp", endpoint = %self.endpoint, "watching for chat tabs");
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			match list_targets(&self.http, &self.endpoint).await {
				Ok(targets) => self.sync(&targets),
				Err(err) => debug!(target = "rt.cdp", error = %format!("{err:#}"), "target list unavailable"),
			}
		}
	}

	fn sync(&mut self, targets: &[TargetInfo]) {
		// Finished drivers have already detached their tab; retry them.
		self.tabs.retain(|_, task| !task.is_finished());

		let live: Vec<&TargetInfo> = targets.iter().filter(|t| t.chat_site().is_some()).collect();

		let gone: Vec<String> = self
			.tabs
			.keys()
			.filter(|id| !live.iter().any(|t| &t.id == *id))
			.cloned()
			.collect();
		for id in gone {
			if let Some(task) = self.tabs.remove(&id) {
				task.abort();
			}
			self.host.detach_page(&id);
		}

		for target in live {
			if self.tabs.contains_key(&target.id) {
				continue;
			}
			let task = tokio::spawn(drive_tab(self.host.clone(), self.sites.clone(), target.clone()));
			self.tabs.insert(target.id.clone(), task);
		}
	}
}

impl Drop for TabWatcher {
	fn drop(&mut self) {
		for (id, task) in self.tabs.drain() {
			task.abort();
			self.host.detach_page(&id);
		}
	}
}

/// What a DevTools event means for the attached agent.
#[derive(Debug, PartialEq)]
pub(crate) enum TabSignal {
	Mutated,
	Visible(bool),
	Navigated(String),
	Closed,
}

pub(crate) fn classify(event: &CdpEvent) -> Option<TabSignal> {
	match event.method.as_str() {
		"Runtime.bindingCalled" => match event.params.get("name").and_then(Value::as_str)? {
			script::MUTATION_BINDING => Some(TabSignal::Mutated),
			script::VISIBILITY_BINDING => {
				let state = event.params.get("payload").and_then(Value::as_str)?;
				Some(TabSignal::Visible(state == "visible"))
			}
			_ => None,
		},
		"Page.frameNavigated" => {
			let frame = event.params.get("frame")?;
			// Subframes carry a parentId.
			if frame.get("parentId").is_some() {
				return None;
			}
			Some(TabSignal::Navigated(frame.get("url")?.as_str()?.to_string()))
		}
		"Inspector.detached" | "Inspector.targetCrashed" => Some(TabSignal::Closed),
		_ => None,
	}
}

async fn prepare(conn: &CdpConnection, site: SiteId, sites: &SiteTable) -> Result<bool> {
	conn.call("Page.enable", json!({})).await?;
	conn.call("Runtime.enable", json!({})).await?;
	for name in [script::MUTATION_BINDING, script::VISIBILITY_BINDING] {
		conn.call("Runtime.addBinding", json!({ "name": name })).await?;
	}
	let hook = script::mutation_hook(&sites.get(site).observe);
	conn.call("Page.addScriptToEvaluateOnNewDocument", json!({ "source": hook }))
		.await?;
	conn.evaluate(&hook).await?;
	let visible = conn.evaluate(&script::call(script::IS_VISIBLE, &[])).await?;
	Ok(visible.as_bool().unwrap_or(false))
}

/// Attaches an agent to the tab and feeds it page signals until the tab
/// closes or stops being a chat page.
async fn drive_tab(host: Arc<Host>, sites: SiteTable, target: TargetInfo) {
	let (Some(site), Some(ws_url)) = (target.chat_site(), target.web_socket_debugger_url.as_deref()) else {
		return;
	};
	let tab = target.id.clone();

	let (conn, events) = match CdpConnection::connect(ws_url).await {
		Ok(connected) => connected,
		Err(err) => {
			warn!(target = "rt.cdp", %tab, %site, error = %err, "cannot connect to tab");
			return;
		}
	};
	let visible = match prepare(&conn, site, &sites).await {
		Ok(visible) => visible,
		Err(err) => {
			warn!(target = "rt.cdp", %tab, %site, error = %format!("{err:#}"), "cannot prepare tab");
			conn.close();
			return;
		}
	};

	let page = Arc::new(CdpPage::new(conn.clone()));
	host.attach_page(tab.clone(), &target.url, page.clone());
	host.set_active(&tab, visible);

	follow(&host, &tab, page, events).await;

	host.detach_page(&tab);
	conn.close();
	debug!(target = "rt.cdp", %tab, "tab driver finished");
}

async fn follow(host: &Host, tab: &str, page: Arc<CdpPage>, mut events: mpsc::UnboundedReceiver<CdpEvent>) {
	while let Some(event) = events.recv().await {
		match classify(&event) {
			Some(TabSignal::Mutated) => host.page_mutated(tab),
			Some(TabSignal::Visible(visible)) => host.set_active(tab, visible),
			Some(TabSignal::Navigated(url)) => {
				// A new document has no agent; start a fresh one if it is still a chat page.
				if !host.attach_page(tab, &url, page.clone()) {
					info!(target = "rt.cdp", %tab, %url, "tab left its chat site");
					return;
				}
			}
			Some(TabSignal::Closed) => return,
			None => {}
		}
	}
}
