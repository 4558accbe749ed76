//! Agent host assembly.

use std::sync::Arc;

use roundtable::{Page, SiteTable};
use roundtable_protocol::SiteId;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agents::AgentPool;
use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::pairing::PairingGate;
use crate::registry::TabId;
use crate::router::Router;
use crate::store::KeyValueStore;

pub struct HostOptions {
	pub sites: SiteTable,
	/// Survives restarts; holds pairing state.
	pub durable: Arc<dyn KeyValueStore>,
	/// Lives as long as the host; holds the response cache.
	pub session: Arc<dyn KeyValueStore>,
	pub clock: Arc<dyn Clock>,
}

/// Router, pairing gate and in-process agents wired together.
pub struct Host {
	router: Arc<Router>,
	pairing: Arc<PairingGate>,
	agents: Arc<AgentPool>,
	pump: JoinHandle<()>,
}

impl Host {
	/// Builds the host and starts routing agent notices. Must be called from
	/// within a tokio runtime.
	pub fn start(options: HostOptions) -> Self {
		let pairing = Arc::new(PairingGate::load(options.durable, options.clock));
		let (agents, notices) = AgentPool::new(options.sites);
		let router = Arc::new(Router::new(ResponseCache::new(options.session)).with_spawner(agents.clone()));
		let pump = tokio::spawn(router.clone().pump_notices(notices));
		Self {
			router,
			pairing,
			agents,
			pump,
		}
	}

	pub fn router(&self) -> &Arc<Router> {
		&self.router
	}

	pub fn pairing(&self) -> &Arc<PairingGate> {
		&self.pairing
	}

	pub fn dispatcher(&self) -> Dispatcher {
		Dispatcher::new(self.router.clone(), self.pairing.clone())
	}

	/// Starts an agent for a page and registers it. Returns `false` for pages
	/// of no supported site.
	pub fn attach_page(&self, tab: impl Into<TabId>, url: &str, page: Arc<dyn Page>) -> bool {
		let tab = tab.into();
		let Some(site) = SiteId::from_url(url) else {
			debug!(target = "rt.host", %tab, url, "not a chat page");
			return false;
		};
		let link = self.agents.spawn(&tab, site, page);
		self.router.attach_tab(tab, url, link)
	}

	pub fn detach_page(&self, tab: &str) {
		self.agents.remove(tab);
		self.router.detach_tab(tab);
	}

	/// Forwards a DOM mutation signal to the tab's agent.
	pub fn page_mutated(&self, tab: &str) {
		self.agents.trigger(tab);
	}

	pub fn set_active(&self, tab: &str, active: bool) {
		self.router.set_active(tab, active);
	}
}

impl Drop for Host {
	fn drop(&mut self) {
		self.pump.abort();
	}
}
