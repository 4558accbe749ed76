//! In-process agents, one per attached page.
//!
//! The pool starts an [`Agent`] for a page, keeps the page so the agent can
//! be recreated when it stops answering, and tags every notice with the tab
//! it came from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use roundtable::{Agent, Page, SiteTable};
use roundtable_protocol::{AgentNotice, SiteId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::link::{AgentLink, AgentSpawner, ChannelLink};
use crate::registry::TabId;

const REQUEST_CAPACITY: usize = 32;
const TRIGGER_CAPACITY: usize = 8;

struct Slot {
	page: Arc<dyn Page>,
	triggers: mpsc::Sender<()>,
	tasks: [JoinHandle<()>; 2],
}

impl Slot {
	fn stop(&self) {
		self.tasks.iter().for_each(JoinHandle::abort);
	}
}

pub struct AgentPool {
	sites: SiteTable,
	slots: Mutex<HashMap<TabId, Slot>>,
	notices: mpsc::UnboundedSender<(TabId, AgentNotice)>,
}

impl AgentPool {
	/// Returns the pool and the stream of tagged notices from all its agents.
	pub fn new(sites: SiteTable) -> (Arc<Self>, mpsc::UnboundedReceiver<(TabId, AgentNotice)>) {
		let (notices, rx) = mpsc::unbounded_channel();
		let pool = Arc::new(Self {
			sites,
			slots: Mutex::new(HashMap::new()),
			notices,
		});
		(pool, rx)
	}

	/// Starts an agent for `page`, replacing any agent the tab already had.
	/// Must be called from within a tokio runtime.
	pub fn spawn(&self, tab: &TabId, site: SiteId, page: Arc<dyn Page>) -> Arc<dyn AgentLink> {
		let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
		let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
		let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();

		let agent = Agent::attach(page.clone(), self.sites.get(site).clone(), notice_tx);
		let run = tokio::spawn(agent.run(request_rx, trigger_rx));

		let forward = {
			let tab = tab.clone();
			let notices = self.notices.clone();
			tokio::spawn(async move {
				while let Some(notice) = notice_rx.recv().await {
					if notices.send((tab.clone(), notice)).is_err() {
						break;
					}
				}
			})
		};

		let slot = Slot {
			page,
			triggers: trigger_tx,
			tasks: [run, forward],
		};
		if let Some(old) = self.slots.lock().insert(tab.clone(), slot) {
			old.stop();
		}
		info!(target = "rt.agents", %tab, %site, "agent started");
		Arc::new(ChannelLink::new(request_tx))
	}

	/// Reports a relevant DOM change on the tab's page.
	pub fn trigger(&self, tab: &str) {
		if let Some(slot) = self.slots.lock().get(tab) {
			// A full queue already guarantees a capture attempt.
			let _ = slot.triggers.try_send(());
		}
	}

	pub fn remove(&self, tab: &str) {
		if let Some(slot) = self.slots.lock().remove(tab) {
			debug!(target = "rt.agents", %tab, "agent stopped");
			slot.stop();
		}
	}

	pub fn contains(&self, tab: &str) -> bool {
		self.slots.lock().contains_key(tab)
	}
}

#[async_trait]
impl AgentSpawner for AgentPool {
	async fn reinject(&self, tab: &TabId, site: SiteId) -> Result<Arc<dyn AgentLink>> {
		let page = self
			.slots
			.lock()
			.get(tab)
			.map(|slot| slot.page.clone())
			.ok_or(Error::Unresponsive { site })?;
		Ok(self.spawn(tab, site, page))
	}
}
