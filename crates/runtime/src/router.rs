//! Message router between controllers and agents.
//!
//! The router picks the most recently seen tab of a site, checks that its
//! agent answers, delivers the command and broadcasts what happened as
//! [`HostEvent`]s to every subscribed controller channel.
//!
//! Only a missing receiver ([`Error::TransientUnreachable`]) is retried, with
//! exponential backoff. That failure is expected for a moment after a page
//! reloads. Everything else is surfaced at once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roundtable_protocol::{
	AgentCommand, AgentNotice, AgentReply, ErrorCode, HostEvent, NewConversationReport, SiteId, SiteOutcome,
	StatusReport, WireError,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::error::{Error, Result};
use crate::link::{AgentLink, AgentSpawner};
use crate::liveness::{self, Liveness, LivenessEvent, REINJECT_SETTLE};
use crate::registry::{TabEntry, TabId, TabRegistry};

/// Upper bound for one delivery to an agent.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for reading the latest response from an agent.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries after a transient failure, on top of the first attempt.
pub const MAX_RETRIES: u32 = 4;

const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(3);

/// Pause between saving the in-flight response and resetting the conversation.
pub const NEW_CONVERSATION_PAUSE: Duration = Duration::from_millis(500);

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 256;

/// Backoff before retry number `attempt` (zero based).
pub fn retry_delay(attempt: u32) -> Duration {
	RETRY_BASE
		.checked_mul(1u32 << attempt.min(16))
		.map_or(RETRY_CAP, |delay| delay.min(RETRY_CAP))
}

pub struct Router {
	tabs: Mutex<TabRegistry>,
	cache: ResponseCache,
	spawner: Option<Arc<dyn AgentSpawner>>,
	events: broadcast::Sender<HostEvent>,
}

impl Router {
	pub fn new(cache: ResponseCache) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			tabs: Mutex::new(TabRegistry::new()),
			cache,
			spawner: None,
			events,
		}
	}

	pub fn with_spawner(mut self, spawner: Arc<dyn AgentSpawner>) -> Self {
		self.spawner = Some(spawner);
		self
	}

	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
		self.events.subscribe()
	}

	fn broadcast(&self, event: HostEvent) {
		debug!(target = "rt.router", kind = ?event.event_type(), "broadcast");
		// No subscribers is fine.
		let _ = self.events.send(event);
	}

	/// Registers a page and the link to its agent. Returns `false` when the
	/// page belongs to no supported site.
	pub fn attach_tab(&self, id: impl Into<TabId>, url: &str, link: Arc<dyn AgentLink>) -> bool {
		let id = id.into();
		let events = self.tabs.lock().register(id.clone(), url, link);
		let Some(events) = events else {
			return false;
		};
		info!(target = "rt.router", tab = %id, url, "tab attached");
		events.into_iter().for_each(|e| self.broadcast(e));
		true
	}

	pub fn detach_tab(&self, id: &str) {
		let event = self.tabs.lock().remove(id);
		info!(target = "rt.router", tab = %id, "tab detached");
		if let Some(event) = event {
			self.broadcast(event);
		}
	}

	pub fn set_active(&self, id: &str, active: bool) {
		self.tabs.lock().set_active(id, active);
	}

	pub fn liveness(&self, id: &str) -> Option<Liveness> {
		self.tabs.lock().get(id).map(|e| e.liveness)
	}

	fn observe(&self, id: &str, event: LivenessEvent) -> Liveness {
		self.tabs
			.lock()
			.observe(id, event)
			.unwrap_or_else(|| Liveness::Unknown.next(event))
	}

	/// Delivers `message` to the agent of `site`.
	///
	/// Broadcasts one `SEND_RESULT` with the final outcome.
	pub async fn send_message(&self, site: SiteId, message: &str) -> Result<()> {
		let mut attempt = 0;
		let result = loop {
			match self.deliver(site, message).await {
				Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
					let delay = retry_delay(attempt);
					warn!(
						target = "rt.router",
						%site,
						attempt = attempt + 1,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"retrying send"
					);
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				other => break other,
			}
		};

		let outcome = match &result {
			Ok(()) => SiteOutcome::success(),
			Err(err) => {
				warn!(target = "rt.router", %site, error = %err, "send failed");
				SiteOutcome::failure(err.to_wire())
			}
		};
		self.broadcast(HostEvent::SendResult { site, outcome });
		result
	}

	async fn deliver(&self, site: SiteId, message: &str) -> Result<()> {
		let tab = self.find(site)?;
		let link = self.ensure_alive(&tab).await?;
		let reply = link
			.request(
				AgentCommand::InjectMessage {
					message: message.to_string(),
				},
				DELIVERY_TIMEOUT,
			)
			.await?;
		debug!(target = "rt.router", %site, tab = %tab.id, "message delivered");
		delivery(reply)
	}

	fn find(&self, site: SiteId) -> Result<TabEntry> {
		self.tabs.lock().find(site).ok_or(Error::NoTabFound { site })
	}

	/// Pings the agent and recreates it when it is dead.
	async fn ensure_alive(&self, tab: &TabEntry) -> Result<Arc<dyn AgentLink>> {
		let has_cached = self.cache.contains(tab.site);
		let event = liveness::ping(tab.link.as_ref(), has_cached).await;
		if self.observe(&tab.id, event).is_usable() {
			if event != LivenessEvent::PingAnswered {
				debug!(target = "rt.router", site = %tab.site, "agent silent but has answered before, assuming busy");
			}
			return Ok(tab.link.clone());
		}

		let Some(spawner) = &self.spawner else {
			return Err(Error::Unresponsive { site: tab.site });
		};
		info!(target = "rt.router", site = %tab.site, tab = %tab.id, "agent appears dead, reinjecting");
		match spawner.reinject(&tab.id, tab.site).await {
			Ok(link) => {
				{
					let mut tabs = self.tabs.lock();
					tabs.replace_link(&tab.id, link.clone());
					tabs.observe(&tab.id, LivenessEvent::Reinjected);
				}
				tokio::time::sleep(REINJECT_SETTLE).await;
				Ok(link)
			}
			Err(err) => {
				warn!(target = "rt.router", site = %tab.site, error = %err, "reinjection failed");
				self.observe(&tab.id, LivenessEvent::ReinjectFailed);
				Err(Error::Unresponsive { site: tab.site })
			}
		}
	}

	/// Latest response of `site`, falling back to the cache when the agent
	/// is gone or fails.
	pub async fn get_response(&self, site: SiteId) -> Option<String> {
		let Ok(tab) = self.find(site) else {
			return self.cache.get(site);
		};
		match tab.link.request(AgentCommand::GetLatestResponse, RESPONSE_TIMEOUT).await {
			Ok(AgentReply::Content { content }) => content,
			Ok(other) => {
				debug!(target = "rt.router", %site, reply = ?other, "unexpected reply, using cache");
				self.cache.get(site)
			}
			Err(err) => {
				debug!(target = "rt.router", %site, error = %err, "agent unavailable, using cache");
				self.cache.get(site)
			}
		}
	}

	pub fn get_status(&self) -> StatusReport {
		self.tabs.lock().status()
	}

	/// Resets each site to a fresh conversation, one after another. A failing
	/// site does not stop the others.
	pub async fn new_conversation(&self, sites: &[SiteId]) -> NewConversationReport {
		let mut results = BTreeMap::new();
		for &site in sites {
			let outcome = match self.reset(site).await {
				Ok(()) => SiteOutcome::success(),
				Err(err) => {
					warn!(target = "rt.router", %site, error = %err, "new conversation failed");
					SiteOutcome::failure(err.to_wire())
				}
			};
			results.insert(site, outcome);
		}
		self.broadcast(HostEvent::NewConversationResults {
			results: results.clone(),
		});
		NewConversationReport { success: true, results }
	}

	async fn reset(&self, site: SiteId) -> Result<()> {
		let tab = self.find(site)?;

		// Save whatever is on the page before it is navigated away.
		match tab.link.request(AgentCommand::GetLatestResponse, RESPONSE_TIMEOUT).await {
			Ok(AgentReply::Content {
				content: Some(content),
			}) if !content.is_empty() => {
				debug!(target = "rt.router", %site, "captured response before new conversation");
				self.record_capture(site, content);
			}
			Ok(_) => {}
			Err(err) => debug!(target = "rt.router", %site, error = %err, "could not read response before reset"),
		}
		tokio::time::sleep(NEW_CONVERSATION_PAUSE).await;

		let reply = tab.link.request(AgentCommand::NewConversation, DELIVERY_TIMEOUT).await?;
		delivery(reply)
	}

	fn record_capture(&self, site: SiteId, content: String) {
		self.cache.record(site, &content);
		self.broadcast(HostEvent::ResponseCaptured { site, content });
	}

	/// Pings the foreground tabs once. Failures only update liveness.
	pub async fn heartbeat_once(&self) -> usize {
		let active = self.tabs.lock().active();
		for tab in &active {
			let event = match tab.link.request(AgentCommand::Heartbeat, liveness::PING_TIMEOUT).await {
				Ok(_) => LivenessEvent::PingAnswered,
				Err(_) => LivenessEvent::PingFailed {
					has_cached: self.cache.contains(tab.site),
				},
			};
			self.observe(&tab.id, event);
		}
		active.len()
	}

	/// Runs [`Router::heartbeat_once`] every `interval` until the task is dropped.
	pub async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		ticker.tick().await;
		loop {
			ticker.tick().await;
			let pinged = self.heartbeat_once().await;
			debug!(target = "rt.router", pinged, "heartbeat");
		}
	}

	/// Applies one notice from the agent of `tab`.
	pub fn observe_notice(&self, tab: &str, notice: AgentNotice) {
		match notice {
			AgentNotice::Ready { site } => {
				{
					let mut tabs = self.tabs.lock();
					tabs.touch(tab);
					tabs.observe(tab, LivenessEvent::Attached);
				}
				self.broadcast(HostEvent::TabStatusUpdate { site, connected: true });
			}
			AgentNotice::ResponseCaptured(captured) => {
				info!(
					target = "rt.router",
					site = %captured.site,
					len = captured.content.len(),
					"response captured"
				);
				self.tabs.lock().touch(tab);
				self.record_capture(captured.site, captured.content);
			}
			AgentNotice::Gone { site } => {
				debug!(target = "rt.router", %site, %tab, "agent gone");
				self.observe(tab, LivenessEvent::Detached);
			}
		}
	}

	/// Feeds agent notices, tagged with their tab, into [`Router::observe_notice`]
	/// until every sender is gone.
	pub async fn pump_notices(self: Arc<Self>, mut notices: mpsc::UnboundedReceiver<(TabId, AgentNotice)>) {
		while let Some((tab, notice)) = notices.recv().await {
			self.observe_notice(&tab, notice);
		}
	}
}

fn delivery(reply: AgentReply) -> Result<()> {
	match reply {
		AgentReply::Delivery { success: true, .. } => Ok(()),
		AgentReply::Delivery { error: Some(err), .. } => Err(Error::Remote(err)),
		other => Err(Error::Remote(WireError::new(
			ErrorCode::Internal,
			format!("unexpected agent reply: {other:?}"),
		))),
	}
}

#[cfg(test)]
mod tests;
