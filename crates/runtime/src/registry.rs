//! Which page hosts which site.
//!
//! The registry only holds links to agents; sessions stay with the agents.

use std::collections::HashMap;
use std::sync::Arc;

use roundtable_protocol::{HostEvent, SiteId, StatusReport};

use crate::link::AgentLink;
use crate::liveness::{Liveness, LivenessEvent};

/// Browser-assigned page identifier.
pub type TabId = String;

#[derive(Clone)]
pub struct TabEntry {
	pub id: TabId,
	pub site: SiteId,
	pub url: String,
	/// Foreground tab of its window.
	pub active: bool,
	pub link: Arc<dyn AgentLink>,
	pub liveness: Liveness,
	seen: u64,
}

#[derive(Default)]
pub struct TabRegistry {
	tabs: HashMap<TabId, TabEntry>,
	clock: u64,
}

impl TabRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn tick(&mut self) -> u64 {
		self.clock += 1;
		self.clock
	}

	/// Adds or replaces a tab. Returns `None` when `url` belongs to no site.
	///
	/// Replacing a tab whose page moved to another site may disconnect the
	/// old site; that transition is returned.
	pub fn register(&mut self, id: impl Into<TabId>, url: &str, link: Arc<dyn AgentLink>) -> Option<Vec<HostEvent>> {
		let id = id.into();
		let site = SiteId::from_url(url)?;
		let mut events = Vec::new();
		if let Some(old) = self.tabs.get(&id).map(|e| e.site) {
			if old != site {
				events.extend(self.remove(&id));
			}
		}
		let seen = self.tick();
		self.tabs.insert(
			id.clone(),
			TabEntry {
				id,
				site,
				url: url.to_string(),
				active: false,
				link,
				liveness: Liveness::Unknown,
				seen,
			},
		);
		Some(events)
	}

	/// Drops a tab. Reports the site as disconnected when it was its last tab.
	pub fn remove(&mut self, id: &str) -> Option<HostEvent> {
		let entry = self.tabs.remove(id)?;
		(self.count(entry.site) == 0).then_some(HostEvent::TabStatusUpdate {
			site: entry.site,
			connected: false,
		})
	}

	pub fn get(&self, id: &str) -> Option<&TabEntry> {
		self.tabs.get(id)
	}

	/// Marks the tab as just seen, making it the preferred tab of its site.
	pub fn touch(&mut self, id: &str) {
		let seen = self.tick();
		if let Some(entry) = self.tabs.get_mut(id) {
			entry.seen = seen;
		}
	}

	pub fn set_active(&mut self, id: &str, active: bool) {
		if let Some(entry) = self.tabs.get_mut(id) {
			entry.active = active;
		}
	}

	pub fn observe(&mut self, id: &str, event: LivenessEvent) -> Option<Liveness> {
		let entry = self.tabs.get_mut(id)?;
		entry.liveness = entry.liveness.next(event);
		Some(entry.liveness)
	}

	pub fn replace_link(&mut self, id: &str, link: Arc<dyn AgentLink>) {
		if let Some(entry) = self.tabs.get_mut(id) {
			entry.link = link;
		}
	}

	/// Most recently seen tab of `site`.
	pub fn find(&self, site: SiteId) -> Option<TabEntry> {
		self.tabs
			.values()
			.filter(|e| e.site == site)
			.max_by_key(|e| e.seen)
			.cloned()
	}

	pub fn active(&self) -> Vec<TabEntry> {
		let mut tabs: Vec<_> = self.tabs.values().filter(|e| e.active).cloned().collect();
		tabs.sort_by_key(|e| e.seen);
		tabs
	}

	pub fn count(&self, site: SiteId) -> usize {
		self.tabs.values().filter(|e| e.site == site).count()
	}

	pub fn len(&self) -> usize {
		self.tabs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tabs.is_empty()
	}

	/// Reachability and tab count for every supported site.
	pub fn status(&self) -> StatusReport {
		let mut report = StatusReport::default();
		for site in SiteId::ALL {
			let count = self.count(site);
			report.statuses.insert(site, count > 0);
			report.tab_counts.insert(site, count);
		}
		report
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use async_trait::async_trait;
	use roundtable_protocol::{AgentCommand, AgentReply};

	use super::*;
	use crate::error::Result;

	struct NullLink;

	#[async_trait]
	impl AgentLink for NullLink {
		async fn request(&self, _command: AgentCommand, _timeout: Duration) -> Result<AgentReply> {
			Ok(AgentReply::delivered())
		}
	}

	fn link() -> Arc<dyn AgentLink> {
		Arc::new(NullLink)
	}

	#[test]
	fn test_unrelated_pages_are_not_registered() {
		let mut registry = TabRegistry::new();
		assert!(registry.register("1", "https://example.com/", link()).is_none());
		assert!(registry.is_empty());
	}

	#[test]
	fn test_status_counts_every_site() {
		let mut registry = TabRegistry::new();
		registry.register("1", "https://claude.ai/new", link());
		registry.register("2", "https://claude.ai/chat/abc", link());
		registry.register("3", "https://chatgpt.com/", link());

		let status = registry.status();
		assert_eq!(status.statuses.len(), SiteId::ALL.len());
		assert_eq!(status.tab_counts[&SiteId::Claude], 2);
		assert_eq!(status.tab_counts[&SiteId::Chatgpt], 1);
		assert!(status.statuses[&SiteId::Chatgpt]);
		assert!(!status.statuses[&SiteId::Kimi]);
		assert_eq!(status.tab_counts[&SiteId::Kimi], 0);
	}

	#[test]
	fn test_last_tab_removal_disconnects_site() {
		let mut registry = TabRegistry::new();
		registry.register("1", "https://claude.ai/new", link());
		registry.register("2", "https://claude.ai/new", link());

		assert_eq!(registry.remove("1"), None);
		assert_eq!(
			registry.remove("2"),
			Some(HostEvent::TabStatusUpdate {
				site: SiteId::Claude,
				connected: false
			})
		);
		assert_eq!(registry.remove("2"), None);
	}

	#[test]
	fn test_navigation_to_other_site_disconnects_old_one() {
		let mut registry = TabRegistry::new();
		registry.register("1", "https://claude.ai/new", link());

		let events = registry.register("1", "https://chat.deepseek.com/", link()).unwrap();

		assert_eq!(
			events,
			vec![HostEvent::TabStatusUpdate {
				site: SiteId::Claude,
				connected: false
			}]
		);
		assert_eq!(registry.get("1").unwrap().site, SiteId::Deepseek);
	}

	#[test]
	fn test_find_prefers_most_recently_seen() {
		let mut registry = TabRegistry::new();
		registry.register("old", "https://kimi.com/", link());
		registry.register("new", "https://www.kimi.com/", link());
		assert_eq!(registry.find(SiteId::Kimi).unwrap().id, "new");

		registry.touch("old");
		assert_eq!(registry.find(SiteId::Kimi).unwrap().id, "old");
		assert!(registry.find(SiteId::Gemini).is_none());
	}

	#[test]
	fn test_liveness_is_tracked_per_tab() {
		let mut registry = TabRegistry::new();
		registry.register("1", "https://chatglm.cn/", link());
		assert_eq!(registry.get("1").unwrap().liveness, Liveness::Unknown);

		assert_eq!(
			registry.observe("1", LivenessEvent::PingFailed { has_cached: false }),
			Some(Liveness::Dead)
		);
		assert_eq!(registry.observe("missing", LivenessEvent::PingAnswered), None);
	}

	#[test]
	fn test_active_tabs() {
		let mut registry = TabRegistry::new();
		registry.register("1", "https://claude.ai/", link());
		registry.register("2", "https://gemini.google.com/app", link());
		registry.set_active("2", true);

		let active = registry.active();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].id, "2");
	}
}
