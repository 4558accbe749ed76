//! Last known response per site.
//!
//! Updated on every captured response so a controller can still read an
//! answer after the page that produced it is gone.

use std::collections::BTreeMap;
use std::sync::Arc;

use roundtable_protocol::SiteId;
use tracing::warn;

use crate::store::{KeyValueStore, KeyValueStoreExt};

const CACHE_KEY: &str = "latestResponses";

#[derive(Clone)]
pub struct ResponseCache {
	store: Arc<dyn KeyValueStore>,
}

impl ResponseCache {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	fn entries(&self) -> BTreeMap<SiteId, String> {
		match self.store.load(CACHE_KEY) {
			Ok(entries) => entries.unwrap_or_default(),
			Err(err) => {
				warn!(target = "rt.cache", error = %err, "response cache unreadable");
				BTreeMap::new()
			}
		}
	}

	pub fn record(&self, site: SiteId, content: &str) {
		let mut entries = self.entries();
		entries.insert(site, content.to_string());
		if let Err(err) = self.store.save(CACHE_KEY, &entries) {
			warn!(target = "rt.cache", %site, error = %err, "failed to cache response");
		}
	}

	pub fn get(&self, site: SiteId) -> Option<String> {
		self.entries().remove(&site)
	}

	pub fn contains(&self, site: SiteId) -> bool {
		self.entries().contains_key(&site)
	}
}
