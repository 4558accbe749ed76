//! Outstanding requests awaiting their correlated response.
//!
//! Each entry is removed exactly once: by its response, by the failure of
//! the channel it was sent on, or by its waiter giving up, whichever comes first.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};

/// Identifies the channel a request went out on.
pub type ChannelId = u64;

struct Pending<T> {
	channel: ChannelId,
	tx: oneshot::Sender<Result<T>>,
}

pub struct PendingRequests<K, T> {
	entries: HashMap<K, Pending<T>>,
}

impl<K, T> Default for PendingRequests<K, T> {
	fn default() -> Self {
		Self { entries: HashMap::new() }
	}
}

impl<K: Eq + Hash + Clone + Debug, T> PendingRequests<K, T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `id`. Fails when the id is already outstanding.
	pub fn insert(&mut self, id: K, channel: ChannelId) -> Result<oneshot::Receiver<Result<T>>> {
		if self.entries.contains_key(&id) {
			return Err(Error::BadRequest(format!("request id {id:?} already pending")));
		}
		let (tx, rx) = oneshot::channel();
		self.entries.insert(id, Pending { channel, tx });
		Ok(rx)
	}

	/// Completes `id`. Returns `false` for unknown or already completed ids.
	pub fn resolve(&mut self, id: &K, result: Result<T>) -> bool {
		let Some(pending) = self.entries.remove(id) else {
			debug!(target = "rt.pending", ?id, "response for unknown request");
			return false;
		};
		// The waiter may have given up.
		let _ = pending.tx.send(result);
		true
	}

	/// Drops `id` without answering, for a waiter that gave up.
	pub fn cancel(&mut self, id: &K) -> bool {
		self.entries.remove(id).is_some()
	}

	/// Fails every request sent on `channel`.
	pub fn fail_channel(&mut self, channel: ChannelId) -> usize {
		let ids: Vec<K> = self
			.entries
			.iter()
			.filter(|(_, p)| p.channel == channel)
			.map(|(id, _)| id.clone())
			.collect();
		for id in &ids {
			if let Some(pending) = self.entries.remove(id) {
				let _ = pending.tx.send(Err(Error::ChannelClosed));
			}
		}
		ids.len()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_resolve_delivers_once() {
		let mut pending = PendingRequests::<String, u32>::new();
		let rx = pending.insert("a".into(), 1).unwrap();

		assert!(pending.resolve(&"a".to_string(), Ok(7)));
		assert!(!pending.resolve(&"a".to_string(), Ok(8)));
		assert_eq!(rx.await.unwrap().unwrap(), 7);
		assert!(pending.is_empty());
	}

	#[test]
	fn test_duplicate_id_is_rejected() {
		let mut pending = PendingRequests::<u64, ()>::new();
		let _rx = pending.insert(1, 0).unwrap();
		assert!(pending.insert(1, 0).is_err());
		assert_eq!(pending.len(), 1);
	}

	#[tokio::test]
	async fn test_fail_channel_only_touches_that_channel() {
		let mut pending = PendingRequests::<u64, ()>::new();
		let a = pending.insert(1, 10).unwrap();
		let b = pending.insert(2, 20).unwrap();

		assert_eq!(pending.fail_channel(10), 1);

		assert!(matches!(a.await.unwrap(), Err(Error::ChannelClosed)));
		assert_eq!(pending.len(), 1);
		assert!(pending.resolve(&2, Ok(())));
		assert!(b.await.unwrap().is_ok());
	}

	#[test]
	fn test_cancel_removes_without_answer() {
		let mut pending = PendingRequests::<u64, ()>::new();
		let _rx = pending.insert(1, 0).unwrap();
		assert!(pending.cancel(&1));
		assert!(!pending.resolve(&1, Ok(())));
	}
}
