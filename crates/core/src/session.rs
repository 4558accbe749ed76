//! Per-page agent state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roundtable_protocol::SiteId;
use tokio::time::Instant;
use tracing::warn;

use crate::capture::{CaptureState, DedupGuard};
use crate::site::DedupPolicy;

/// A capture still running after this long is considered stuck and may be replaced.
pub const STUCK_CAPTURE_RESET: Duration = Duration::from_secs(5 * 60);

/// State of one agent bound to one page load.
///
/// Created when the agent attaches and dropped when the page goes away, so no
/// flag outlives a reload.
#[derive(Debug)]
pub struct AgentSession {
	site: SiteId,
	alive: bool,
	last_ping: Option<Instant>,
	state: CaptureState,
	/// Incremented for every capture that is started. A loop only acts while its
	/// generation is current.
	generation: u64,
	capture_started: Option<Instant>,
	dedup: DedupGuard,
}

/// Shared handle to a session, used by the agent and its capture loops.
pub type SharedSession = Arc<Mutex<AgentSession>>;

impl AgentSession {
	pub fn new(site: SiteId, policy: DedupPolicy) -> Self {
		Self {
			site,
			alive: true,
			last_ping: None,
			state: CaptureState::Idle,
			generation: 0,
			capture_started: None,
			dedup: DedupGuard::new(policy),
		}
	}

	pub fn shared(self) -> SharedSession {
		Arc::new(Mutex::new(self))
	}

	pub fn site(&self) -> SiteId {
		self.site
	}

	pub fn is_alive(&self) -> bool {
		self.alive
	}

	pub fn record_ping(&mut self, now: Instant) {
		self.last_ping = Some(now);
	}

	pub fn last_ping(&self) -> Option<Instant> {
		self.last_ping
	}

	/// Marks the session finished; running captures stop at their next poll.
	pub fn end(&mut self) {
		self.alive = false;
		self.generation += 1;
		self.state = CaptureState::Idle;
		self.capture_started = None;
	}

	pub fn state(&self) -> CaptureState {
		self.state
	}

	pub fn capture_in_progress(&self) -> bool {
		self.state.is_active()
	}

	/// Claims the capture guard, returning the generation the new loop owns.
	///
	/// Returns `None` when another capture is active and younger than
	/// [`STUCK_CAPTURE_RESET`].
	pub fn begin_capture(&mut self, now: Instant) -> Option<u64> {
		if !self.alive {
			return None;
		}
		if self.capture_in_progress() {
			let started = self.capture_started.unwrap_or(now);
			if now.saturating_duration_since(started) < STUCK_CAPTURE_RESET {
				return None;
			}
			warn!(target = "rt.capture", site = %self.site, "capture stuck, resetting");
		}
		self.generation += 1;
		self.state = CaptureState::Polling;
		self.capture_started = Some(now);
		Some(self.generation)
	}

	pub fn is_current(&self, generation: u64) -> bool {
		self.alive && self.generation == generation
	}

	/// Moves the capture owned by `generation` to `state`. Stale owners are ignored.
	pub fn set_state(&mut self, generation: u64, state: CaptureState) {
		if self.is_current(generation) {
			self.state = state;
			if !state.is_active() {
				self.capture_started = None;
			}
		}
	}

	/// Records `content` as emitted unless it is a duplicate. Returns whether it
	/// should be emitted.
	pub fn accept_capture(&mut self, content: &str, now: Instant) -> bool {
		if self.dedup.is_duplicate(content, now) {
			return false;
		}
		self.dedup.record(content, now);
		true
	}

	/// Content of the last emitted capture.
	pub fn last_captured(&self) -> Option<&str> {
		self.dedup.last_content()
	}

	pub fn last_capture_time(&self) -> Option<Instant> {
		self.dedup.last_emit()
	}
}
