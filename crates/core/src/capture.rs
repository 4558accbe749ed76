//! Response capture.
//!
//! Sites expose no "generation finished" signal, so completion is decided by
//! polling: the rendered response must stay byte-identical, with no streaming
//! marker on the page, for a site-tuned number of consecutive polls.
//!
//! [`CaptureMachine`] holds the pure stability logic and is driven by
//! [`run_capture`], which owns the timing and the page reads.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Error;
use crate::markdown::to_markdown;
use crate::page::Page;
use crate::session::SharedSession;
use crate::site::{DedupPolicy, TargetSite};

/// Overall limit for one capture.
pub const CAPTURE_CEILING: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
	Idle,
	/// Waiting for non-streaming content.
	Polling,
	/// Content seen, counting identical polls.
	Stabilizing,
	Captured,
	TimedOut,
}

impl CaptureState {
	pub fn is_active(self) -> bool {
		matches!(self, CaptureState::Polling | CaptureState::Stabilizing)
	}
}

/// One poll of the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
	pub text: String,
	pub streaming: bool,
}

impl Observation {
	pub fn new(text: impl Into<String>, streaming: bool) -> Self {
		Self {
			text: text.into(),
			streaming,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
	Continue(CaptureState),
	/// The content has been stable for the threshold and is final.
	Stable(String),
	TimedOut,
}

/// Stability counter over successive [`Observation`]s.
///
/// The first non-streaming, non-empty observation of a text counts as one
/// stable poll; every identical repeat adds one. A streaming marker, empty
/// text or a changed text restarts the count.
#[derive(Debug)]
pub struct CaptureMachine {
	threshold: u32,
	ceiling: Duration,
	started: Instant,
	previous: String,
	stable: u32,
}

impl CaptureMachine {
	pub fn new(threshold: u32, started: Instant) -> Self {
		Self::with_ceiling(threshold, CAPTURE_CEILING, started)
	}

	pub fn with_ceiling(threshold: u32, ceiling: Duration, started: Instant) -> Self {
		Self {
			threshold: threshold.max(1),
			ceiling,
			started,
			previous: String::new(),
			stable: 0,
		}
	}

	pub fn stable_count(&self) -> u32 {
		self.stable
	}

	pub fn observe(&mut self, observation: Observation, now: Instant) -> Step {
		if observation.streaming || observation.text.is_empty() {
			self.stable = 0;
			self.previous = observation.text;
		} else if self.stable > 0 && observation.text == self.previous {
			self.stable += 1;
		} else {
			self.stable = 1;
			self.previous = observation.text;
		}

		if self.stable >= self.threshold {
			return Step::Stable(self.previous.clone());
		}
		if now.saturating_duration_since(self.started) >= self.ceiling {
			return Step::TimedOut;
		}
		Step::Continue(if self.stable > 0 {
			CaptureState::Stabilizing
		} else {
			CaptureState::Polling
		})
	}
}

/// 32-bit `h * 31 + unit` rolling hash over UTF-16 code units.
pub fn rolling_hash(content: &str) -> i32 {
	content
		.encode_utf16()
		.fold(0i32, |hash, unit| hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit)))
}

/// Suppresses re-emission of content that was already captured.
#[derive(Debug)]
pub struct DedupGuard {
	policy: DedupPolicy,
	last_content: Option<String>,
	last_hash: Option<i32>,
	last_emit: Option<Instant>,
}

impl DedupGuard {
	pub fn new(policy: DedupPolicy) -> Self {
		Self {
			policy,
			last_content: None,
			last_hash: None,
			last_emit: None,
		}
	}

	pub fn is_duplicate(&self, content: &str, now: Instant) -> bool {
		if self.last_content.as_deref() == Some(content) {
			return true;
		}
		if self.policy.hash && self.last_hash == Some(rolling_hash(content)) {
			return true;
		}
		let cooldown = self.policy.cooldown();
		!cooldown.is_zero() && self.last_emit.is_some_and(|at| now.saturating_duration_since(at) < cooldown)
	}

	pub fn record(&mut self, content: &str, now: Instant) {
		self.last_hash = Some(rolling_hash(content));
		self.last_content = Some(content.to_string());
		self.last_emit = Some(now);
	}

	pub fn last_content(&self) -> Option<&str> {
		self.last_content.as_deref()
	}

	pub fn last_emit(&self) -> Option<Instant> {
		self.last_emit
	}
}

/// Renders the current response using every response lookup and keeps the
/// longest rendering of at least `min_len` characters.
///
/// Each lookup contributes its last match in document order.
pub async fn read_response(page: &dyn Page, site: &TargetSite) -> crate::Result<Option<String>> {
	let mut best: Option<String> = None;
	for lookup in site.response_lookups() {
		let matches = page.query_all(&lookup.selector).await?;
		let Some(last) = matches.last() else {
			continue;
		};
		let target = match &lookup.closest {
			Some(ancestor) => page.closest(last, ancestor).await?.unwrap_or_else(|| last.clone()),
			None => last.clone(),
		};
		let node = page.snapshot(&target, &site.strip).await?;
		let text = to_markdown(&node);
		if text.chars().count() >= site.min_len && best.as_ref().is_none_or(|b| text.len() > b.len()) {
			best = Some(text);
		}
	}
	Ok(best)
}

pub async fn is_streaming(page: &dyn Page, site: &TargetSite) -> crate::Result<bool> {
	for selector in &site.streaming {
		if page.exists(selector).await? {
			return Ok(true);
		}
	}
	Ok(false)
}

pub async fn observe_page(page: &dyn Page, site: &TargetSite) -> crate::Result<Observation> {
	let streaming = is_streaming(page, site).await?;
	let text = read_response(page, site).await?.unwrap_or_default();
	Ok(Observation { text, streaming })
}

#[derive(Debug)]
pub enum CaptureOutcome {
	Captured(String),
	/// Stable content equalled a previous capture; nothing emitted.
	Duplicate,
	TimedOut,
	/// A newer capture took over or the session ended.
	Superseded,
	PageClosed,
}

/// Polls `page` until the response is final, then records it in `session`.
///
/// `generation` must come from [`AgentSession::begin_capture`](crate::AgentSession::begin_capture).
/// Page errors other than a closed page count as an empty poll.
pub async fn run_capture(page: &dyn Page, site: &TargetSite, session: &SharedSession, generation: u64) -> CaptureOutcome {
	let mut machine = CaptureMachine::new(site.timing.stable_threshold, Instant::now());
	debug!(target = "rt.capture", site = %site.id, generation, "capture started");

	loop {
		tokio::time::sleep(site.timing.poll()).await;
		if !session.lock().is_current(generation) {
			debug!(target = "rt.capture", site = %site.id, generation, "capture superseded");
			return CaptureOutcome::Superseded;
		}

		let observation = match observe_page(page, site).await {
			Ok(observation) => observation,
			Err(Error::PageClosed) => {
				session.lock().set_state(generation, CaptureState::Idle);
				return CaptureOutcome::PageClosed;
			}
			Err(err) => {
				debug!(target = "rt.capture", site = %site.id, error = %err, "poll failed");
				Observation::default()
			}
		};

		let now = Instant::now();
		match machine.observe(observation, now) {
			Step::Continue(state) => session.lock().set_state(generation, state),
			Step::Stable(content) => {
				let mut session = session.lock();
				if !session.is_current(generation) {
					return CaptureOutcome::Superseded;
				}
				if session.accept_capture(&content, now) {
					session.set_state(generation, CaptureState::Captured);
					info!(target = "rt.capture", site = %site.id, len = content.len(), "response captured");
					return CaptureOutcome::Captured(content);
				}
				session.set_state(generation, CaptureState::Idle);
				debug!(target = "rt.capture", site = %site.id, "duplicate content suppressed");
				return CaptureOutcome::Duplicate;
			}
			Step::TimedOut => {
				session.lock().set_state(generation, CaptureState::TimedOut);
				info!(target = "rt.capture", site = %site.id, "capture timed out without stable content");
				return CaptureOutcome::TimedOut;
			}
		}
	}
}
