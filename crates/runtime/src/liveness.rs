//! Agent liveness.
//!
//! ```text
//! Unknown ──ping ok──────────────▶ Alive
//!    │  └──ping failed, cached────▶ Alive (assumed busy)
//!    └─────ping failed────────────▶ Dead ──reinject──▶ Reinjected
//!                                    ▲      └─failed──▶ Dead
//! ```
//!
//! An agent that does not answer while its site already produced a response
//! is assumed to be busy streaming, and is left alone so the conversation in
//! flight is not interrupted.

use std::time::Duration;

use roundtable_protocol::AgentCommand;
use tracing::debug;

use crate::link::AgentLink;

/// How long a ping may take before the agent counts as unresponsive.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause after recreating an agent before it is used.
pub const REINJECT_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
	#[default]
	Unknown,
	Alive,
	Dead,
	Reinjected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
	PingAnswered,
	PingFailed { has_cached: bool },
	Reinjected,
	ReinjectFailed,
	/// The agent announced itself or left.
	Attached,
	Detached,
}

impl Liveness {
	pub fn next(self, event: LivenessEvent) -> Liveness {
		match event {
			LivenessEvent::PingAnswered | LivenessEvent::Attached => Liveness::Alive,
			LivenessEvent::PingFailed { has_cached: true } => Liveness::Alive,
			LivenessEvent::PingFailed { has_cached: false } => Liveness::Dead,
			LivenessEvent::Reinjected => Liveness::Reinjected,
			LivenessEvent::ReinjectFailed | LivenessEvent::Detached => Liveness::Dead,
		}
	}

	/// Whether a command may be sent to the agent.
	pub fn is_usable(self) -> bool {
		matches!(self, Liveness::Alive | Liveness::Reinjected)
	}
}

/// Pings over `link` and reports the resulting event.
pub async fn ping(link: &dyn AgentLink, has_cached: bool) -> LivenessEvent {
	match link.request(AgentCommand::Ping, PING_TIMEOUT).await {
		Ok(_) => LivenessEvent::PingAnswered,
		Err(err) => {
			debug!(target = "rt.liveness", error = %err, has_cached, "ping failed");
			LivenessEvent::PingFailed { has_cached }
		}
	}
}
