//! Host ↔ agent messages.
//!
//! An agent lives next to one page. The host sends it an [`AgentCommand`] and
//! waits for exactly one [`AgentReply`]; independently the agent pushes
//! [`AgentNotice`]s whenever something happens on the page.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::site::SiteId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentCommand {
	Heartbeat,
	Ping,
	InjectMessage { message: String },
	GetLatestResponse,
	NewConversation,
}

impl AgentCommand {
	pub fn name(&self) -> &'static str {
		match self {
			AgentCommand::Heartbeat => "HEARTBEAT",
			AgentCommand::Ping => "PING",
			AgentCommand::InjectMessage { .. } => "INJECT_MESSAGE",
			AgentCommand::GetLatestResponse => "GET_LATEST_RESPONSE",
			AgentCommand::NewConversation => "NEW_CONVERSATION",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentReply {
	/// Answer to `Heartbeat` / `Ping`.
	Alive { site: SiteId },
	/// Answer to `InjectMessage` / `NewConversation`.
	Delivery {
		success: bool,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		error: Option<WireError>,
	},
	/// Answer to `GetLatestResponse`.
	Content { content: Option<String> },
}

impl AgentReply {
	pub fn delivered() -> Self {
		AgentReply::Delivery {
			success: true,
			error: None,
		}
	}

	pub fn failed(error: WireError) -> Self {
		AgentReply::Delivery {
			success: false,
			error: Some(error),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
	pub site: SiteId,
	pub content: String,
	/// Unix epoch milliseconds.
	pub captured_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentNotice {
	/// The agent finished attaching to its page.
	Ready { site: SiteId },
	ResponseCaptured(CapturedResponse),
	/// The page navigated away or closed; the agent is finished.
	Gone { site: SiteId },
}

impl AgentNotice {
	pub fn site(&self) -> SiteId {
		match self {
			AgentNotice::Ready { site } | AgentNotice::Gone { site } => *site,
			AgentNotice::ResponseCaptured(captured) => captured.site,
		}
	}
}
