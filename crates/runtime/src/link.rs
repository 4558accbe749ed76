//! How the host reaches an agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roundtable::AgentRequest;
use roundtable_protocol::{AgentCommand, AgentReply, SiteId};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::registry::TabId;

/// Request/reply channel to one agent.
#[async_trait]
pub trait AgentLink: Send + Sync {
	/// Sends `command` and waits up to `timeout` for its reply.
	///
	/// A receiver that is gone fails with [`Error::TransientUnreachable`];
	/// silence fails with [`Error::DeliveryTimeout`].
	async fn request(&self, command: AgentCommand, timeout: Duration) -> Result<AgentReply>;
}

/// Recreates the agent of a tab whose agent stopped answering.
#[async_trait]
pub trait AgentSpawner: Send + Sync {
	async fn reinject(&self, tab: &TabId, site: SiteId) -> Result<Arc<dyn AgentLink>>;
}

/// In-process link over the agent's request channel.
#[derive(Clone)]
pub struct ChannelLink {
	tx: mpsc::Sender<AgentRequest>,
}

impl ChannelLink {
	pub fn new(tx: mpsc::Sender<AgentRequest>) -> Self {
		Self { tx }
	}
}

#[async_trait]
impl AgentLink for ChannelLink {
	async fn request(&self, command: AgentCommand, timeout: Duration) -> Result<AgentReply> {
		let name = command.name();
		let exchange = async {
			let (reply, rx) = oneshot::channel();
			self.tx
				.send(AgentRequest { command, reply })
				.await
				.map_err(|_| Error::TransientUnreachable(format!("agent channel closed before {name}")))?;
			rx.await
				.map_err(|_| Error::TransientUnreachable(format!("agent dropped {name} without reply")))
		};
		tokio::time::timeout(timeout, exchange)
			.await
			.map_err(|_| Error::DeliveryTimeout { timeout })?
	}
}
