//! Agent runtime: one [`Agent`] per page load.
//!
//! The agent owns its [`AgentSession`], answers [`AgentCommand`]s from the host,
//! arms a capture after every successful injection and whenever the driver
//! reports a relevant DOM mutation, and reports what it sees as
//! [`AgentNotice`]s.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use roundtable_protocol::{AgentCommand, AgentNotice, AgentReply, CapturedResponse, SiteId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{self, CaptureOutcome};
use crate::inject;
use crate::page::Page;
use crate::session::{AgentSession, SharedSession};
use crate::site::TargetSite;

/// Delay before navigating away for a new conversation.
pub const NEW_CONVERSATION_DELAY: Duration = Duration::from_millis(100);

/// A command together with the slot its reply goes to.
#[derive(Debug)]
pub struct AgentRequest {
	pub command: AgentCommand,
	pub reply: oneshot::Sender<AgentReply>,
}

/// Automation agent bound to one page.
#[derive(Clone)]
pub struct Agent {
	page: Arc<dyn Page>,
	site: Arc<TargetSite>,
	session: SharedSession,
	notices: mpsc::UnboundedSender<AgentNotice>,
}

impl Agent {
	/// Creates the agent and announces it with [`AgentNotice::Ready`].
	pub fn attach(page: Arc<dyn Page>, site: TargetSite, notices: mpsc::UnboundedSender<AgentNotice>) -> Self {
		let session = AgentSession::new(site.id, site.dedup).shared();
		let agent = Self {
			page,
			site: Arc::new(site),
			session,
			notices,
		};
		info!(target = "rt.agent", site = %agent.site.id, "agent attached");
		agent.notify(AgentNotice::Ready { site: agent.site.id });
		agent
	}

	pub fn site(&self) -> SiteId {
		self.site.id
	}

	pub fn session(&self) -> SharedSession {
		self.session.clone()
	}

	pub fn is_alive(&self) -> bool {
		self.session.lock().is_alive()
	}

	fn notify(&self, notice: AgentNotice) {
		if self.notices.send(notice).is_err() {
			debug!(target = "rt.agent", site = %self.site.id, "notice receiver gone");
		}
	}

	pub async fn handle(&self, command: AgentCommand) -> AgentReply {
		debug!(target = "rt.agent", site = %self.site.id, command = command.name(), "command received");
		match command {
			AgentCommand::Heartbeat | AgentCommand::Ping => {
				self.session.lock().record_ping(Instant::now());
				AgentReply::Alive { site: self.site.id }
			}
			AgentCommand::InjectMessage { message } => self.inject(&message).await,
			AgentCommand::GetLatestResponse => AgentReply::Content {
				content: self.latest_response().await,
			},
			AgentCommand::NewConversation => self.new_conversation().await,
		}
	}

	async fn inject(&self, message: &str) -> AgentReply {
		match inject::inject(self.page.as_ref(), &self.site, message).await {
			Ok(_) => {
				self.arm_capture();
				AgentReply::delivered()
			}
			Err(err) => {
				warn!(target = "rt.agent", site = %self.site.id, error = %err, "injection failed");
				AgentReply::failed(err.to_wire())
			}
		}
	}

	/// Current rendering of the response, or the last capture when the page has none.
	pub async fn latest_response(&self) -> Option<String> {
		match capture::read_response(self.page.as_ref(), &self.site).await {
			Ok(Some(content)) => Some(content),
			Ok(None) => self.session.lock().last_captured().map(str::to_string),
			Err(err) => {
				debug!(target = "rt.agent", site = %self.site.id, error = %err, "reading response failed");
				self.session.lock().last_captured().map(str::to_string)
			}
		}
	}

	/// Starts a capture loop unless one is already running. Returns whether a
	/// loop was started.
	pub fn arm_capture(&self) -> bool {
		let Some(generation) = self.session.lock().begin_capture(Instant::now()) else {
			debug!(target = "rt.agent", site = %self.site.id, "capture already running");
			return false;
		};
		let agent = self.clone();
		tokio::spawn(async move {
			let outcome = capture::run_capture(agent.page.as_ref(), &agent.site, &agent.session, generation).await;
			match outcome {
				CaptureOutcome::Captured(content) => agent.notify(AgentNotice::ResponseCaptured(CapturedResponse {
					site: agent.site.id,
					content,
					captured_at_ms: unix_millis(),
				})),
				CaptureOutcome::PageClosed => agent.finish(),
				CaptureOutcome::Duplicate | CaptureOutcome::TimedOut | CaptureOutcome::Superseded => {}
			}
		});
		true
	}

	async fn new_conversation(&self) -> AgentReply {
		tokio::time::sleep(NEW_CONVERSATION_DELAY).await;
		match self.page.navigate(&self.site.new_chat_url).await {
			Ok(()) => {
				info!(target = "rt.agent", site = %self.site.id, url = %self.site.new_chat_url, "new conversation");
				self.finish();
				AgentReply::delivered()
			}
			Err(err) => AgentReply::failed(err.to_wire()),
		}
	}

	/// Ends the session and reports [`AgentNotice::Gone`]. Idempotent.
	pub fn finish(&self) {
		{
			let mut session = self.session.lock();
			if !session.is_alive() {
				return;
			}
			session.end();
		}
		info!(target = "rt.agent", site = %self.site.id, "agent finished");
		self.notify(AgentNotice::Gone { site: self.site.id });
	}

	/// Serves `requests` and mutation `triggers` until the host drops the
	/// request channel or the session ends.
	///
	/// Commands run concurrently so a liveness ping is answered while an
	/// injection is in progress.
	pub async fn run(self, mut requests: mpsc::Receiver<AgentRequest>, mut triggers: mpsc::Receiver<()>) {
		let mut triggers_open = true;
		loop {
			tokio::select! {
				request = requests.recv() => {
					let Some(AgentRequest { command, reply }) = request else {
						break;
					};
					let agent = self.clone();
					tokio::spawn(async move {
						let answer = agent.handle(command).await;
						let _ = reply.send(answer);
					});
				}
				trigger = triggers.recv(), if triggers_open => match trigger {
					Some(()) => {
						self.arm_capture();
					}
					None => triggers_open = false,
				},
			}
			if !self.is_alive() {
				break;
			}
		}
		debug!(target = "rt.agent", site = %self.site.id, "agent loop stopped");
	}
}

fn unix_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}

#[cfg(test)]
mod tests;
