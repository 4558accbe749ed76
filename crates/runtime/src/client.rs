//! Controller side of a controller channel.
//!
//! Transport agnostic: outgoing envelopes go to an mpsc sender, incoming
//! frames are fed through [`ControllerClient::handle_incoming`]. Requests are
//! correlated by id and given up after [`REQUEST_TIMEOUT`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use roundtable_protocol::{
	Command, Envelope, HostEvent, NewConversationReport, PairCode, PairToken, ResponseData, SiteId, SiteOutcome,
	StatusReport,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pending::{ChannelId, PendingRequests};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

pub struct ControllerClient {
	outbound: mpsc::UnboundedSender<Envelope>,
	pending: Mutex<PendingRequests<String, Value>>,
	token: Mutex<Option<String>>,
	events: broadcast::Sender<HostEvent>,
	channel: AtomicU64,
}

impl ControllerClient {
	pub fn new(outbound: mpsc::UnboundedSender<Envelope>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			outbound,
			pending: Mutex::new(PendingRequests::new()),
			token: Mutex::new(None),
			events,
			channel: AtomicU64::new(0),
		}
	}

	pub fn with_token(self, token: Option<String>) -> Self {
		*self.token.lock() = token;
		self
	}

	pub fn token(&self) -> Option<String> {
		self.token.lock().clone()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
		self.events.subscribe()
	}

	fn channel(&self) -> ChannelId {
		self.channel.load(Ordering::SeqCst)
	}

	/// Routes a frame from the host: responses to their waiter, events to subscribers.
	pub fn handle_incoming(&self, envelope: Envelope) {
		match envelope {
			Envelope::Response(response) => {
				let id = response.id.clone();
				self.pending
					.lock()
					.resolve(&id, response.into_result().map_err(Error::from));
			}
			Envelope::Event(event) => match HostEvent::from_event(&event) {
				Some(event) => {
					let _ = self.events.send(event);
				}
				None => debug!(target = "rt.client", kind = ?event.kind, "undecodable event"),
			},
			Envelope::Request(request) => {
				debug!(target = "rt.client", id = %request.id, "ignoring request from host");
			}
		}
	}

	pub fn handle_text(&self, text: &str) {
		match serde_json::from_str::<Envelope>(text) {
			Ok(envelope) => self.handle_incoming(envelope),
			Err(err) => warn!(target = "rt.client", error = %err, "malformed frame from host"),
		}
	}

	/// Fails everything in flight on the current connection.
	pub fn disconnected(&self) -> usize {
		let channel = self.channel.fetch_add(1, Ordering::SeqCst);
		self.pending.lock().fail_channel(channel)
	}

	pub fn pending(&self) -> usize {
		self.pending.lock().len()
	}

	/// Sends `command` and waits for its response data.
	pub async fn request(&self, command: Command) -> Result<Value> {
		let id = Uuid::new_v4().to_string();
		let kind = command.request_type();
		let rx = self.pending.lock().insert(id.clone(), self.channel())?;
		let request = command.into_request(id.clone(), self.token());

		if self.outbound.send(Envelope::Request(request)).is_err() {
			self.pending.lock().cancel(&id);
			return Err(Error::ChannelClosed);
		}
		debug!(target = "rt.client", %id, ?kind, "request sent");

		let result = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.pending.lock().cancel(&id);
				Err(Error::DeliveryTimeout {
					timeout: REQUEST_TIMEOUT,
				})
			}
		};

		if let Err(err) = &result {
			if err.code().clears_pairing() && self.token.lock().take().is_some() {
				warn!(target = "rt.client", error = %err, "pairing rejected, token cleared");
			}
		}
		result
	}

	async fn request_as<T: DeserializeOwned>(&self, command: Command) -> Result<T> {
		Ok(serde_json::from_value(self.request(command).await?)?)
	}

	/// Asks the host to show a pairing code.
	pub async fn request_pair_code(&self) -> Result<String> {
		let PairCode { code } = self.request_as(Command::GetPairCode).await?;
		Ok(code)
	}

	/// Confirms the code shown by the host and keeps the token.
	pub async fn confirm_pairing(&self, code: &str) -> Result<String> {
		let PairToken { token } = self
			.request_as(Command::PairConfirm {
				code: code.trim().to_ascii_uppercase(),
			})
			.await?;
		*self.token.lock() = Some(token.clone());
		Ok(token)
	}

	pub async fn auto_pair(&self) -> Result<String> {
		let PairToken { token } = self.request_as(Command::AutoPair).await?;
		*self.token.lock() = Some(token.clone());
		Ok(token)
	}

	pub async fn send_message(&self, site: SiteId, message: &str) -> Result<SiteOutcome> {
		self.request_as(Command::SendMessage {
			site,
			message: message.to_string(),
		})
		.await
	}

	pub async fn get_response(&self, site: SiteId) -> Result<Option<String>> {
		let ResponseData { content } = self.request_as(Command::GetResponse { site }).await?;
		Ok(content)
	}

	pub async fn get_status(&self) -> Result<StatusReport> {
		self.request_as(Command::GetStatus).await
	}

	pub async fn new_conversation(&self, sites: Vec<SiteId>) -> Result<NewConversationReport> {
		self.request_as(Command::NewConversation { sites }).await
	}
}
