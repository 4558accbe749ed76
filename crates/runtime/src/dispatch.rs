//! Controller request handling.
//!
//! Turns each [`Request`] into exactly one [`Response`]. Pairing commands are
//! answered first; every other command from an external channel must carry
//! a valid token.

use std::sync::Arc;

use roundtable_protocol::{Command, Envelope, PairCode, PairToken, Request, Response, ResponseData, SiteOutcome};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pairing::PairingGate;
use crate::router::Router;

/// Where a controller channel comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
	/// Same trusted context as the host; exempt from token checks.
	Internal,
	External,
}

#[derive(Clone)]
pub struct Dispatcher {
	router: Arc<Router>,
	pairing: Arc<PairingGate>,
}

impl Dispatcher {
	pub fn new(router: Arc<Router>, pairing: Arc<PairingGate>) -> Self {
		Self { router, pairing }
	}

	pub fn router(&self) -> &Arc<Router> {
		&self.router
	}

	pub fn pairing(&self) -> &Arc<PairingGate> {
		&self.pairing
	}

	/// Handles one raw text frame. Anything but a request is ignored.
	///
	/// A frame that only looks like a request (`kind: "REQ"` and a string
	/// `id`) is still answered, with `BAD_REQUEST`.
	pub async fn dispatch_text(&self, text: &str, origin: ChannelOrigin) -> Option<Response> {
		match serde_json::from_str::<Envelope>(text) {
			Ok(Envelope::Request(request)) => Some(self.dispatch(request, origin).await),
			Ok(_) => {
				debug!(target = "rt.dispatch", "ignoring non-request message");
				None
			}
			Err(err) => {
				warn!(target = "rt.dispatch", error = %err, "malformed controller message");
				let id = request_id(text)?;
				Some(Response::err(id, Error::BadRequest(err.to_string()).to_wire()))
			}
		}
	}

	pub async fn dispatch(&self, request: Request, origin: ChannelOrigin) -> Response {
		let id = request.id.clone();
		debug!(target = "rt.dispatch", %id, kind = ?request.kind, ?origin, "request");
		match self.handle(&request, origin).await {
			Ok(response) => response,
			Err(err) => {
				debug!(target = "rt.dispatch", %id, error = %err, "request failed");
				Response::err(id, err.to_wire())
			}
		}
	}

	async fn handle(&self, request: &Request, origin: ChannelOrigin) -> Result<Response> {
		let id = request.id.as_str();
		let command = Command::from_request(request)?;
		if !command.is_pairing() && origin == ChannelOrigin::External {
			self.pairing.authorize(request.token.as_deref())?;
		}

		Ok(match command {
			Command::GetPairCode => Response::ok(
				id,
				&PairCode {
					code: self.pairing.issue_code()?,
				},
			),
			Command::PairConfirm { code } => Response::ok(
				id,
				&PairToken {
					token: self.pairing.confirm(&code)?,
				},
			),
			Command::AutoPair => {
				if origin != ChannelOrigin::Internal {
					warn!(target = "rt.dispatch", "auto-pair refused for external channel");
					return Err(Error::Unauthorized);
				}
				Response::ok(
					id,
					&PairToken {
						token: self.pairing.auto_pair()?,
					},
				)
			}
			Command::SendMessage { site, message } => {
				let outcome = match self.router.send_message(site, &message).await {
					Ok(()) => SiteOutcome::success(),
					Err(err) => SiteOutcome::failure(err.to_wire()),
				};
				Response::ok(id, &outcome)
			}
			Command::GetResponse { site } => Response::ok(
				id,
				&ResponseData {
					content: self.router.get_response(site).await,
				},
			),
			Command::GetStatus => Response::ok(id, &self.router.get_status()),
			Command::NewConversation { sites } => Response::ok(id, &self.router.new_conversation(&sites).await),
		})
	}
}

/// Correlation id of a frame that claims to be a request.
fn request_id(text: &str) -> Option<String> {
	let value: Value = serde_json::from_str(text).ok()?;
	if value.get("kind").and_then(Value::as_str) != Some("REQ") {
		return None;
	}
	value.get("id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests;
