//! One Chrome DevTools Protocol websocket with id-correlated commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CdpError {
	#[error("DevTools connection closed")]
	Closed,

	#[error("{method} failed: {message}")]
	Protocol { method: String, message: String },

	#[error("{method} timed out")]
	Timeout { method: String },

	#[error("Page script failed: {0}")]
	Script(String),

	#[error("DevTools websocket: {0}")]
	Ws(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("DevTools JSON: {0}")]
	Json(#[from] serde_json::Error),
}

/// A protocol event, e.g. `Runtime.bindingCalled`.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
	pub method: String,
	pub params: Value,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
	Reply { id: u64, result: Result<Value, String> },
	Event(CdpEvent),
}

/// Classifies one frame from the browser.
pub(crate) fn parse_incoming(text: &str) -> Option<Incoming> {
	let value: Value = serde_json::from_str(text).ok()?;
	if let Some(id) = value.get("id").and_then(Value::as_u64) {
		let result = match value.get("error") {
			Some(error) => Err(error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("unknown error")
				.to_string()),
			None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
		};
		return Some(Incoming::Reply { id, result });
	}
	let method = value.get("method")?.as_str()?.to_string();
	let params = value.get("params").cloned().unwrap_or(Value::Null);
	Some(Incoming::Event(CdpEvent { method, params }))
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

pub struct CdpConnection {
	outbound: mpsc::UnboundedSender<Message>,
	pending: Pending,
	next_id: AtomicU64,
}

impl CdpConnection {
	/// Connects to a target's `webSocketDebuggerUrl`. Events arrive on the
	/// returned receiver, which ends when the socket closes.
	pub async fn connect(ws_url: &str) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<CdpEvent>), CdpError> {
		let (socket, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(ws_url))
			.await
			.map_err(|_| CdpError::Timeout {
				method: "connect".into(),
			})??;
		let (mut ws_tx, mut ws_rx) = socket.split();

		let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let pending: Pending = Arc::default();

		tokio::spawn(async move {
			while let Some(msg) = outbound_rx.recv().await {
				if ws_tx.send(msg).await.is_err() {
					break;
				}
			}
		});

		let reader_pending = pending.clone();
		tokio::spawn(async move {
			while let Some(msg) = ws_rx.next().await {
				match msg {
					Ok(Message::Text(text)) => match parse_incoming(&text) {
						Some(Incoming::Reply { id, result }) => {
							let waiter = reader_pending.lock().remove(&id);
							match waiter {
								Some(waiter) => {
									let _ = waiter.send(result);
								}
								None => debug!(target = "rt.cdp", id, "reply for unknown command"),
							}
						}
						Some(Incoming::Event(event)) => {
							if events_tx.send(event).is_err() {
								break;
							}
						}
						None => warn!(target = "rt.cdp", "unparseable DevTools frame"),
					},
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						warn!(target = "rt.cdp", error = %err, "DevTools websocket error");
						break;
					}
				}
			}
			// Dropping the waiters fails every command still in flight.
			reader_pending.lock().clear();
		});

		Ok((
			Arc::new(Self {
				outbound,
				pending,
				next_id: AtomicU64::new(1),
			}),
			events_rx,
		))
	}

	pub async fn call(&self, method: &str, params: Value) -> Result<Value, CdpError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		let frame = json!({ "id": id, "method": method, "params": params }).to_string();
		if self.outbound.send(Message::Text(frame.into())).is_err() {
			self.pending.lock().remove(&id);
			return Err(CdpError::Closed);
		}

		match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
			Ok(Ok(Ok(result))) => Ok(result),
			Ok(Ok(Err(message))) => Err(CdpError::Protocol {
				method: method.to_string(),
				message,
			}),
			Ok(Err(_)) => Err(CdpError::Closed),
			Err(_) => {
				self.pending.lock().remove(&id);
				Err(CdpError::Timeout {
					method: method.to_string(),
				})
			}
		}
	}

	/// Evaluates `expression` in the page and returns its value.
	pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
		let reply = self
			.call(
				"Runtime.evaluate",
				json!({
					"expression": expression,
					"returnByValue": true,
					"awaitPromise": true,
				}),
			)
			.await?;
		evaluation_value(reply)
	}

	pub fn close(&self) {
		let _ = self.outbound.send(Message::Close(None));
	}
}

/// Unwraps a `Runtime.evaluate` reply into the returned value.
pub(crate) fn evaluation_value(reply: Value) -> Result<Value, CdpError> {
	if let Some(details) = reply.get("exceptionDetails") {
		let message = details
			.pointer("/exception/description")
			.or_else(|| details.get("text"))
			.and_then(Value::as_str)
			.unwrap_or("exception")
			.to_string();
		return Err(CdpError::Script(message));
	}
	Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
}
