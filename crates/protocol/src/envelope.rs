//! Controller channel envelope.
//!
//! Every message on a controller channel is one of three kinds:
//!
//! 1. [`Request`] (`kind: "REQ"`) sent by the controller, carrying a unique `id`,
//!    a [`RequestType`], an optional payload and, for external controllers, a token
//! 2. [`Response`] (`kind: "RES"`) sent by the host, echoing the request `id`;
//!    exactly one per request
//! 3. [`Event`] (`kind: "EVT"`) pushed by the host without correlation
//!
//! The raw [`Request`] keeps its payload as JSON so that unknown or malformed
//! payloads can still be answered with a correlated error. [`Command`] is the
//! typed view used by the host.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, WireError};
use crate::site::SiteId;

/// Any message travelling on a controller channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Envelope {
	#[serde(rename = "REQ")]
	Request(Request),
	#[serde(rename = "RES")]
	Response(Response),
	#[serde(rename = "EVT")]
	Event(Event),
}

impl Envelope {
	pub fn to_json(&self) -> String {
		// Envelope contains only strings, maps and JSON values.
		serde_json::to_string(self).unwrap_or_default()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
	SendMessage,
	GetResponse,
	GetStatus,
	NewConversation,
	GetPairCode,
	PairConfirm,
	AutoPair,
	/// A type this host does not handle; answered with `BAD_REQUEST`.
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: RequestType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<WireError>,
}

impl Response {
	pub fn ok<T: Serialize>(id: impl Into<String>, data: &T) -> Self {
		Self {
			id: id.into(),
			ok: true,
			data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
			error: None,
		}
	}

	pub fn err(id: impl Into<String>, error: WireError) -> Self {
		Self {
			id: id.into(),
			ok: false,
			data: None,
			error: Some(error),
		}
	}

	/// Splits into the data payload or the carried error.
	pub fn into_result(self) -> Result<Value, WireError> {
		if self.ok {
			Ok(self.data.unwrap_or(Value::Null))
		} else {
			Err(self
				.error
				.unwrap_or_else(|| WireError::new(ErrorCode::Internal, "failed without error detail")))
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
	TabStatusUpdate,
	ResponseCaptured,
	SendResult,
	NewConversationResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	#[serde(rename = "type")]
	pub kind: EventType,
	pub data: Value,
}

/// Typed controller command decoded from a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	SendMessage { site: SiteId, message: String },
	GetResponse { site: SiteId },
	GetStatus,
	NewConversation { sites: Vec<SiteId> },
	GetPairCode,
	PairConfirm { code: String },
	AutoPair,
}

#[derive(Serialize, Deserialize)]
struct SendPayload {
	site: SiteId,
	message: String,
}

#[derive(Serialize, Deserialize)]
struct SitePayload {
	site: SiteId,
}

#[derive(Serialize, Deserialize)]
struct SitesPayload {
	sites: Vec<SiteId>,
}

#[derive(Serialize, Deserialize)]
struct CodePayload {
	code: String,
}

impl Command {
	pub fn from_request(request: &Request) -> Result<Command, WireError> {
		Ok(match request.kind {
			RequestType::SendMessage => {
				let p: SendPayload = payload(request)?;
				Command::SendMessage {
					site: p.site,
					message: p.message,
				}
			}
			RequestType::GetResponse => {
				let p: SitePayload = payload(request)?;
				Command::GetResponse { site: p.site }
			}
			RequestType::GetStatus => Command::GetStatus,
			RequestType::NewConversation => {
				let p: SitesPayload = payload(request)?;
				Command::NewConversation { sites: p.sites }
			}
			RequestType::GetPairCode => Command::GetPairCode,
			RequestType::PairConfirm => {
				let p: CodePayload = payload(request)?;
				Command::PairConfirm { code: p.code }
			}
			RequestType::AutoPair => Command::AutoPair,
			RequestType::Unknown => {
				return Err(WireError::new(ErrorCode::BadRequest, "unknown request type"));
			}
		})
	}

	pub fn request_type(&self) -> RequestType {
		match self {
			Command::SendMessage { .. } => RequestType::SendMessage,
			Command::GetResponse { .. } => RequestType::GetResponse,
			Command::GetStatus => RequestType::GetStatus,
			Command::NewConversation { .. } => RequestType::NewConversation,
			Command::GetPairCode => RequestType::GetPairCode,
			Command::PairConfirm { .. } => RequestType::PairConfirm,
			Command::AutoPair => RequestType::AutoPair,
		}
	}

	/// Pairing commands are answered before any token check.
	pub fn is_pairing(&self) -> bool {
		matches!(self, Command::GetPairCode | Command::PairConfirm { .. } | Command::AutoPair)
	}

	pub fn into_request(self, id: impl Into<String>, token: Option<String>) -> Request {
		let kind = self.request_type();
		let payload = match self {
			Command::SendMessage { site, message } => serde_json::to_value(SendPayload { site, message }).ok(),
			Command::GetResponse { site } => serde_json::to_value(SitePayload { site }).ok(),
			Command::NewConversation { sites } => serde_json::to_value(SitesPayload { sites }).ok(),
			Command::PairConfirm { code } => serde_json::to_value(CodePayload { code }).ok(),
			Command::GetStatus | Command::GetPairCode | Command::AutoPair => None,
		};
		Request {
			id: id.into(),
			kind,
			payload,
			token,
		}
	}
}

fn payload<T: DeserializeOwned>(request: &Request) -> Result<T, WireError> {
	let value = request.payload.clone().unwrap_or(Value::Null);
	serde_json::from_value(value).map_err(|e| {
		WireError::new(
			ErrorCode::BadRequest,
			format!("invalid payload for {:?}: {e}", request.kind),
		)
	})
}

/// Result of a single delivery (`SEND_MESSAGE`, per-site new conversation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutcome {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<WireError>,
}

impl SiteOutcome {
	pub fn success() -> Self {
		Self {
			success: true,
			error: None,
		}
	}

	pub fn failure(error: WireError) -> Self {
		Self {
			success: false,
			error: Some(error),
		}
	}
}

/// `GET_RESPONSE` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
	pub content: Option<String>,
}

/// `GET_STATUS` data: reachability and tab count for every site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
	pub statuses: BTreeMap<SiteId, bool>,
	pub tab_counts: BTreeMap<SiteId, usize>,
}

/// `NEW_CONVERSATION` data; always carries one entry per requested site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversationReport {
	pub success: bool,
	pub results: BTreeMap<SiteId, SiteOutcome>,
}

/// `GET_PAIR_CODE` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCode {
	pub code: String,
}

/// `PAIR_CONFIRM` / `AUTO_PAIR` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairToken {
	pub token: String,
}

/// Typed view of the unsolicited events the host broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostEvent {
	TabStatusUpdate {
		site: SiteId,
		connected: bool,
	},
	ResponseCaptured {
		site: SiteId,
		content: String,
	},
	SendResult {
		site: SiteId,
		#[serde(flatten)]
		outcome: SiteOutcome,
	},
	NewConversationResults {
		results: BTreeMap<SiteId, SiteOutcome>,
	},
}

impl HostEvent {
	pub fn event_type(&self) -> EventType {
		match self {
			HostEvent::TabStatusUpdate { .. } => EventType::TabStatusUpdate,
			HostEvent::ResponseCaptured { .. } => EventType::ResponseCaptured,
			HostEvent::SendResult { .. } => EventType::SendResult,
			HostEvent::NewConversationResults { .. } => EventType::NewConversationResults,
		}
	}

	pub fn to_event(&self) -> Event {
		Event {
			kind: self.event_type(),
			data: serde_json::to_value(self).unwrap_or(Value::Null),
		}
	}

	/// Decodes an [`Event`] using its type tag, so that untagged payloads are unambiguous.
	pub fn from_event(event: &Event) -> Option<HostEvent> {
		#[derive(Deserialize)]
		struct Status {
			site: SiteId,
			connected: bool,
		}
		#[derive(Deserialize)]
		struct Captured {
			site: SiteId,
			content: String,
		}
		#[derive(Deserialize)]
		struct Sent {
			site: SiteId,
			#[serde(flatten)]
			outcome: SiteOutcome,
		}
		#[derive(Deserialize)]
		struct Results {
			results: BTreeMap<SiteId, SiteOutcome>,
		}

		let data = event.data.clone();
		match event.kind {
			EventType::TabStatusUpdate => serde_json::from_value::<Status>(data)
				.ok()
				.map(|s| HostEvent::TabStatusUpdate {
					site: s.site,
					connected: s.connected,
				}),
			EventType::ResponseCaptured => serde_json::from_value::<Captured>(data)
				.ok()
				.map(|c| HostEvent::ResponseCaptured {
					site: c.site,
					content: c.content,
				}),
			EventType::SendResult => serde_json::from_value::<Sent>(data)
				.ok()
				.map(|s| HostEvent::SendResult {
					site: s.site,
					outcome: s.outcome,
				}),
			EventType::NewConversationResults => serde_json::from_value::<Results>(data)
				.ok()
				.map(|r| HostEvent::NewConversationResults { results: r.results }),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_serializes_with_kind_and_type_tags() {
		let request = Command::SendMessage {
			site: SiteId::Claude,
			message: "hi".into(),
		}
		.into_request("r1", Some("tok".into()));
		let json = Envelope::Request(request).to_json();
		assert!(json.contains(r#""kind":"REQ""#));
		assert!(json.contains(r#""type":"SEND_MESSAGE""#));
		assert!(json.contains(r#""token":"tok""#));
	}

	#[test]
	fn parses_controller_request_without_payload() {
		let raw = r#"{"kind":"REQ","id":"7","type":"GET_STATUS"}"#;
		let Envelope::Request(request) = serde_json::from_str(raw).unwrap() else {
			panic!("expected request");
		};
		assert_eq!(request.id, "7");
		assert_eq!(Command::from_request(&request).unwrap(), Command::GetStatus);
	}

	#[test]
	fn malformed_payload_is_bad_request() {
		let request = Request {
			id: "x".into(),
			kind: RequestType::SendMessage,
			payload: Some(json!({"site": "claude"})),
			token: None,
		};
		let err = Command::from_request(&request).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadRequest);
	}

	#[test]
	fn unknown_request_type_still_parses() {
		let raw = r#"{"kind":"REQ","id":"u1","type":"GET_SOMETHING_ELSE"}"#;
		let Envelope::Request(request) = serde_json::from_str(raw).unwrap() else {
			panic!("expected request");
		};
		assert_eq!(request.kind, RequestType::Unknown);
		assert_eq!(Command::from_request(&request).unwrap_err().code, ErrorCode::BadRequest);
	}

	#[test]
	fn error_response_carries_code() {
		let response = Response::err("1", WireError::new(ErrorCode::Unauthorized, "Unauthorized"));
		let json = Envelope::Response(response.clone()).to_json();
		assert!(json.contains(r#""code":"UNAUTHORIZED""#));
		assert_eq!(response.into_result().unwrap_err().code, ErrorCode::Unauthorized);
	}

	#[test]
	fn status_report_uses_camel_case_counts() {
		let mut report = StatusReport::default();
		report.statuses.insert(SiteId::Kimi, true);
		report.tab_counts.insert(SiteId::Kimi, 2);
		let value = serde_json::to_value(&report).unwrap();
		assert_eq!(value["tabCounts"]["kimi"], 2);
		assert_eq!(value["statuses"]["kimi"], true);
	}

	#[test]
	fn send_result_event_decodes_by_type() {
		let event = HostEvent::SendResult {
			site: SiteId::Gemini,
			outcome: SiteOutcome::success(),
		}
		.to_event();
		assert_eq!(event.kind, EventType::SendResult);
		assert_eq!(event.data["success"], true);
		assert_eq!(
			HostEvent::from_event(&event),
			Some(HostEvent::SendResult {
				site: SiteId::Gemini,
				outcome: SiteOutcome::success(),
			})
		);
	}
}
