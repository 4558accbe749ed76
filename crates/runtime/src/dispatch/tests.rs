use std::time::Duration;

use async_trait::async_trait;
use roundtable_protocol::{AgentCommand, AgentReply, ErrorCode, RequestType, SiteId, StatusReport};
use serde_json::json;

use super::*;
use crate::cache::ResponseCache;
use crate::clock::ManualClock;
use crate::link::AgentLink;
use crate::pairing::TOKEN_TTL;
use crate::store::MemoryStore;

struct Echo;

#[async_trait]
impl AgentLink for Echo {
	async fn request(&self, command: AgentCommand, _timeout: Duration) -> Result<AgentReply> {
		Ok(match command {
			AgentCommand::Ping | AgentCommand::Heartbeat => AgentReply::Alive { site: SiteId::Claude },
			AgentCommand::GetLatestResponse => AgentReply::Content {
				content: Some("answer".into()),
			},
			_ => AgentReply::delivered(),
		})
	}
}

fn dispatcher() -> (Dispatcher, Arc<ManualClock>) {
	let clock = Arc::new(ManualClock::new(1_000));
	let router = Arc::new(Router::new(ResponseCache::new(Arc::new(MemoryStore::new()))));
	router.attach_tab("t1", "https://claude.ai/new", Arc::new(Echo));
	let pairing = Arc::new(PairingGate::load(Arc::new(MemoryStore::new()), clock.clone()));
	(Dispatcher::new(router, pairing), clock)
}

fn request(id: &str, kind: RequestType, payload: Option<serde_json::Value>, token: Option<&str>) -> Request {
	Request {
		id: id.into(),
		kind,
		payload,
		token: token.map(str::to_string),
	}
}

fn error_code(response: &Response) -> ErrorCode {
	assert!(!response.ok, "expected failure, got {response:?}");
	response.error.as_ref().unwrap().code
}

async fn pair(dispatcher: &Dispatcher) -> String {
	let issued = dispatcher
		.dispatch(request("c", RequestType::GetPairCode, None, None), ChannelOrigin::External)
		.await;
	let code = issued.data.unwrap()["code"].as_str().unwrap().to_string();
	let confirmed = dispatcher
		.dispatch(
			request("p", RequestType::PairConfirm, Some(json!({"code": code})), None),
			ChannelOrigin::External,
		)
		.await;
	confirmed.data.unwrap()["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_external_request_without_token_is_unauthorized() {
	let (dispatcher, _clock) = dispatcher();

	let response = dispatcher
		.dispatch(request("1", RequestType::GetStatus, None, None), ChannelOrigin::External)
		.await;

	assert_eq!(response.id, "1");
	assert_eq!(error_code(&response), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_internal_channel_skips_token_check() {
	let (dispatcher, _clock) = dispatcher();

	let response = dispatcher
		.dispatch(request("1", RequestType::GetStatus, None, None), ChannelOrigin::Internal)
		.await;

	assert!(response.ok);
	let status: StatusReport = serde_json::from_value(response.data.unwrap()).unwrap();
	assert!(status.statuses[&SiteId::Claude]);
	assert_eq!(status.tab_counts[&SiteId::Claude], 1);
}

#[tokio::test]
async fn test_paired_controller_can_send() {
	let (dispatcher, _clock) = dispatcher();
	let token = pair(&dispatcher).await;

	let response = dispatcher
		.dispatch(
			request(
				"2",
				RequestType::SendMessage,
				Some(json!({"site": "claude", "message": "hi"})),
				Some(&token),
			),
			ChannelOrigin::External,
		)
		.await;

	assert!(response.ok);
	assert_eq!(response.data.unwrap()["success"], true);
}

#[tokio::test]
async fn test_expired_token_is_reported() {
	let (dispatcher, clock) = dispatcher();
	let token = pair(&dispatcher).await;
	clock.advance(TOKEN_TTL + Duration::from_millis(1));

	let response = dispatcher
		.dispatch(
			request("3", RequestType::GetStatus, None, Some(&token)),
			ChannelOrigin::External,
		)
		.await;

	assert_eq!(error_code(&response), ErrorCode::TokenExpired);
}

#[tokio::test]
async fn test_auto_pair_is_internal_only() {
	let (dispatcher, _clock) = dispatcher();

	let refused = dispatcher
		.dispatch(request("1", RequestType::AutoPair, None, None), ChannelOrigin::External)
		.await;
	assert_eq!(error_code(&refused), ErrorCode::Unauthorized);
	assert!(dispatcher.pairing().state().token.is_none());

	let granted = dispatcher
		.dispatch(request("2", RequestType::AutoPair, None, None), ChannelOrigin::Internal)
		.await;
	let token = granted.data.unwrap()["token"].as_str().unwrap().to_string();
	assert!(dispatcher.pairing().authorize(Some(&token)).is_ok());
}

#[tokio::test]
async fn test_send_failure_is_reported_per_site() {
	let (dispatcher, _clock) = dispatcher();

	let response = dispatcher
		.dispatch(
			request(
				"4",
				RequestType::SendMessage,
				Some(json!({"site": "kimi", "message": "hi"})),
				None,
			),
			ChannelOrigin::Internal,
		)
		.await;

	assert!(response.ok);
	let data = response.data.unwrap();
	assert_eq!(data["success"], false);
	assert_eq!(data["error"]["code"], "NO_TAB_FOUND");
}

#[tokio::test]
async fn test_bad_payload_is_answered_with_same_id() {
	let (dispatcher, _clock) = dispatcher();

	let response = dispatcher
		.dispatch(
			request("5", RequestType::SendMessage, Some(json!({"site": "bard"})), None),
			ChannelOrigin::Internal,
		)
		.await;

	assert_eq!(response.id, "5");
	assert_eq!(error_code(&response), ErrorCode::BadRequest);
}

#[tokio::test]
async fn test_get_response_and_new_conversation() {
	let (dispatcher, _clock) = dispatcher();

	let response = dispatcher
		.dispatch(
			request("6", RequestType::GetResponse, Some(json!({"site": "claude"})), None),
			ChannelOrigin::Internal,
		)
		.await;
	assert_eq!(response.data.unwrap()["content"], "answer");

	let response = dispatcher
		.dispatch(
			request(
				"7",
				RequestType::NewConversation,
				Some(json!({"sites": ["claude", "gemini"]})),
				None,
			),
			ChannelOrigin::Internal,
		)
		.await;
	let data = response.data.unwrap();
	assert_eq!(data["success"], true);
	assert_eq!(data["results"]["claude"]["success"], true);
	assert_eq!(data["results"]["gemini"]["success"], false);
}

#[tokio::test]
async fn test_dispatch_text_ignores_non_requests() {
	let (dispatcher, _clock) = dispatcher();

	assert!(
		dispatcher
			.dispatch_text(r#"{"kind":"EVT","type":"SEND_RESULT","data":{}}"#, ChannelOrigin::Internal)
			.await
			.is_none()
	);
	assert!(dispatcher.dispatch_text("not json", ChannelOrigin::Internal).await.is_none());

	let response = dispatcher
		.dispatch_text(r#"{"kind":"REQ","id":"9","type":"GET_STATUS"}"#, ChannelOrigin::Internal)
		.await
		.unwrap();
	assert!(response.ok);
	assert_eq!(response.id, "9");
}

#[tokio::test]
async fn test_unrecognized_request_is_still_answered() {
	let (dispatcher, _clock) = dispatcher();

	let unknown = dispatcher
		.dispatch_text(r#"{"kind":"REQ","id":"u1","type":"GET_SOMETHING_ELSE"}"#, ChannelOrigin::External)
		.await
		.unwrap();
	assert_eq!(unknown.id, "u1");
	assert_eq!(error_code(&unknown), ErrorCode::BadRequest);

	let no_type = dispatcher
		.dispatch_text(r#"{"kind":"REQ","id":"u2","payload":7}"#, ChannelOrigin::Internal)
		.await
		.unwrap();
	assert_eq!(no_type.id, "u2");
	assert_eq!(error_code(&no_type), ErrorCode::BadRequest);

	assert!(
		dispatcher
			.dispatch_text(r#"{"kind":"REQ","type":"GET_STATUS","id":3}"#, ChannelOrigin::Internal)
			.await
			.is_none()
	);
}
