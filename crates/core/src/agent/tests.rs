use std::time::Duration;

use roundtable_protocol::ErrorCode;

use super::*;
use crate::testing::{FakeElement, ScriptedPage};

fn site() -> TargetSite {
	let mut site = TargetSite::builtin(SiteId::Claude);
	site.input = vec!["#input".into()];
	site.send = vec!["#send".into()];
	site.response = vec![".answer".into()];
	site.streaming = vec![".typing".into()];
	site
}

fn chat_page() -> ScriptedPage {
	let page = ScriptedPage::new();
	page.add(FakeElement::new("div").matching("#input").editable());
	page.add(FakeElement::new("button").matching("#send"));
	page
}

fn attach(page: &ScriptedPage) -> (Agent, mpsc::UnboundedReceiver<AgentNotice>) {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let agent = Agent::attach(Arc::new(page.clone()), site(), tx);
	assert_eq!(rx.try_recv().unwrap(), AgentNotice::Ready { site: SiteId::Claude });
	(agent, rx)
}

#[tokio::test(start_paused = true)]
async fn ping_reports_site_and_records_time() {
	let page = chat_page();
	let (agent, _rx) = attach(&page);

	assert_eq!(agent.handle(AgentCommand::Ping).await, AgentReply::Alive { site: SiteId::Claude });
	assert!(agent.session().lock().last_ping().is_some());
}

#[tokio::test(start_paused = true)]
async fn injection_arms_capture_and_reports_response() {
	let page = chat_page();
	page.add(
		FakeElement::new("div")
			.matching(".answer")
			.text_at(Duration::from_secs(1), "Working")
			.text_at(Duration::from_secs(2), "Final answer"),
	);
	let (agent, mut rx) = attach(&page);

	let reply = agent.handle(AgentCommand::InjectMessage { message: "question".into() }).await;
	assert_eq!(reply, AgentReply::delivered());
	assert!(agent.session().lock().capture_in_progress());

	let Some(AgentNotice::ResponseCaptured(captured)) = rx.recv().await else {
		panic!("expected a captured response");
	};
	assert_eq!(captured.site, SiteId::Claude);
	assert_eq!(captured.content, "Final answer");
	assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_injection_reports_code_and_arms_nothing() {
	let page = ScriptedPage::new();
	let (agent, _rx) = attach(&page);

	let reply = agent.handle(AgentCommand::InjectMessage { message: "question".into() }).await;

	let AgentReply::Delivery { success, error } = reply else {
		panic!("expected delivery reply");
	};
	assert!(!success);
	assert_eq!(error.unwrap().code, ErrorCode::InputNotFound);
	assert!(!agent.session().lock().capture_in_progress());
}

#[tokio::test(start_paused = true)]
async fn new_conversation_navigates_and_ends_session() {
	let page = chat_page();
	let (agent, mut rx) = attach(&page);
	let start = Instant::now();

	let reply = agent.handle(AgentCommand::NewConversation).await;

	assert_eq!(reply, AgentReply::delivered());
	assert!(start.elapsed() >= NEW_CONVERSATION_DELAY);
	assert_eq!(page.navigations(), vec!["https://claude.ai/new".to_string()]);
	assert!(!agent.is_alive());
	assert_eq!(rx.recv().await, Some(AgentNotice::Gone { site: SiteId::Claude }));
}

#[tokio::test(start_paused = true)]
async fn latest_response_falls_back_to_last_capture() {
	let page = chat_page();
	let (agent, _rx) = attach(&page);
	assert_eq!(agent.latest_response().await, None);

	agent.session().lock().accept_capture("remembered", Instant::now());
	assert_eq!(agent.latest_response().await.as_deref(), Some("remembered"));

	page.add(FakeElement::new("div").matching(".answer").text_at(Duration::ZERO, "on page"));
	assert_eq!(
		agent.handle(AgentCommand::GetLatestResponse).await,
		AgentReply::Content {
			content: Some("on page".into())
		}
	);
}

#[tokio::test(start_paused = true)]
async fn mutation_bursts_coalesce_into_one_capture() {
	let page = chat_page();
	page.add(FakeElement::new("div").matching(".answer").text_at(Duration::ZERO, "Done"));
	let (agent, mut rx) = attach(&page);
	let (_request_tx, request_rx) = mpsc::channel(8);
	let (trigger_tx, trigger_rx) = mpsc::channel(8);
	let session = agent.session();
	tokio::spawn(agent.run(request_rx, trigger_rx));

	for _ in 0..3 {
		trigger_tx.send(()).await.unwrap();
	}

	let notice = rx.recv().await.unwrap();
	assert!(matches!(notice, AgentNotice::ResponseCaptured(ref c) if c.content == "Done"));
	tokio::time::sleep(Duration::from_secs(30)).await;
	assert!(rx.try_recv().is_err());
	assert_eq!(session.lock().last_captured(), Some("Done"));
}

#[tokio::test(start_paused = true)]
async fn run_answers_requests_and_stops_when_host_leaves() {
	let page = chat_page();
	let (agent, _rx) = attach(&page);
	let (request_tx, request_rx) = mpsc::channel(8);
	let (_trigger_tx, trigger_rx) = mpsc::channel(8);
	let task = tokio::spawn(agent.run(request_rx, trigger_rx));

	let (reply_tx, reply_rx) = oneshot::channel();
	request_tx
		.send(AgentRequest {
			command: AgentCommand::Heartbeat,
			reply: reply_tx,
		})
		.await
		.unwrap();
	assert_eq!(reply_rx.await.unwrap(), AgentReply::Alive { site: SiteId::Claude });

	drop(request_tx);
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn closed_page_finishes_agent() {
	let page = chat_page();
	page.add(FakeElement::new("span").matching(".typing"));
	let (agent, mut rx) = attach(&page);

	assert!(agent.arm_capture());
	page.close();

	assert_eq!(rx.recv().await, Some(AgentNotice::Gone { site: SiteId::Claude }));
	assert!(!agent.is_alive());
}
