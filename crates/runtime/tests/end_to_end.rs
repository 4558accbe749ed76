use std::sync::Arc;
use std::time::Duration;

use roundtable::testing::{FakeElement, ScriptedPage};
use roundtable::{SiteTable, TargetSite};
use roundtable_protocol::{Envelope, HostEvent, SiteId};
use roundtable_runtime::{ChannelOrigin, ControllerClient, Host, HostOptions, ManualClock, MemoryStore};
use tokio::sync::{broadcast, mpsc};

fn site(id: SiteId) -> TargetSite {
	let mut site = TargetSite::builtin(id);
	site.input = vec!["#input".into()];
	site.send = vec!["#send".into()];
	site.response = vec![".answer".into()];
	site.streaming = vec![".typing".into()];
	site
}

fn chat_page(answer: &str) -> ScriptedPage {
	let page = ScriptedPage::new();
	page.add(FakeElement::new("div").matching("#input").editable());
	page.add(FakeElement::new("button").matching("#send"));
	page.add(
		FakeElement::new("div")
			.matching(".answer")
			.text_at(Duration::from_secs(1), "Thinking")
			.text_at(Duration::from_secs(3), answer),
	);
	page.add(
		FakeElement::new("span")
			.matching(".typing")
			.present_between(Duration::from_secs(1), Duration::from_secs(3)),
	);
	page
}

fn start_host() -> Host {
	let sites = SiteTable::builtin()
		.with_overrides(vec![site(SiteId::Claude), site(SiteId::Gemini)])
		.unwrap();
	Host::start(HostOptions {
		sites,
		durable: Arc::new(MemoryStore::new()),
		session: Arc::new(MemoryStore::new()),
		clock: Arc::new(ManualClock::new(1_000)),
	})
}

/// Connects a controller to the host over an in-memory channel.
fn connect(host: &Host) -> Arc<ControllerClient> {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let client = Arc::new(ControllerClient::new(tx));
	let dispatcher = host.dispatcher();
	let peer = client.clone();
	tokio::spawn(async move {
		while let Some(envelope) = rx.recv().await {
			if let Envelope::Request(request) = envelope {
				let response = dispatcher.dispatch(request, ChannelOrigin::External).await;
				peer.handle_incoming(Envelope::Response(response));
			}
		}
	});
	client
}

async fn captured(events: &mut broadcast::Receiver<HostEvent>, count: usize) -> Vec<(SiteId, String)> {
	let mut found = Vec::new();
	while found.len() < count {
		if let HostEvent::ResponseCaptured { site, content } = events.recv().await.unwrap() {
			found.push((site, content));
		}
	}
	found.sort();
	found
}

#[tokio::test(start_paused = true)]
async fn test_message_reaches_two_sites_and_both_answers_are_captured() {
	let host = start_host();
	let mut events = host.router().subscribe();
	assert!(host.attach_page("tab-claude", "https://claude.ai/new", Arc::new(chat_page("Claude says hi"))));
	assert!(host.attach_page("tab-gemini", "https://gemini.google.com/app", Arc::new(chat_page("Gemini says hi"))));
	assert!(!host.attach_page("tab-other", "https://example.com", Arc::new(ScriptedPage::new())));

	let client = connect(&host);
	client.request_pair_code().await.unwrap();
	let code = host.pairing().current_code().unwrap();
	client.confirm_pairing(&code).await.unwrap();

	for site in [SiteId::Claude, SiteId::Gemini] {
		let outcome = client.send_message(site, "hello").await.unwrap();
		assert!(outcome.success, "{site}: {outcome:?}");
	}

	let answers = tokio::time::timeout(Duration::from_secs(60), captured(&mut events, 2))
		.await
		.unwrap();
	assert_eq!(
		answers,
		vec![
			(SiteId::Claude, "Claude says hi".to_string()),
			(SiteId::Gemini, "Gemini says hi".to_string()),
		]
	);

	let status = client.get_status().await.unwrap();
	assert_eq!(status.statuses[&SiteId::Claude], true);
	assert_eq!(status.statuses[&SiteId::Gemini], true);
	assert_eq!(status.statuses[&SiteId::Kimi], false);
	assert_eq!(status.tab_counts[&SiteId::Claude], 1);
	assert_eq!(status.tab_counts[&SiteId::Gemini], 1);

	assert_eq!(
		client.get_response(SiteId::Gemini).await.unwrap().as_deref(),
		Some("Gemini says hi")
	);
}

#[tokio::test(start_paused = true)]
async fn test_detached_site_is_reported_missing() {
	let host = start_host();
	let client = connect(&host);
	let token = client.auto_pair().await;
	assert!(token.is_err(), "external controllers cannot auto-pair");

	client.request_pair_code().await.unwrap();
	let code = host.pairing().current_code().unwrap();
	client.confirm_pairing(&code).await.unwrap();

	host.attach_page("tab-claude", "https://claude.ai/new", Arc::new(chat_page("unused")));
	host.detach_page("tab-claude");

	let outcome = client.send_message(SiteId::Claude, "hello").await.unwrap();
	assert!(!outcome.success);
	assert!(host.router().get_status().tab_counts.values().all(|count| *count == 0));
}
