use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use roundtable_protocol::CapturedResponse;
use tokio::time::Instant;

use super::*;
use crate::store::MemoryStore;

type Handler = dyn Fn(&AgentCommand) -> Result<AgentReply> + Send + Sync;

/// Link whose replies come from a closure; records every command it sees.
struct FakeLink {
	handler: Box<Handler>,
	seen: Mutex<Vec<(AgentCommand, Instant)>>,
}

impl FakeLink {
	fn new(handler: impl Fn(&AgentCommand) -> Result<AgentReply> + Send + Sync + 'static) -> Arc<Self> {
		Arc::new(Self {
			handler: Box::new(handler),
			seen: Mutex::new(Vec::new()),
		})
	}

	fn responsive(site: SiteId) -> Arc<Self> {
		Self::new(move |command| Ok(answer(site, command)))
	}

	fn commands(&self) -> Vec<AgentCommand> {
		self.seen.lock().iter().map(|(c, _)| c.clone()).collect()
	}

	fn inject_times(&self) -> Vec<Instant> {
		self.seen
			.lock()
			.iter()
			.filter(|(c, _)| matches!(c, AgentCommand::InjectMessage { .. }))
			.map(|(_, at)| *at)
			.collect()
	}
}

#[async_trait]
impl AgentLink for FakeLink {
	async fn request(&self, command: AgentCommand, _timeout: Duration) -> Result<AgentReply> {
		self.seen.lock().push((command.clone(), Instant::now()));
		(self.handler)(&command)
	}
}

fn answer(site: SiteId, command: &AgentCommand) -> AgentReply {
	match command {
		AgentCommand::Ping | AgentCommand::Heartbeat => AgentReply::Alive { site },
		AgentCommand::GetLatestResponse => AgentReply::Content {
			content: Some("on page".into()),
		},
		AgentCommand::InjectMessage { .. } | AgentCommand::NewConversation => AgentReply::delivered(),
	}
}

fn silent_ping(site: SiteId) -> Arc<FakeLink> {
	FakeLink::new(move |command| match command {
		AgentCommand::Ping | AgentCommand::Heartbeat => Err(Error::TransientUnreachable("no receiver".into())),
		other => Ok(answer(site, other)),
	})
}

struct FakeSpawner {
	link: Option<Arc<FakeLink>>,
	calls: AtomicUsize,
}

#[async_trait]
impl AgentSpawner for FakeSpawner {
	async fn reinject(&self, _tab: &TabId, site: SiteId) -> Result<Arc<dyn AgentLink>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &self.link {
			Some(link) => Ok(link.clone()),
			None => Err(Error::Unresponsive { site }),
		}
	}
}

fn router() -> Router {
	Router::new(ResponseCache::new(Arc::new(MemoryStore::new())))
}

fn drain(rx: &mut broadcast::Receiver<HostEvent>) -> Vec<HostEvent> {
	let mut events = Vec::new();
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	events
}

#[test]
fn test_retry_delay_doubles_up_to_cap() {
	assert_eq!(retry_delay(0), Duration::from_secs(1));
	assert_eq!(retry_delay(1), Duration::from_secs(2));
	assert_eq!(retry_delay(2), Duration::from_secs(3));
	assert_eq!(retry_delay(3), Duration::from_secs(3));
	assert_eq!(retry_delay(40), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_send_without_tab_fails_fast() {
	let router = router();
	let mut events = router.subscribe();
	let start = Instant::now();

	let err = router.send_message(SiteId::Claude, "hi").await.unwrap_err();

	assert!(matches!(err, Error::NoTabFound { site: SiteId::Claude }));
	assert_eq!(start.elapsed(), Duration::ZERO);
	let Ok([HostEvent::SendResult { site, outcome }]) = <[HostEvent; 1]>::try_from(drain(&mut events)) else {
		panic!("expected a single SEND_RESULT");
	};
	assert_eq!(site, SiteId::Claude);
	assert_eq!(outcome.error.unwrap().code, ErrorCode::NoTabFound);
}

#[tokio::test(start_paused = true)]
async fn test_send_delivers_and_reports_success() {
	let router = router();
	let link = FakeLink::responsive(SiteId::Gemini);
	router.attach_tab("t1", "https://gemini.google.com/app", link.clone());
	let mut events = router.subscribe();

	router.send_message(SiteId::Gemini, "hello").await.unwrap();

	assert_eq!(
		link.commands(),
		vec![
			AgentCommand::Ping,
			AgentCommand::InjectMessage {
				message: "hello".into()
			}
		]
	);
	assert_eq!(router.liveness("t1"), Some(Liveness::Alive));
	assert_eq!(
		drain(&mut events),
		vec![HostEvent::SendResult {
			site: SiteId::Gemini,
			outcome: SiteOutcome::success()
		}]
	);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_backoff() {
	let router = router();
	let failures = Arc::new(AtomicUsize::new(0));
	let counter = failures.clone();
	let link = FakeLink::new(move |command| match command {
		AgentCommand::InjectMessage { .. } if counter.fetch_add(1, Ordering::SeqCst) < 2 => {
			Err(Error::TransientUnreachable("receiving end does not exist".into()))
		}
		other => Ok(answer(SiteId::Deepseek, other)),
	});
	router.attach_tab("t1", "https://chat.deepseek.com/", link.clone());
	let start = Instant::now();

	router.send_message(SiteId::Deepseek, "hello").await.unwrap();

	assert_eq!(start.elapsed(), Duration::from_secs(3));
	let times = link.inject_times();
	assert_eq!(times.len(), 3);
	assert_eq!(times[1] - times[0], Duration::from_secs(1));
	assert_eq!(times[2] - times[1], Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
	let router = router();
	let link = FakeLink::new(|command| match command {
		AgentCommand::InjectMessage { .. } => Err(Error::TransientUnreachable("gone".into())),
		other => Ok(answer(SiteId::Kimi, other)),
	});
	router.attach_tab("t1", "https://www.kimi.com/", link.clone());
	let start = Instant::now();

	let err = router.send_message(SiteId::Kimi, "hello").await.unwrap_err();

	assert!(err.is_transient());
	assert_eq!(link.inject_times().len(), 1 + MAX_RETRIES as usize);
	assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 3 + 3));
}

#[tokio::test(start_paused = true)]
async fn test_agent_failures_are_surfaced_without_retry() {
	let router = router();
	let link = FakeLink::new(|command| match command {
		AgentCommand::InjectMessage { .. } => Ok(AgentReply::failed(WireError::new(
			ErrorCode::InputNotFound,
			"no input",
		))),
		other => Ok(answer(SiteId::Claude, other)),
	});
	router.attach_tab("t1", "https://claude.ai/new", link.clone());

	let err = router.send_message(SiteId::Claude, "hello").await.unwrap_err();

	assert_eq!(err.code(), ErrorCode::InputNotFound);
	assert_eq!(link.inject_times().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dead_agent_is_reinjected() {
	let fresh = FakeLink::responsive(SiteId::Chatgpt);
	let spawner = Arc::new(FakeSpawner {
		link: Some(fresh.clone()),
		calls: AtomicUsize::new(0),
	});
	let router = router().with_spawner(spawner.clone());
	let stale = silent_ping(SiteId::Chatgpt);
	router.attach_tab("t1", "https://chatgpt.com/", stale.clone());

	router.send_message(SiteId::Chatgpt, "hello").await.unwrap();

	assert_eq!(spawner.calls.load(Ordering::SeqCst), 1);
	assert_eq!(stale.inject_times().len(), 0);
	assert_eq!(fresh.inject_times().len(), 1);
	assert_eq!(router.liveness("t1"), Some(Liveness::Reinjected));
}

#[tokio::test(start_paused = true)]
async fn test_silent_agent_with_cached_response_is_left_alone() {
	let spawner = Arc::new(FakeSpawner {
		link: None,
		calls: AtomicUsize::new(0),
	});
	let router = router().with_spawner(spawner.clone());
	let link = silent_ping(SiteId::Doubao);
	router.attach_tab("t1", "https://www.doubao.com/chat/", link.clone());
	router.cache().record(SiteId::Doubao, "earlier answer");

	router.send_message(SiteId::Doubao, "hello").await.unwrap();

	assert_eq!(spawner.calls.load(Ordering::SeqCst), 0);
	assert_eq!(link.inject_times().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_agent_fails_without_retry() {
	let spawner = Arc::new(FakeSpawner {
		link: None,
		calls: AtomicUsize::new(0),
	});
	let router = router().with_spawner(spawner.clone());
	router.attach_tab("t1", "https://chatglm.cn/", silent_ping(SiteId::Chatglm));

	let err = router.send_message(SiteId::Chatglm, "hello").await.unwrap_err();

	assert!(matches!(err, Error::Unresponsive { site: SiteId::Chatglm }));
	assert_eq!(spawner.calls.load(Ordering::SeqCst), 1);
	assert_eq!(router.liveness("t1"), Some(Liveness::Dead));
}

#[tokio::test(start_paused = true)]
async fn test_get_response_prefers_live_agent() {
	let router = router();
	router.cache().record(SiteId::Claude, "cached");
	router.attach_tab("t1", "https://claude.ai/", FakeLink::responsive(SiteId::Claude));

	assert_eq!(router.get_response(SiteId::Claude).await.as_deref(), Some("on page"));
}

#[tokio::test(start_paused = true)]
async fn test_get_response_after_disconnect_uses_cache() {
	let router = router();
	router.attach_tab("t1", "https://claude.ai/", FakeLink::responsive(SiteId::Claude));
	router.observe_notice(
		"t1",
		AgentNotice::ResponseCaptured(CapturedResponse {
			site: SiteId::Claude,
			content: "final answer".into(),
			captured_at_ms: 1,
		}),
	);
	router.detach_tab("t1");

	assert_eq!(router.get_response(SiteId::Claude).await.as_deref(), Some("final answer"));
	assert_eq!(router.get_response(SiteId::Gemini).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_get_response_falls_back_when_agent_fails() {
	let router = router();
	router.cache().record(SiteId::Kimi, "cached");
	router.attach_tab(
		"t1",
		"https://kimi.com/",
		FakeLink::new(|_| Err(Error::TransientUnreachable("gone".into()))),
	);

	assert_eq!(router.get_response(SiteId::Kimi).await.as_deref(), Some("cached"));
}

#[tokio::test(start_paused = true)]
async fn test_new_conversation_reports_every_site() {
	let router = router();
	let link = FakeLink::responsive(SiteId::Claude);
	router.attach_tab("t1", "https://claude.ai/chat/1", link.clone());
	let mut events = router.subscribe();
	let start = Instant::now();

	let report = router.new_conversation(&[SiteId::Claude, SiteId::Kimi]).await;

	assert!(report.success);
	assert!(report.results[&SiteId::Claude].success);
	assert_eq!(
		report.results[&SiteId::Kimi].error.as_ref().unwrap().code,
		ErrorCode::NoTabFound
	);
	assert!(start.elapsed() >= NEW_CONVERSATION_PAUSE);
	assert_eq!(
		link.commands(),
		vec![AgentCommand::GetLatestResponse, AgentCommand::NewConversation]
	);
	assert_eq!(
		drain(&mut events),
		vec![
			HostEvent::ResponseCaptured {
				site: SiteId::Claude,
				content: "on page".into()
			},
			HostEvent::NewConversationResults {
				results: report.results.clone()
			},
		]
	);
	assert_eq!(router.cache().get(SiteId::Claude).as_deref(), Some("on page"));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_pings_only_active_tabs() {
	let router = router();
	let background = FakeLink::responsive(SiteId::Claude);
	let foreground = FakeLink::responsive(SiteId::Gemini);
	router.attach_tab("bg", "https://claude.ai/", background.clone());
	router.attach_tab("fg", "https://gemini.google.com/", foreground.clone());
	router.set_active("fg", true);

	assert_eq!(router.heartbeat_once().await, 1);

	assert!(background.commands().is_empty());
	assert_eq!(foreground.commands(), vec![AgentCommand::Heartbeat]);
	assert_eq!(router.liveness("fg"), Some(Liveness::Alive));
	assert_eq!(router.liveness("bg"), Some(Liveness::Unknown));
}

#[tokio::test(start_paused = true)]
async fn test_run_heartbeat_ticks_on_interval() {
	let router = Arc::new(router());
	let link = FakeLink::responsive(SiteId::Claude);
	router.attach_tab("t1", "https://claude.ai/", link.clone());
	router.set_active("t1", true);

	let task = tokio::spawn(router.clone().run_heartbeat(HEARTBEAT_INTERVAL));
	tokio::time::sleep(HEARTBEAT_INTERVAL * 2 + Duration::from_millis(1)).await;
	task.abort();

	assert_eq!(link.commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ready_notice_connects_site() {
	let router = router();
	router.attach_tab("t1", "https://chatglm.cn/", FakeLink::responsive(SiteId::Chatglm));
	let mut events = router.subscribe();

	router.observe_notice("t1", AgentNotice::Ready { site: SiteId::Chatglm });

	assert_eq!(router.liveness("t1"), Some(Liveness::Alive));
	assert_eq!(
		drain(&mut events),
		vec![HostEvent::TabStatusUpdate {
			site: SiteId::Chatglm,
			connected: true
		}]
	);

	router.observe_notice("t1", AgentNotice::Gone { site: SiteId::Chatglm });
	assert_eq!(router.liveness("t1"), Some(Liveness::Dead));

	router.detach_tab("t1");
	assert_eq!(
		drain(&mut events),
		vec![HostEvent::TabStatusUpdate {
			site: SiteId::Chatglm,
			connected: false
		}]
	);
}

#[tokio::test(start_paused = true)]
async fn test_pump_forwards_agent_notices() {
	let router = Arc::new(router());
	router.attach_tab("t1", "https://claude.ai/", FakeLink::responsive(SiteId::Claude));
	let mut events = router.subscribe();
	let (tx, rx) = mpsc::unbounded_channel();
	let task = tokio::spawn(router.clone().pump_notices(rx));

	tx.send((
		"t1".to_string(),
		AgentNotice::ResponseCaptured(CapturedResponse {
			site: SiteId::Claude,
			content: "pumped".into(),
			captured_at_ms: 7,
		}),
	))
	.unwrap();
	drop(tx);
	task.await.unwrap();

	assert_eq!(
		events.recv().await.unwrap(),
		HostEvent::ResponseCaptured {
			site: SiteId::Claude,
			content: "pumped".into()
		}
	);
}

#[test]
fn test_status_reflects_attached_tabs() {
	let router = router();
	router.attach_tab("t1", "https://claude.ai/", FakeLink::responsive(SiteId::Claude));
	assert!(!router.attach_tab("t2", "https://example.org/", FakeLink::responsive(SiteId::Claude)));

	let status = router.get_status();
	assert!(status.statuses[&SiteId::Claude]);
	assert_eq!(status.tab_counts[&SiteId::Claude], 1);
	assert!(!status.statuses[&SiteId::Gemini]);
}
