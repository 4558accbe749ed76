//! Per-site configuration tables.
//!
//! A [`TargetSite`] is pure data: the lookup chains, streaming markers and
//! timing the shared engine needs to drive one chat site. The built-in tables
//! follow the live sites as of writing and can be replaced wholesale from a
//! JSON file when a site redesign breaks them.

use std::collections::BTreeMap;
use std::time::Duration;

use roundtable_protocol::SiteId;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::page::{DomEvent, Lookup};

/// How the message is written into the input element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
	/// `value` for text fields, `textContent` for contenteditable widgets.
	#[default]
	Auto,
	/// A single escaped `<p>` as `innerHTML` (ProseMirror editors).
	Paragraph,
}

/// How the filled message is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitMode {
	/// Click the send control; fail when none is found.
	#[default]
	Click,
	/// Click the send control, or press Enter in the input when none is found.
	ClickOrEnter,
	/// Always press Enter in the input.
	EnterKey,
}

/// Duplicate suppression applied before a capture is emitted.
///
/// Exact repeats of the last emitted content are always suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupPolicy {
	/// Also compare a rolling hash of the content.
	pub hash: bool,
	/// Minimum time between two emissions, in milliseconds.
	pub cooldown_ms: u64,
}

impl DedupPolicy {
	pub fn cooldown(&self) -> Duration {
		Duration::from_millis(self.cooldown_ms)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
	/// Wait after filling the input before looking for the send control.
	pub settle_ms: u64,
	/// Interval between capture polls.
	pub poll_ms: u64,
	/// Consecutive identical non-streaming polls before content is final.
	pub stable_threshold: u32,
	/// Pause between synthetic trigger events.
	#[serde(default)]
	pub trigger_gap_ms: u64,
}

impl Timing {
	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	pub fn poll(&self) -> Duration {
		Duration::from_millis(self.poll_ms)
	}

	pub fn trigger_gap(&self) -> Duration {
		Duration::from_millis(self.trigger_gap_ms)
	}
}

/// Immutable description of one chat site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSite {
	pub id: SiteId,
	/// Navigated to for a fresh conversation.
	pub new_chat_url: String,
	/// Input lookups in priority order.
	pub input: Vec<String>,
	/// Send-control lookups in priority order.
	#[serde(default)]
	pub send: Vec<String>,
	/// Selectors scanned for a visible control with an icon when no send lookup matches.
	#[serde(default = "default_send_scan")]
	pub send_scan: Vec<String>,
	/// Scanned controls must end within this many pixels of the viewport bottom.
	#[serde(default = "default_scan_margin")]
	pub scan_bottom_margin: Option<f64>,
	/// Response container lookups; the longest rendering wins.
	pub response: Vec<String>,
	/// Any match means the reply is still being generated.
	#[serde(default)]
	pub streaming: Vec<String>,
	/// Mutations under these selectors arm a capture.
	#[serde(default)]
	pub observe: Vec<String>,
	/// Removed from response snapshots before rendering.
	#[serde(default)]
	pub strip: Vec<String>,
	#[serde(default)]
	pub fill: FillMode,
	#[serde(default)]
	pub submit: SubmitMode,
	#[serde(default = "DomEvent::full_click")]
	pub trigger_events: Vec<DomEvent>,
	pub timing: Timing,
	#[serde(default)]
	pub dedup: DedupPolicy,
	/// Renderings shorter than this are ignored.
	#[serde(default = "default_min_len")]
	pub min_len: usize,
}

fn default_send_scan() -> Vec<String> {
	vec!["button".to_string()]
}

fn default_scan_margin() -> Option<f64> {
	Some(200.0)
}

fn default_min_len() -> usize {
	1
}

fn strings(items: &[&str]) -> Vec<String> {
	items.iter().map(|s| (*s).to_string()).collect()
}

impl TargetSite {
	pub fn input_lookups(&self) -> Vec<Lookup> {
		self.input.iter().map(|s| Lookup::parse(s)).collect()
	}

	pub fn send_lookups(&self) -> Vec<Lookup> {
		self.send.iter().map(|s| Lookup::parse(s)).collect()
	}

	pub fn response_lookups(&self) -> Vec<Lookup> {
		self.response.iter().map(|s| Lookup::parse(s)).collect()
	}

	pub fn validate(&self) -> Result<()> {
		if self.input.is_empty() {
			return Err(Error::InvalidSiteTable(format!("{}: no input lookups", self.id)));
		}
		if self.response.is_empty() {
			return Err(Error::InvalidSiteTable(format!("{}: no response lookups", self.id)));
		}
		if self.timing.poll_ms == 0 || self.timing.stable_threshold == 0 {
			return Err(Error::InvalidSiteTable(format!(
				"{}: poll interval and stability threshold must be positive",
				self.id
			)));
		}
		Ok(())
	}

	/// Built-in table for `id`.
	pub fn builtin(id: SiteId) -> TargetSite {
		match id {
			SiteId::Claude => claude(),
			SiteId::Chatgpt => chatgpt(),
			SiteId::Gemini => gemini(),
			SiteId::Deepseek => deepseek(),
			SiteId::Kimi => kimi(),
			SiteId::Doubao => doubao(),
			SiteId::Chatglm => chatglm(),
		}
	}
}

/// Configuration for every supported site.
#[derive(Debug, Clone)]
pub struct SiteTable {
	sites: BTreeMap<SiteId, TargetSite>,
}

impl Default for SiteTable {
	fn default() -> Self {
		Self::builtin()
	}
}

impl SiteTable {
	pub fn builtin() -> Self {
		Self {
			sites: SiteId::ALL.into_iter().map(|id| (id, TargetSite::builtin(id))).collect(),
		}
	}

	/// Replaces built-in entries with the ones in `overrides`, keyed by site id.
	pub fn with_overrides(mut self, overrides: Vec<TargetSite>) -> Result<Self> {
		for site in overrides {
			site.validate()?;
			self.sites.insert(site.id, site);
		}
		Ok(self)
	}

	/// Parses a JSON array of [`TargetSite`] overrides.
	pub fn from_json(json: &str) -> Result<Self> {
		let overrides: Vec<TargetSite> = serde_json::from_str(json)?;
		Self::builtin().with_overrides(overrides)
	}

	pub fn get(&self, id: SiteId) -> &TargetSite {
		// Every id is present: built from SiteId::ALL and only ever overwritten.
		&self.sites[&id]
	}

	pub fn iter(&self) -> impl Iterator<Item = &TargetSite> {
		self.sites.values()
	}
}

fn claude() -> TargetSite {
	TargetSite {
		id: SiteId::Claude,
		new_chat_url: "https://claude.ai/new".into(),
		input: strings(&[
			r#"div[contenteditable="true"].ProseMirror"#,
			r#"div.ProseMirror[contenteditable="true"]"#,
			r#"[data-placeholder="How can Claude help you today?"]"#,
			r#"fieldset div[contenteditable="true"]"#,
		]),
		send: strings(&[
			r#"button[aria-label="Send message"]"#,
			r#"button[aria-label="Send Message"]"#,
			r#"button[type="submit"]"#,
			"fieldset button:last-of-type",
			"button svg[viewBox] >> closest(button)",
		]),
		send_scan: default_send_scan(),
		scan_bottom_margin: default_scan_margin(),
		response: strings(&[
			r#"[data-is-streaming="false"] .standard-markdown:not([class*="overflow-hidden"][class*="max-h-"] .standard-markdown)"#,
			r#"[data-is-streaming="false"] .standard-markdown"#,
		]),
		streaming: strings(&[r#"[data-is-streaming="true"]"#, r#"button[aria-label*="Stop"]"#]),
		observe: strings(&["[data-is-streaming]", ".font-claude-message"]),
		strip: Vec::new(),
		fill: FillMode::Paragraph,
		submit: SubmitMode::Click,
		trigger_events: vec![DomEvent::Click],
		timing: Timing {
			settle_ms: 100,
			poll_ms: 500,
			stable_threshold: 4,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy::default(),
		min_len: 1,
	}
}

fn chatgpt() -> TargetSite {
	TargetSite {
		id: SiteId::Chatgpt,
		new_chat_url: "https://chatgpt.com/".into(),
		input: strings(&[
			"#prompt-textarea",
			r#"textarea[data-id="root"]"#,
			r#"div[contenteditable="true"][data-placeholder]"#,
			r#"textarea[placeholder*="Message"]"#,
			"textarea",
		]),
		send: strings(&[
			r#"button[data-testid="send-button"]"#,
			r#"button[aria-label="Send prompt"]"#,
			r#"button[aria-label="Send message"]"#,
			r#"form button[type="submit"]"#,
			r#"button svg path[d*="M15.192"] >> closest(button)"#,
		]),
		send_scan: strings(&["form button"]),
		scan_bottom_margin: None,
		response: strings(&[
			r#"[data-message-author-role="assistant"] .markdown"#,
			r#"[data-message-author-role="assistant"] [class*="markdown"]"#,
			r#"[data-message-author-role="assistant"]"#,
			".agent-turn .markdown",
			r#"[class*="agent-turn"] .markdown"#,
			r#"[data-testid*="conversation-turn"] .markdown"#,
			r#"article[data-testid*="conversation"] .markdown"#,
		]),
		streaming: Vec::new(),
		observe: strings(&[r#"[data-message-author-role="assistant"]"#, ".agent-turn", r#"[class*="assistant"]"#]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::ClickOrEnter,
		trigger_events: vec![DomEvent::Click],
		timing: Timing {
			settle_ms: 100,
			poll_ms: 500,
			stable_threshold: 4,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy::default(),
		min_len: 1,
	}
}

fn gemini() -> TargetSite {
	TargetSite {
		id: SiteId::Gemini,
		new_chat_url: "https://gemini.google.com/app".into(),
		input: strings(&[
			".ql-editor",
			r#"div[contenteditable="true"]"#,
			"rich-textarea textarea",
			r#"textarea[aria-label*="prompt"]"#,
			r#"textarea[placeholder*="Enter"]"#,
			".input-area textarea",
			"textarea",
		]),
		send: strings(&[
			r#"button[aria-label*="Send"]"#,
			r#"button[aria-label*="submit"]"#,
			"button.send-button",
			r#"button[data-test-id="send-button"]"#,
			".input-area button",
			r#"button mat-icon[data-mat-icon-name="send"] >> closest(button)"#,
		]),
		send_scan: default_send_scan(),
		scan_bottom_margin: Some(150.0),
		response: strings(&[".model-response-text", "message-content"]),
		streaming: Vec::new(),
		observe: strings(&[".model-response-text", "message-content"]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::Click,
		trigger_events: vec![DomEvent::Click],
		timing: Timing {
			settle_ms: 150,
			poll_ms: 500,
			stable_threshold: 4,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy::default(),
		min_len: 1,
	}
}

fn deepseek() -> TargetSite {
	TargetSite {
		id: SiteId::Deepseek,
		new_chat_url: "https://chat.deepseek.com/".into(),
		input: strings(&[
			"#chat-input",
			r#"textarea[placeholder*="输入"]"#,
			r#"textarea[placeholder*="发送"]"#,
			r#"textarea[placeholder*="DeepSeek"]"#,
			"textarea",
			r#"div[contenteditable="true"]"#,
		]),
		send: strings(&[
			r#"div[role="button"]:not([aria-disabled="true"])"#,
			"div.ds-icon-button:not(.ds-icon-button--disabled)",
			r#"button[aria-label*="发送"]"#,
			r#"button[aria-label*="Send"]"#,
			r#"button[type="submit"]"#,
		]),
		send_scan: strings(&[r#"div[role="button"]"#, "button"]),
		scan_bottom_margin: default_scan_margin(),
		response: strings(&[
			r#"div[class*="ds-markdown"].ds-markdown--block"#,
			r#"div[class*="ds-markdown"]"#,
			".markdown-body",
		]),
		streaming: strings(&[
			r#"[class*="loading"]"#,
			r#"[class*="streaming"]"#,
			r#"button[aria-label*="停止"]"#,
		]),
		observe: strings(&[
			r#"[class*="assistant"]"#,
			r#"[class*="message"]"#,
			r#"[class*="response"]"#,
			r#"[class*="markdown"]"#,
		]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::EnterKey,
		trigger_events: DomEvent::full_click(),
		timing: Timing {
			settle_ms: 300,
			poll_ms: 400,
			stable_threshold: 10,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy::default(),
		min_len: 5,
	}
}

fn kimi() -> TargetSite {
	TargetSite {
		id: SiteId::Kimi,
		new_chat_url: "https://kimi.moonshot.cn/".into(),
		input: strings(&[
			"div.chat-input-editor",
			r#"[contenteditable="true"]"#,
			r#"div[class*="editor"]"#,
			"textarea",
		]),
		send: strings(&[
			"div.send-button-container",
			r#"div[class*="send-button"]"#,
			r#"button[aria-label*="发送"]"#,
			r#"button[aria-label*="Send"]"#,
			r#"button[type="submit"]"#,
			r#"button[class*="send"]"#,
			".send-btn",
			r#"[data-testid="send-button"]"#,
		]),
		send_scan: default_send_scan(),
		scan_bottom_margin: Some(250.0),
		response: strings(&[
			".message-list .message.ai .message-content",
			r#"[class*="bot-message"] .message-content"#,
			r#"[class*="assistant"] [class*="markdown"]"#,
			r#"[class*="message-content"]"#,
			r#"[class*="kimi-response"]"#,
			".markdown-body",
		]),
		streaming: strings(&[
			r#"[class*="loading"]"#,
			r#"[class*="streaming"]"#,
			r#"[class*="typing"]"#,
			r#"[class*="thinking"]"#,
			r#"[class*="generating"]"#,
			r#"button[aria-label*="停止"]"#,
			r#"button[aria-label*="Stop"]"#,
			".stop-btn",
			r#"[class*="cursor"]"#,
		]),
		observe: strings(&[
			r#"[class*="assistant"]"#,
			r#"[class*="message"]"#,
			r#"[class*="response"]"#,
			r#"[class*="markdown"]"#,
		]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::ClickOrEnter,
		trigger_events: DomEvent::full_click(),
		timing: Timing {
			settle_ms: 300,
			poll_ms: 500,
			stable_threshold: 10,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy::default(),
		min_len: 1,
	}
}

fn doubao() -> TargetSite {
	TargetSite {
		id: SiteId::Doubao,
		new_chat_url: "https://www.doubao.com/chat/".into(),
		input: strings(&[
			"textarea.semi-input-textarea",
			r#"textarea[placeholder*="输入"]"#,
			r#"textarea[placeholder*="豆包"]"#,
			"textarea",
			r#"[contenteditable="true"]"#,
		]),
		send: strings(&[
			r#"button[aria-label="发送"]"#,
			r#"button[aria-label*="发送"]"#,
			r#"button[aria-label*="Send"]"#,
			r#"button[type="submit"]"#,
			r#"button[class*="send"]"#,
		]),
		send_scan: default_send_scan(),
		scan_bottom_margin: default_scan_margin(),
		response: strings(&[
			r#"div[class*="message-block-container"]:last-child div[class*="flow-markdown-body"]"#,
			r#"div[class*="flow-markdown-body"]:last-of-type"#,
			r#"[class*="markdown-body"]:last-of-type"#,
		]),
		streaming: strings(&[
			r#"[class*="loading"]"#,
			r#"[class*="streaming"]"#,
			r#"[class*="typing"]"#,
			r#"button[aria-label*="停止"]"#,
		]),
		observe: strings(&[
			r#"[class*="assistant"]"#,
			r#"[class*="message"]"#,
			r#"[class*="response"]"#,
			r#"[class*="markdown"]"#,
		]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::EnterKey,
		trigger_events: DomEvent::full_click(),
		timing: Timing {
			settle_ms: 200,
			poll_ms: 400,
			stable_threshold: 6,
			trigger_gap_ms: 0,
		},
		dedup: DedupPolicy {
			hash: true,
			cooldown_ms: 3000,
		},
		min_len: 21,
	}
}

fn chatglm() -> TargetSite {
	TargetSite {
		id: SiteId::Chatglm,
		new_chat_url: "https://chatglm.cn/main/alltoolsdetail".into(),
		input: strings(&[
			r#"textarea[placeholder*="输入"]"#,
			r#"textarea[placeholder*="智谱"]"#,
			r#"textarea[placeholder*="问"]"#,
			"textarea",
			r#"[contenteditable="true"]"#,
		]),
		send: strings(&[
			".enter-icon-container",
			"div.enter",
			"div.enter img.enter_icon >> closest(div.enter)",
			r#"button[aria-label*="发送"]"#,
			r#"button[aria-label*="Send"]"#,
			r#"button[type="submit"]"#,
			r#"button[class*="send"]"#,
		]),
		send_scan: default_send_scan(),
		scan_bottom_margin: default_scan_margin(),
		response: strings(&[
			r#"[class*="assistant"] [class*="markdown"]"#,
			r#"[class*="bot-message"]"#,
			r#"[class*="message-content"]"#,
			r#"[class*="glm-response"]"#,
			".markdown-body",
		]),
		streaming: strings(&[
			r#"[class*="loading"]"#,
			r#"[class*="streaming"]"#,
			r#"[class*="typing"]"#,
			r#"button[aria-label*="停止"]"#,
		]),
		observe: strings(&[
			r#"[class*="assistant"]"#,
			r#"[class*="message"]"#,
			r#"[class*="response"]"#,
			r#"[class*="markdown"]"#,
		]),
		strip: Vec::new(),
		fill: FillMode::Auto,
		submit: SubmitMode::Click,
		trigger_events: DomEvent::full_click(),
		timing: Timing {
			settle_ms: 300,
			poll_ms: 600,
			stable_threshold: 5,
			trigger_gap_ms: 50,
		},
		dedup: DedupPolicy {
			hash: true,
			cooldown_ms: 3000,
		},
		min_len: 1,
	}
}
