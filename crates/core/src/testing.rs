//! Testing infrastructure for agents.
//!
//! [`ScriptedPage`] is an in-memory [`Page`] whose DOM changes over (tokio)
//! time, so injection and capture can be exercised without a browser. Tests
//! run under `#[tokio::test(start_paused = true)]` and describe the page as a
//! timeline:
//!
//! ```ignore
//! let page = ScriptedPage::new();
//! page.add(FakeElement::new("textarea").matching("textarea"));
//! page.add(
//!     FakeElement::new("div")
//!         .matching(".answer")
//!         .text_at(Duration::from_millis(800), "Hel")
//!         .text_at(Duration::from_millis(1600), "Hello"),
//! );
//! page.add(FakeElement::new("div").matching(".typing").present_between(Duration::ZERO, Duration::from_secs(2)));
//! ```
//!
//! Selectors are matched literally: an element matches a selector only if it
//! was registered with exactly that string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use roundtable_protocol::DomNode;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::page::{DomEvent, Element, ElementContent, ElementHandle, Page};

/// Description of one element in a [`ScriptedPage`].
#[derive(Debug, Clone)]
pub struct FakeElement {
	tag: String,
	selectors: Vec<String>,
	editable: bool,
	visible: bool,
	has_icon: bool,
	bottom: f64,
	viewport_height: f64,
	enabled_at: Option<Duration>,
	present_from: Duration,
	present_until: Option<Duration>,
	content: Vec<(Duration, Option<DomNode>)>,
	ancestors: Vec<(String, ElementHandle)>,
}

impl FakeElement {
	pub fn new(tag: &str) -> Self {
		Self {
			tag: tag.to_ascii_lowercase(),
			selectors: Vec::new(),
			editable: false,
			visible: true,
			has_icon: false,
			bottom: 0.0,
			viewport_height: 800.0,
			enabled_at: None,
			present_from: Duration::ZERO,
			present_until: None,
			content: Vec::new(),
			ancestors: Vec::new(),
		}
	}

	pub fn matching(mut self, selector: &str) -> Self {
		self.selectors.push(selector.to_string());
		self
	}

	pub fn editable(mut self) -> Self {
		self.editable = true;
		self
	}

	pub fn hidden(mut self) -> Self {
		self.visible = false;
		self
	}

	pub fn with_icon(mut self) -> Self {
		self.has_icon = true;
		self
	}

	pub fn at_bottom(mut self, bottom: f64, viewport_height: f64) -> Self {
		self.bottom = bottom;
		self.viewport_height = viewport_height;
		self
	}

	/// Reports `disabled` until `at`.
	pub fn disabled_until(mut self, at: Duration) -> Self {
		self.enabled_at = Some(at);
		self
	}

	/// Reports `disabled` for the whole test.
	pub fn disabled(self) -> Self {
		self.disabled_until(Duration::MAX)
	}

	pub fn present_between(mut self, from: Duration, until: Duration) -> Self {
		self.present_from = from;
		self.present_until = Some(until);
		self
	}

	/// Sets the subtree from `at` onwards. The element is absent before its first content.
	pub fn html_at(mut self, at: Duration, node: DomNode) -> Self {
		self.content.push((at, Some(node)));
		self.content.sort_by_key(|(at, _)| *at);
		self
	}

	/// Shorthand for a `<p>` holding `text`.
	pub fn text_at(self, at: Duration, text: &str) -> Self {
		self.html_at(at, DomNode::element("p").with_text(text))
	}

	/// Removes the element from `at` onwards.
	pub fn removed_at(mut self, at: Duration) -> Self {
		self.content.push((at, None));
		self.content.sort_by_key(|(at, _)| *at);
		self
	}

	/// `closest(selector)` on this element yields `ancestor`.
	pub fn with_ancestor(mut self, selector: &str, ancestor: ElementHandle) -> Self {
		self.ancestors.push((selector.to_string(), ancestor));
		self
	}

	fn content_at(&self, elapsed: Duration) -> Option<Option<&DomNode>> {
		if self.content.is_empty() {
			return Some(None);
		}
		self.content
			.iter()
			.rev()
			.find(|(at, _)| *at <= elapsed)
			.and_then(|(_, node)| node.as_ref().map(Some))
	}

	fn present(&self, elapsed: Duration) -> bool {
		elapsed >= self.present_from
			&& self.present_until.is_none_or(|until| elapsed < until)
			&& self.content_at(elapsed).is_some()
	}
}

/// Something a test can assert happened on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
	Write(ElementHandle, ElementContent),
	Dispatch(ElementHandle, DomEvent),
	Navigate(String),
}

#[derive(Debug)]
struct Dom {
	started: Instant,
	elements: Vec<(ElementHandle, FakeElement)>,
	written: HashMap<ElementHandle, DomNode>,
	actions: Vec<PageAction>,
	next_handle: u64,
	closed: bool,
}

/// In-memory [`Page`] driven by a timeline.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
	dom: Arc<Mutex<Dom>>,
}

impl Default for ScriptedPage {
	fn default() -> Self {
		Self::new()
	}
}

impl ScriptedPage {
	/// Creates an empty page whose timeline starts now.
	pub fn new() -> Self {
		Self {
			dom: Arc::new(Mutex::new(Dom {
				started: Instant::now(),
				elements: Vec::new(),
				written: HashMap::new(),
				actions: Vec::new(),
				next_handle: 1,
				closed: false,
			})),
		}
	}

	pub fn add(&self, element: FakeElement) -> ElementHandle {
		let mut dom = self.dom.lock();
		let handle = ElementHandle(dom.next_handle);
		dom.next_handle += 1;
		dom.elements.push((handle, element));
		handle
	}

	/// Makes every further operation fail with [`Error::PageClosed`].
	pub fn close(&self) {
		self.dom.lock().closed = true;
	}

	pub fn actions(&self) -> Vec<PageAction> {
		self.dom.lock().actions.clone()
	}

	pub fn events_on(&self, handle: ElementHandle) -> Vec<DomEvent> {
		self.actions()
			.into_iter()
			.filter_map(|action| match action {
				PageAction::Dispatch(h, event) if h == handle => Some(event),
				_ => None,
			})
			.collect()
	}

	pub fn writes(&self) -> Vec<(ElementHandle, ElementContent)> {
		self.actions()
			.into_iter()
			.filter_map(|action| match action {
				PageAction::Write(h, content) => Some((h, content)),
				_ => None,
			})
			.collect()
	}

	pub fn navigations(&self) -> Vec<String> {
		self.actions()
			.into_iter()
			.filter_map(|action| match action {
				PageAction::Navigate(url) => Some(url),
				_ => None,
			})
			.collect()
	}

	fn live(&self) -> Result<parking_lot::MutexGuard<'_, Dom>> {
		let dom = self.dom.lock();
		if dom.closed {
			return Err(Error::PageClosed);
		}
		Ok(dom)
	}
}

impl Dom {
	fn elapsed(&self) -> Duration {
		Instant::now().saturating_duration_since(self.started)
	}

	fn describe(&self, handle: ElementHandle, fake: &FakeElement) -> Element {
		let elapsed = self.elapsed();
		Element {
			handle,
			tag: fake.tag.clone(),
			editable: fake.editable,
			visible: fake.visible,
			disabled: fake.enabled_at.is_some_and(|at| elapsed < at),
			has_icon: fake.has_icon,
			bottom: fake.bottom,
			viewport_height: fake.viewport_height,
		}
	}

	fn matching(&self, selector: &str) -> Vec<Element> {
		let elapsed = self.elapsed();
		self.elements
			.iter()
			.filter(|(_, fake)| fake.present(elapsed) && fake.selectors.iter().any(|s| s == selector))
			.map(|(handle, fake)| self.describe(*handle, fake))
			.collect()
	}

	fn find(&self, handle: ElementHandle) -> Option<&FakeElement> {
		self.elements.iter().find(|(h, _)| *h == handle).map(|(_, fake)| fake)
	}
}

#[async_trait]
impl Page for ScriptedPage {
	async fn query(&self, selector: &str) -> Result<Option<Element>> {
		Ok(self.live()?.matching(selector).into_iter().next())
	}

	async fn query_all(&self, selector: &str) -> Result<Vec<Element>> {
		Ok(self.live()?.matching(selector))
	}

	async fn closest(&self, element: &Element, selector: &str) -> Result<Option<Element>> {
		let dom = self.live()?;
		let ancestor = dom
			.find(element.handle)
			.and_then(|fake| fake.ancestors.iter().find(|(s, _)| s == selector))
			.map(|(_, handle)| *handle);
		Ok(ancestor.and_then(|handle| dom.find(handle).map(|fake| dom.describe(handle, fake))))
	}

	async fn write(&self, element: &Element, content: ElementContent) -> Result<()> {
		let mut dom = self.live()?;
		let text = match &content {
			ElementContent::Value(text) | ElementContent::Text(text) | ElementContent::Html(text) => text.clone(),
		};
		dom.written.insert(element.handle, DomNode::element("div").with_text(text));
		dom.actions.push(PageAction::Write(element.handle, content));
		Ok(())
	}

	async fn dispatch(&self, element: &Element, event: &DomEvent) -> Result<()> {
		self.live()?.actions.push(PageAction::Dispatch(element.handle, event.clone()));
		Ok(())
	}

	async fn snapshot(&self, element: &Element, _exclude: &[String]) -> Result<DomNode> {
		let dom = self.live()?;
		if let Some(written) = dom.written.get(&element.handle) {
			return Ok(written.clone());
		}
		let elapsed = dom.elapsed();
		let node = dom
			.find(element.handle)
			.and_then(|fake| fake.content_at(elapsed))
			.flatten()
			.cloned()
			.unwrap_or_else(|| DomNode::element("div"));
		Ok(node)
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		self.live()?.actions.push(PageAction::Navigate(url.to_string()));
		Ok(())
	}
}
