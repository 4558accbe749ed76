//! [`Page`] abstraction over a live chat tab.
//!
//! The engine never touches a browser directly. A driver (CDP in the CLI, a
//! scripted fake in tests) implements [`Page`] and hands out [`Element`]s that
//! carry an opaque [`ElementHandle`] plus the few layout facts the send-control
//! heuristic needs.

mod input;
mod lookup;

use async_trait::async_trait;
use roundtable_protocol::DomNode;

pub use self::input::{DomEvent, ElementContent};
pub use self::lookup::Lookup;
use crate::error::Result;

/// Driver-assigned identifier of a DOM element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// A DOM element as seen at lookup time.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
	pub handle: ElementHandle,
	/// Lowercase tag name.
	pub tag: String,
	/// `contenteditable` resolved to true.
	pub editable: bool,
	/// Computed style is not `display:none`, `visibility:hidden` or `opacity:0`.
	pub visible: bool,
	/// `disabled`, `aria-disabled="true"`, a `disabled` class or `pointer-events:none`.
	pub disabled: bool,
	/// Contains an `svg` descendant.
	pub has_icon: bool,
	/// Bounding rect bottom in CSS pixels.
	pub bottom: f64,
	pub viewport_height: f64,
}

impl Element {
	pub fn new(handle: ElementHandle, tag: impl Into<String>) -> Self {
		Self {
			handle,
			tag: tag.into().to_ascii_lowercase(),
			editable: false,
			visible: true,
			disabled: false,
			has_icon: false,
			bottom: 0.0,
			viewport_height: 0.0,
		}
	}

	/// `<textarea>` or `<input>`, filled by value assignment.
	pub fn is_text_field(&self) -> bool {
		matches!(self.tag.as_str(), "textarea" | "input")
	}

	/// Whether the element sits within `margin` pixels of the viewport bottom.
	pub fn near_bottom(&self, margin: f64) -> bool {
		self.bottom > self.viewport_height - margin
	}
}

/// Operations the engine performs against a page.
///
/// Every method may suspend. Drivers report a vanished page as
/// [`Error::PageClosed`](crate::Error::PageClosed).
#[async_trait]
pub trait Page: Send + Sync {
	/// First element in document order matching `selector`.
	async fn query(&self, selector: &str) -> Result<Option<Element>>;

	/// All elements matching `selector`, in document order.
	async fn query_all(&self, selector: &str) -> Result<Vec<Element>>;

	async fn exists(&self, selector: &str) -> Result<bool> {
		Ok(self.query(selector).await?.is_some())
	}

	/// Nearest inclusive ancestor of `element` matching `selector`.
	async fn closest(&self, element: &Element, selector: &str) -> Result<Option<Element>>;

	async fn write(&self, element: &Element, content: ElementContent) -> Result<()>;

	async fn dispatch(&self, element: &Element, event: &DomEvent) -> Result<()>;

	/// Serializes the subtree under `element`, dropping descendants that match
	/// any of `exclude`.
	async fn snapshot(&self, element: &Element, exclude: &[String]) -> Result<DomNode>;

	async fn navigate(&self, url: &str) -> Result<()>;
}
