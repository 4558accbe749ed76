//! Content writes and synthetic events for [`Page`](super::Page).

use serde::{Deserialize, Serialize};

/// How new content is placed into an input element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementContent {
	/// Assigned through the native `value` setter (`textarea`, `input`).
	Value(String),
	/// Replaces `textContent` of a contenteditable widget.
	Text(String),
	/// Replaces `innerHTML` of a contenteditable widget.
	Html(String),
}

impl ElementContent {
	/// Builds a single paragraph for ProseMirror-style editors.
	pub fn paragraph(text: &str) -> Self {
		ElementContent::Html(format!("<p>{}</p>", escape_html(text)))
	}
}

/// A synthetic DOM event, dispatched bubbling and cancelable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
	Focus,
	Input,
	Change,
	PointerDown,
	PointerUp,
	MouseDown,
	MouseUp,
	Click,
	/// `keydown` with the given `key` (e.g. `"Enter"`).
	KeyDown(String),
}

impl DomEvent {
	/// DOM event type name.
	pub fn name(&self) -> &'static str {
		match self {
			DomEvent::Focus => "focus",
			DomEvent::Input => "input",
			DomEvent::Change => "change",
			DomEvent::PointerDown => "pointerdown",
			DomEvent::PointerUp => "pointerup",
			DomEvent::MouseDown => "mousedown",
			DomEvent::MouseUp => "mouseup",
			DomEvent::Click => "click",
			DomEvent::KeyDown(_) => "keydown",
		}
	}

	/// Sequence that satisfies pages listening on any of the pointer, mouse or click events.
	pub fn full_click() -> Vec<DomEvent> {
		vec![
			DomEvent::PointerDown,
			DomEvent::PointerUp,
			DomEvent::MouseDown,
			DomEvent::MouseUp,
			DomEvent::Click,
		]
	}

	pub fn enter() -> DomEvent {
		DomEvent::KeyDown("Enter".to_string())
	}
}

pub(crate) fn escape_html(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}
