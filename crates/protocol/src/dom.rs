//! Serialized DOM subtrees.
//!
//! Page drivers snapshot a response container into a [`DomNode`] tree so that
//! formatting happens in Rust, independent of the page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One node of a captured DOM subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum DomNode {
	Text {
		text: String,
	},
	Element {
		/// Lowercase tag name.
		tag: String,
		#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
		attrs: BTreeMap<String, String>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		children: Vec<DomNode>,
	},
}

impl DomNode {
	pub fn text(text: impl Into<String>) -> Self {
		DomNode::Text { text: text.into() }
	}

	pub fn element(tag: impl Into<String>) -> Self {
		DomNode::Element {
			tag: tag.into().to_ascii_lowercase(),
			attrs: BTreeMap::new(),
			children: Vec::new(),
		}
	}

	/// Builder: sets an attribute. No-op on text nodes.
	pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		if let DomNode::Element { attrs, .. } = &mut self {
			attrs.insert(name.into(), value.into());
		}
		self
	}

	/// Builder: appends a child. No-op on text nodes.
	pub fn with_child(mut self, child: DomNode) -> Self {
		if let DomNode::Element { children, .. } = &mut self {
			children.push(child);
		}
		self
	}

	/// Builder: appends a text child.
	pub fn with_text(self, text: impl Into<String>) -> Self {
		self.with_child(DomNode::text(text))
	}

	pub fn tag(&self) -> Option<&str> {
		match self {
			DomNode::Element { tag, .. } => Some(tag),
			DomNode::Text { .. } => None,
		}
	}

	pub fn attr(&self, name: &str) -> Option<&str> {
		match self {
			DomNode::Element { attrs, .. } => attrs.get(name).map(String::as_str),
			DomNode::Text { .. } => None,
		}
	}

	pub fn children(&self) -> &[DomNode] {
		match self {
			DomNode::Element { children, .. } => children,
			DomNode::Text { .. } => &[],
		}
	}

	pub fn has_class(&self, class: &str) -> bool {
		self.attr("class")
			.is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
	}

	/// Concatenated text of this node and its descendants (`textContent`).
	pub fn text_content(&self) -> String {
		let mut out = String::new();
		self.collect_text(&mut out);
		out
	}

	fn collect_text(&self, out: &mut String) {
		match self {
			DomNode::Text { text } => out.push_str(text),
			DomNode::Element { children, .. } => {
				for child in children {
					child.collect_text(out);
				}
			}
		}
	}

	/// First descendant (depth first, excluding `self`) with the given tag.
	pub fn find_descendant(&self, tag: &str) -> Option<&DomNode> {
		for child in self.children() {
			if child.tag() == Some(tag) {
				return Some(child);
			}
			if let Some(found) = child.find_descendant(tag) {
				return Some(found);
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_content_concatenates_descendants() {
		let node = DomNode::element("p")
			.with_text("Hello ")
			.with_child(DomNode::element("strong").with_text("world"));
		assert_eq!(node.text_content(), "Hello world");
	}

	#[test]
	fn has_class_checks_whole_tokens() {
		let node = DomNode::element("div").with_attr("class", "copy-btn sr-only");
		assert!(node.has_class("sr-only"));
		assert!(!node.has_class("copy"));
	}

	#[test]
	fn deserializes_driver_snapshot() {
		let raw = r#"{"t":"element","tag":"pre","children":[{"t":"element","tag":"code","attrs":{"class":"language-rust"},"children":[{"t":"text","text":"fn main() {}"}]}]}"#;
		let node: DomNode = serde_json::from_str(raw).unwrap();
		let code = node.find_descendant("code").unwrap();
		assert_eq!(code.attr("class"), Some("language-rust"));
		assert_eq!(node.text_content(), "fn main() {}");
	}
}
