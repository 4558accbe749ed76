use std::fmt;

use super::{Element, Page};
use crate::error::Result;

const CLOSEST_MARKER: &str = ">>";

/// A lookup strategy: a CSS selector, optionally followed by
/// `>> closest(<selector>)` to climb from the match to an ancestor.
///
/// `button svg[viewBox] >> closest(button)` finds an icon and clicks its
/// button; when no ancestor matches, the icon itself is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
	pub selector: String,
	pub closest: Option<String>,
}

impl Lookup {
	pub fn parse(raw: &str) -> Self {
		if let Some((selector, rest)) = raw.rsplit_once(CLOSEST_MARKER) {
			let rest = rest.trim();
			if let Some(ancestor) = rest.strip_prefix("closest(").and_then(|r| r.strip_suffix(')')) {
				return Self {
					selector: selector.trim().to_string(),
					closest: Some(ancestor.trim().to_string()),
				};
			}
		}
		Self {
			selector: raw.trim().to_string(),
			closest: None,
		}
	}

	pub async fn resolve(&self, page: &dyn Page) -> Result<Option<Element>> {
		let Some(found) = page.query(&self.selector).await? else {
			return Ok(None);
		};
		match &self.closest {
			Some(ancestor) => Ok(Some(page.closest(&found, ancestor).await?.unwrap_or(found))),
			None => Ok(Some(found)),
		}
	}
}

impl fmt::Display for Lookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.closest {
			Some(ancestor) => write!(f, "{} >> closest({})", self.selector, ancestor),
			None => f.write_str(&self.selector),
		}
	}
}
