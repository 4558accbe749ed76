//! Identifiers for the supported chat sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported chat site.
///
/// Serialized as the lowercase site name (`"claude"`, `"chatgpt"`, ...), which is
/// also the key used in status maps and the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteId {
	Claude,
	Chatgpt,
	Gemini,
	Deepseek,
	Kimi,
	Doubao,
	Chatglm,
}

impl SiteId {
	/// Every supported site, in display order.
	pub const ALL: [SiteId; 7] = [
		SiteId::Claude,
		SiteId::Chatgpt,
		SiteId::Gemini,
		SiteId::Deepseek,
		SiteId::Kimi,
		SiteId::Doubao,
		SiteId::Chatglm,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			SiteId::Claude => "claude",
			SiteId::Chatgpt => "chatgpt",
			SiteId::Gemini => "gemini",
			SiteId::Deepseek => "deepseek",
			SiteId::Kimi => "kimi",
			SiteId::Doubao => "doubao",
			SiteId::Chatglm => "chatglm",
		}
	}

	/// Human readable name.
	pub fn display_name(self) -> &'static str {
		match self {
			SiteId::Claude => "Claude",
			SiteId::Chatgpt => "ChatGPT",
			SiteId::Gemini => "Gemini",
			SiteId::Deepseek => "DeepSeek",
			SiteId::Kimi => "Kimi",
			SiteId::Doubao => "Doubao",
			SiteId::Chatglm => "ChatGLM",
		}
	}

	/// Host fragments that identify a page of this site.
	pub fn url_patterns(self) -> &'static [&'static str] {
		match self {
			SiteId::Claude => &["claude.ai"],
			SiteId::Chatgpt => &["chat.openai.com", "chatgpt.com"],
			SiteId::Gemini => &["gemini.google.com"],
			SiteId::Deepseek => &["chat.deepseek.com"],
			SiteId::Kimi => &["www.kimi.com", "kimi.com", "kimi.moonshot.cn"],
			SiteId::Doubao => &["www.doubao.com", "doubao.com", "bot.doubao.com", "chat.doubao.com"],
			SiteId::Chatglm => &["chatglm.cn"],
		}
	}

	/// Classifies a page URL, returning the first site whose pattern it contains.
	pub fn from_url(url: &str) -> Option<SiteId> {
		if url.is_empty() {
			return None;
		}
		Self::ALL
			.into_iter()
			.find(|site| site.url_patterns().iter().any(|p| url.contains(p)))
	}
}

impl fmt::Display for SiteId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Returned when a string names no supported site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSiteError(pub String);

impl fmt::Display for ParseSiteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unknown site: {}", self.0)
	}
}

impl std::error::Error for ParseSiteError {}

impl FromStr for SiteId {
	type Err = ParseSiteError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.trim().to_ascii_lowercase();
		Self::ALL
			.into_iter()
			.find(|site| site.as_str() == lower)
			.ok_or_else(|| ParseSiteError(s.to_string()))
	}
}
