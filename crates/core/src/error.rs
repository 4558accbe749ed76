//! Error types for the agent engine.

use roundtable_protocol::{ErrorCode, SiteId, WireError};
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// None of the input lookups matched.
	#[error("Input element not found on {site}")]
	InputNotFound { site: SiteId },

	/// None of the send lookups matched and the site has no Enter-key path.
	#[error("Send control not found on {site}")]
	SendControlNotFound { site: SiteId },

	/// Filling and triggering did not finish in time.
	#[error("Submission on {site} did not complete within {timeout_ms}ms")]
	SubmissionTimeout { site: SiteId, timeout_ms: u64 },

	/// The page driver failed to carry out an operation.
	#[error("Page error: {0}")]
	Page(String),

	/// The page is gone (closed or navigated away).
	#[error("Page closed")]
	PageClosed,

	#[error("Invalid site table: {0}")]
	InvalidSiteTable(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn code(&self) -> ErrorCode {
		match self {
			Error::InputNotFound { .. } => ErrorCode::InputNotFound,
			Error::SendControlNotFound { .. } => ErrorCode::SendControlNotFound,
			Error::SubmissionTimeout { .. } => ErrorCode::SubmissionTimeout,
			Error::Page(_) | Error::PageClosed => ErrorCode::PageError,
			Error::InvalidSiteTable(_) | Error::Json(_) => ErrorCode::Internal,
		}
	}

	pub fn to_wire(&self) -> WireError {
		WireError::new(self.code(), self.to_string())
	}
}
