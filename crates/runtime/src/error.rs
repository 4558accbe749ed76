//! Error types for the agent host.

use std::time::Duration;

use roundtable_protocol::{ErrorCode, SiteId, WireError};
use thiserror::Error;

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No registered page belongs to the site.
	#[error("No {site} tab found")]
	NoTabFound { site: SiteId },

	/// The agent did not answer within the delivery window.
	#[error("Timeout after {}ms", .timeout.as_millis())]
	DeliveryTimeout { timeout: Duration },

	/// The receiving agent does not exist right now (reload, navigation).
	#[error("Receiving end does not exist: {0}")]
	TransientUnreachable(String),

	/// The agent neither answered a ping nor could be recreated.
	#[error("Failed to connect to {site}")]
	Unresponsive { site: SiteId },

	/// A failure reported by the other side of a channel.
	#[error("{0}")]
	Remote(WireError),

	#[error("Unauthorized")]
	Unauthorized,

	#[error("Token expired")]
	TokenExpired,

	#[error("Pairing code expired")]
	CodeExpired,

	#[error("Invalid pairing code")]
	InvalidCode,

	#[error("No pairing in progress")]
	NoPairingInProgress,

	#[error("Bad request: {0}")]
	BadRequest(String),

	/// The controller channel closed with the request still outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn code(&self) -> ErrorCode {
		match self {
			Error::NoTabFound { .. } => ErrorCode::NoTabFound,
			Error::DeliveryTimeout { .. } => ErrorCode::DeliveryTimeout,
			Error::TransientUnreachable(_) | Error::Unresponsive { .. } => ErrorCode::TransientUnreachable,
			Error::Remote(err) => err.code,
			Error::Unauthorized => ErrorCode::Unauthorized,
			Error::TokenExpired => ErrorCode::TokenExpired,
			Error::CodeExpired => ErrorCode::CodeExpired,
			Error::InvalidCode => ErrorCode::InvalidCode,
			Error::NoPairingInProgress => ErrorCode::NoPairingInProgress,
			Error::BadRequest(_) => ErrorCode::BadRequest,
			Error::ChannelClosed | Error::Io(_) | Error::Json(_) => ErrorCode::Internal,
		}
	}

	/// Only a missing receiver is worth an automatic retry.
	pub fn is_transient(&self) -> bool {
		matches!(self, Error::TransientUnreachable(_))
	}

	pub fn to_wire(&self) -> WireError {
		match self {
			Error::Remote(err) => err.clone(),
			other => WireError::new(other.code(), other.to_string()),
		}
	}
}

impl From<WireError> for Error {
	fn from(err: WireError) -> Self {
		Error::Remote(err)
	}
}

impl From<roundtable::Error> for Error {
	fn from(err: roundtable::Error) -> Self {
		Error::Remote(err.to_wire())
	}
}
