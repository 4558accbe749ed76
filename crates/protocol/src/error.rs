use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine readable failure classes carried in responses and agent replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InputNotFound,
	SendControlNotFound,
	SubmissionTimeout,
	NoTabFound,
	Unauthorized,
	TokenExpired,
	CodeExpired,
	InvalidCode,
	NoPairingInProgress,
	DeliveryTimeout,
	/// The receiving agent does not exist (yet). Expected right after a reload.
	TransientUnreachable,
	BadRequest,
	PageError,
	Internal,
}

impl ErrorCode {
	/// Whether a controller should drop its pairing token on this error.
	pub fn clears_pairing(self) -> bool {
		matches!(self, ErrorCode::Unauthorized | ErrorCode::TokenExpired)
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			ErrorCode::InputNotFound => "INPUT_NOT_FOUND",
			ErrorCode::SendControlNotFound => "SEND_CONTROL_NOT_FOUND",
			ErrorCode::SubmissionTimeout => "SUBMISSION_TIMEOUT",
			ErrorCode::NoTabFound => "NO_TAB_FOUND",
			ErrorCode::Unauthorized => "UNAUTHORIZED",
			ErrorCode::TokenExpired => "TOKEN_EXPIRED",
			ErrorCode::CodeExpired => "CODE_EXPIRED",
			ErrorCode::InvalidCode => "INVALID_CODE",
			ErrorCode::NoPairingInProgress => "NO_PAIRING_IN_PROGRESS",
			ErrorCode::DeliveryTimeout => "DELIVERY_TIMEOUT",
			ErrorCode::TransientUnreachable => "TRANSIENT_UNREACHABLE",
			ErrorCode::BadRequest => "BAD_REQUEST",
			ErrorCode::PageError => "PAGE_ERROR",
			ErrorCode::Internal => "INTERNAL",
		};
		f.write_str(text)
	}
}

/// Structured failure as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
	pub code: ErrorCode,
	pub message: String,
}

impl WireError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}
}

impl fmt::Display for WireError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.code, self.message)
	}
}

impl std::error::Error for WireError {}
