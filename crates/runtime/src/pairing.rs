//! Pairing and authorization gate.
//!
//! A controller outside the trusted context pairs in two steps: it asks for
//! a short code, which is shown to the operator, then confirms that code and
//! receives a token. Every later request carries the token.
//!
//! ```text
//! Unpaired ──issue_code──▶ CodeIssued ──confirm──▶ Confirmed(token)
//!     └──────────────auto_pair (trusted only)──────────▲
//! ```
//!
//! The whole state is replaced on every new code or auto-pairing. A change
//! only takes effect once the durable store has accepted it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::{KeyValueStore, KeyValueStoreExt};

/// How long an issued code can be confirmed.
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Lifetime of the token issued alongside a code that has not been confirmed yet.
pub const UNCONFIRMED_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Lifetime of a confirmed or auto-paired token.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Code characters; `0 O 1 I` are left out.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 6;

const STATE_KEY: &str = "pairingState";

/// Persisted pairing state. Expiries are unix epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingState {
	pub code: Option<String>,
	pub code_expiry: Option<u64>,
	pub token: Option<String>,
	pub token_expiry: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingPhase {
	Unpaired,
	CodeIssued,
	Confirmed,
}

impl PairingState {
	pub fn phase(&self) -> PairingPhase {
		if self.code.is_some() {
			PairingPhase::CodeIssued
		} else if self.token.is_some() {
			PairingPhase::Confirmed
		} else {
			PairingPhase::Unpaired
		}
	}
}

pub struct PairingGate {
	state: Mutex<PairingState>,
	store: Arc<dyn KeyValueStore>,
	clock: Arc<dyn Clock>,
	codes: watch::Sender<Option<String>>,
}

impl PairingGate {
	/// Restores the last persisted state before anything is answered.
	pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
		let state = match store.load::<PairingState>(STATE_KEY) {
			Ok(Some(state)) => {
				debug!(target = "rt.pairing", phase = ?state.phase(), "pairing state restored");
				state
			}
			Ok(None) => PairingState::default(),
			Err(err) => {
				warn!(target = "rt.pairing", error = %err, "pairing state unreadable, starting unpaired");
				PairingState::default()
			}
		};
		let (codes, _) = watch::channel(state.code.clone());
		Self {
			state: Mutex::new(state),
			store,
			clock,
			codes,
		}
	}

	pub fn state(&self) -> PairingState {
		self.state.lock().clone()
	}

	/// Code awaiting confirmation, if any.
	pub fn current_code(&self) -> Option<String> {
		self.state.lock().code.clone()
	}

	/// Observes issued codes so a local surface can show them to the operator.
	pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
		self.codes.subscribe()
	}

	/// Persists `next`, then makes it current. A failed write leaves the gate untouched.
	fn replace(&self, state: &mut PairingState, next: PairingState) -> Result<()> {
		self.store.save(STATE_KEY, &next)?;
		*state = next;
		self.codes.send_replace(state.code.clone());
		Ok(())
	}

	/// Issues a fresh code together with a fresh, not yet confirmed token.
	pub fn issue_code(&self) -> Result<String> {
		let now = self.clock.now_ms();
		let code = generate_code();
		let mut state = self.state.lock();
		self.replace(
			&mut state,
			PairingState {
				code: Some(code.clone()),
				code_expiry: Some(now + CODE_TTL.as_millis() as u64),
				token: Some(generate_token()),
				token_expiry: Some(now + UNCONFIRMED_TOKEN_TTL.as_millis() as u64),
			},
		)?;
		info!(target = "rt.pairing", "pairing code issued");
		Ok(code)
	}

	/// Exchanges the current code for the token. The code works once.
	pub fn confirm(&self, code: &str) -> Result<String> {
		let now = self.clock.now_ms();
		let mut state = self.state.lock();
		let (Some(expected), Some(expiry)) = (state.code.clone(), state.code_expiry) else {
			return Err(Error::NoPairingInProgress);
		};
		if now > expiry {
			return Err(Error::CodeExpired);
		}
		if !constant_time_eq(code, &expected) {
			return Err(Error::InvalidCode);
		}
		let Some(token) = state.token.clone() else {
			return Err(Error::NoPairingInProgress);
		};
		let next = PairingState {
			code: None,
			code_expiry: None,
			token: Some(token.clone()),
			token_expiry: Some(now + TOKEN_TTL.as_millis() as u64),
		};
		self.replace(&mut state, next)?;
		info!(target = "rt.pairing", "pairing confirmed");
		Ok(token)
	}

	/// Issues a long-lived token without a code. Only for trusted callers.
	pub fn auto_pair(&self) -> Result<String> {
		let now = self.clock.now_ms();
		let token = generate_token();
		let mut state = self.state.lock();
		self.replace(
			&mut state,
			PairingState {
				code: None,
				code_expiry: None,
				token: Some(token.clone()),
				token_expiry: Some(now + TOKEN_TTL.as_millis() as u64),
			},
		)?;
		info!(target = "rt.pairing", "auto-paired trusted controller");
		Ok(token)
	}

	/// Checks a token presented by an untrusted controller.
	pub fn authorize(&self, token: Option<&str>) -> Result<()> {
		let state = self.state.lock();
		let matches = match (token, state.token.as_deref()) {
			(Some(given), Some(expected)) => constant_time_eq(given, expected),
			_ => false,
		};
		if !matches {
			return Err(Error::Unauthorized);
		}
		if state.token_expiry.is_some_and(|expiry| self.clock.now_ms() > expiry) {
			return Err(Error::TokenExpired);
		}
		Ok(())
	}
}

fn constant_time_eq(a: &str, b: &str) -> bool {
	a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn generate_code() -> String {
	let mut rng = rand::thread_rng();
	(0..CODE_LEN)
		.map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
		.collect()
}

fn generate_token() -> String {
	Uuid::new_v4().to_string()
}
