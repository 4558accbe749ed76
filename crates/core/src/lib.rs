//! roundtable: drive chat sites through their own web pages.
//!
//! This crate holds everything that runs next to a single page:
//!
//! - **Page access**: the [`Page`] trait a browser driver implements
//! - **Site tables**: [`TargetSite`] lookup chains and timing per chat site
//! - **Injection**: fill the input and submit ([`inject()`])
//! - **Capture**: decide when a streamed answer is final ([`CaptureMachine`], [`run_capture`])
//! - **Formatting**: reduce the answer subtree to Markdown ([`to_markdown`])
//! - **Agent**: per-page runtime tying the above together ([`Agent`])
//!
//! # Architecture
//!
//! ```text
//!   host ──AgentCommand──▶ Agent ──inject──▶ Page
//!        ◀──AgentReply───   │
//!        ◀──AgentNotice──   └──run_capture──▶ Page (poll)
//! ```
//!
//! Routing between many agents and controllers lives in `roundtable-runtime`.

pub mod agent;
pub mod capture;
pub mod error;
pub mod inject;
pub mod markdown;
pub mod page;
pub mod session;
pub mod site;
pub mod testing;

pub use agent::{Agent, AgentRequest};
pub use capture::{CaptureMachine, CaptureOutcome, CaptureState, DedupGuard, Observation, Step, run_capture};
pub use error::{Error, Result};
pub use inject::{Submission, inject};
pub use markdown::to_markdown;
pub use page::{DomEvent, Element, ElementContent, ElementHandle, Lookup, Page};
pub use session::{AgentSession, SharedSession};
pub use site::{DedupPolicy, FillMode, SiteTable, SubmitMode, TargetSite, Timing};
