//! Wire types for the roundtable agent host.
//!
//! Three audiences share these types:
//!
//! - controllers talk to the host with [`Envelope`] messages (request,
//!   response, event) correlated by id
//! - the host talks to per-page agents with [`AgentCommand`] / [`AgentReply`]
//! - agents report back with [`AgentNotice`]
//!
//! Nothing in here performs I/O.

mod agent;
mod dom;
mod envelope;
mod error;
mod site;

pub use agent::{AgentCommand, AgentNotice, AgentReply, CapturedResponse};
pub use dom::DomNode;
pub use envelope::{
	Command, Envelope, Event, EventType, HostEvent, NewConversationReport, PairCode, PairToken, Request, RequestType,
	Response, ResponseData, SiteOutcome, StatusReport,
};
pub use error::{ErrorCode, WireError};
pub use site::{ParseSiteError, SiteId};

/// Default host for the controller websocket.
pub const CONTROLLER_LISTEN_HOST: &str = "127.0.0.1";

/// Default port for the controller websocket.
pub const CONTROLLER_LISTEN_PORT: u16 = 19989;
