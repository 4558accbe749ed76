//! roundtable-runtime: the agent host.
//!
//! Sits between controllers and the per-page agents of `roundtable`:
//!
//! - [`Router`] finds the agent of a site, checks it is alive, delivers
//!   commands with retry and broadcasts [`HostEvent`](roundtable_protocol::HostEvent)s
//! - [`PairingGate`] hands out pairing codes and tokens and checks them
//! - [`Dispatcher`] answers controller requests, one response per request
//! - [`ControllerClient`] is the controller end of the same channel
//! - [`Host`] wires the above to in-process agents
//!
//! Persistent state goes through [`KeyValueStore`].

pub mod agents;
pub mod cache;
pub mod client;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod link;
pub mod liveness;
pub mod pairing;
pub mod pending;
pub mod registry;
pub mod router;
pub mod store;

pub use agents::AgentPool;
pub use cache::ResponseCache;
pub use client::ControllerClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{ChannelOrigin, Dispatcher};
pub use error::{Error, Result};
pub use host::{Host, HostOptions};
pub use link::{AgentLink, AgentSpawner, ChannelLink};
pub use liveness::Liveness;
pub use pairing::{PairingGate, PairingState};
pub use pending::PendingRequests;
pub use registry::{TabId, TabRegistry};
pub use router::Router;
pub use store::{JsonFileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};
