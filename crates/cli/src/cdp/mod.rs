//! Chrome DevTools Protocol page driver.
//!
//! [`TabWatcher`] polls `GET /json/list`, opens a websocket per chat tab and
//! hands a [`CdpPage`] to the host. A page-side hook reports DOM mutations and
//! visibility changes back through `Runtime.addBinding`.

mod connection;
mod discovery;
mod page;
mod script;

pub use connection::{CdpConnection, CdpError, CdpEvent};
pub use discovery::{TabWatcher, TargetInfo, list_targets};
pub use page::CdpPage;
