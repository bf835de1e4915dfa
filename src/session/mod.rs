//! Session lifecycle
//!
//! [`machine`] holds the synchronous state machine, [`service`] drives it
//! against a settlement gateway, and [`driver`] feeds it wall-clock ticks.

pub mod driver;
pub mod machine;
pub mod service;
pub mod types;

pub use driver::spawn_ticker;
pub use machine::SessionMachine;
pub use service::SessionService;
pub use types::{GameSession, SessionEvent, SessionId, SessionStatus, TickToken};
