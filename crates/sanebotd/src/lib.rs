//! sanebotd - the sanity-review daemon.
//!
//! Wires the domain model to the outside world: configuration surface,
//! the live stream and snapshot transports, per-project git mirrors, the
//! dispatcher loop, and verdict publishing.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod mirror;
pub mod publish;
pub mod snapshot;
pub mod stream;

pub use agent::Agent;
pub use config::AgentConfig;
