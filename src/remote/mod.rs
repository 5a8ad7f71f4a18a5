//! Backend capability interface and the adapters shipped with the core.

pub mod api;
pub mod disconnected;
pub mod memory;
pub mod rows;
pub mod types;

#[cfg(test)]
mod tests;

pub use api::{with_deadline, RemoteApi};
pub use disconnected::NoBackend;
pub use memory::InMemoryRemote;
pub use types::{tables, AuthChange, AuthEvent, AuthSession, Row, Selector};
