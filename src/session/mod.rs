//! Active identity and the core's event bus.

pub mod events;
mod manager;


pub use events::{CoreEvent, EventBus, ListenerId};
pub use manager::SessionManager;
