//! Persistence: the tool registry, sessions, and messages, all backed
//! by a single `rusqlite` file, with each query run inside
//! `spawn_blocking` to keep the async runtime's worker threads free.

pub mod messages;
pub mod registry;
pub mod session;

pub use messages::MessageStore;
pub use registry::{ToolRegistry, ToolRow};
pub use session::SessionStore;
