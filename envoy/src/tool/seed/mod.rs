//! Seed tools (§4.3): the built-in tools available before any dynamic tool
//! is registered. Every tool here that performs filesystem I/O routes
//! through [`crate::workspace_guard`].

mod ask_user;
mod fetch_url;
mod read_file;
mod run_script;
mod write_file;

pub use ask_user::AskUser;
pub use fetch_url::FetchUrl;
pub use read_file::ReadFile;
pub use run_script::RunScript;
pub use write_file::WriteFile;
