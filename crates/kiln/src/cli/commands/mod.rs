//! CLI commands

mod cache;
mod completions;
mod init;
mod list;
mod run;
mod validate;

pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use list::ListCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;
