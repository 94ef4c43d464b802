//! Seam between the orchestrator and the development server

use futures::future::BoxFuture;
use kiln_core::ServerConfig;

use crate::reload::ReloadChannel;

/// A long-running development server.
///
/// `serve` resolves only when the server stops. Implementations subscribe to
/// `reload` and push its events to connected browsers.
pub trait DevServer: Send + Sync {
    /// Run the server
    fn serve(&self, config: ServerConfig, reload: ReloadChannel) -> BoxFuture<'static, std::io::Result<()>>;
}
