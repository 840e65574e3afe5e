// Dub API client
//
// Facade over the request engine and the logging setup shared by every
// binary that talks to the Dub API.

// Re-export the request engine
pub use dub_http_client::*;

// Re-export logging setup
#[cfg(feature = "log")]
pub use dub_log as log;

/// Initialize logging and build a client from `DUB_*` environment variables.
///
/// `debug` raises the log level to debug; otherwise only errors are printed
/// unless `DUB_LOG_LEVEL` or `RUST_LOG` say otherwise.
#[cfg(feature = "log")]
pub fn from_env(debug: bool) -> Result<ApiClient> {
    dub_log::init(debug);
    ApiClient::new(ClientConfig::from_env()?)
}
