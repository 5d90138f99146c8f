pub mod capabilities;
pub mod init;
pub mod run;

use anyhow::{Context, Result};

/// Multi-threaded runtime for one command; capability servers and the model
/// client both need the IO and time drivers.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("failed to start the async runtime")
}
