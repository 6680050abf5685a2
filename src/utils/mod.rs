mod net;
pub(crate) mod scoped_timer;
pub use net::*;

#[cfg(test)]
mod utils_test;

use std::future::Future;
use std::time::Duration;

use sha2::Digest;
use sha2::Sha256;

use crate::Error;
use crate::Result;

/// Lower-case hex SHA-256 of `data`
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Bounds a store round trip by `timeout`.
pub(crate) async fn with_timeout<T, F>(
    timeout: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| Error::Timeout(timeout))?
}
