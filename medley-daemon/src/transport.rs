//! Byte sources for urls: local files and HTTP(S).

use std::fs::File;
use std::io::{BufReader, Read};
use std::time::Duration;

use medley_plugins::builtin::file::url_to_path;
use tracing::debug;

use crate::error::{io_err, DaemonError};

/// Limit for connecting to a remote host and for each read from it.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Open `url` for reading.
///
/// `file://` urls and bare absolute paths are read from disk, `http://` and
/// `https://` with a blocking GET bounded by [`HTTP_TIMEOUT`].
pub fn open(url: &str, buffer_size: usize) -> Result<Box<dyn Read + Send>, DaemonError> {
    open_with_timeout(url, buffer_size, HTTP_TIMEOUT)
}

fn open_with_timeout(
    url: &str,
    buffer_size: usize,
    timeout: Duration,
) -> Result<Box<dyn Read + Send>, DaemonError> {
    if is_remote(url) {
        debug!(url, "opening remote stream");
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        let response = agent.get(url).call().map_err(|e| DaemonError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        return Ok(Box::new(BufReader::with_capacity(
            buffer_size,
            response.into_reader(),
        )));
    }

    let path = url_to_path(url).ok_or_else(|| DaemonError::Transport {
        url: url.to_string(),
        message: "unsupported url scheme".to_string(),
    })?;
    let file = File::open(&path).map_err(|e| io_err(&path, e))?;
    Ok(Box::new(BufReader::with_capacity(buffer_size, file)))
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Read up to `limit` bytes, stopping early only at end of stream.
pub fn read_head(reader: &mut dyn Read, limit: usize) -> Result<Vec<u8>, std::io::Error> {
    let mut head = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut head)?;
    Ok(head)
}
