//! Source archive download.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{BuildError, BuildResult};

/// Download a source archive into memory.
///
/// Requires a 2xx status and a non-empty body. Both the request and the
/// body transfer are abandoned as soon as `cancel` fires.
#[instrument(skip(client, cancel))]
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    cancel: &CancellationToken,
) -> BuildResult<Vec<u8>> {
    let failed = |reason: String| BuildError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(BuildError::Cancelled),
        result = client.get(url).send() => result.map_err(|e| failed(e.to_string()))?,
    };

    let status = response.status();
    if !status.is_success() {
        warn!(%status, "archive download rejected");
        return Err(failed(format!("unexpected status {status}")));
    }

    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(BuildError::Cancelled),
        result = response.bytes() => result.map_err(|e| failed(e.to_string()))?,
    };

    if body.is_empty() {
        return Err(BuildError::ArchiveEmpty);
    }
    debug!(size = body.len(), "archive downloaded");
    Ok(body.to_vec())
}
