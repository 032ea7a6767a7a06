//! Lease disk transfer.
//!
//! Streams the base disk image to the lease's device URL and reports upload
//! progress back to the lease. Progress reports are strictly increasing
//! integer percentages; a transport or I/O failure aborts the lease before
//! the error propagates.

use crate::errors::{ProvisionError, ProvisionResult};
use crate::platform::{LeaseRef, Platform};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio_stream::wrappers::ReceiverStream;

const UPLOAD_CHUNK_SIZE: usize = 512 * 1024;

/// Content type the platform expects for stream-optimized disk uploads.
const UPLOAD_CONTENT_TYPE: &str = "application/x-vnd.vmware-streamVmdk";

/// Computes the percentage to report to the lease, suppressing anything that
/// does not strictly exceed the last reported value.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: u64,
    last: u8,
}

impl ProgressTracker {
    pub(crate) fn new(total: u64) -> Self {
        Self { total, last: 0 }
    }

    /// Percentage to report for `bytes_sent` cumulative bytes, if any.
    pub(crate) fn update(&mut self, bytes_sent: u64) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let percent = ((bytes_sent as f64 / self.total as f64) * 100.0).round();
        let percent = percent.clamp(0.0, 100.0) as u8;
        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }
}

/// Substitute the wildcard host token in a lease device URL with the actual
/// platform host.
pub(crate) fn resolve_device_url(device_url: &str, host: &str) -> String {
    device_url.replace('*', host)
}

/// Phase 4 body: stream `image` to the lease's device URL, reporting
/// progress. Aborts the lease on failure before returning the error.
pub(crate) async fn upload_disk(
    platform: &dyn Platform,
    client: &reqwest::Client,
    lease: &LeaseRef,
    image: &Path,
) -> ProvisionResult<()> {
    let info = platform.lease_info(lease).await?;
    let url = resolve_device_url(&info.device_url, platform.host());
    tracing::info!(url = %url, image = %image.display(), "uploading disk image");

    match stream_disk(platform, client, lease, &url, image).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let reason = err.to_string();
            if let Err(abort_err) = platform.lease_abort(lease, &reason).await {
                tracing::warn!(error = %abort_err, "lease abort after transfer failure failed");
            }
            Err(err)
        }
    }
}

async fn stream_disk(
    platform: &dyn Platform,
    client: &reqwest::Client,
    lease: &LeaseRef,
    url: &str,
    image: &Path,
) -> ProvisionResult<()> {
    let total = tokio::fs::metadata(image)
        .await
        .map_err(|e| ProvisionError::Transfer(format!("stat {}: {e}", image.display())))?
        .len();
    let mut file = tokio::fs::File::open(image)
        .await
        .map_err(|e| ProvisionError::Transfer(format!("open {}: {e}", image.display())))?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, std::io::Error>>(4);
    let request = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
        .body(reqwest::Body::wrap_stream(ReceiverStream::new(rx)))
        .send();
    let in_flight = tokio::spawn(request);

    let mut tracker = ProgressTracker::new(total);
    let mut bytes_sent: u64 = 0;
    loop {
        let mut chunk = vec![0u8; UPLOAD_CHUNK_SIZE];
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|e| ProvisionError::Transfer(format!("read {}: {e}", image.display())))?;
        if n == 0 {
            break;
        }
        chunk.truncate(n);
        if tx.send(Ok(chunk)).await.is_err() {
            // Receiver dropped: the request already failed; surface that
            // error below instead of the send failure.
            break;
        }
        bytes_sent += n as u64;
        if let Some(percent) = tracker.update(bytes_sent) {
            tracing::debug!(percent, "reporting upload progress");
            platform.lease_progress(lease, percent).await?;
        }
    }
    drop(tx);

    let response = in_flight
        .await
        .map_err(|e| ProvisionError::Transfer(format!("upload task: {e}")))?
        .map_err(|e| ProvisionError::Transfer(format!("upload request: {e}")))?;
    response
        .error_for_status()
        .map_err(|e| ProvisionError::Transfer(format!("upload rejected: {e}")))?;

    tracing::info!(bytes = bytes_sent, "disk image upload complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_progress_reported_only_on_strict_increase() {
        let mut tracker = ProgressTracker::new(1000);
        assert_eq!(tracker.update(10), Some(1));
        assert_eq!(tracker.update(11), None);
        assert_eq!(tracker.update(20), Some(2));
        assert_eq!(tracker.update(20), None);
        assert_eq!(tracker.update(1000), Some(100));
        assert_eq!(tracker.update(1000), None);
    }

    #[test]
    fn test_progress_rounds_to_nearest() {
        let mut tracker = ProgressTracker::new(1000);
        // 4/1000 = 0.4% rounds to 0, which does not exceed the initial 0.
        assert_eq!(tracker.update(4), None);
        // 5/1000 = 0.5% rounds to 1.
        assert_eq!(tracker.update(5), Some(1));
    }

    #[test]
    fn test_empty_image_reports_nothing() {
        let mut tracker = ProgressTracker::new(0);
        assert_eq!(tracker.update(0), None);
        assert_eq!(tracker.update(100), None);
    }

    #[test]
    fn test_wildcard_host_substitution() {
        assert_eq!(
            resolve_device_url("https://*/nfc/disk-1.vmdk", "vcenter.example"),
            "https://vcenter.example/nfc/disk-1.vmdk"
        );
        assert_eq!(
            resolve_device_url("https://10.0.0.5/nfc/disk-1.vmdk", "vcenter.example"),
            "https://10.0.0.5/nfc/disk-1.vmdk"
        );
    }

    proptest! {
        #[test]
        fn test_reports_strictly_increasing_and_bounded(
            total in 1u64..=1_000_000,
            increments in prop::collection::vec(1u64..=100_000, 1..64),
        ) {
            let mut tracker = ProgressTracker::new(total);
            let mut sent = 0u64;
            let mut reports = Vec::new();
            for step in increments {
                sent = (sent + step).min(total);
                if let Some(percent) = tracker.update(sent) {
                    reports.push(percent);
                }
            }
            for pair in reports.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            for percent in &reports {
                prop_assert!(*percent <= 100);
            }
        }
    }
}
