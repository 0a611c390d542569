use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use azmux_domain::ByteRange;
use reqwest::Method;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{BlobClient, BlobRequest};
use crate::error::BlobError;

const SECTOR: u64 = 512;
const FOOTER_COOKIE: &[u8] = b"conectix";
/// Largest page write the service accepts.
pub const PAGE_RANGE_SIZE: u64 = 2 * 1024 * 1024;
pub const UPLOAD_WORKERS: usize = 3;

/// Size of a fixed VHD after checking its footer.
pub async fn check_vhd(path: &Path) -> Result<u64, BlobError> {
    let size = tokio::fs::metadata(path).await?.len();
    if size == 0 || size % SECTOR != 0 {
        return Err(BlobError::InvalidVhd(format!(
            "{}: size {} is not a multiple of {}",
            path.display(),
            size,
            SECTOR
        )));
    }
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(size - SECTOR)).await?;
    let mut footer = vec![0u8; SECTOR as usize];
    file.read_exact(&mut footer).await?;
    if !footer.starts_with(FOOTER_COOKIE) {
        return Err(BlobError::InvalidVhd(format!("{}: missing VHD footer", path.display())));
    }
    Ok(size)
}

/// Contiguous page ranges of at most [`PAGE_RANGE_SIZE`] covering `size` bytes.
pub fn page_ranges(size: u64) -> Vec<ByteRange> {
    (0..size)
        .step_by(PAGE_RANGE_SIZE as usize)
        .map(|start| ByteRange::new(start, (start + PAGE_RANGE_SIZE).min(size) - 1))
        .collect()
}

impl BlobClient {
    /// Upload a fixed VHD as a page blob and return its URL. All-zero ranges
    /// are skipped since a new page blob reads as zeros.
    pub async fn upload_vhd(&self, container: &str, blob: &str, path: &Path) -> Result<String, BlobError> {
        let size = check_vhd(path).await?;
        self.ensure_container(container).await?;

        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .header("x-ms-blob-type", "PageBlob")
            .header("x-ms-blob-content-length", size.to_string());
        self.send(req).await?;

        let ranges = page_ranges(size);
        info!(container, blob, size, ranges = ranges.len(), "uploading VHD");
        let queue = Arc::new(Mutex::new(VecDeque::from(ranges)));

        let workers = (0..UPLOAD_WORKERS).map(|worker| {
            let client    = self.clone();
            let queue     = Arc::clone(&queue);
            let path      = path.to_path_buf();
            let container = container.to_string();
            let blob      = blob.to_string();
            tokio::spawn(async move { client.upload_pages(worker, queue, path, container, blob).await })
        });

        for joined in futures::future::try_join_all(workers)
            .await
            .map_err(|e| BlobError::Io(std::io::Error::other(e)))?
        {
            joined?;
        }
        info!(container, blob, "VHD uploaded");
        Ok(self.blob_url(container, blob))
    }

    async fn upload_pages(
        &self,
        worker: usize,
        queue: Arc<Mutex<VecDeque<ByteRange>>>,
        path: PathBuf,
        container: String,
        blob: String,
    ) -> Result<(), BlobError> {
        let mut file = File::open(&path).await?;
        loop {
            let Some(range) = queue.lock().await.pop_front() else {
                return Ok(());
            };
            let mut buf = vec![0u8; range.len() as usize];
            file.seek(SeekFrom::Start(range.start)).await?;
            file.read_exact(&mut buf).await?;
            if buf.iter().all(|b| *b == 0) {
                debug!(worker, range = %range.header_value(), "skipping empty range");
                continue;
            }
            debug!(worker, range = %range.header_value(), "Put Page");
            let req = BlobRequest::new(Method::PUT, Self::blob_path(&container, &blob))
                .query("comp", "page")
                .header("x-ms-page-write", "update")
                .header("x-ms-range", range.header_value())
                .body(buf);
            self.send(req).await?;
        }
    }
}
