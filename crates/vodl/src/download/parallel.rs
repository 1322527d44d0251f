use std::{
    num::NonZeroU32,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use reqwest::Url;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::{progress::ByteCounter, ChunkDownloader};
use crate::error::{VodError, VodResult};

/// A segment to be downloaded into its own file.
#[derive(Debug, Clone)]
pub struct SegmentTask {
    pub name: String,
    pub url: Url,
    pub path: PathBuf,
}

/// Runs the chunk downloader for many segments, at most `concurrency` at a time.
///
/// Every segment writes a distinct file. The first failed segment stops the others.
pub struct ParallelDownloader {
    downloader: Arc<ChunkDownloader>,
    concurrency: NonZeroU32,
    permits: Arc<Semaphore>,

    downloaded: Arc<AtomicUsize>,
    bytes: Arc<ByteCounter>,
}

impl ParallelDownloader {
    pub fn new(
        downloader: ChunkDownloader,
        concurrency: NonZeroU32,
        bytes: Arc<ByteCounter>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(concurrency.get() as usize));

        Self {
            downloader: Arc::new(downloader),
            concurrency,
            permits,
            downloaded: Arc::new(AtomicUsize::new(0)),
            bytes,
        }
    }

    pub async fn download(
        self,
        cancel: &CancellationToken,
        segments: Vec<SegmentTask>,
    ) -> VodResult<()> {
        let total = segments.len();
        tracing::info!(
            "Start downloading {total} segments with {} thread(s).",
            self.concurrency.get()
        );

        let token = cancel.child_token();
        let mut tasks = JoinSet::new();
        for segment in segments {
            let permit = tokio::select! {
                _ = token.cancelled() => None,
                permit = self.permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tasks.abort_all();
                return Err(VodError::Cancelled);
            };

            // fail fast instead of queueing more segments behind a failure
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result.map_err(VodError::from).and_then(|r| r) {
                    token.cancel();
                    tasks.abort_all();
                    return Err(e);
                }
            }

            let downloader = self.downloader.clone();
            let downloaded = self.downloaded.clone();
            let bytes = self.bytes.clone();
            let segment_token = token.clone();
            tasks.spawn(async move {
                let result = downloader
                    .download(&segment_token, &segment.url, &segment.path)
                    .await;
                drop(permit);

                let size = result?;
                let downloaded = downloaded.fetch_add(1, Ordering::Relaxed) + 1;
                let percentage = downloaded as f32 / total as f32 * 100.;
                tracing::info!(
                    "Processing {} finished, {size} bytes. ({downloaded} / {total} or {percentage:.2}%, {} bytes total)",
                    segment.name,
                    bytes.get()
                );
                Ok::<_, VodError>(())
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result.map_err(VodError::from).and_then(|r| r) {
                if !e.is_cancelled() {
                    tracing::error!("Segment download failed: {e}");
                }
                token.cancel();
                tasks.abort_all();
                return Err(e);
            }
        }

        if cancel.is_cancelled() {
            return Err(VodError::Cancelled);
        }
        Ok(())
    }
}
