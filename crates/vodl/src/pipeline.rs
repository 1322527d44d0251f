use std::{
    fs::File,
    io::{BufWriter, Write},
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    sync::Arc,
};

use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use vodl_ts::{TransportStream, AUDIO_PID, VIDEO_PID};

use crate::{
    auth::{play_info_url, SigningNonce, DEFAULT_ENDPOINT},
    decrypt::ContentKey,
    download::{ByteCounter, ChunkDownloader, ParallelDownloader, Progress, RetryPolicy, SegmentTask},
    error::{VodError, VodResult},
    playlist::{fetch_play_info, fetch_playlist, PlayInfoResponse},
    util::{
        http::HttpClient,
        path::{sanitize_filename, VodPathExt},
    },
};

/// Settings shared by every download of one [VodDownloader].
#[derive(Clone)]
pub struct VodConfig {
    pub endpoint: Url,
    pub client: HttpClient,
    /// Number of byte ranges fetched concurrently for one resource.
    pub range_concurrency: NonZeroUsize,
    pub retry: RetryPolicy,
    pub output_extension: String,
}

impl VodConfig {
    pub fn builder() -> VodConfigBuilder {
        VodConfigBuilder::new()
    }
}

pub struct VodConfigBuilder {
    endpoint: String,
    client: Option<HttpClient>,
    range_concurrency: NonZeroUsize,
    retry: RetryPolicy,
    output_extension: String,
}

impl VodConfigBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: None,
            range_concurrency: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            retry: RetryPolicy::default(),
            output_extension: "ts".to_string(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn range_concurrency(mut self, range_concurrency: NonZeroUsize) -> Self {
        self.range_concurrency = range_concurrency;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn output_extension(mut self, extension: impl Into<String>) -> Self {
        self.output_extension = extension.into();
        self
    }

    pub fn build(self) -> VodResult<VodConfig> {
        let client = match self.client {
            Some(client) => client,
            None => HttpClient::new(Client::builder())?,
        };

        Ok(VodConfig {
            endpoint: Url::parse(&self.endpoint)?,
            client,
            range_concurrency: self.range_concurrency,
            retry: self.retry,
            output_extension: self.output_extension,
        })
    }
}

impl Default for VodConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One video to fetch.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub playback_token: String,
    pub video_id: String,
    pub quality: String,
    /// Output name. Falls back to the title reported by the platform, then to the video id.
    pub title: Option<String>,
}

pub struct VodDownloader {
    config: VodConfig,
}

impl VodDownloader {
    pub fn new(config: VodConfig) -> Self {
        Self { config }
    }

    fn chunk_downloader(&self, progress: Arc<dyn Progress>) -> ChunkDownloader {
        ChunkDownloader::new(self.config.client.clone())
            .concurrency(self.config.range_concurrency)
            .retry(self.config.retry)
            .progress(progress)
    }

    /// Exchanges `playback_token` for the list of available variants.
    pub async fn play_info(
        &self,
        cancel: &CancellationToken,
        playback_token: &str,
        video_id: &str,
        nonce: &SigningNonce,
    ) -> VodResult<PlayInfoResponse> {
        let url = play_info_url(&self.config.endpoint, playback_token, video_id, nonce)?;
        fetch_play_info(cancel, &self.config.client, url, video_id).await
    }

    /// Downloads every segment of the requested variant into a temporary
    /// directory under `output_dir`, then merges them in playlist order,
    /// decrypting if the playlist is encrypted.
    ///
    /// Returns the path of the merged file. The temporary directory is removed
    /// on every exit path.
    pub async fn download_encrypted_video(
        &self,
        cancel: &CancellationToken,
        request: &VideoRequest,
        output_dir: impl AsRef<Path>,
        concurrency: NonZeroU32,
    ) -> VodResult<PathBuf> {
        let output_dir = output_dir.as_ref();
        let video_id = request.video_id.as_str();

        let nonce = SigningNonce::random();
        let play_info = self
            .play_info(cancel, &request.playback_token, video_id, &nonce)
            .await?;
        let variant = play_info.select(video_id, &request.quality)?;
        tracing::info!(
            "Selected {} of {video_id}, {} bytes.",
            variant.definition,
            variant.size
        );

        let title = request
            .title
            .as_deref()
            .and_then(sanitize_filename)
            .or_else(|| play_info.title().and_then(sanitize_filename))
            .unwrap_or_else(|| video_id.to_string());

        let playlist = fetch_playlist(cancel, &self.config.client, &variant.play_url).await?;
        let key = if playlist.is_encrypted {
            Some(ContentKey::derive(
                &nonce.client_rand,
                &variant.rand,
                &variant.plaintext,
            )?)
        } else {
            None
        };

        tokio::fs::create_dir_all(output_dir).await?;
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!(".{title}-"))
            .tempdir_in(output_dir)?;

        let segments = playlist
            .segments
            .iter()
            .enumerate()
            .map(|(index, name)| {
                Ok(SegmentTask {
                    name: name.clone(),
                    url: playlist.segment_url(name)?,
                    path: temp_dir.path().join(format!("{index:06}.ts")),
                })
            })
            .collect::<VodResult<Vec<_>>>()?;

        let bytes = Arc::new(ByteCounter::new());
        let downloader = ParallelDownloader::new(
            self.chunk_downloader(bytes.clone()),
            concurrency,
            bytes.clone(),
        );
        downloader.download(cancel, segments.clone()).await?;
        if cancel.is_cancelled() {
            return Err(VodError::Cancelled);
        }

        let output = output_dir
            .join(&title)
            .with_output_extension(&self.config.output_extension);
        tracing::info!("Merging {} segments...", segments.len());
        let merge_output = output.clone();
        tokio::task::spawn_blocking(move || merge_segments(&segments, key.as_ref(), &merge_output))
            .await??;

        temp_dir.close()?;
        tracing::info!(
            "All finished, {} bytes downloaded. Please checkout your file at {}",
            bytes.get(),
            output.display()
        );
        Ok(output)
    }

    /// Downloads a plain resource with the chunk downloader, appending to `dest`.
    pub async fn download_file(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        dest: impl AsRef<Path>,
    ) -> VodResult<u64> {
        let bytes = Arc::new(ByteCounter::new());
        let size = self
            .chunk_downloader(bytes)
            .download(cancel, url, dest.as_ref())
            .await?;
        tracing::info!("Downloaded {url}, {size} bytes.");
        Ok(size)
    }
}

/// Concatenates the segments in order into a fresh `output`. A partial output
/// is removed on failure.
fn merge_segments(
    segments: &[SegmentTask],
    key: Option<&ContentKey>,
    output: &Path,
) -> VodResult<()> {
    let result = write_segments(segments, key, output);
    if result.is_err() && output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            tracing::warn!("Failed to remove {}: {e}", output.display());
        }
    }
    result
}

fn write_segments(
    segments: &[SegmentTask],
    key: Option<&ContentKey>,
    output: &Path,
) -> VodResult<()> {
    let mut writer = BufWriter::new(File::create(output)?);
    for segment in segments {
        let wrap = |source| VodError::Segment {
            segment: segment.name.clone(),
            source,
        };

        let data = std::fs::read(&segment.path)?;
        let mut stream = TransportStream::parse(data).map_err(wrap)?;
        tracing::debug!(
            "{}: {} packets, {} video and {} audio fragments.",
            segment.name,
            stream.packets().len(),
            stream.fragment_count(VIDEO_PID),
            stream.fragment_count(AUDIO_PID)
        );
        if let Some(key) = key {
            stream.decrypt(key.as_bytes()).map_err(wrap)?;
        }
        writer.write_all(stream.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}
