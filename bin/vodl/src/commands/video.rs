use std::{num::NonZeroU32, path::PathBuf};

use clap::Args;
use tokio_util::sync::CancellationToken;
use vodl::{auth::SigningNonce, VideoRequest, VodDownloader};

use super::{build_config, HttpOptions, RangeOptions};

/// Download a private-encrypted video
#[derive(Args, Clone, Debug)]
#[clap(visible_alias = "v")]
pub struct VideoCommand {
    #[clap(flatten)]
    pub http: HttpOptions,

    #[clap(flatten)]
    pub range: RangeOptions,

    /// Play auth issued for this video
    #[clap(long, env = "VODL_PLAY_AUTH")]
    pub play_auth: String,

    /// Video quality, eg. SD, HD, FHD
    #[clap(short, long, default_value = "HD")]
    pub quality: String,

    /// Output file name, without extension. Defaults to the video title
    #[clap(long)]
    pub title: Option<String>,

    /// Output directory
    #[clap(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Concurrent segment downloads
    #[clap(long, default_value = "5")]
    pub threads: NonZeroU32,

    /// Print available qualities and exit
    #[clap(long)]
    pub list_qualities: bool,

    /// GetPlayInfo endpoint
    #[clap(long, hide = true)]
    pub endpoint: Option<String>,

    /// Video id
    pub video_id: String,
}

impl VideoCommand {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut config = build_config(self.http, self.range)?;
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.parse()?;
        }
        let downloader = VodDownloader::new(config);

        if self.list_qualities {
            let play_info = downloader
                .play_info(&cancel, &self.play_auth, &self.video_id, &SigningNonce::random())
                .await?;
            if let Some(title) = play_info.title() {
                println!("{title}");
            }
            for variant in &play_info.play_info_list.play_info {
                println!(
                    "{:<6} {:>12} bytes  {}",
                    variant.definition,
                    variant.size,
                    variant.format.as_deref().unwrap_or("-")
                );
            }
            return Ok(());
        }

        let request = VideoRequest {
            playback_token: self.play_auth,
            video_id: self.video_id,
            quality: self.quality,
            title: self.title,
        };
        let output = downloader
            .download_encrypted_video(&cancel, &request, &self.output, self.threads)
            .await?;
        println!("{}", output.display());

        Ok(())
    }
}
