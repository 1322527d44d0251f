use std::path::PathBuf;

use clap::Args;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use vodl::VodDownloader;

use super::{build_config, HttpOptions, RangeOptions};

/// Download a plain file with concurrent byte ranges
#[derive(Args, Clone, Debug)]
#[clap(visible_alias = "f")]
pub struct FetchCommand {
    #[clap(flatten)]
    pub http: HttpOptions,

    #[clap(flatten)]
    pub range: RangeOptions,

    /// Output file. Appended to if it exists
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// URL to download
    pub url: Url,
}

impl FetchCommand {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let output = match self.output {
            Some(output) => output,
            None => PathBuf::from(
                self.url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|name| !name.is_empty())
                    .unwrap_or("download"),
            ),
        };

        let downloader = VodDownloader::new(build_config(self.http, self.range)?);
        downloader.download_file(&cancel, &self.url, &output).await?;
        println!("{}", output.display());

        Ok(())
    }
}
