use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use anyhow::Context;
use clap::{Args, Subcommand};
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use tokio_util::sync::CancellationToken;
use vodl::{HttpClient, VodConfig};

mod decrypt;
mod fetch;
mod video;

#[derive(Subcommand, Clone)]
pub enum VodlCommand {
    Video(video::VideoCommand),
    Fetch(fetch::FetchCommand),
    Decrypt(decrypt::DecryptCommand),
}

impl VodlCommand {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        match self {
            VodlCommand::Video(command) => command.run(cancel).await,
            VodlCommand::Fetch(command) => command.run(cancel).await,
            VodlCommand::Decrypt(command) => command.run(),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct HttpOptions {
    /// Additional HTTP headers, eg. "Referer: https://example.com"
    #[clap(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Cookies sent with every request, separated by `;`
    #[clap(long, env = "VODL_COOKIES")]
    pub cookies: Option<String>,

    /// User agent. A random Chrome user agent is used by default
    #[clap(long)]
    pub user_agent: Option<String>,

    /// HTTP timeout, in seconds
    #[clap(short, long, default_value = "60")]
    pub timeout: u64,
}

impl HttpOptions {
    pub fn into_client(self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }
        if let Some(cookies) = &self.cookies {
            if !headers.contains_key(reqwest::header::COOKIE) {
                headers.insert(reqwest::header::COOKIE, HeaderValue::from_str(cookies)?);
            }
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| get_chrome_rua().to_string());
        let builder = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout));
        Ok(HttpClient::new(builder)?)
    }
}

#[derive(Args, Clone, Debug)]
pub struct RangeOptions {
    /// Concurrent byte ranges per file
    #[clap(long, default_value = "5")]
    pub range_threads: NonZeroUsize,
}

pub fn build_config(http: HttpOptions, range: RangeOptions) -> anyhow::Result<VodConfig> {
    Ok(VodConfig::builder()
        .client(http.into_client()?)
        .range_concurrency(range.range_threads)
        .build()?)
}
