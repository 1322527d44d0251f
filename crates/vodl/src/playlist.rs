use std::future::Future;

use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{VodError, VodResult},
    util::http::HttpClient,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayInfoResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub play_info_list: PlayInfoList,
    #[serde(default)]
    pub video_base: Option<VideoBase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayInfoList {
    #[serde(default)]
    pub play_info: Vec<PlayInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoBase {
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// One available quality of a video.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayInfo {
    pub definition: String,
    #[serde(rename = "PlayURL")]
    pub play_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub rand: String,
    #[serde(default)]
    pub plaintext: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub encrypt: u8,
    #[serde(default)]
    pub encrypt_type: Option<String>,
}

impl PlayInfoResponse {
    pub fn definitions(&self) -> Vec<String> {
        self.play_info_list
            .play_info
            .iter()
            .map(|p| p.definition.clone())
            .collect()
    }

    /// Selects the variant whose definition equals `quality`, ignoring case.
    pub fn select(&self, video_id: &str, quality: &str) -> VodResult<&PlayInfo> {
        self.play_info_list
            .play_info
            .iter()
            .find(|p| p.definition.eq_ignore_ascii_case(quality))
            .ok_or_else(|| VodError::NoMatchingVariant {
                video_id: video_id.to_string(),
                quality: quality.to_string(),
                available: self.definitions(),
            })
    }

    pub fn title(&self) -> Option<&str> {
        self.video_base.as_ref()?.title.as_deref()
    }
}

/// Resolves `body` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    body: impl Future<Output = VodResult<T>>,
) -> VodResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(VodError::Cancelled),
        result = body => result,
    }
}

pub async fn fetch_play_info(
    cancel: &CancellationToken,
    client: &HttpClient,
    url: Url,
    video_id: &str,
) -> VodResult<PlayInfoResponse> {
    tracing::info!("Fetching play info of {video_id}.");

    let (status, body) = cancellable(cancel, async {
        let response = client.get(url).send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    })
    .await?;
    if !status.is_success() {
        return Err(VodError::PlayInfoRequest {
            video_id: video_id.to_string(),
            status,
            body,
        });
    }

    let play_info: PlayInfoResponse = serde_json::from_str(&body)?;
    tracing::debug!(
        "Play info of {video_id}: {:?} (request {:?})",
        play_info.definitions(),
        play_info.request_id
    );
    Ok(play_info)
}

/// Segment names of a media playlist, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub segments: Vec<String>,
    pub is_encrypted: bool,
    /// Playlist URL up to and including its last `/`.
    pub prefix: String,
}

impl Playlist {
    /// Scans the playlist line by line. Every non-comment line ending in `.ts`
    /// is a segment. Only the first `#EXT-X-KEY` tag is considered.
    pub fn parse(url: &Url, content: &str) -> Self {
        let mut segments = Vec::new();
        let mut key_method: Option<&str> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("#EXT-X-KEY") {
                if key_method.is_none() {
                    key_method = Some(attribute(line, "METHOD").unwrap_or_default());
                }
            } else if !line.starts_with('#') && line.ends_with(".ts") {
                segments.push(line.to_string());
            }
        }

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let base = base.as_str();
        let prefix = match base.rfind('/') {
            Some(pos) => base[..=pos].to_string(),
            None => base.to_string(),
        };

        Self {
            segments,
            is_encrypted: key_method == Some("AES-128"),
            prefix,
        }
    }

    pub fn segment_url(&self, segment: &str) -> VodResult<Url> {
        Ok(Url::parse(&format!("{}{segment}", self.prefix))?)
    }
}

fn attribute<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (_, attributes) = line.split_once(':')?;
    attributes.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

pub async fn fetch_playlist(
    cancel: &CancellationToken,
    client: &HttpClient,
    url: &str,
) -> VodResult<Playlist> {
    let url = Url::parse(url)?;
    tracing::info!("Start fetching M3U8 file.");

    let content = cancellable(cancel, async {
        let response = client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(VodError::HttpError(response.status()));
        }
        Ok(response.text().await?)
    })
    .await?;
    let playlist = Playlist::parse(&url, &content);

    tracing::info!(
        "M3U8 file fetched, {} segments, encrypted: {}.",
        playlist.segments.len(),
        playlist.is_encrypted
    );
    Ok(playlist)
}
