use aes::cipher::block_padding::UnpadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VodError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Malformed play auth: {0}")]
    MalformedPlayAuth(String),

    #[error("Auth resolution failed for video {video_id}: {reason}")]
    AuthResolution { video_id: String, reason: String },

    #[error("GetPlayInfo failed for video {video_id} ({status}): {body}")]
    PlayInfoRequest {
        video_id: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("No {quality} variant for video {video_id}, available: {}", available.join(", "))]
    NoMatchingVariant {
        video_id: String,
        quality: String,
        available: Vec<String>,
    },

    #[error("Range {range} of {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        range: String,
        attempts: u32,
        #[source]
        source: Box<VodError>,
    },

    #[error("Range {range} returned {actual} bytes, expected {expected}")]
    IncompleteRange {
        range: String,
        expected: u64,
        actual: u64,
    },

    #[error("Operation canceled")]
    Cancelled,

    #[error("Invalid decryption key material: {0}")]
    InvalidKey(String),

    #[error("Pkcs7 unpad error")]
    UnpadError(#[from] UnpadError),

    #[error("Transport stream error in {segment}: {source}")]
    Segment {
        segment: String,
        #[source]
        source: vodl_ts::Error,
    },

    #[error(transparent)]
    TsError(#[from] vodl_ts::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    RsaError(#[from] rsa::Error),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

impl VodError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            VodError::Cancelled => true,
            VodError::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn auth(video_id: &str, reason: impl ToString) -> Self {
        VodError::AuthResolution {
            video_id: video_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type VodResult<T> = Result<T, VodError>;
