//! Acquisition pipeline for private-encrypted VOD videos.
//!
//! ```text
//! play auth ──► GetPlayInfo ──► playlist ──► segments ──► merge
//!  (auth)        (playlist)     (playlist)   (download)   (vodl_ts + decrypt)
//! ```

pub mod auth;
pub mod decrypt;
pub mod download;
pub mod error;
pub mod playlist;
mod pipeline;
pub mod util;

pub use error::{VodError, VodResult};
pub use pipeline::*;
pub use tokio_util::sync::CancellationToken;
pub use util::http::HttpClient;

pub use reqwest;
