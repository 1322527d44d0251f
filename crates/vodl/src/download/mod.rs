mod chunked;
mod parallel;
mod progress;

pub use chunked::{ChunkDownloader, RetryPolicy};
pub use parallel::{ParallelDownloader, SegmentTask};
pub use progress::{ByteCounter, NoProgress, Progress};
