use std::{num::NonZeroU32, sync::Arc};

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use vodl::{
    download::{ByteCounter, ParallelDownloader, SegmentTask},
    VodError,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{chunk_downloader, mount_resource, test_body, RangeResponder};

fn segment(server: &MockServer, dir: &std::path::Path, index: usize) -> anyhow::Result<SegmentTask> {
    Ok(SegmentTask {
        name: format!("{index}.ts"),
        url: Url::parse(&format!("{}/{index}.ts", server.uri()))?,
        path: dir.join(format!("{index}.ts")),
    })
}

#[tokio::test]
async fn test_parallel_downloader_writes_every_segment() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    for index in 0..6 {
        mount_resource(
            &server,
            &format!("/{index}.ts"),
            RangeResponder::new(test_body(100 + index * 10)),
        )
        .await;
    }

    let temp = tempfile::tempdir()?;
    let segments = (0..6)
        .map(|i| segment(&server, temp.path(), i))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let bytes = Arc::new(ByteCounter::new());
    let downloader = chunk_downloader(2)?.progress(bytes.clone());
    ParallelDownloader::new(downloader, NonZeroU32::new(3).unwrap(), bytes.clone())
        .download(&CancellationToken::new(), segments.clone())
        .await?;

    for (index, segment) in segments.iter().enumerate() {
        assert_eq!(tokio::fs::read(&segment.path).await?, test_body(100 + index * 10));
    }
    assert_eq!(bytes.get(), (0..6).map(|i| 100 + i * 10).sum::<usize>() as u64);

    Ok(())
}

#[tokio::test]
async fn test_parallel_downloader_fails_on_segment_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_resource(&server, "/0.ts", RangeResponder::new(test_body(100))).await;
    Mock::given(method("GET"))
        .and(path("/1.ts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir()?;
    let segments = vec![segment(&server, temp.path(), 0)?, segment(&server, temp.path(), 1)?];

    let bytes = Arc::new(ByteCounter::new());
    let error = ParallelDownloader::new(chunk_downloader(1)?, NonZeroU32::new(2).unwrap(), bytes)
        .download(&CancellationToken::new(), segments.clone())
        .await
        .unwrap_err();

    match error {
        VodError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        e => panic!("unexpected error: {e}"),
    }
    assert!(!segments[1].path.exists());

    Ok(())
}
