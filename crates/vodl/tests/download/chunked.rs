use std::{sync::Arc, time::Duration};

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use vodl::{download::ByteCounter, VodError};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{chunk_downloader, mount_resource, test_body, FlakyResponder, RangeResponder};

#[tokio::test]
async fn test_reassembles_out_of_order_parts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(4099);
    mount_resource(
        &server,
        "/file.bin",
        RangeResponder::new(body.clone()).reverse_delay(Duration::from_millis(80)),
    )
    .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let temp = tempfile::tempdir()?;
    for n in 1..=16 {
        let dest = temp.path().join(format!("{n}.bin"));
        let written = chunk_downloader(n)?
            .download(&CancellationToken::new(), &url, &dest)
            .await?;
        assert_eq!(written, body.len() as u64);
        assert_eq!(tokio::fs::read(&dest).await?, body, "{n} parts");
    }

    Ok(())
}

#[tokio::test]
async fn test_parts_are_returned_in_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(1000);
    mount_resource(
        &server,
        "/file.bin",
        RangeResponder::new(body.clone()).reverse_delay(Duration::from_millis(50)),
    )
    .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let parts = chunk_downloader(4)?
        .fetch(&CancellationToken::new(), &url)
        .await?;
    let lengths: Vec<_> = parts.iter().map(|p| p.len()).collect();
    assert_eq!(lengths, [250, 250, 250, 250]);
    assert_eq!(parts.concat(), body);

    Ok(())
}

#[tokio::test]
async fn test_unknown_size_uses_single_open_range() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(300);
    Mock::given(method("HEAD"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("range", "bytes=0-"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let parts = chunk_downloader(8)?
        .fetch(&CancellationToken::new(), &url)
        .await?;
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].as_ref(), body.as_slice());

    Ok(())
}

#[tokio::test]
async fn test_range_succeeds_after_two_failures() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(512);
    mount_resource(
        &server,
        "/flaky.bin",
        FlakyResponder::new(2, RangeResponder::new(body.clone())),
    )
    .await;
    let url = Url::parse(&format!("{}/flaky.bin", server.uri()))?;

    let parts = chunk_downloader(1)?
        .fetch(&CancellationToken::new(), &url)
        .await?;
    assert_eq!(parts.concat(), body);

    Ok(())
}

#[tokio::test]
async fn test_range_fails_after_three_attempts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_resource(
        &server,
        "/broken.bin",
        FlakyResponder::new(3, RangeResponder::new(test_body(512))),
    )
    .await;
    let url = Url::parse(&format!("{}/broken.bin", server.uri()))?;

    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("broken.bin");
    let error = chunk_downloader(1)?
        .download(&CancellationToken::new(), &url, &dest)
        .await
        .unwrap_err();

    match error {
        VodError::RetriesExhausted {
            attempts, range, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(range, "bytes=0-");
        }
        e => panic!("unexpected error: {e}"),
    }
    assert!(!dest.exists());

    Ok(())
}

#[tokio::test]
async fn test_failed_range_writes_nothing() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(1000);
    Mock::given(method("HEAD"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("range", "bytes=500-"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(RangeResponder::new(body))
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("existing.bin");
    tokio::fs::write(&dest, b"existing").await?;

    let bytes = Arc::new(ByteCounter::new());
    let result = chunk_downloader(2)?
        .progress(bytes.clone())
        .download(&CancellationToken::new(), &url, &dest)
        .await;
    assert!(result.is_err());
    assert_eq!(tokio::fs::read(&dest).await?, b"existing");
    // the first half arrived but the resource was dropped
    assert_eq!(bytes.get(), 0);

    Ok(())
}

#[tokio::test]
async fn test_appends_to_existing_file() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(777);
    mount_resource(&server, "/file.bin", RangeResponder::new(body.clone())).await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("out.bin");
    tokio::fs::write(&dest, b"header").await?;

    chunk_downloader(3)?
        .download(&CancellationToken::new(), &url, &dest)
        .await?;

    let mut expected = b"header".to_vec();
    expected.extend_from_slice(&body);
    assert_eq!(tokio::fs::read(&dest).await?, expected);

    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_download() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_resource(
        &server,
        "/slow.bin",
        RangeResponder::new(test_body(1000)).reverse_delay(Duration::from_secs(30)),
    )
    .await;
    let url = Url::parse(&format!("{}/slow.bin", server.uri()))?;

    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("slow.bin");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let error = tokio::time::timeout(
        Duration::from_secs(10),
        chunk_downloader(4)?.download(&cancel, &url, &dest),
    )
    .await?
    .unwrap_err();
    assert!(error.is_cancelled());
    assert!(!dest.exists());

    Ok(())
}

#[tokio::test]
async fn test_cancelled_before_start() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let error = chunk_downloader(2)?.fetch(&cancel, &url).await.unwrap_err();
    assert!(matches!(error, VodError::Cancelled));

    Ok(())
}

#[tokio::test]
async fn test_cancel_during_head() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let error = tokio::time::timeout(
        Duration::from_secs(5),
        chunk_downloader(4)?.fetch(&cancel, &url),
    )
    .await?
    .unwrap_err();
    assert!(matches!(error, VodError::Cancelled));

    Ok(())
}

#[tokio::test]
async fn test_progress_counts_finished_resources() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let body = test_body(900);
    mount_resource(&server, "/file.bin", RangeResponder::new(body.clone())).await;
    let url = Url::parse(&format!("{}/file.bin", server.uri()))?;

    let bytes = Arc::new(ByteCounter::new());
    let parts = chunk_downloader(3)?
        .progress(bytes.clone())
        .fetch(&CancellationToken::new(), &url)
        .await?;
    assert_eq!(parts.concat(), body);
    assert_eq!(bytes.get(), 900);

    Ok(())
}
