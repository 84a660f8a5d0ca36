//! Remote source tests against a local mock HTTP server.

mod common;

use audio_chunker::source::{download, http_client};
use audio_chunker::{ChunkerError, Config, RunCoordinator, SourceReference, Toolkit};
use common::{files_in, rate_for, scaled_constraints, sorted, FakeAudio};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn coordinator(fake: Arc<FakeAudio>, work_dir: &Path) -> RunCoordinator {
    let config = Config {
        constraints: scaled_constraints(),
        work_dir: work_dir.to_path_buf(),
        download_timeout_secs: 10,
        ..Default::default()
    };
    RunCoordinator::new(config, Toolkit::uniform(fake)).unwrap()
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

// ============================================================================
// download
// ============================================================================

mod download_tests {
    use super::*;

    #[tokio::test]
    async fn test_download_keeps_extension_and_body() {
        let server = MockServer::start().await;
        serve(&server, "/media/Talk.OGG", b"OggS fake payload".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let url = format!("{}/media/Talk.OGG?token=abc", server.uri());
        let dest = download(&client, &url, dir.path(), false).await.unwrap();

        assert!(dest.starts_with(dir.path()));
        let name = dest.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("audio_"));
        assert!(name.ends_with(".ogg"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"OggS fake payload");
    }

    #[tokio::test]
    async fn test_download_creates_destination() {
        let server = MockServer::start().await;
        serve(&server, "/a.mp3", vec![1, 2, 3]).await;
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("not").join("yet");
        let client = http_client(Duration::from_secs(5)).unwrap();

        let dest = download(&client, &format!("{}/a.mp3", server.uri()), &nested, false)
            .await
            .unwrap();

        assert!(dest.starts_with(&nested));
        assert_eq!(std::fs::read(&dest).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let result = download(&client, &format!("{}/missing.mp3", server.uri()), dir.path(), false).await;

        match result {
            Err(ChunkerError::Download(msg)) => assert!(msg.contains("404")),
            other => panic!("Expected Download error, got: {other:?}"),
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_download_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let result = download(&client, "http://", dir.path(), false).await;

        assert!(matches!(result, Err(ChunkerError::Download(_))));
    }
}

// ============================================================================
// Remote runs
// ============================================================================

mod remote_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_source_is_downloaded_and_split() {
        let server = MockServer::start().await;
        // 45 minutes at 40 MB under the scaled limits.
        serve(&server, "/lectures/week1.mp3", vec![0u8; 40 * 1024]).await;
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let fake = FakeAudio::new(rate_for(40.0, 2700.0));

        let source = SourceReference::parse(&format!("{}/lectures/week1.mp3", server.uri()));
        let report = coordinator(fake, &work)
            .process_report(&source)
            .await
            .unwrap();

        let chunks = report.chunk_paths();
        assert_eq!(chunks.len(), 3);
        assert_eq!(report.stats.forced_cuts, 2);
        assert!((report.stats.total_audio_secs - 2700.0).abs() < 1e-6);

        // Only the chunks remain: the download and the intermediate piece are gone.
        let run_dir = work.join(&report.run_id);
        assert_eq!(files_in(&run_dir), sorted(&chunks));
        assert_eq!(report.stats.intermediates_removed, 2);
    }

    #[tokio::test]
    async fn test_small_remote_source_is_kept_as_chunk() {
        let server = MockServer::start().await;
        serve(&server, "/clip.mp3", vec![0u8; 2048]).await;
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let fake = FakeAudio::new(rate_for(2.0, 120.0));

        let source = SourceReference::parse(&format!("{}/clip.mp3", server.uri()));
        let chunks = coordinator(fake, &work).process_all(&source).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].exists());
        assert!(chunks[0].starts_with(&work));
    }

    #[tokio::test]
    async fn test_unsupported_url_is_rejected_before_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");

        let source = SourceReference::parse(&format!("{}/notes.xyz", server.uri()));
        let result = coordinator(FakeAudio::new(1.0), &work).process_all(&source).await;

        match result {
            Err(ChunkerError::UnsupportedFormat(ext)) => assert_eq!(ext, "xyz"),
            other => panic!("Expected UnsupportedFormat, got: {other:?}"),
        }
        assert_eq!(entries(&work), 0);
    }

    #[tokio::test]
    async fn test_server_error_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");

        let source = SourceReference::parse(&format!("{}/talk.mp3", server.uri()));
        let result = coordinator(FakeAudio::new(1.0), &work).process_all(&source).await;

        assert!(matches!(result, Err(ChunkerError::Download(_))));
        assert_eq!(entries(&work), 0);
    }
}
