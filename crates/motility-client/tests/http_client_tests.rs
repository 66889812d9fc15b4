//! Integration tests for the HTTP job client against a mock service.

use std::io::Write;
use std::sync::{Arc, Mutex};

use motility_client::{
    ClientConfig, ClientError, ExportFormat, HttpJobClient, RemoteJobClient, UploadProgress,
};
use motility_core::{AnalysisParameters, InputRef, RemoteId, RemoteState};
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpJobClient {
    let config = ClientConfig::new(&server.uri())
        .expect("mock server uri should be valid")
        .with_upload_chunk_size(256);
    HttpJobClient::new(config).expect("client should build")
}

fn fixture_video() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file should be created");
    file.write_all(&vec![7_u8; 1_024])
        .expect("fixture bytes should be written");
    file
}

#[tokio::test]
async fn http_client_tests_submit_uploads_multipart_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_string_contains("name=\"video\""))
        .and(body_string_contains("confidence_threshold"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "analysis_id": "job-42",
            "status": "processing",
            "message": "Video uploaded successfully",
            "estimated_time": "2-5 minutes"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let video = fixture_video();
    let input = InputRef::new(video.path().to_string_lossy().into_owned());
    let parameters = AnalysisParameters::new().with("confidence_threshold", 0.5);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: UploadProgress = Arc::new(move |percent| {
        sink.lock().expect("progress lock").push(percent);
    });

    let receipt = client_for(&server)
        .submit(&input, &parameters, Some(progress))
        .await
        .expect("submit should succeed");

    assert_eq!(receipt.remote_id.as_str(), "job-42");
    assert_eq!(receipt.estimated_time.as_deref(), Some("2-5 minutes"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn http_client_tests_submit_maps_validation_error_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": "invalid file"
        })))
        .mount(&server)
        .await;

    let video = fixture_video();
    let input = InputRef::new(video.path().to_string_lossy().into_owned());
    let error = client_for(&server)
        .submit(&input, &AnalysisParameters::new(), None)
        .await
        .expect_err("422 should fail");

    assert_eq!(
        error,
        ClientError::Server {
            status_code: 422,
            detail: Some("invalid file".to_string()),
        }
    );
    assert_eq!(error.user_message(), "invalid file");
}

#[tokio::test]
async fn http_client_tests_missing_media_is_a_media_error() {
    let server = MockServer::start().await;
    let input = InputRef::new("/definitely/not/here.mp4");

    let error = client_for(&server)
        .submit(&input, &AnalysisParameters::new(), None)
        .await
        .expect_err("missing file should fail");
    assert!(matches!(error, ClientError::Media(_)));
}

#[tokio::test]
async fn http_client_tests_status_maps_pending_to_processing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "analysis_id": "job-42",
            "status": "pending",
            "progress": 12.6,
            "message": "Queued"
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server)
        .fetch_status(&RemoteId::new("job-42").unwrap())
        .await
        .expect("status should parse");
    assert_eq!(snapshot.state, RemoteState::Processing);
    assert_eq!(snapshot.progress, 13);
    assert_eq!(snapshot.message.as_deref(), Some("Queued"));
}

#[tokio::test]
async fn http_client_tests_result_payload_keeps_summary_and_extras() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "summary": {"total_sperm": 120, "motile_sperm": 80, "motility_percentage": 66.7},
            "time_series": [{"time": 0.0, "sperm_count": 10, "motility": 60.0, "velocity": 20.5, "density": 1.2}],
            "quality_metrics": {"focus": "good"}
        })))
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .fetch_result(&RemoteId::new("job-42").unwrap())
        .await
        .expect("result should parse");
    assert_eq!(payload.summary.motility(), Some(66.7));
    assert_eq!(payload.time_series.len(), 1);
    assert!(payload.extra.contains_key("quality_metrics"));
}

#[tokio::test]
async fn http_client_tests_cancel_and_download_use_service_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/delete/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/job-42"))
        .and(query_param("format", "csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("time,count\n0,10\n"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let remote_id = RemoteId::new("job-42").unwrap();
    client.cancel(&remote_id).await.expect("cancel should succeed");

    let bytes = client
        .download(&remote_id, ExportFormat::Csv)
        .await
        .expect("download should succeed");
    assert!(bytes.starts_with(b"time,count"));
}

#[tokio::test]
async fn http_client_tests_history_health_and_statistics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": [
                {"analysis_id": "job-1", "status": "completed", "created_at": "2026-01-02T10:00:00"},
                {"analysis_id": "", "status": "failed"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "version": "1.0.0"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_analyses": 3})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let history = client.history().await.expect("history should parse");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].remote_id.as_str(), "job-1");

    let report = client.test_connection().await;
    assert!(report.success);
    assert!(report.latency.is_some());

    let statistics = client.statistics().await.expect("statistics should parse");
    assert_eq!(statistics["total_analyses"], 3);
}

#[tokio::test]
async fn http_client_tests_unreachable_server_is_a_transport_error() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    drop(server);

    let error = client
        .fetch_status(&RemoteId::new("job-42").unwrap())
        .await
        .expect_err("closed server should fail");
    assert!(matches!(error, ClientError::Transport(_)));
    assert_eq!(
        error.user_message(),
        "Network error - Please check your internet connection"
    );

    let report = client.test_connection().await;
    assert!(!report.success);
}
