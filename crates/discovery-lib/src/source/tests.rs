//! Prometheus client tests against a mock HTTP server

#[cfg(test)]
mod mock_server_tests {
    use crate::models::QueryMode;
    use crate::observability::{AuditLog, AUDIT_LOG_FILE};
    use crate::source::{extract_result, FetchError, MetricsSource, PrometheusClient};
    use mockito::Matcher;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const INSTANT_BODY: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"namespace": "ns1", "owner_name": "deploy-a", "container_name": "web"},
                 "value": [1700000000, "128"]}
            ]
        }
    }"#;

    fn client(url: &str, audit: Arc<AuditLog>) -> PrometheusClient {
        PrometheusClient::with_base_url(url, Duration::from_secs(5), audit).unwrap()
    }

    #[tokio::test]
    async fn test_instant_query_returns_result_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                r#"sum(up{job="kubelet"}) by (namespace)"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(INSTANT_BODY)
            .create_async()
            .await;

        let source = client(&server.url(), Arc::new(AuditLog::disabled()));
        let samples = source
            .fetch(
                r#"sum(up{job="kubelet"}) by (namespace)"#,
                "result",
                QueryMode::Instant,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("owner_name"), Some("deploy-a"));
        assert_eq!(samples[0].latest_value(), Some("128"));
    }

    #[tokio::test]
    async fn test_range_query_passes_window_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "up".into()),
                Matcher::UrlEncoded("start".into(), "2026-10-17T00:00:00.000Z".into()),
                Matcher::UrlEncoded("end".into(), "2026-10-18T23:00:00.000Z".into()),
                Matcher::UrlEncoded("step".into(), "5m".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":{"result":[{"metric":{},"values":[[1,"1"],[2,"2"]]}]}}"#)
            .create_async()
            .await;

        let source = client(&server.url(), Arc::new(AuditLog::disabled()));
        let samples = source
            .fetch(
                "up&start=2026-10-17T00:00:00.000Z&end=2026-10-18T23:00:00.000Z&step=5m",
                "result",
                QueryMode::Range,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(samples[0].values.len(), 2);
        assert_eq!(samples[0].latest_value(), Some("2"));
    }

    #[tokio::test]
    async fn test_non_ok_status_is_fatal_and_audited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("bad_data: parse error")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(AUDIT_LOG_FILE);
        let audit = Arc::new(AuditLog::create(&log_path, false).unwrap());
        let source = client(&server.url(), audit.clone());

        let err = source
            .fetch("sum(", "result", QueryMode::Instant)
            .await
            .unwrap_err();

        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad_data: parse error");
            }
            other => panic!("expected status error, got {other:?}"),
        }

        audit.flush().unwrap();
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("/api/v1/query?query=sum("));
        assert!(log.contains("\n400\n"));
        assert!(log.contains("bad_data: parse error"));
    }

    #[tokio::test]
    async fn test_debug_mode_logs_every_query_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(INSTANT_BODY)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join(AUDIT_LOG_FILE);
        let audit = Arc::new(AuditLog::create(&log_path, true).unwrap());
        let source = client(&server.url(), audit.clone());

        source.fetch("up", "result", QueryMode::Instant).await.unwrap();
        audit.flush().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log, format!("{}/api/v1/query?query=up\n", server.url()));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_error() {
        let source = client("http://127.0.0.1:1", Arc::new(AuditLog::disabled()));
        let err = source
            .fetch("up", "result", QueryMode::Instant)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }

    #[test]
    fn test_query_url_layout() {
        let source = client("https://prom.example:9443/", Arc::new(AuditLog::disabled()));
        assert_eq!(
            source.query_url("up", QueryMode::Range),
            "https://prom.example:9443/api/v1/query_range?query=up"
        );
    }

    #[test]
    fn test_extract_result_errors() {
        let err = extract_result("u", "not json", "result").unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));

        let err = extract_result("u", r#"{"data":{}}"#, "result").unwrap_err();
        assert!(matches!(err, FetchError::MissingField { .. }));

        let err = extract_result("u", r#"{"data":{"result":"scalar"}}"#, "result").unwrap_err();
        assert!(matches!(err, FetchError::MissingField { .. }));

        let err = extract_result("u", r#"{"data":{"result":[{"metric":5}]}}"#, "result").unwrap_err();
        assert!(matches!(err, FetchError::Sample { .. }));
    }

    #[test]
    fn test_extract_result_other_field() {
        let samples =
            extract_result("u", r#"{"data":{"result":[],"targets":[{"metric":{"a":"b"}}]}}"#, "targets")
                .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("a"), Some("b"));
    }
}
