//! Integration tests for the HTTP collaborator adapters
//!
//! Tests cover:
//! - Queue attribute parsing and failure mapping
//! - Running-task counting and desired-count writes
//! - Metric publication
//! - A full cycle over HTTP against a stub server

use backlog_autoscaler::{
    ActuationOutcome, BacklogMetric, CapacityParameters, ControlLoop, CooldownPolicy,
    CycleOutcome, FleetInspector, FleetScaler, HttpMetricEmitter, HttpOrchestratorClient,
    HttpQueueInspector, MetricEmitter, MetricTarget, QueueInspector, ScalingActuator,
    ScalingError,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn orchestrator(server: &MockServer) -> HttpOrchestratorClient {
    HttpOrchestratorClient::new(&server.uri(), "queue-cluster", "queue-processing", TIMEOUT)
        .unwrap()
}

fn metric_target() -> MetricTarget {
    MetricTarget {
        namespace: "QueueProcessing".to_string(),
        name: "BacklogPerWorker".to_string(),
        unit: "Count".to_string(),
        cluster: "queue-cluster".to_string(),
        service: "queue-processing".to_string(),
    }
}

#[tokio::test]
async fn test_queue_inspector_reads_attributes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Attributes": {
                "ApproximateNumberOfMessages": "450",
                "ApproximateNumberOfMessagesNotVisible": "12",
                "QueueArn": "arn:queue:jobs"
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let inspector = HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap();
    let snapshot = inspector.backlog().await.unwrap();

    assert_eq!(snapshot.approximate_message_count, 450);
    assert_eq!(snapshot.approximate_in_flight_count, Some(12));
}

#[tokio::test]
async fn test_queue_inspector_ignores_non_count_attributes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Attributes": {
                "ApproximateNumberOfMessages": "450",
                "FifoQueue": false,
                "RedrivePolicy": { "maxReceiveCount": 5 },
                "MessageRetentionPeriod": 18446744073709551615u64,
                "DelaySeconds": 0.5
            }
        })))
        .mount(&mock_server)
        .await;

    let inspector = HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap();
    let snapshot = inspector.backlog().await.unwrap();

    assert_eq!(snapshot.approximate_message_count, 450);
    assert_eq!(snapshot.approximate_in_flight_count, None);
}

#[tokio::test]
async fn test_queue_inspector_error_status_is_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let inspector = HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap();
    let err = inspector.backlog().await.unwrap_err();

    assert!(matches!(
        err,
        ScalingError::ObservationUnavailable {
            collaborator: "queue",
            ..
        }
    ));
}

#[tokio::test]
async fn test_queue_inspector_missing_attribute_is_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Attributes": {} })))
        .mount(&mock_server)
        .await;

    let inspector = HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap();
    let err = inspector.backlog().await.unwrap_err();

    assert!(matches!(err, ScalingError::ObservationUnavailable { .. }));
}

#[tokio::test]
async fn test_queue_inspector_negative_count_is_invalid() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Attributes": { "ApproximateNumberOfMessages": "-4" }
        })))
        .mount(&mock_server)
        .await;

    let inspector = HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap();
    let err = inspector.backlog().await.unwrap_err();

    assert!(matches!(err, ScalingError::InvalidParameters { .. }));
}

#[tokio::test]
async fn test_queue_inspector_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Attributes": { "ApproximateNumberOfMessages": "1" } }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let inspector =
        HttpQueueInspector::new(&mock_server.uri(), "jobs", Duration::from_millis(100)).unwrap();
    let err = inspector.backlog().await.unwrap_err();

    assert!(matches!(err, ScalingError::ObservationUnavailable { .. }));
}

#[tokio::test]
async fn test_fleet_inspector_counts_running_tasks() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/clusters/queue-cluster/services/queue-processing/tasks"))
        .and(query_param("desiredStatus", "RUNNING"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskArns": ["task/a", "task/b", "task/c"]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let snapshot = orchestrator(&mock_server).active_workers().await.unwrap();
    assert_eq!(snapshot.active_worker_count, 3);
}

#[tokio::test]
async fn test_fleet_inspector_malformed_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/clusters/queue-cluster/services/queue-processing/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tasks": 3 })))
        .mount(&mock_server)
        .await;

    let err = orchestrator(&mock_server).active_workers().await.unwrap_err();
    assert!(matches!(
        err,
        ScalingError::ObservationUnavailable {
            collaborator: "fleet",
            ..
        }
    ));
}

#[tokio::test]
async fn test_fleet_scaler_posts_desired_count() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/clusters/queue-cluster/services/queue-processing/desired-count",
        ))
        .and(body_json(json!({
            "cluster": "queue-cluster",
            "service": "queue-processing",
            "desiredCount": 23
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = orchestrator(&mock_server).set_desired_worker_count(23).await;
    assert!(result.is_ok(), "Scaler should succeed with 200 response");
}

#[tokio::test]
async fn test_fleet_scaler_does_not_retry_on_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/clusters/queue-cluster/services/queue-processing/desired-count",
        ))
        .respond_with(ResponseTemplate::new(429).set_body_string("throttled"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = orchestrator(&mock_server)
        .set_desired_worker_count(23)
        .await
        .unwrap_err();

    match err {
        ScalingError::ScalingActionFailed { attempted, message } => {
            assert_eq!(attempted, 23);
            assert!(message.contains("throttled"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_metric_emitter_publishes_datum() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/metrics"))
        .and(body_partial_json(json!({
            "namespace": "QueueProcessing",
            "metricData": [{
                "metricName": "BacklogPerWorker",
                "value": 22.5,
                "unit": "Count",
                "dimensions": [
                    { "name": "ClusterName", "value": "queue-cluster" },
                    { "name": "ServiceName", "value": "queue-processing" }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let emitter = HttpMetricEmitter::new(&mock_server.uri(), TIMEOUT).unwrap();
    let metric: BacklogMetric = metric_target().datum(22.5, Utc::now());

    assert!(emitter.emit(&metric).await.is_ok());
}

#[tokio::test]
async fn test_metric_emitter_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let emitter = HttpMetricEmitter::new(&mock_server.uri(), TIMEOUT).unwrap();
    let err = emitter
        .emit(&metric_target().datum(1.0, Utc::now()))
        .await
        .unwrap_err();

    assert!(matches!(err, ScalingError::MetricEmissionFailed { .. }));
}

#[tokio::test]
async fn test_full_cycle_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/queues/jobs/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Attributes": { "ApproximateNumberOfMessages": "450" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/clusters/queue-cluster/services/queue-processing/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskArns": ["task/a"]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(
            "/clusters/queue-cluster/services/queue-processing/desired-count",
        ))
        .and(body_partial_json(json!({ "desiredCount": 23 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = Arc::new(orchestrator(&mock_server));
    let control = ControlLoop::new(
        CapacityParameters::new(10.0, 0.5, 1, 40).unwrap(),
        metric_target(),
        Arc::new(HttpQueueInspector::new(&mock_server.uri(), "jobs", TIMEOUT).unwrap()),
        orchestrator.clone(),
        Arc::new(HttpMetricEmitter::new(&mock_server.uri(), TIMEOUT).unwrap()),
        TIMEOUT,
    )
    .with_actuator(ScalingActuator::new(
        orchestrator,
        CooldownPolicy::default(),
        TIMEOUT,
    ));

    let report = control.run_cycle().await.unwrap();

    assert_eq!(report.decision.desired_worker_count, 23);
    assert_eq!(report.decision.backlog_per_worker, 450.0);
    assert!(report.metric_emitted);
    assert!(matches!(
        report.outcome,
        CycleOutcome::Actuated(ActuationOutcome::Applied {
            previous_worker_count: 1,
            desired_worker_count: 23,
            ..
        })
    ));
}
