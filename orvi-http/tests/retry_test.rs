use orvi_http::{HttpClient, HttpError, RequestOpts};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "busy"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"taskId": 7})))
        .mount(&server)
        .await;

    let client = HttpClient::new(&format!("{}/", server.uri())).unwrap();
    let got: Value = client
        .post_json("createTask", &json!({"clientKey": "k"}), RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(got["taskId"], 7);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/getBalance"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad key"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&format!("{}/", server.uri())).unwrap();
    let err = client
        .post_json::<_, Value>("getBalance", &json!({"clientKey": "k"}), RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::Api { status, message } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "bad key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn request_timeout_bounds_a_slow_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"taskId": 7}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(&format!("{}/", server.uri())).unwrap();
    let started = Instant::now();
    let err = client
        .post_json::<_, Value>(
            "createTask",
            &json!({"clientKey": "k"}),
            RequestOpts {
                timeout: Some(Duration::from_millis(100)),
                retries: Some(0),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Network(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
