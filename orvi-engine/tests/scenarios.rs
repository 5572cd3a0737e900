mod common;

use common::{attempt_lines, harness, harness_with, logs_contain, request};
use orvi_drivers::mock::MockSession;
use orvi_engine::Credentials;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn login_page() -> MockSession {
    MockSession::new()
        .with_element("#user", "")
        .with_element("#pass", "")
        .with_element("#submit", "Entrar")
        .reveal_on_click("#submit", "#dashboard")
}

fn login_steps() -> serde_json::Value {
    json!([
        {"action": "navigate", "data": "https://bank.example/login"},
        {"action": "input", "element": "#user", "data": "alice"},
        {"action": "input", "element": "#pass", "data": "secret"},
        {"action": "click", "element": "#submit"},
        {"action": "wait", "target_element": "#dashboard", "timeout": 5000}
    ])
}

#[tokio::test]
async fn scenario_a_login_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(login_page(), tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": login_steps()}], "coordinates": {}})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success(), "{:#?}", report.logs());
    for step in 0..5 {
        assert_eq!(attempt_lines(&report, 0, step), 1, "step {step}");
    }
    assert_eq!(h.page.navigations(), vec!["https://bank.example/login"]);
    assert_eq!(
        h.page.fills(),
        vec![
            ("#user".to_string(), "alice".to_string()),
            ("#pass".to_string(), "secret".to_string())
        ]
    );
    assert!(!logs_contain(&report, "secret"));
    assert!(logs_contain(&report, "flow finished in 0m"));

    let shot = report.screenshot().expect("screenshot path");
    assert!(shot.exists());
    assert!(
        shot.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("execution_")
    );
    assert_eq!(h.page.close_count(), 1);
}

#[tokio::test]
async fn scenario_b_challenge_code_is_resolved() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new()
        .with_element("#challenge", " H3 ")
        .with_element("#coord", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({
                "sequences": [{"title": "Card", "steps": [
                    {"action": "dynamic_input", "element": "#coord", "data": "#challenge"}
                ]}],
                "coordinates": {"H3": "9012"}
            })),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success(), "{:#?}", report.logs());
    assert_eq!(
        h.page.fills(),
        vec![("#coord".to_string(), "9012".to_string())]
    );
    assert!(logs_contain(&report, "challenge code H3"));
    assert!(!logs_contain(&report, "9012"));
}

#[tokio::test]
async fn scenario_b_missing_coordinate_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new()
        .with_element("#challenge", "H3")
        .with_element("#coord", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({
                "sequences": [
                    {"title": "Card", "steps": [
                        {"action": "dynamic_input", "element": "#coord", "data": "#challenge"}
                    ]},
                    {"title": "Transfer", "steps": [
                        {"action": "navigate", "data": "https://bank.example/transfer"}
                    ]}
                ],
                "coordinates": {}
            })),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert!(logs_contain(&report, "MissingCoordinateError"));
    assert_eq!(attempt_lines(&report, 0, 0), 1);
    assert!(h.page.navigations().is_empty());
    assert!(!logs_contain(&report, "[1]"));
    assert!(h.page.fills().is_empty());
    assert_eq!(h.page.close_count(), 1);
}

#[tokio::test]
async fn scenario_c_missing_submit_exhausts_retries() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new()
        .with_element("#user", "")
        .with_element("#pass", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": login_steps()}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(attempt_lines(&report, 0, 3), 3);
    assert_eq!(attempt_lines(&report, 0, 4), 0);
    assert!(logs_contain(&report, "StepExecutionError: [0:3] click failed"));
    assert!(report.screenshot().is_some());
    assert_eq!(h.page.close_count(), 1);
}

#[tokio::test]
async fn retry_bound_follows_configuration() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness_with(MockSession::new(), tmp.path(), |deps| {
        deps.settings.retry_limit = 5;
    });

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": [
                {"action": "click", "element": "#never"}
            ]}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(attempt_lines(&report, 0, 0), 5);
    assert_eq!(h.page.lookups("#never"), 5);
}

#[tokio::test]
async fn env_references_come_from_the_credential_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().with_element("#user", "");
    let h = harness_with(page, tmp.path(), |deps| {
        deps.credentials = Credentials::new([("BANK_USER", "alice.w")]);
    });

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": [
                {"action": "input", "element": "#user", "data": "env:BANK_USER"}
            ]}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(
        h.page.fills(),
        vec![("#user".to_string(), "alice.w".to_string())]
    );
    assert!(!logs_contain(&report, "alice.w"));
}

#[tokio::test]
async fn unset_credential_is_a_resolution_error() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().with_element("#user", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": [
                {"action": "input", "element": "#user", "data": "env:ORVI_TEST_UNSET_USER"}
            ]}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert!(logs_contain(&report, "ResolutionError"));
    assert_eq!(attempt_lines(&report, 0, 0), 1);
}

#[tokio::test]
async fn navigate_reloads_when_already_on_the_page() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().at_url("https://bank.example/login/");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Login", "steps": [
                {"action": "navigate", "data": "https://bank.example/login"}
            ]}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(h.page.reloads(), 1);
    assert!(h.page.navigations().is_empty());
}

#[tokio::test]
async fn sequence_target_is_retried_per_intents() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().with_element("#submit", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{
                "title": "Login",
                "intents_number": 2,
                "target_element": "#dashboard",
                "target_element_wait": 0.05,
                "steps": [{"action": "click", "element": "#submit"}]
            }]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert!(logs_contain(&report, "sequence 'Login' started (try 2/2)"));
    assert!(logs_contain(&report, "sequence confirmation failed"));
    assert_eq!(h.page.clicks().len(), 2);
}

#[tokio::test]
async fn sequence_target_wait_defaults_to_step_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().with_element("#submit", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{
                "title": "Login",
                "target_element": "#dashboard",
                "steps": [{"action": "click", "element": "#submit"}]
            }]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert!(logs_contain(
        &report,
        "target #dashboard not visible: timed out after 50ms waiting for #dashboard"
    ));
}

#[tokio::test]
async fn sequence_target_confirms_completion() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(login_page(), tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{
                "title": "Login",
                "target_element": "#dashboard",
                "target_element_wait": 1,
                "steps": [
                    {"action": "input", "element": "#user", "data": "alice"},
                    {"action": "click", "element": "#submit"}
                ]
            }]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success(), "{:#?}", report.logs());
    assert!(logs_contain(&report, "target #dashboard confirmed"));
}

#[tokio::test]
async fn step_post_condition_is_checked() {
    let tmp = tempfile::tempdir().unwrap();
    let page = MockSession::new().with_element("#next", "");
    let h = harness(page, tmp.path());

    let report = h
        .service
        .execute(
            request(json!({"sequences": [{"title": "Transfer", "steps": [
                {"action": "click", "element": "#next", "target_element": "#confirm"}
            ]}]})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(attempt_lines(&report, 0, 0), 3);
    assert_eq!(h.page.clicks().len(), 3);
}
