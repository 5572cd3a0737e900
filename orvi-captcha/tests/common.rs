use orvi_captcha::AntiCaptchaClient;
use std::time::Duration;
use wiremock::MockServer;

pub fn client_for(server: &MockServer, timeout: Duration) -> AntiCaptchaClient {
    AntiCaptchaClient::new(
        "test-key",
        &format!("{}/", server.uri()),
        Duration::from_millis(10),
        timeout,
    )
    .expect("client")
}
