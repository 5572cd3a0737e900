use fantoccini::elements::Element;
use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
/// Types text one key at a time with a jittered delay, as a person would.
pub struct Typist {
    key_delay_ms: u64,
}

impl Typist {
    pub fn new(key_delay_ms: u64) -> Self {
        Self { key_delay_ms }
    }

    /// Delay before the next key: the base delay plus up to 50% jitter.
    pub fn next_delay(&self) -> Duration {
        if self.key_delay_ms == 0 {
            return Duration::ZERO;
        }
        let jitter = OsRng.gen_range(0..=self.key_delay_ms / 2);
        Duration::from_millis(self.key_delay_ms + jitter)
    }

    pub async fn type_into(
        &self,
        element: &Element,
        text: &str,
    ) -> Result<(), fantoccini::error::CmdError> {
        for ch in text.chars() {
            element.send_keys(&ch.to_string()).await?;
            let delay = self.next_delay();
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        Ok(())
    }
}
