use std::time::Duration;

/// Browser failures, classified so the engine can pick a recovery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("timed out after {}ms waiting for {what}", waited.as_millis())]
    Timeout { what: String, waited: Duration },

    #[error("no element matches `{0}`")]
    NotFound(String),

    #[error("stale element reference: {0}")]
    Stale(String),

    /// Another element (usually a modal) received the click.
    #[error("element click intercepted: {0}")]
    Intercepted(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The session is gone; nothing further can run on it.
    #[error("browser session unusable: {0}")]
    Unusable(String),

    #[error("could not start browser session: {0}")]
    Launch(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        DriverError::Timeout {
            what: what.into(),
            waited,
        }
    }

    /// Map a WebDriver error message onto a variant.
    ///
    /// ```
    /// use orvi_drivers::DriverError;
    ///
    /// let err = DriverError::classify("stale element reference: element is not attached");
    /// assert!(matches!(err, DriverError::Stale(_)));
    /// ```
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("stale element") {
            DriverError::Stale(message)
        } else if lower.contains("click intercepted")
            || lower.contains("not interactable")
            || lower.contains("other element would receive the click")
        {
            DriverError::Intercepted(message)
        } else if lower.contains("no such element") || lower.contains("unable to locate") {
            DriverError::NotFound(message)
        } else if lower.contains("invalid session id")
            || lower.contains("session deleted")
            || lower.contains("chrome not reachable")
            || lower.contains("no such window")
            || lower.contains("disconnected")
        {
            DriverError::Unusable(message)
        } else if lower.contains("net::err") || lower.contains("navigation") {
            DriverError::Navigation(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            DriverError::Timeout {
                what: message,
                waited: Duration::ZERO,
            }
        } else {
            DriverError::Other(message)
        }
    }

    /// Whether another attempt on the same session can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DriverError::Unusable(_) | DriverError::Launch(_))
    }
}

impl From<fantoccini::error::CmdError> for DriverError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        use fantoccini::error::CmdError;
        match err {
            CmdError::WaitTimeout => DriverError::timeout("condition", Duration::ZERO),
            other => DriverError::classify(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webdriver_messages_are_classified() {
        assert!(matches!(
            DriverError::classify("element click intercepted: Element <button> is not clickable"),
            DriverError::Intercepted(_)
        ));
        assert!(matches!(
            DriverError::classify("no such element: Unable to locate element"),
            DriverError::NotFound(_)
        ));
        assert!(matches!(
            DriverError::classify("invalid session id"),
            DriverError::Unusable(_)
        ));
        assert!(matches!(
            DriverError::classify("unknown error: net::ERR_NAME_NOT_RESOLVED"),
            DriverError::Navigation(_)
        ));
        assert!(matches!(
            DriverError::classify("something odd"),
            DriverError::Other(_)
        ));
    }

    #[test]
    fn lost_sessions_are_not_transient() {
        assert!(!DriverError::Unusable("gone".into()).is_transient());
        assert!(DriverError::Stale("reload".into()).is_transient());
        assert!(DriverError::timeout("#x", Duration::from_millis(5)).is_transient());
    }
}
