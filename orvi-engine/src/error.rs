use crate::resolver::ResolveError;
use orvi_captcha::CaptchaError;

/// A malformed sequence or step. Raised before any browser action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("ConfigurationError: request contains no sequences")]
    NoSequences,

    #[error("ConfigurationError: {location}: unknown action `{action}`")]
    UnknownAction { location: String, action: String },

    #[error("ConfigurationError: {location}: `{action}` requires `{field}`")]
    MissingField {
        location: String,
        action: &'static str,
        field: &'static str,
    },

    #[error("ConfigurationError: {location}: {reason}")]
    Invalid { location: String, reason: String },
}

fn step_label(seq: &usize, step: &Option<usize>) -> String {
    match step {
        Some(step) => format!("{seq}:{step}"),
        None => format!("{seq}"),
    }
}

/// Run-level failure kinds. `Display` starts with the kind name so report
/// lines identify them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("ResolutionError: {0}")]
    Resolution(String),

    #[error("MissingCoordinateError: code `{code}` is not in the coordinate map")]
    MissingCoordinate { code: String },

    #[error("ChallengeParseError: no coordinate code in challenge text {text:?}")]
    ChallengeParse { text: String },

    #[error("CaptchaSolveError: {reason}")]
    CaptchaSolve { reason: String, retryable: bool },

    #[error("StepExecutionError: [{}] {action} failed: {reason}", step_label(.seq, .step))]
    StepExecution {
        seq: usize,
        step: Option<usize>,
        action: String,
        reason: String,
    },

    #[error("CapacityError: {0}")]
    Capacity(String),

    #[error("TimeoutError: {0}")]
    Timeout(String),

    #[error("SessionError: {0}")]
    SessionUnusable(String),

    #[error("SessionLaunchError: {0}")]
    SessionLaunch(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "ConfigurationError",
            EngineError::Resolution(_) => "ResolutionError",
            EngineError::MissingCoordinate { .. } => "MissingCoordinateError",
            EngineError::ChallengeParse { .. } => "ChallengeParseError",
            EngineError::CaptchaSolve { .. } => "CaptchaSolveError",
            EngineError::StepExecution { .. } => "StepExecutionError",
            EngineError::Capacity(_) => "CapacityError",
            EngineError::Timeout(_) => "TimeoutError",
            EngineError::SessionUnusable(_) => "SessionError",
            EngineError::SessionLaunch(_) => "SessionLaunchError",
        }
    }

    /// Whether the step interpreter may try the step again.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::ChallengeParse { .. } | EngineError::StepExecution { .. } => true,
            EngineError::CaptchaSolve { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<ResolveError> for EngineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingCoordinate(code) => EngineError::MissingCoordinate { code },
            other => EngineError::Resolution(other.to_string()),
        }
    }
}

impl From<CaptchaError> for EngineError {
    fn from(err: CaptchaError) -> Self {
        let retryable = !matches!(
            err,
            CaptchaError::InsufficientBalance | CaptchaError::Unsupported(_)
        );
        EngineError::CaptchaSolve {
            reason: err.to_string(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_leads_with_kind() {
        let err = EngineError::MissingCoordinate { code: "H3".into() };
        assert!(err.to_string().starts_with(err.kind()));

        let err = EngineError::StepExecution {
            seq: 0,
            step: Some(3),
            action: "click".into(),
            reason: "timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "StepExecutionError: [0:3] click failed: timed out"
        );

        let err = EngineError::from(ConfigurationError::NoSequences);
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(err.to_string().starts_with("ConfigurationError"));
    }

    #[test]
    fn balance_errors_are_not_retried() {
        let err = EngineError::from(CaptchaError::InsufficientBalance);
        assert!(!err.is_retryable());
        let err = EngineError::from(CaptchaError::EmptySolution);
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_coordinate_is_fatal() {
        let err = EngineError::from(ResolveError::MissingCoordinate("A1".into()));
        assert!(matches!(err, EngineError::MissingCoordinate { .. }));
        assert!(!err.is_retryable());
    }
}
