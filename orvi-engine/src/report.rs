use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of one execution. Built once by the runner and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    success: bool,
    screenshot: Option<PathBuf>,
    logs: Vec<String>,
}

impl ExecutionReport {
    pub fn new(success: bool, screenshot: Option<PathBuf>, logs: Vec<String>) -> Self {
        Self {
            success,
            screenshot,
            logs,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn screenshot(&self) -> Option<&Path> {
        self.screenshot.as_deref()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_to_the_response_shape() {
        let report = ExecutionReport::new(
            false,
            Some(PathBuf::from("screenshots/execution_20250101_120000_x.png")),
            vec!["line".into()],
        );
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "success": false,
                "screenshot": "screenshots/execution_20250101_120000_x.png",
                "logs": ["line"]
            })
        );
        let none = ExecutionReport::new(false, None, vec![]);
        assert_eq!(serde_json::to_value(&none).unwrap()["screenshot"], json!(null));
    }
}
