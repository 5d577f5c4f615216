use serde::{Deserialize, Serialize};

// API Request/Response models
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub findings: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

impl ReportRequest {
    /// Trimmed `(findings, template)`; absent or null fields become empty.
    pub fn normalized(&self) -> (&str, &str) {
        (
            self.findings.as_deref().unwrap_or_default().trim(),
            self.template.as_deref().unwrap_or_default().trim(),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
