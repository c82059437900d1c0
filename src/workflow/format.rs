//! Rendering of the final requirements document.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::WorkflowError;

const DOCUMENT_TITLE: &str = "Business requirements";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    #[default]
    Markdown,
    Json,
}

impl ResultFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ResultFormat::Markdown => "text/markdown; charset=utf-8",
            ResultFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::Markdown => ".md",
            ResultFormat::Json => ".json",
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultFormat::Markdown => write!(f, "markdown"),
            ResultFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ResultFormat {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "markdown" | "md" => Ok(ResultFormat::Markdown),
            "json" => Ok(ResultFormat::Json),
            other => Err(WorkflowError::Validation(format!(
                "unsupported format: {other} (expected markdown or json)"
            ))),
        }
    }
}

/// A rendered document plus what a download needs to describe it
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResult {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: String,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    title: &'a str,
    requirements: &'a str,
}

pub fn format_result(
    name: &str,
    result: &str,
    format: ResultFormat,
) -> Result<FormattedResult, WorkflowError> {
    let body = match format {
        ResultFormat::Markdown => format!("# {DOCUMENT_TITLE}\n\n{result}\n"),
        ResultFormat::Json => serde_json::to_string_pretty(&JsonDocument {
            title: DOCUMENT_TITLE,
            requirements: result,
        })
        .map_err(|e| WorkflowError::Internal(format!("render result: {e}")))?,
    };

    Ok(FormattedResult {
        content_type: format.content_type(),
        file_name: format!("requirements-{name}{}", format.extension()),
        body,
    })
}
