//! JSON request/response boundary

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::context::Params;
use crate::error::Diagnostic;

/// Malformed request input
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("invalid request field: {0}")]
    InvalidField(serde_json::Error),
    #[error("missing required field: template")]
    MissingTemplate,
}

impl From<RequestError> for Diagnostic {
    fn from(err: RequestError) -> Self {
        Diagnostic::validation(err.to_string())
    }
}

/// A render request; unknown fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub template: Option<String>,
    /// Scalar-valued parameters; absent is the same as empty
    #[serde(default)]
    pub params: Option<Params>,
    /// Anything other than a string selects the default mode
    #[serde(default, deserialize_with = "mode_name")]
    pub mode: Option<String>,
}

fn mode_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(name) => Ok(Some(name)),
        _ => Ok(None),
    }
}

impl RenderRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Parse a request from a JSON body
    pub fn from_json(body: &str) -> Result<Self, RequestError> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(RequestError::InvalidJson)?;
        if !value.is_object() {
            return Err(RequestError::NotAnObject);
        }
        serde_json::from_value(value).map_err(RequestError::InvalidField)
    }

    /// The template source, which every request must carry
    pub fn template(&self) -> Result<&str, RequestError> {
        self.template.as_deref().ok_or(RequestError::MissingTemplate)
    }
}

/// Status and JSON body handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Response {
    pub fn success(result: String) -> Self {
        Self {
            status: 200,
            body: json!({ "result": result }),
        }
    }

    pub fn failure(diagnostic: &Diagnostic) -> Self {
        Self {
            status: diagnostic.kind.status(),
            body: json!({
                "status": "ERROR",
                "kind": diagnostic.kind.as_str(),
                "message": diagnostic.message,
                "line": diagnostic.position.map(|p| p.line),
                "column": diagnostic.position.map(|p| p.column),
                "origin": diagnostic.origin,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Rendered text of a successful response
    pub fn result(&self) -> Option<&str> {
        self.body.get("result").and_then(|v| v.as_str())
    }

    pub fn body_string(&self) -> String {
        self.body.to_string()
    }
}

impl From<Result<String, Diagnostic>> for Response {
    fn from(result: Result<String, Diagnostic>) -> Self {
        match result {
            Ok(text) => Response::success(text),
            Err(diag) => Response::failure(&diag),
        }
    }
}
