use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::{gateway::GatewayError, identity::AuthenticationError};

/// Errors that know which HTTP status they should be reported with.
pub trait ApiRequestError: std::error::Error {
    fn status_code(&self) -> StatusCode;
}

#[derive(Debug)]
pub enum AppError {
    /// Rejected before reaching the store: bad input or a missing identity.
    Validation { msg: String, status: StatusCode },

    /// The store kept refusing the write because of concurrent writers. Safe
    /// to retry.
    Conflict(String),

    Gateway {
        error: GatewayError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },

    Unhandled(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation {
            msg: msg.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { status, .. } => *status,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway { error, .. } => error.status_code(),
            AppError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation { msg, .. } => write!(f, "{msg}"),
            AppError::Conflict(msg) => write!(f, "{msg}"),
            AppError::Gateway { error, .. } => write!(f, "{error}"),
            AppError::Unhandled(msg) => write!(f, "{msg}"),
        }
    }
}

impl ApiRequestError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Rejected(_) | GatewayError::Malformed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,

    #[cfg(debug_assertions)]
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();

        let (code, msg, retryable) = match &self {
            AppError::Validation { msg, .. } => ("INVALID_REQUEST", msg.clone(), false),
            AppError::Conflict(msg) => ("CONFLICT", msg.clone(), true),
            AppError::Gateway { error, .. } => {
                let (code, msg) = match error {
                    GatewayError::Conflict(_) => ("CONFLICT", error.to_string()),
                    GatewayError::NotFound(_) => ("NOT_FOUND", error.to_string()),
                    GatewayError::Transport(_) => ("STORE_UNAVAILABLE", "Store is unreachable".into()),
                    GatewayError::Rejected(_) | GatewayError::Malformed(_) => {
                        ("STORE_ERR", "Store error".into())
                    }
                };
                (code, msg, error.is_retryable())
            }
            AppError::Unhandled(msg) => ("ERR", msg.clone(), false),
        };

        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let error_response = ErrorResponse {
            code: code.into(),
            msg: Some(msg),
            retryable,
            #[cfg(debug_assertions)]
            debug_info: match &self {
                AppError::Gateway {
                    error,
                    backtrace: Some(backtrace),
                } => Some(HashMap::from([
                    (
                        "backtrace",
                        serde_json::to_value(filter_backtrace(backtrace)).unwrap_or_default(),
                    ),
                    ("error", Value::String(error.to_string())),
                ])),
                _ => None,
            },
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(error: GatewayError) -> Self {
        AppError::Gateway {
            error,

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }
}

impl From<AuthenticationError> for AppError {
    fn from(e: AuthenticationError) -> Self {
        AppError::Validation {
            status: e.status_code(),
            msg: e.to_string(),
        }
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Unhandled(e.into())
    }
}

impl<M: Into<String>> From<(M, StatusCode)> for AppError {
    fn from((msg, status): (M, StatusCode)) -> Self {
        AppError::Validation {
            msg: msg.into(),
            status,
        }
    }
}

#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = concat!(env!("CARGO_PKG_NAME"), "::");
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|f| f.to_owned()),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.display(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gateway_errors_map_to_statuses() {
        let transport: AppError = GatewayError::Transport("timed out".into()).into();
        assert_eq!(transport.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let missing: AppError = GatewayError::NotFound("post 3".into()).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let conflict = AppError::Conflict("vote".into());
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unauthenticated_is_rejected_as_validation() {
        let err: AppError = AuthenticationError::NoToken.into();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
