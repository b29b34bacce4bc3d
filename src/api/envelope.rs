//! API result envelope.
//!
//! Every API request is answered with the same shape regardless of
//! outcome: `{"status": "ok"|"failed", "message": ..., "echo": ...}` plus
//! optional `data`. The correlation token is always echoed back, `null`
//! included, so clients can match responses to requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome discriminator of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    /// The action was performed.
    Ok,
    /// The action was rejected or failed.
    Failed,
}

/// Response envelope for one API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    /// Outcome of the call.
    pub status: ApiStatus,
    /// Human-readable result message.
    pub message: String,
    /// Correlation token from the request, echoed verbatim.
    pub echo: Option<Value>,
    /// Endpoint-specific result payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl ApiEnvelope {
    /// Builds a success envelope.
    #[must_use]
    pub fn ok(message: impl Into<String>, echo: Option<Value>) -> Self {
        Self {
            status: ApiStatus::Ok,
            message: message.into(),
            echo,
            data: None,
        }
    }

    /// Builds a success envelope carrying a result payload.
    #[must_use]
    pub fn ok_with_data(message: impl Into<String>, echo: Option<Value>, data: Value) -> Self {
        Self {
            status: ApiStatus::Ok,
            message: message.into(),
            echo,
            data: Some(data),
        }
    }

    /// Builds a failure envelope. The correlation token is preserved.
    #[must_use]
    pub fn failed(message: impl Into<String>, echo: Option<Value>) -> Self {
        Self {
            status: ApiStatus::Failed,
            message: message.into(),
            echo,
            data: None,
        }
    }
}
