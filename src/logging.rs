//! Tracing setup and response error logging

use serde::Deserialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Longest body excerpt written to the error log
pub const MAX_BODY_EXCERPT: usize = 500;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over `level` when set.
pub fn init(level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| crate::GatewayError::ConfigError(format!("Invalid log level: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| {
            crate::GatewayError::ConfigError(format!("Failed to set tracing subscriber: {}", e))
        })
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Message to log for a finished request, if any
///
/// A JSON body whose `code` is not 200 is reported as such. For error
/// statuses, framework `errors` take precedence, and an otherwise unexplained
/// body is logged truncated to [`MAX_BODY_EXCERPT`] characters.
pub fn response_error_message(status: u16, body: &[u8], errors: &[String]) -> Option<String> {
    let mut message = None;

    if !body.is_empty() {
        if let Ok(envelope) = serde_json::from_slice::<ResponseEnvelope>(body) {
            if envelope.code != 200 {
                message = Some(format!(
                    "error: code={}, message={}",
                    envelope.code, envelope.message
                ));
            }
        }
    }

    if status >= 400 {
        if !errors.is_empty() {
            message = Some(errors.join("; "));
        } else if message.is_none() && !body.is_empty() {
            let body = String::from_utf8_lossy(body);
            message = Some(if body.chars().count() > MAX_BODY_EXCERPT {
                let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
                format!("{}...", excerpt)
            } else {
                body.into_owned()
            });
        }
    }

    message
}

/// Log the error carried by a finished request, if any
pub fn log_response(status: u16, body: &[u8], errors: &[String]) {
    if let Some(message) = response_error_message(status, body, errors) {
        error!(status, "{}", message);
    }
}
