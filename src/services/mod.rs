//! Request-level operations. Handlers in `routes` stay thin and delegate
//! here; everything below works against `AppState` so it can be driven
//! from tests without HTTP.

pub mod deletion;
pub mod listings;
pub mod notifications;
pub mod reports;
pub mod restoration;

use std::fmt::Display;
use std::future::Future;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::state::AppState;

/// Runs a step whose failure must not fail the surrounding request.
/// Returns `None` when it errored or ran past the side-effect timeout.
pub(crate) async fn best_effort<T, E, F>(
    state: &AppState,
    step: &'static str,
    subject_id: Uuid,
    future: F,
) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(state.config.side_effect_timeout, future).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(step, %subject_id, error = %err, "side effect failed");
            None
        }
        Err(_) => {
            warn!(
                step,
                %subject_id,
                timeout_ms = state.config.side_effect_timeout.as_millis() as u64,
                "side effect timed out"
            );
            None
        }
    }
}

/// Runs fan-out work on its own task and waits for it up to the
/// side-effect timeout. Past that the request moves on and the task keeps
/// delivering; `None` means the result was not known in time.
pub(crate) async fn detach_after_timeout<T, F>(
    state: &AppState,
    step: &'static str,
    subject_id: Uuid,
    future: F,
) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(future);
    match tokio::time::timeout(state.config.side_effect_timeout, task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(step, %subject_id, error = %err, "side effect task failed");
            None
        }
        Err(_) => {
            info!(
                step,
                %subject_id,
                timeout_ms = state.config.side_effect_timeout.as_millis() as u64,
                "side effect still running; continuing in the background"
            );
            None
        }
    }
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// First `max_chars` characters, with an ellipsis when cut.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
