use crate::error::{ProviderError, TransientKind};
use rand::Rng;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff with random jitter for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to every backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.backoff(attempt));
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Sends a request built by `send`, retrying transient failures per `policy`.
///
/// Returns the body of the first successful response. The body is read inside
/// the retry loop, so a stalled body counts as a timeout like a stalled
/// connect. Permanent failures (credentials, quota, content policy, other
/// client errors) are returned immediately.
pub(crate) async fn send_with_retry<F, Fut>(
    provider: &'static str,
    policy: &RetryPolicy,
    mut send: F,
) -> Result<String, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let (kind, details, retry_after) = match send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => return Ok(body),
                Err(error) => (transport_kind(&error), format!("reading body: {error}"), None),
            },
            Ok(response) => {
                let status = response.status();
                let retry_after = retry_after_header(&response);
                let body = response.text().await.unwrap_or_default();
                let kind = classify_status(provider, status, &body)?;
                (kind, format!("status {status}: {}", error_message(&body)), retry_after)
            }
            Err(error) => (transport_kind(&error), error.to_string(), None),
        };

        if attempt >= max_attempts {
            return Err(ProviderError::Transient {
                provider,
                kind,
                attempts: attempt,
                details,
            });
        }

        let delay = policy.delay(attempt, retry_after);
        warn!(
            provider,
            %kind,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "retrying provider request"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn transport_kind(error: &reqwest::Error) -> TransientKind {
    if error.is_timeout() {
        TransientKind::Timeout
    } else {
        TransientKind::Network
    }
}

/// Maps a non-success status to a retryable kind, or to a permanent error.
pub(crate) fn classify_status(
    provider: &'static str,
    status: StatusCode,
    body: &str,
) -> Result<TransientKind, ProviderError> {
    let code = error_code(body);
    let details = format!("status {status}: {}", error_message(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        if code.as_deref() == Some("insufficient_quota") {
            return Err(ProviderError::Quota { provider, details });
        }
        return Ok(TransientKind::RateLimited);
    }
    if status.is_server_error() {
        return Ok(TransientKind::Server);
    }
    if status == StatusCode::REQUEST_TIMEOUT {
        return Ok(TransientKind::Timeout);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Auth { provider, details });
    }
    if matches!(
        code.as_deref(),
        Some("content_policy_violation") | Some("content_filter")
    ) {
        return Err(ProviderError::ContentPolicy { provider, details });
    }

    Err(ProviderError::BackendResponse { provider, details })
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn error_code(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .pointer("/error/code")
        .or_else(|| parsed.pointer("/error/type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
