use anyhow::{Context, Result, anyhow};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Sends the request built by `build`, retrying while the backend reports it
/// is overloaded. Returns the response body of the first 2xx response.
///
/// `build` is called once per attempt because multipart bodies cannot be
/// cloned.
pub(crate) async fn send_with_retry<F>(label: &str, mut build: F) -> Result<String>
where
    F: FnMut() -> Result<RequestBuilder>,
{
    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = build()?
            .send()
            .await
            .with_context(|| format!("{} request failed", label))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        debug!("{} responded {} ({} bytes)", label, status, text.len());
        if status.is_success() {
            return Ok(text);
        }
        if is_rate_limited(status) && attempt < RATE_LIMIT_MAX_RETRIES {
            delay = wait_with_backoff(label, attempt, delay, retry_after).await;
            continue;
        }
        return Err(match extract_backend_error(&text) {
            Some(message) => anyhow!("{} failed with status: {} ({})", label, status, message),
            None => anyhow!("{} failed with status: {}", label, status),
        });
    }
}

pub(crate) fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || matches!(status.as_u16(), 503 | 529)
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn wait_with_backoff(
    label: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let mut wait = delay;
    if let Some(retry_after) = retry_after
        && retry_after > wait
    {
        wait = retry_after;
    }
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        label,
        wait.as_secs_f32(),
        attempt,
        RATE_LIMIT_MAX_RETRIES
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let next_secs = current
        .as_secs()
        .saturating_mul(2)
        .max(RATE_LIMIT_BASE_DELAY.as_secs());
    Duration::from_secs(next_secs).min(RATE_LIMIT_MAX_DELAY)
}

/// The backend reports failures as `{"error": "..."}`.
fn extract_backend_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.filter(|message| !message.trim().is_empty())
}
