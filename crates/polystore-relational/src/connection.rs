//! Connection helpers shared by the relational contexts.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use polystore_core::config::relational::ResilienceSettings;
use polystore_core::error::ErrorKind;
use polystore_core::result::AppResult;

/// Run `attempt` until it succeeds or the retry budget is spent.
///
/// The delay grows linearly with the attempt number. Configuration errors
/// are returned immediately.
pub(crate) async fn retry<T, F, Fut>(
    provider: &str,
    resilience: &ResilienceSettings,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut tries: u32 = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind == ErrorKind::Configuration || tries >= resilience.max_retry_count => {
                return Err(e);
            }
            Err(e) => {
                tries += 1;
                let delay = Duration::from_millis(resilience.retry_delay_millis * u64::from(tries));
                warn!(
                    provider,
                    attempt = tries,
                    max_retries = resilience.max_retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Mask the password portion of a database URL for safe logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    mask_ado_password(url)
}

/// Mask `Password=...` in an ADO.NET style connection string.
fn mask_ado_password(conn: &str) -> String {
    conn.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if matches!(
                    key.trim().to_ascii_lowercase().as_str(),
                    "password" | "pwd"
                ) =>
            {
                format!("{key}=****")
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Append `key=value` to a URL query string.
pub(crate) fn with_query_param(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}
