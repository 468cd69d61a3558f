// SPDX-License-Identifier: BUSL-1.1
//! Backoff for collaborator HTTP calls.
//!
//! Transport failures and `429 Too Many Requests` are retried; every other
//! response goes straight back to the caller. On a 429 the server's
//! `Retry-After` (delta-seconds form) replaces the computed delay, capped at
//! [`Backoff::cap`]. When retries run out the last result is returned as is,
//! so a caller may still see a 429.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    /// Attempts after the first request.
    pub max_retries: u32,
    /// First delay; doubles per retry.
    pub base: Duration,
    /// Upper bound for any single wait, including a server-requested one.
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    fn delay(&self, retry: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(retry)).min(self.cap)
    }

    fn throttled_delay(&self, retry: u32, headers: &HeaderMap) -> Duration {
        retry_after(headers).map_or_else(|| self.delay(retry), |d| d.min(self.cap))
    }

    /// Send a request built by `f`, retrying per the rules above.
    ///
    /// `f` must rebuild the request each time. Money-moving callers attach an
    /// idempotency key so a retry that already reached the processor is not
    /// applied twice.
    pub(crate) async fn send<F, Fut>(&self, operation: &str, f: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut retry = 0;
        loop {
            let result = f().await;
            if retry == self.max_retries {
                return result;
            }
            let wait = match &result {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = self.throttled_delay(retry, resp.headers());
                    tracing::warn!(
                        operation,
                        retry = retry + 1,
                        max_retries = self.max_retries,
                        "collaborator throttled the request, retrying in {wait:?}"
                    );
                    Some(wait)
                }
                Ok(_) => None,
                Err(e) => {
                    let wait = self.delay(retry);
                    tracing::warn!(
                        operation,
                        retry = retry + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "collaborator request failed, retrying in {wait:?}"
                    );
                    Some(wait)
                }
            };
            match wait {
                None => return result,
                Some(wait) => tokio::time::sleep(wait).await,
            }
            retry += 1;
        }
    }
}

/// `Retry-After` in seconds. The HTTP-date form is ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick() -> Backoff {
        Backoff {
            max_retries: 2,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(10),
        }
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        let b = Backoff::default();
        assert_eq!(b.delay(0), Duration::from_millis(200));
        assert_eq!(b.delay(2), Duration::from_millis(800));
        assert_eq!(b.delay(10), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_seconds_are_honoured_and_capped() {
        let b = Backoff::default();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(b.throttled_delay(0, &headers), Duration::from_secs(2));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(b.throttled_delay(0, &headers), Duration::from_secs(5));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(b.throttled_delay(1, &headers), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn exhausts_all_attempts_on_transport_failure() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();

        let result = quick()
            .send("transfer", || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    // Closed port: connection refused.
                    reqwest::Client::builder()
                        .timeout(Duration::from_millis(50))
                        .build()
                        .unwrap()
                        .get("http://127.0.0.1:1/")
                        .send()
                        .await
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_error_is_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let resp = quick().send("refund", || client.get(&url).send()).await.unwrap();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn throttled_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let resp = quick().send("transfer", || client.get(&url).send()).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistent_throttling_returns_the_last_response() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let resp = quick().send("transfer", || client.get(&url).send()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
