//! Blocking PagerDuty REST v2 client.
//!
//! Thin wrapper over reqwest: token auth, classic limit/offset
//! pagination, and bounded retries with exponential backoff for
//! throttling and server errors. The [`Upstream`] trait is the seam the
//! sync layer consumes; `test_utils` provides an in-memory stand-in.

pub mod records;

use std::time::Duration;

use reqwest::blocking::{RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;

/// Public PagerDuty REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.pagerduty.com";

/// Hard per-page cap enforced by the API.
pub const PAGE_LIMIT: usize = 100;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PdError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authorization failed (HTTP {0}); check the API token")]
    AuthFailed(u16),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Malformed response envelope: {0}")]
    Envelope(String),
    #[error("Request exhausted {0} retries")]
    RetriesExhausted(u32),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: StatusCode) -> RetryDecision {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

fn send_with_retry(request: RequestBuilder, policy: &RetryPolicy) -> Result<Response, PdError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().map_err(PdError::Http);
        };

        match cloned.send() {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "pagerduty retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    std::thread::sleep(delay);
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "pagerduty retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    continue;
                }
                return Err(PdError::Http(err));
            }
        }
    }

    Err(PdError::RetriesExhausted(attempts))
}

// ============================================================================
// Session
// ============================================================================

/// The envelope key wrapping a resource's payload is the last path
/// segment: `incidents` for `incidents`, `log_entries` for
/// `incidents/{id}/log_entries`.
fn envelope_key(resource: &str) -> &str {
    let trimmed = resource.trim_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Authenticated blocking session against one PagerDuty account.
pub struct PdSession {
    http: reqwest::blocking::Client,
    token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl PdSession {
    pub fn new(token: impl Into<String>) -> Result<Self, PdError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the session at a non-default endpoint (regional API or a
    /// local test server).
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, PdError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    fn get_json(&self, resource: &str, params: &[(String, String)]) -> Result<Value, PdError> {
        let url = format!("{}/{}", self.base_url, resource.trim_start_matches('/'));
        let request = self
            .http
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token token={}", self.token),
            )
            .header(
                reqwest::header::ACCEPT,
                "application/vnd.pagerduty+json;version=2",
            )
            .query(params);

        let resp = send_with_retry(request, &self.retry)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PdError::AuthFailed(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(PdError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json()?)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Lazy page-by-page iterator over a classic-paginated resource.
///
/// Pages are fetched on demand, so a consumer that stops early never
/// requests the remaining pages. After a fetch error the iterator yields
/// that error once and then fuses.
struct PageIter<'s> {
    session: &'s PdSession,
    resource: String,
    params: Vec<(String, String)>,
    buffer: std::vec::IntoIter<Value>,
    offset: usize,
    more: bool,
    failed: bool,
}

impl<'s> PageIter<'s> {
    fn new(session: &'s PdSession, resource: &str, params: &[(String, String)]) -> Self {
        Self {
            session,
            resource: resource.to_string(),
            params: params.to_vec(),
            buffer: Vec::new().into_iter(),
            offset: 0,
            more: true,
            failed: false,
        }
    }

    fn fetch_page(&mut self) -> Result<(), PdError> {
        let mut params = self.params.clone();
        params.push(("offset".to_string(), self.offset.to_string()));

        let body = self.session.get_json(&self.resource, &params)?;
        let key = envelope_key(&self.resource);
        let items = body
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                PdError::Envelope(format!(
                    "missing `{}` array in {} response",
                    key, self.resource
                ))
            })?;

        self.offset += items.len();
        self.more = body.get("more").and_then(Value::as_bool).unwrap_or(false)
            && !items.is_empty();
        self.buffer = items.into_iter();
        Ok(())
    }
}

impl Iterator for PageIter<'_> {
    type Item = Result<Value, PdError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if !self.more {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}

// ============================================================================
// Upstream seam
// ============================================================================

/// Read access to the remote API, as consumed by the sync layer.
pub trait Upstream {
    /// Iterate every item of a paginated resource, fetching pages lazily.
    fn iter_all<'s>(
        &'s self,
        resource: &str,
        params: &[(String, String)],
    ) -> Box<dyn Iterator<Item = Result<Value, PdError>> + 's>;

    /// Single GET of a resource, unwrapped from its response envelope.
    fn rget(&self, resource: &str) -> Result<Value, PdError>;
}

impl Upstream for PdSession {
    fn iter_all<'s>(
        &'s self,
        resource: &str,
        params: &[(String, String)],
    ) -> Box<dyn Iterator<Item = Result<Value, PdError>> + 's> {
        Box::new(PageIter::new(self, resource, params))
    }

    fn rget(&self, resource: &str) -> Result<Value, PdError> {
        let body = self.get_json(resource, &[])?;
        let key = envelope_key(resource);
        body.get(key).cloned().ok_or_else(|| {
            PdError::Envelope(format!("missing `{}` in {} response", key, resource))
        })
    }
}

// ============================================================================
// Test doubles
// ============================================================================

#[cfg(test)]
pub mod test_utils {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    use serde_json::Value;

    use super::{envelope_key, PdError, Upstream};

    /// Canned in-memory [`Upstream`].
    ///
    /// Each `stage_items` call appends one batch for a resource;
    /// successive `iter_all` calls consume batches in order, and the
    /// last staged batch is sticky so single-batch setups behave like a
    /// static server. Query params are recorded for assertions.
    #[derive(Default)]
    pub struct FakeUpstream {
        items: RefCell<HashMap<String, VecDeque<Vec<Value>>>>,
        rgets: HashMap<String, Value>,
        fail_after: HashMap<String, usize>,
        pub recorded_params: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl FakeUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stage_items(&mut self, resource: &str, items: Vec<Value>) {
            self.items
                .borrow_mut()
                .entry(resource.to_string())
                .or_default()
                .push_back(items);
        }

        pub fn stage_rget(&mut self, resource: &str, value: Value) {
            self.rgets.insert(resource.to_string(), value);
        }

        /// Make iteration over `resource` yield an error after `n` good
        /// items.
        pub fn fail_iteration_after(&mut self, resource: &str, n: usize) {
            self.fail_after.insert(resource.to_string(), n);
        }

        fn take_batch(&self, resource: &str) -> Vec<Value> {
            let mut map = self.items.borrow_mut();
            match map.get_mut(resource) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some(queue) => queue.front().cloned().unwrap_or_default(),
                None => Vec::new(),
            }
        }
    }

    impl Upstream for FakeUpstream {
        fn iter_all<'s>(
            &'s self,
            resource: &str,
            params: &[(String, String)],
        ) -> Box<dyn Iterator<Item = Result<Value, PdError>> + 's> {
            self.recorded_params
                .borrow_mut()
                .push((resource.to_string(), params.to_vec()));

            let mut out: Vec<Result<Value, PdError>> =
                self.take_batch(resource).into_iter().map(Ok).collect();
            if let Some(&n) = self.fail_after.get(resource) {
                out.truncate(n);
                out.push(Err(PdError::Envelope(format!(
                    "missing `{}` array in {} response",
                    envelope_key(resource),
                    resource
                ))));
            }
            Box::new(out.into_iter())
        }

        fn rget(&self, resource: &str) -> Result<Value, PdError> {
            self.rgets.get(resource).cloned().ok_or_else(|| {
                PdError::ApiError {
                    status: 404,
                    message: format!("no canned response for {}", resource),
                }
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
