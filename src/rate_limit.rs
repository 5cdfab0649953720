//! Per-client sliding-window admission for the contact endpoint.
//!
//! Every request is keyed by a client identifier taken from proxy headers and
//! checked against a [`CounterStore`]. When the store is missing, failing or
//! slow the request is admitted anyway: the endpoint staying reachable matters
//! more than strict enforcement while the store is down.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use prometheus::Counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::metrics::{RATE_LIMIT_FAIL_OPEN, RATE_LIMITED};
use crate::state::AppState;
use crate::store::CounterStore;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// Bucket shared by every request that carries no identifying header
pub const FALLBACK_CLIENT: &str = "127.0.0.1";

// Checked in order after x-forwarded-for
const CLIENT_IP_HEADERS: [&str; 5] = [
    "x-real-ip",
    "cf-connecting-ip",
    "x-vercel-forwarded-for",
    "fastly-client-ip",
    "true-client-ip",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Rejected,
    // Admitted without enforcement, the store could not be consulted
    FailedOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self.outcome, Outcome::Rejected)
    }

    // Whole seconds until `reset`, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let millis = (self.reset - self.checked_at).num_milliseconds().max(0);
        (millis as u64).div_ceil(1000)
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset.timestamp_millis()));
    }
}

pub struct RequestAdmissionGuard<S> {
    store: Option<S>,
    limit: u32,
    window: Duration,
    timeout: Duration,
    prefix: String,
    clock: Arc<dyn Clock>,
    // counts outages only, not a deliberately absent store
    fail_open_total: Counter,
}

impl<S: CounterStore> RequestAdmissionGuard<S> {
    // `store == None` is the unconfigured case and admits everything
    pub fn new(store: Option<S>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            timeout: Duration::from_millis(500),
            prefix: "ratelimit".to_string(),
            clock: Arc::new(SystemClock),
            fail_open_total: RATE_LIMIT_FAIL_OPEN.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    fn with_fail_open_counter(mut self, counter: Counter) -> Self {
        self.fail_open_total = counter;
        self
    }

    /// Consults the store for `client_id` and records the request if admitted.
    ///
    /// Never fails: store errors and timeouts turn into [`Outcome::FailedOpen`].
    pub async fn check(&self, client_id: &str) -> Decision {
        let now = self.clock.now();
        let Some(store) = &self.store else {
            return self.unenforced(now);
        };

        let key = format!("{}:contact:{}", self.prefix, client_id);
        let hit = store.hit(&key, self.limit, self.window, now.timestamp_millis());
        let result = match tokio::time::timeout(self.timeout, hit).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        match result {
            Ok(hit) => {
                let reset = DateTime::from_timestamp_millis(hit.reset_ms)
                    .unwrap_or(now)
                    .max(now);
                let outcome = if hit.admitted {
                    Outcome::Admitted
                } else {
                    RATE_LIMITED.inc();
                    Outcome::Rejected
                };
                Decision {
                    outcome,
                    limit: self.limit,
                    remaining: if hit.admitted { hit.remaining } else { 0 },
                    reset,
                    checked_at: now,
                }
            }
            Err(e) => {
                warn!(error = %e, client = client_id, "Counter store unavailable, admitting request");
                self.fail_open(now)
            }
        }
    }

    fn fail_open(&self, now: DateTime<Utc>) -> Decision {
        self.fail_open_total.inc();
        self.unenforced(now)
    }

    fn unenforced(&self, now: DateTime<Utc>) -> Decision {
        Decision {
            outcome: Outcome::FailedOpen,
            limit: self.limit,
            remaining: self.limit,
            reset: now,
            checked_at: now,
        }
    }
}

// First x-forwarded-for hop, then the usual proxy headers, then the shared fallback
pub fn client_identifier(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| header(name))
        .unwrap_or(FALLBACK_CLIENT)
        .to_string()
}

// Middleware for the contact route
pub async fn admission_layer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let client_id = client_identifier(req.headers());
    let decision = state.guard.check(&client_id).await;

    let mut response = if decision.is_admitted() {
        next.run(req).await
    } else {
        info!(client = %client_id, reset = %decision.reset, "Rate limit exceeded");
        let mut rejected = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too Many Requests" })),
        )
            .into_response();
        rejected
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs()));
        rejected
    };

    // Nothing meaningful to report when the store was not consulted
    if decision.outcome != Outcome::FailedOpen {
        decision.apply_headers(response.headers_mut());
    }
    response
}
