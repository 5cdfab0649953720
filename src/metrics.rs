use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};

// Registration only fails on duplicate names, which would be a startup bug
lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("contact_requests_total", "Total contact form submissions").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("contact_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref RATE_LIMIT_FAIL_OPEN: Counter = register_counter!(
        "contact_rate_limit_fail_open_total",
        "Requests admitted because the counter store was unavailable"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "contact_request_latency_seconds",
        "Contact handler latency in seconds"
    )
    .unwrap();
}
