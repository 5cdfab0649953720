use clap::{Parser, ValueEnum};

// Which counter store backs the rate limiter
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    // Per-process sliding log
    Memory,
    // Shared store, needs --redis-url
    Redis,
    // No enforcement, every request fails open
    Disabled,
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "contact-gateway")]
#[command(about = "Rate limited contact form endpoint")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    // Counter store backend
    #[arg(long, env = "RATE_LIMIT_STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    // Redis url, e.g. "redis://127.0.0.1:6379/"
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    // Key namespace inside the counter store
    #[arg(long, env = "RATE_LIMIT_PREFIX", default_value = "ratelimit")]
    pub key_prefix: String,

    // Upper bound on one store round-trip, in milliseconds
    #[arg(long, env = "RATE_LIMIT_TIMEOUT_MS", default_value_t = 500)]
    pub store_timeout_ms: u64,

    // Seconds between sweeps of expired in-memory entries
    #[arg(long, env = "RATE_LIMIT_PURGE_INTERVAL", default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub purge_interval: u64,

    // Scheduling link handed back to the visitor
    #[arg(long, env = "CONTACT_CAL_URL", default_value = "https://cal.com/l4zarusdev")]
    pub cal_url: String,
}
