//! Shared counter store on Redis.
//!
//! Lets several gateway instances enforce one limit. Each key is a sorted set
//! of admitted request timestamps (the same sliding log the in-memory store
//! keeps), trimmed and checked by a single Lua script so Redis executes the
//! read-and-record step atomically per key.
//!
//! Keys carry a `PEXPIRE` of one window, so idle clients disappear on their
//! own and nothing has to be deleted explicitly.

use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::StoreError;
use crate::store::{CounterStore, Hit, window_millis};

// Returns {remaining, reset_ms}; remaining is -1 on reject
const SLIDING_LOG_SCRIPT: &str = r#"
local key = KEYS[1]
local seq_key = KEYS[2]
local limit = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])

redis.call("ZREMRANGEBYSCORE", key, "-inf", now - window)
local count = redis.call("ZCARD", key)

if count >= limit then
  local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
  return {-1, tonumber(oldest[2]) + window}
end

local seq = redis.call("INCR", seq_key)
redis.call("ZADD", key, now, now .. ":" .. seq)
redis.call("PEXPIRE", key, window)
redis.call("PEXPIRE", seq_key, window)

local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
return {limit - count - 1, tonumber(oldest[2]) + window}
"#;

pub struct RedisStore {
    client: Client,
    // Connected on first use so a down server only fails individual hits
    connection: OnceCell<ConnectionManager>,
    script: Script,
}

impl RedisStore {
    // Validates the url; does not touch the network
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            connection: OnceCell::new(),
            script: Script::new(SLIDING_LOG_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

// Counter that makes sorted-set members unique within one millisecond
fn sequence_key(key: &str) -> String {
    format!("{key}:seq")
}

impl CounterStore for RedisStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<Hit, StoreError> {
        let window_ms = window_millis(window);

        let mut conn = self.connection().await?;
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(key)
            .key(sequence_key(key))
            .arg(limit)
            .arg(now_ms)
            .arg(window_ms);
        let (remaining, reset_ms): (i64, i64) = invocation.invoke_async(&mut conn).await?;

        Ok(if remaining < 0 {
            Hit {
                admitted: false,
                remaining: 0,
                reset_ms,
            }
        } else {
            Hit {
                admitted: true,
                remaining: u32::try_from(remaining).unwrap_or(limit),
                reset_ms,
            }
        })
    }
}
