//! Redis-backed buckets shared by every API instance.
//!
//! The refill-and-take runs as one Lua script, so it is atomic per key on
//! the Redis side. Keys expire after an hour of inactivity.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;

use super::bucket::{BucketParams, TakeOutcome};
use super::store::{BucketStore, LimiterStoreError, BUCKET_TTL};

const TAKE_SCRIPT: &str = r#"
local capacity = tonumber(ARGV[1])
local refill_tokens = tonumber(ARGV[2])
local period_ms = tonumber(ARGV[3])
local now_ms = tonumber(ARGV[4])
local ttl_ms = tonumber(ARGV[5])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
  tokens = capacity
  ts = now_ms
end

local elapsed = math.max(0, now_ms - ts)
tokens = math.min(capacity, tokens + elapsed * refill_tokens / period_ms)

local allowed = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(math.max(now_ms, ts)))
redis.call('PEXPIRE', KEYS[1], ttl_ms)
return {allowed, tostring(tokens)}
"#;

#[derive(Clone)]
pub struct RedisBucketStore {
    connection: MultiplexedConnection,
    script: Script,
    ttl: Duration,
}

impl RedisBucketStore {
    pub async fn connect(redis_url: &str) -> Result<Self, LimiterStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| LimiterStoreError::Unavailable(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LimiterStoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            connection,
            script: Script::new(TAKE_SCRIPT),
            ttl: BUCKET_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn take(
        &self,
        key: &str,
        params: &BucketParams,
        now_ms: i64,
    ) -> Result<TakeOutcome, LimiterStoreError> {
        let mut connection = self.connection.clone();
        let (allowed, tokens): (i64, String) = self
            .script
            .key(key)
            .arg(params.capacity)
            .arg(params.refill_tokens)
            .arg(params.refill_period.as_millis() as u64)
            .arg(now_ms)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| LimiterStoreError::Unavailable(e.to_string()))?;

        let tokens = tokens
            .parse::<f64>()
            .map_err(|e| LimiterStoreError::Malformed(format!("tokens '{tokens}': {e}")))?;

        Ok(TakeOutcome {
            allowed: allowed == 1,
            tokens,
        })
    }
}
