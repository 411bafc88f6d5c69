//! Redis-backed session token store and rate-limit counters.

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::{Instrument, debug};

use super::{CounterStore, SessionTokenStore, StoreError};

/// Key namespace for refresh-token records.
pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";

const SCAN_BATCH: usize = 500;

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if matches!(err.kind(), redis::ErrorKind::TypeError) {
            Self::Corrupt(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Open a managed connection that reconnects on failure.
///
/// # Errors
/// Returns an error if the URL is invalid or the first connection fails.
pub async fn connect(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

fn redis_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("db.query", db.system = "redis", db.operation = operation)
}

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSessionStore {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_prefix(conn, REFRESH_TOKEN_PREFIX)
    }

    #[must_use]
    pub fn with_prefix(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn bare_key(&self, key: String) -> String {
        match key.strip_prefix(self.prefix.as_str()) {
            Some(bare) => bare.to_string(),
            None => key,
        }
    }
}

#[async_trait]
impl SessionTokenStore for RedisSessionStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .instrument(redis_span("SET"))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<Option<String>>(&mut conn)
            .instrument(redis_span("GET"))
            .await?;
        Ok(value)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GETDEL")
            .arg(self.key(key))
            .query_async::<Option<String>>(&mut conn)
            .instrument(redis_span("GETDEL"))
            .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<()>(&mut conn)
            .instrument(redis_span("DEL"))
            .await?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut entries = Vec::new();
        loop {
            let (next, page) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .instrument(redis_span("SCAN"))
                .await?;
            if !page.is_empty() {
                let values = redis::cmd("MGET")
                    .arg(&page)
                    .query_async::<Vec<Option<String>>>(&mut conn)
                    .instrument(redis_span("MGET"))
                    .await?;
                // Keys can expire between SCAN and MGET.
                for (key, value) in page.into_iter().zip(values) {
                    if let Some(value) = value {
                        entries.push((self.bare_key(key), value));
                    }
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(entries = entries.len(), "scanned session tokens");
        Ok(entries)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .instrument(redis_span("PING"))
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<u64>>(&mut conn)
            .instrument(redis_span("GET"))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX EX creates the key with its expiry in one step; INCR never touches the TTL.
        let (count,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(window.as_secs().max(1))
            .ignore()
            .cmd("INCR")
            .arg(key)
            .query_async::<(u64,)>(&mut conn)
            .instrument(redis_span("INCR"))
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rate_limit::RATE_LIMIT_PREFIX;

    async fn live_connection() -> Option<ConnectionManager> {
        let url = std::env::var("TESSERA_TEST_REDIS_URL").ok()?;
        match connect(&url).await {
            Ok(conn) => Some(conn),
            Err(err) => panic!("redis connect: {err}"),
        }
    }

    #[test]
    fn io_errors_map_to_unavailable() {
        let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "not an integer"));
        assert!(matches!(StoreError::from(err), StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn live_session_store_take_and_scan() {
        let Some(conn) = live_connection().await else {
            return;
        };
        let prefix = format!("test:{}:", ulid::Ulid::new());
        let store = RedisSessionStore::with_prefix(conn, &prefix);

        assert!(store.put("a", "1", Duration::from_secs(30)).await.is_ok());
        assert!(store.put("b", "2", Duration::from_secs(30)).await.is_ok());

        let mut all = store.scan_all().await.unwrap_or_default();
        all.sort();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );

        assert_eq!(store.take("a").await.ok().flatten().as_deref(), Some("1"));
        assert_eq!(store.take("a").await.ok().flatten(), None);
        assert!(store.delete("b").await.is_ok());
        assert_eq!(store.get("b").await.ok().flatten(), None);
    }

    #[tokio::test]
    async fn live_scan_reads_every_page() {
        let Some(conn) = live_connection().await else {
            return;
        };
        let prefix = format!("test:{}:", ulid::Ulid::new());
        let store = RedisSessionStore::with_prefix(conn, &prefix);

        let total = SCAN_BATCH * 2 + 7;
        for i in 0..total {
            assert!(
                store
                    .put(&format!("k{i}"), &i.to_string(), Duration::from_secs(30))
                    .await
                    .is_ok()
            );
        }
        let all = store.scan_all().await.unwrap_or_default();
        assert_eq!(all.len(), total);
        assert!(all.iter().all(|(key, value)| key == &format!("k{value}")));

        for (key, _) in all {
            assert!(store.delete(&key).await.is_ok());
        }
    }

    #[tokio::test]
    async fn live_counter_keeps_first_window() {
        let Some(conn) = live_connection().await else {
            return;
        };
        let store = RedisCounterStore::new(conn);
        let key = format!("{RATE_LIMIT_PREFIX}test:{}", ulid::Ulid::new());

        assert_eq!(store.get(&key).await.ok(), Some(0));
        assert_eq!(
            store.increment(&key, Duration::from_secs(30)).await.ok(),
            Some(1)
        );
        assert_eq!(
            store.increment(&key, Duration::from_secs(30)).await.ok(),
            Some(2)
        );
        assert_eq!(store.get(&key).await.ok(), Some(2));
    }
}
