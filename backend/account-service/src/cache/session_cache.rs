use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{CacheError, SessionCache};

/// Redis-backed session cache
#[derive(Clone)]
pub struct RedisSessionCache {
    conn: ConnectionManager,
}

impl RedisSessionCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn add_to_index(
        &self,
        index: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(index)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(index)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn purge_index(&self, index: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(index)
            .query_async(&mut conn)
            .await?;

        let mut del = redis::cmd("DEL");
        del.arg(index);
        for member in &members {
            del.arg(member);
        }
        del.query_async::<_, ()>(&mut conn).await?;

        Ok(members.len())
    }
}
