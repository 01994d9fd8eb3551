//! Bounded connection pool.
//!
//! Connections are opened lazily, checked out per query, and returned to
//! the idle list when the guard drops. Closed connections are discarded.

use std::ops::Deref;
use std::sync::Mutex;
use std::time::Duration;

use siphon_types::SourceError;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use crate::config::Config;

const SESSION_OPTIONS: &str = "-c TimeZone=UTC";

pub(crate) struct Pool {
    pg: PgConfig,
    endpoint: String,
    idle: Mutex<Vec<Client>>,
    permits: Semaphore,
}

impl Pool {
    pub(crate) fn new(config: &Config) -> Self {
        let mut pg = PgConfig::new();
        pg.host(&config.host);
        pg.port(config.port);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        pg.dbname(&config.database);
        pg.application_name("siphon");
        // Cursor timestamps are naive UTC; pin the session zone to match.
        pg.options(SESSION_OPTIONS);
        if let Some(secs) = config.connect_timeout_secs {
            pg.connect_timeout(Duration::from_secs(secs));
        }
        Self {
            pg,
            endpoint: format!("{}:{}/{}", config.host, config.port, config.database),
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(config.pool_size.max(1)),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check out a connection, waiting for a free slot.
    pub(crate) async fn get(&self) -> Result<PooledClient<'_>, SourceError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SourceError::connect("connection pool is closed"))?;
        let reused = self.idle.lock().ok().and_then(|mut idle| {
            idle.retain(|c| !c.is_closed());
            idle.pop()
        });
        let client = match reused {
            Some(client) => client,
            None => self.connect().await?,
        };
        Ok(PooledClient {
            client: Some(client),
            pool: self,
            _permit: permit,
        })
    }

    async fn connect(&self) -> Result<Client, SourceError> {
        let (client, connection) = self
            .pg
            .connect(NoTls)
            .await
            .map_err(|e| SourceError::connect(format!("{}: {e}", self.endpoint)))?;

        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(endpoint = %endpoint, "PostgreSQL connection error: {}", e);
            }
        });
        tracing::debug!(endpoint = %self.endpoint, "Opened connection");
        Ok(client)
    }

    fn give_back(&self, client: Client) {
        if client.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }
}

/// A checked-out connection. Returns to the pool on drop.
pub(crate) struct PooledClient<'a> {
    client: Option<Client>,
    pool: &'a Pool,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        // Only `drop` takes the client out.
        self.client.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.give_back(client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_json::from_value(serde_json::json!({
            "host": "db.internal",
            "user": "reader",
            "database": "tasks",
            "pool_size": 0
        }))
        .unwrap()
    }

    #[test]
    fn sessions_run_in_utc() {
        let pool = Pool::new(&config());
        assert_eq!(pool.pg.get_options(), Some("-c TimeZone=UTC"));
        assert_eq!(pool.pg.get_application_name(), Some("siphon"));
    }

    #[test]
    fn endpoint_and_pool_size_floor() {
        let pool = Pool::new(&config());
        assert_eq!(pool.endpoint(), "db.internal:5432/tasks");
        assert_eq!(pool.permits.available_permits(), 1);
    }
}
