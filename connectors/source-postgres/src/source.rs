//! `PagedSource` over PostgreSQL-wire tables.

use async_trait::async_trait;
use siphon_engine::{Page, PageRequest, PagedSource};
use siphon_types::{Filter, Record, ScanOrder, SourceError};

use crate::client::Pool;
use crate::config::{Config, TableRouting};
use crate::decode::decode_row;
use crate::query::{self, SqlQuery};

/// Reads task records from `{prefix}_{COUNTRY}` tables.
pub struct PostgresSource {
    id: String,
    routing: TableRouting,
    pool: Pool,
}

impl PostgresSource {
    /// Build a source. Connections are opened on first use.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn new(config: Config) -> Result<Self, SourceError> {
        config.validate()?;
        let pool = Pool::new(&config);
        Ok(Self {
            id: format!("postgres://{}", pool.endpoint()),
            routing: config.routing,
            pool,
        })
    }

    /// Build a source from the untyped `source` section of the service
    /// config.
    ///
    /// # Errors
    ///
    /// Returns a config error if the settings do not deserialize or fail
    /// validation.
    pub fn from_settings(settings: serde_json::Value) -> Result<Self, SourceError> {
        let config: Config = serde_json::from_value(settings)
            .map_err(|e| SourceError::config(format!("invalid postgres source config: {e}")))?;
        Self::new(config)
    }

    /// Round-trip a trivial query to confirm connectivity.
    ///
    /// # Errors
    ///
    /// Returns a connect error when the server is unreachable.
    pub async fn ping(&self) -> Result<(), SourceError> {
        let client = self.pool.get().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| SourceError::connect(format!("connection test failed: {e}")))?;
        tracing::info!(source = %self.id, "Connected");
        Ok(())
    }

    fn table_for(&self, filter: &Filter) -> Result<String, SourceError> {
        self.routing
            .table_name(filter.task_type(), filter.country_code())
    }

    async fn rows(&self, query: &SqlQuery) -> Result<Vec<Record>, SourceError> {
        tracing::debug!(source = %self.id, sql = %query.sql, binds = query.binds.len(), "Executing query");
        let client = self.pool.get().await?;
        let rows = client
            .query(query.sql.as_str(), &query.params())
            .await
            .map_err(|e| SourceError::query(e.to_string()))?;
        rows.iter()
            .map(|row| decode_row(row, &self.routing))
            .collect()
    }
}

#[async_trait]
impl PagedSource for PostgresSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, SourceError> {
        let table = self.table_for(request.filter)?;
        let query = query::page_query(
            &self.routing,
            &table,
            request.filter,
            request.cursor,
            request.order,
            request.projection,
            request.limit,
        )?;
        let rows = self.rows(&query).await?;
        Ok(Page::from_rows(rows, request.order))
    }

    async fn fetch_by_keys(
        &self,
        keys: &[String],
        filter: &Filter,
    ) -> Result<Vec<Record>, SourceError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table_for(filter)?;
        let query = query::keys_query(&self.routing, &table, filter, keys);
        self.rows(&query).await
    }

    async fn probe_at(
        &self,
        filter: &Filter,
        order: ScanOrder,
        position: u64,
    ) -> Result<Option<Record>, SourceError> {
        let table = self.table_for(filter)?;
        let query = query::probe_query(&self.routing, &table, filter, order, position);
        Ok(self.rows(&query).await?.into_iter().next())
    }

    async fn count(&self, filter: &Filter) -> Result<u64, SourceError> {
        let table = self.table_for(filter)?;
        let query = query::count_query(&self.routing, &table, filter);
        tracing::debug!(source = %self.id, sql = %query.sql, "Executing count");
        let client = self.pool.get().await?;
        let row = client
            .query_one(query.sql.as_str(), &query.params())
            .await
            .map_err(|e| SourceError::query(e.to_string()))?;
        let n: i64 = row
            .try_get(0)
            .map_err(|e| SourceError::decode(format!("count: {e}")))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
