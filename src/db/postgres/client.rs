use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// Connection attempts at startup before giving up
const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Split SQL into statements, respecting dollar-quoted strings.
/// This handles PostgreSQL function definitions that use $$ ... $$ blocks.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = sql[start..i].trim();
            if !stmt.is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    let rest = sql[start..].trim();
    if !rest.is_empty() {
        statements.push(rest);
    }

    statements
}

/// PostgreSQL client with connection pooling.
///
/// Holds the `token`, `tick`, `pool` and `pool_tick` tables. Every sync run
/// checks out one connection for its write transaction.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
    schema_path: String,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL at {}:{}", settings.host, settings.port);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            // Test the connection
            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self {
                        pool,
                        schema_path: settings.schema_path,
                    });
                },
                Err(e) if attempt >= MAX_CONNECT_ATTEMPTS => {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to PostgreSQL after {} attempts: {}",
                        MAX_CONNECT_ATTEMPTS,
                        e
                    ));
                },
                Err(e) => {
                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}): {}, retrying in {:?}...",
                        attempt, MAX_CONNECT_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Applies the schema file statement by statement. Every statement is
    /// idempotent, so this runs on every start.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations from {}", self.schema_path);
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string(&self.schema_path)
            .await
            .with_context(|| format!("Failed to read {}", self.schema_path))?;

        for stmt in split_sql_statements(&schema) {
            client
                .execute(stmt, &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL migrations completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_statements() {
        let sql = "CREATE TABLE a (id TEXT);\n\nCREATE INDEX a_idx ON a (id);\n";
        assert_eq!(
            split_sql_statements(sql),
            vec!["CREATE TABLE a (id TEXT)", "CREATE INDEX a_idx ON a (id)"]
        );
    }

    #[test]
    fn test_split_keeps_dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $$ BEGIN PERFORM 1; END; $$ LANGUAGE plpgsql;\
                   SELECT 1";
        let statements = split_sql_statements(sql);

        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("LANGUAGE plpgsql"));
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_split_skips_empty_statements() {
        assert!(split_sql_statements(" ; ;\n").is_empty());
    }

    #[tokio::test]
    async fn test_schema_file_splits_into_statements() {
        let schema = tokio::fs::read_to_string("schema/postgres.sql").await.unwrap();
        let statements = split_sql_statements(&schema);

        assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS pool_tick")));
        assert!(statements.iter().all(|s| !s.is_empty()));
    }
}
