//! Pooled PostgreSQL connections.
//!
//! Pooled clients implement [`Connection`](crate::Connection), so a checked-out
//! client can back a [`Db`](crate::Db) directly. Share one catalog between the
//! clients of a pool so each table is introspected once:
//!
//! ```ignore
//! let conn = config.connection("default")?;
//! let pool = conn.pool("default")?;
//! let catalog = conn.catalog();
//!
//! let db = Db::new(pool.get().await?).with_catalog(Arc::clone(&catalog));
//! ```

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Pool size used when the configuration does not set `pool_size`.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Pool for a bare database URL with the default settings.
pub fn create_pool(database_url: &str) -> OrmResult<Pool> {
    pool_from_config(&ConnectionConfig::new(database_url))
}

/// Pool shaped by a connection's settings: every pooled session uses the
/// configured charset, and `pool_size` caps the number of clients.
pub fn pool_from_config(config: &ConnectionConfig) -> OrmResult<Pool> {
    let manager = Manager::from_config(
        config.pg_config()?,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let max_size = config.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
    tracing::debug!(target: "quarry.sql", max_size, "building connection pool");

    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparsable_urls() {
        let err = create_pool("not a url at all ::").unwrap_err();
        assert!(matches!(err, OrmError::Connection(_)));
    }

    #[tokio::test]
    async fn pool_size_comes_from_the_connection_config() {
        let mut config = ConnectionConfig::new("postgres://localhost/quarry_test");
        assert_eq!(
            pool_from_config(&config).unwrap().status().max_size,
            DEFAULT_POOL_SIZE
        );

        config.pool_size = Some(3);
        config.charset = Some("UTF8".to_string());
        assert_eq!(pool_from_config(&config).unwrap().status().max_size, 3);
    }

    #[test]
    fn invalid_charset_fails_before_building() {
        let mut config = ConnectionConfig::new("postgres://localhost/quarry_test");
        config.charset = Some("UTF8; DROP".to_string());
        assert!(matches!(pool_from_config(&config), Err(OrmError::Config(_))));
    }
}
