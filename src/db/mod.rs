//! Database module: read-only PostgreSQL pool and the statement executor

pub mod connection;
pub mod executor;
pub mod row_set;

pub use connection::{init_pool, lazy_pool, DbPool, PoolSettings};
pub use executor::{
    classify_sqlx_error, ExecutionError, ExecutorSettings, QueryExecutor, StatementExecutor,
    DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT,
};
pub use row_set::RowSet;
