//! Database backend.
//!
//! [`TableStore`] is the capability the upload pipeline needs from a
//! database: connect, check and create the target table, insert a batch.
//! [`Database`] implements it over a single `sqlx` connection to MySQL,
//! PostgreSQL or SQLite.
//!
//! ```text
//! ConnectOptions ──resolve──▶ Target ──connect──▶ Connection
//!   (driver, host,            (sqlx options       (MySql | Postgres | Sqlite)
//!    user, ..., options)       per driver)
//! ```
//!
//! Batches are inserted in one multi-row statement inside a transaction, so
//! a batch is written completely or not at all.

pub mod options;
pub mod sql;

pub use options::{ConnectOptions, Driver, Target, DEFAULT_MYSQL_PORT, DEFAULT_PGSQL_PORT};

use sqlx::mysql::{MySql, MySqlConnection};
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{ConnectOptions as _, Connection as _, Encode, Transaction, Type};
use tracing::{debug, warn};

use crate::error::{ConfigError, DatabaseError, DatabaseResult};
use crate::models::{ColumnMapping, Record, SqlValue};

/// Operations the upload pipeline performs against a database.
#[allow(async_fn_in_trait)]
pub trait TableStore {
    /// Connect. Calling it again once connected does nothing.
    async fn open(&mut self, options: &ConnectOptions) -> DatabaseResult<()>;

    /// Whether `table` can be queried. Any failure counts as missing.
    async fn table_exists(&mut self, table: &str) -> bool;

    /// Create `table` with one column per mapping entry.
    async fn create_table(&mut self, table: &str, mapping: &ColumnMapping) -> DatabaseResult<()>;

    /// Insert all rows or none of them.
    async fn insert_batch(&mut self, table: &str, rows: &[Record]) -> DatabaseResult<()>;
}

/// An open driver connection
#[derive(Debug)]
enum Connection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

impl Connection {
    async fn connect(target: Target) -> Result<Self, sqlx::Error> {
        Ok(match target {
            Target::MySql(opts) => Connection::MySql(opts.connect().await?),
            Target::Postgres(opts) => Connection::Postgres(opts.connect().await?),
            Target::Sqlite(opts) => Connection::Sqlite(opts.connect().await?),
        })
    }

    fn driver(&self) -> Driver {
        match self {
            Connection::MySql(_) => Driver::MySql,
            Connection::Postgres(_) => Driver::Postgres,
            Connection::Sqlite(_) => Driver::Sqlite,
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        match self {
            Connection::MySql(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
            Connection::Postgres(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
            Connection::Sqlite(c) => sqlx::query(sql).execute(&mut *c).await.map(|_| ()),
        }
    }

    async fn fetch_optional(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        match self {
            Connection::MySql(c) => sqlx::query(sql).fetch_optional(&mut *c).await.map(|_| ()),
            Connection::Postgres(c) => sqlx::query(sql).fetch_optional(&mut *c).await.map(|_| ()),
            Connection::Sqlite(c) => sqlx::query(sql).fetch_optional(&mut *c).await.map(|_| ()),
        }
    }

    async fn insert(&mut self, sql: &str, rows: &[Record]) -> DatabaseResult<()> {
        match self {
            Connection::MySql(c) => {
                let mut tx = c.begin().await?;
                let outcome = bind_values(sqlx::query::<MySql>(sql), rows).execute(&mut *tx).await;
                finish(tx, outcome.map(|_| ())).await
            }
            Connection::Postgres(c) => {
                let mut tx = c.begin().await?;
                let outcome = bind_values(sqlx::query::<Postgres>(sql), rows).execute(&mut *tx).await;
                finish(tx, outcome.map(|_| ())).await
            }
            Connection::Sqlite(c) => {
                let mut tx = c.begin().await?;
                let outcome = bind_values(sqlx::query::<Sqlite>(sql), rows).execute(&mut *tx).await;
                finish(tx, outcome.map(|_| ())).await
            }
        }
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Connection::MySql(c) => c.close().await,
            Connection::Postgres(c) => c.close().await,
            Connection::Sqlite(c) => c.close().await,
        }
    }
}

/// Bind every non-NULL value of the batch in statement order.
fn bind_values<'q, DB>(
    mut query: Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>,
    rows: &'q [Record],
) -> Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>
where
    DB: sqlx::Database,
    &'q str: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
{
    for value in sql::bound_values(rows) {
        query = match value {
            SqlValue::Text(text) => query.bind(text.as_str()),
            SqlValue::Integer(n) => query.bind(*n),
            SqlValue::Null => query,
        };
    }
    query
}

/// Commit on success, roll back and classify the error otherwise.
async fn finish<DB: sqlx::Database>(
    tx: Transaction<'_, DB>,
    outcome: Result<(), sqlx::Error>,
) -> DatabaseResult<()> {
    match outcome {
        Ok(()) => tx.commit().await.map_err(classify),
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(classify(err))
        }
    }
}

/// Separate unique-constraint violations from other query failures.
fn classify(err: sqlx::Error) -> DatabaseError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DatabaseError::Duplicate {
            code: db.code().map(|c| c.into_owned()),
            message: db.message().to_string(),
        },
        other => DatabaseError::Query(other),
    }
}

/// A single connection to one of the supported databases.
///
/// Created closed; [`TableStore::open`] connects and [`Database::close`]
/// ends the lifecycle.
#[derive(Debug, Default)]
pub struct Database {
    conn: Option<Connection>,
    last_error: Option<String>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Driver of the open connection
    pub fn driver(&self) -> Option<Driver> {
        self.conn.as_ref().map(Connection::driver)
    }

    /// Message of the last failed `open`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Close the connection if one is open.
    pub async fn close(&mut self) -> DatabaseResult<()> {
        if let Some(conn) = self.conn.take() {
            debug!(driver = %conn.driver(), "Closing database connection");
            conn.close().await?;
        }
        Ok(())
    }

    fn connection(&mut self) -> DatabaseResult<&mut Connection> {
        self.conn.as_mut().ok_or(DatabaseError::NotConnected)
    }

    async fn connect(options: &ConnectOptions) -> DatabaseResult<Connection> {
        let target = options.resolve()?;
        let driver = options.driver()?;
        debug!(driver = %driver, host = %options.host, path = %options.path, "Connecting");

        Connection::connect(target)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))
    }
}

impl TableStore for Database {
    async fn open(&mut self, options: &ConnectOptions) -> DatabaseResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        match Self::connect(options).await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(match &err {
                    DatabaseError::Connection(message) => message.clone(),
                    other => other.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn table_exists(&mut self, table: &str) -> bool {
        let Ok(conn) = self.connection() else {
            return false;
        };
        let sql = sql::table_exists_sql(conn.driver(), table);
        match conn.fetch_optional(&sql).await {
            Ok(()) => true,
            Err(err) => {
                debug!(table, error = %err, "Table probe failed");
                false
            }
        }
    }

    async fn create_table(&mut self, table: &str, mapping: &ColumnMapping) -> DatabaseResult<()> {
        if mapping.is_empty() {
            return Err(ConfigError::Invalid(format!("no columns declared for table \"{}\"", table)).into());
        }
        let conn = self.connection()?;
        let sql = sql::create_table_sql(conn.driver(), table, mapping);
        debug!(%sql, "Creating table");
        conn.execute(&sql).await.map_err(classify)
    }

    async fn insert_batch(&mut self, table: &str, rows: &[Record]) -> DatabaseResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        sql::check_batch(rows)?;

        let conn = self.connection()?;
        let sql = sql::insert_sql(conn.driver(), table, rows);
        debug!(table, rows = rows.len(), "Inserting batch");
        conn.insert(&sql, rows).await
    }
}
