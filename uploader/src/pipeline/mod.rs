//! Upload pipeline
//!
//! ```text
//! file ──▶ RowReader ──▶ transform + validate ──▶ batch ──▶ TableStore::insert_batch
//!                              │                              │
//!                              ▼                              ▼
//!                     "{reason} {col}='{raw}'        "{db message} at line N"
//!                          at line N"                   (duplicate key)
//! ```
//!
//! Invalid rows and batches rejected for a duplicate key are counted as
//! skipped and reported in [`UploadResult::errors`]. Every other failure
//! aborts the run.

use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{ConnectOptions, Database, TableStore};
use crate::error::{SchemaError, UploadError};
use crate::models::{Record, Row, SqlValue, UploadResult};
use crate::parser::RowReader;
use crate::transform::transform;
use crate::validation::validate;

/// Counters accumulated while a file is read
#[derive(Debug, Default)]
struct Tally {
    inserted: u64,
    skipped: u64,
    errors: Vec<String>,
}

/// Loads CSV files into the configured table of a [`TableStore`].
pub struct Uploader<S: TableStore = Database> {
    config: Config,
    store: S,
}

impl Uploader<Database> {
    /// Uploader over a real, not yet connected, database.
    pub fn with_database(config: Config) -> Self {
        Self::new(config, Database::new())
    }

    /// Close the underlying connection.
    pub async fn close(&mut self) -> Result<(), UploadError> {
        Ok(self.store.close().await?)
    }
}

impl<S: TableStore> Uploader<S> {
    pub fn new(config: Config, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Upload one file.
    ///
    /// With `dry_run` every row is read, transformed and validated but
    /// nothing is inserted.
    pub async fn upload<P: AsRef<Path>>(
        &mut self,
        file: P,
        options: &ConnectOptions,
        dry_run: bool,
    ) -> Result<UploadResult, UploadError> {
        let path = file.as_ref();
        debug!(file = %path.display(), driver = %options.driver, dry_run, "Before upload");

        if !path.exists() {
            return Err(UploadError::FileNotFound(path.to_path_buf()));
        }

        self.connect(options).await?;

        if !self.store.table_exists(&self.config.table).await {
            error!(table = %self.config.table, "Table not exists");
            return Err(SchemaError::TableMissing(self.config.table.clone()).into());
        }

        let reader = RowReader::open(path, self.config.delimiter()?)?;
        info!(
            file = %path.display(),
            encoding = reader.encoding(),
            delimiter = %reader.delimiter(),
            columns = %reader.headers().join(", "),
            "Reading rows"
        );

        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
        let mut tally = Tally::default();
        let mut processed = 0;
        let mut line = 0;

        for row in reader {
            let row = row?;
            processed = row.number;
            line = row.line;

            let record = match self.process_row(&row) {
                Ok(record) => record,
                Err(message) => {
                    tally.skipped += 1;
                    tally.errors.push(message);
                    continue;
                }
            };

            if dry_run {
                continue;
            }
            batch.push(record);
            if batch.len() >= batch_size {
                self.flush(&mut batch, line, &mut tally).await?;
            }
        }

        if !dry_run {
            self.flush(&mut batch, line, &mut tally).await?;
        }

        debug!(
            inserted = tally.inserted,
            processed,
            skipped = tally.skipped,
            "After upload"
        );

        Ok(UploadResult::new(tally.inserted, processed, tally.skipped, tally.errors))
    }

    /// Create the configured table. Fails when it already exists.
    pub async fn create_table(&mut self, options: &ConnectOptions) -> Result<(), UploadError> {
        self.connect(options).await?;

        let table = &self.config.table;
        if self.store.table_exists(table).await {
            error!(table = %table, "The table already exists");
            return Err(SchemaError::TableExists(table.clone()).into());
        }

        self.store.create_table(table, &self.config.columns).await?;
        info!(table = %table, columns = self.config.columns.len(), "Table created");
        Ok(())
    }

    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), UploadError> {
        self.store.open(options).await.map_err(|err| {
            error!(error = %err, "Could not connect to the database");
            UploadError::from(err)
        })
    }

    /// Transform and validate each field in header order.
    ///
    /// Returns the record to insert, or the error line for the first
    /// invalid field.
    fn process_row(&self, row: &Row) -> Result<Record, String> {
        let mut record = Record::new();

        for (column, raw) in &row.fields {
            let Some(spec) = self.config.columns.get(column) else {
                record.push(column.as_str(), SqlValue::Text(raw.clone()));
                continue;
            };

            let value = transform(raw, &spec.transformer);

            if let Err(invalid) = validate(raw, &spec.validator) {
                warn!(
                    validator = invalid.validator,
                    column = %column,
                    value = %raw,
                    line = row.line,
                    error = %invalid,
                    "Invalid value, the row will be skipped"
                );
                return Err(format!("{} {}='{}' at line {}", invalid, column, raw, row.line));
            }

            record.push(column.as_str(), spec.column_type.convert(value));
        }

        Ok(record)
    }

    /// Insert the pending batch and clear it, whatever the outcome.
    async fn flush(&mut self, batch: &mut Vec<Record>, line: u64, tally: &mut Tally) -> Result<(), UploadError> {
        if batch.is_empty() {
            return Ok(());
        }

        let result = self.store.insert_batch(&self.config.table, batch).await;
        let size = batch.len() as u64;
        batch.clear();

        match result {
            Ok(()) => {
                tally.inserted += size;
                Ok(())
            }
            Err(err) if err.is_duplicate() => {
                let message = format!("{} at line {}", err, line);
                error!(rows = size, "Could not insert a batch: {}", message);
                tally.skipped += 1;
                tally.errors.push(message);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
