//! SQL text generation for DDL and batched inserts.
//!
//! Statements are built per [`Driver`]: identifier quoting and placeholder
//! style differ, the statement shapes do not.

use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{ColumnMapping, ColumnType, Record, SqlValue};

use super::options::Driver;

/// Quote an identifier for the driver, doubling any embedded quote.
pub fn quote_ident(driver: Driver, name: &str) -> String {
    let quote = match driver {
        Driver::MySql => '`',
        Driver::Postgres | Driver::Sqlite => '"',
    };
    let escaped = name.replace(quote, &format!("{}{}", quote, quote));
    format!("{}{}{}", quote, escaped, quote)
}

/// Storage type of a logical column type.
pub fn column_type_sql(driver: Driver, column_type: ColumnType) -> &'static str {
    match (driver, column_type) {
        (_, ColumnType::Integer) => "INTEGER",
        (Driver::Sqlite, ColumnType::String) => "TEXT",
        (Driver::MySql | Driver::Postgres, ColumnType::String) => "VARCHAR(255)",
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a column mapping, columns in mapping order.
pub fn create_table_sql(driver: Driver, table: &str, mapping: &ColumnMapping) -> String {
    let columns: Vec<String> = mapping
        .iter()
        .map(|(name, spec)| {
            let mut column = format!(
                "{} {}",
                quote_ident(driver, name),
                column_type_sql(driver, spec.column_type)
            );
            if !spec.nullable {
                column.push_str(" NOT NULL");
            }
            if spec.unique {
                column.push_str(" UNIQUE");
            }
            column
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(driver, table),
        columns.join(", ")
    )
}

/// Probe query used to check that a table exists.
pub fn table_exists_sql(driver: Driver, table: &str) -> String {
    format!("SELECT 1 FROM {} LIMIT 1", quote_ident(driver, table))
}

/// Fail unless every record lists the same columns, in the same order, as the first.
pub fn check_batch(rows: &[Record]) -> DatabaseResult<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };

    match rows.iter().position(|row| !row.same_columns(first)) {
        None => Ok(()),
        Some(index) => Err(DatabaseError::MismatchedBatch {
            index,
            expected: first.columns().collect::<Vec<_>>().join(", "),
            found: rows[index].columns().collect::<Vec<_>>().join(", "),
        }),
    }
}

/// Multi-row `INSERT` for a batch.
///
/// `NULL` values are written inline; every other value gets a placeholder,
/// numbered from 1 on PostgreSQL. Bind values in the order of
/// [`bound_values`].
pub fn insert_sql(driver: Driver, table: &str, rows: &[Record]) -> String {
    let columns = rows
        .first()
        .map(|r| {
            r.columns()
                .map(|c| quote_ident(driver, c))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let mut index = 0;
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row
                .values()
                .map(|value| match value {
                    SqlValue::Null => "NULL".to_string(),
                    _ => {
                        index += 1;
                        match driver {
                            Driver::Postgres => format!("${}", index),
                            Driver::MySql | Driver::Sqlite => "?".to_string(),
                        }
                    }
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(driver, table),
        columns,
        tuples.join(", ")
    )
}

/// Values that need a placeholder, in statement order.
pub fn bound_values(rows: &[Record]) -> impl Iterator<Item = &SqlValue> {
    rows.iter()
        .flat_map(|row| row.values())
        .filter(|v| !matches!(v, SqlValue::Null))
}
