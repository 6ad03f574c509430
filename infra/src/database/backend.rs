//! Compile-time backend selection
//!
//! Exactly one SQL backend is active per build: `sqlite` (default) or
//! `mysql`. When both features are enabled SQLite wins. Both backends use
//! `?` placeholders and ANSI savepoint statements, so the differences kept
//! here are identifier quoting, the "no limit" literal, empty inserts,
//! last-insert-id retrieval and per-connection session statements.

use std::collections::BTreeMap;
use std::time::Duration;

use ks_core::repositories::Value;
use sqlx::Arguments;

#[cfg(not(any(feature = "sqlite", feature = "mysql")))]
compile_error!("ks_infra needs a database backend: enable the `sqlite` or `mysql` feature");

#[cfg(feature = "sqlite")]
mod dialect {
    use super::*;

    pub type Db = sqlx::Sqlite;
    pub type DbConnectOptions = sqlx::sqlite::SqliteConnectOptions;
    pub type DbQueryResult = sqlx::sqlite::SqliteQueryResult;

    pub const BACKEND_NAME: &str = "sqlite";

    /// LIMIT value meaning "no limit", needed when only OFFSET is wanted
    pub const UNBOUNDED_LIMIT: &str = "-1";

    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    pub fn empty_insert(table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
    }

    pub fn last_insert_id(result: &DbQueryResult) -> i64 {
        result.last_insert_rowid()
    }

    /// SQLite has no per-statement timeout; lock waits are bounded instead
    pub fn session_statements(
        settings: &BTreeMap<String, String>,
        statement_timeout: Duration,
    ) -> Vec<String> {
        let mut statements = vec![format!(
            "PRAGMA busy_timeout = {}",
            statement_timeout.as_millis()
        )];
        statements.extend(
            settings
                .iter()
                .map(|(key, value)| format!("PRAGMA {} = {}", key, value)),
        );
        statements
    }

    /// Version, database, user and server-side connection count; SQLite
    /// has no users or server, so those two columns are NULL
    pub const SERVER_INFO_QUERY: &str = "SELECT 'SQLite ' || sqlite_version(), \
         COALESCE(NULLIF((SELECT file FROM pragma_database_list WHERE name = 'main'), ''), 'main'), \
         NULL, NULL";

    pub const LIST_TABLES_QUERY: &str = "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
}

#[cfg(all(feature = "mysql", not(feature = "sqlite")))]
mod dialect {
    use super::*;

    pub type Db = sqlx::MySql;
    pub type DbConnectOptions = sqlx::mysql::MySqlConnectOptions;
    pub type DbQueryResult = sqlx::mysql::MySqlQueryResult;

    pub const BACKEND_NAME: &str = "mysql";

    /// LIMIT value meaning "no limit", needed when only OFFSET is wanted
    pub const UNBOUNDED_LIMIT: &str = "18446744073709551615";

    pub fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    pub fn empty_insert(table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", quote_identifier(table))
    }

    pub fn last_insert_id(result: &DbQueryResult) -> i64 {
        i64::try_from(result.last_insert_id()).unwrap_or(i64::MAX)
    }

    pub fn session_statements(
        settings: &BTreeMap<String, String>,
        statement_timeout: Duration,
    ) -> Vec<String> {
        let mut statements = vec![format!(
            "SET SESSION max_execution_time = {}",
            statement_timeout.as_millis()
        )];
        statements.extend(
            settings
                .iter()
                .map(|(key, value)| format!("SET SESSION {} = {}", key, value)),
        );
        statements
    }

    pub const SERVER_INFO_QUERY: &str = "SELECT VERSION(), COALESCE(DATABASE(), ''), CURRENT_USER(), \
         (SELECT COUNT(*) FROM information_schema.processlist WHERE db = DATABASE())";

    pub const LIST_TABLES_QUERY: &str = "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name";
}

pub use dialect::*;

pub type DbConnection = <Db as sqlx::Database>::Connection;
pub type DbRow = <Db as sqlx::Database>::Row;
pub type DbArguments<'q> = <Db as sqlx::database::HasArguments<'q>>::Arguments;
pub type DbTransactionManager = <Db as sqlx::Database>::TransactionManager;

/// Bind `values` positionally, in order
pub fn to_arguments<'q>(values: Vec<Value>) -> DbArguments<'q> {
    let mut arguments = DbArguments::default();
    for value in values {
        match value {
            Value::Null => arguments.add(None::<String>),
            Value::Bool(b) => arguments.add(b),
            Value::Int(i) => arguments.add(i),
            Value::Float(f) => arguments.add(f),
            Value::Text(s) => arguments.add(s),
            Value::Bytes(bytes) => arguments.add(bytes),
            Value::Timestamp(ts) => arguments.add(ts),
        }
    }
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        let quoted = quote_identifier("order");
        assert!(quoted.len() == "order".len() + 2);
        assert!(quoted.contains("order"));

        let hostile = quote_identifier("a\"b`c");
        assert!(hostile.starts_with(&quoted[..1]));
        assert!(hostile.ends_with(&quoted[..1]));
    }

    #[test]
    fn test_session_statements_start_with_timeout() {
        let mut settings = BTreeMap::new();
        settings.insert("foreign_keys".to_string(), "ON".to_string());

        let statements = session_statements(&settings, Duration::from_secs(60));
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("60000"));
        assert!(statements[1].contains("foreign_keys = ON"));
    }

    #[test]
    fn test_empty_insert_targets_table() {
        assert!(empty_insert("orders").starts_with("INSERT INTO "));
        assert!(empty_insert("orders").contains("orders"));
    }
}
