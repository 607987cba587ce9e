//! Database dialects.
//!
//! A dialect decides how values are written as SQL literals, which
//! merge/upsert forms the compiler may emit and how the execution boundary
//! reports a unique-key violation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, TwoWayError};

/// LIKE escape character used by `escape()` and the `as*fix()` helpers
/// unless the configuration names another one. Every supported dialect
/// accepts it in an `escape` clause.
pub const DEFAULT_ESCAPE_CHAR: char = '\\';
use crate::value::{TypedValue, Value};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    H2,
    #[default]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    Oracle,
    Sqlite,
    SqlServer,
}

/// How an insert-or-update is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `on conflict (keys) do update set ...`
    OnConflict,
    /// `on duplicate key update ...`
    OnDuplicateKey,
    /// only through `merge into`
    MergeOnly,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::H2,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::Oracle,
        Dialect::Sqlite,
        Dialect::SqlServer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::H2 => "h2",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Oracle => "oracle",
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlserver",
        }
    }

    pub fn supports_merge(&self) -> bool {
        matches!(self, Dialect::H2 | Dialect::Oracle | Dialect::SqlServer)
    }

    pub fn upsert_style(&self) -> UpsertStyle {
        match self {
            Dialect::Postgres | Dialect::Sqlite => UpsertStyle::OnConflict,
            Dialect::MySql => UpsertStyle::OnDuplicateKey,
            Dialect::H2 | Dialect::Oracle | Dialect::SqlServer => UpsertStyle::MergeOnly,
        }
    }

    /// Write a value as an SQL literal.
    pub fn format_value(&self, value: &TypedValue) -> String {
        self.format(&value.value)
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => match self {
                Dialect::Oracle | Dialect::SqlServer | Dialect::Sqlite => if *b { "1" } else { "0" }.to_string(),
                _ => b.to_string(),
            },
            Value::Char(c) => quote(&c.to_string()),
            Value::String(s) => quote(s),
            Value::Int(n) => n.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Double(n) => n.to_string(),
            Value::BigDecimal(d) => d.to_string(),
            Value::Timestamp(ts) => {
                let text = quote(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string());
                match self {
                    Dialect::SqlServer | Dialect::Sqlite => text,
                    _ => format!("timestamp {}", text),
                }
            }
            Value::List(items) => format!(
                "({})",
                items.iter().map(|v| self.format(v)).collect::<Vec<_>>().join(", ")
            ),
            Value::Object(_) => quote(&value.to_plain_string()),
        }
    }

    /// Whether a boundary error reports a duplicate key.
    pub fn is_unique_violation(&self, error: &ExecutionError) -> bool {
        match self {
            Dialect::H2 | Dialect::Postgres => error.sql_state.as_deref() == Some("23505"),
            Dialect::MySql => error.vendor_code == Some(1062),
            Dialect::Oracle => error.vendor_code == Some(1),
            Dialect::Sqlite => matches!(error.vendor_code, Some(2067) | Some(1555)),
            Dialect::SqlServer => matches!(error.vendor_code, Some(2627) | Some(2601)),
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dialect {
    type Err = TwoWayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h2" => Ok(Dialect::H2),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "oracle" => Ok(Dialect::Oracle),
            "sqlite" => Ok(Dialect::Sqlite),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(TwoWayError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}
