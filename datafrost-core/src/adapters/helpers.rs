//! Helper utilities shared by the backend adapters.
//!
//! - `ensure_read_only`: the keyword allow-list applied to ad-hoc SQL
//! - `ConnectionSlot`: lifecycle holder for an adapter's live connection
//! - `count_total`: reads the total of a page's count query

use crate::models::{QueryResult, Value};
use crate::{Result, error::DatafrostError};
use parking_lot::RwLock;

/// Read-only keywords accepted by every backend.
pub const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH"];

/// Read-only keywords accepted by SQLite-family backends.
pub const SQLITE_READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH", "PRAGMA"];

/// Rejects any statement whose trimmed, uppercased text does not start
/// with one of `allowed`.
///
/// This is a prefix check, not a parser: `SELECT 1; DELETE FROM t` passes
/// and relies on the driver refusing multiple statements or on a
/// read-only session.
///
/// # Example
/// ```rust
/// use datafrost_core::adapters::helpers::{READ_ONLY_KEYWORDS, ensure_read_only};
///
/// assert!(ensure_read_only("  select 1", READ_ONLY_KEYWORDS).is_ok());
/// assert!(ensure_read_only("DELETE FROM users", READ_ONLY_KEYWORDS).is_err());
/// ```
pub fn ensure_read_only(sql: &str, allowed: &[&str]) -> Result<()> {
    let normalized = sql.trim().to_uppercase();
    if allowed.iter().any(|keyword| normalized.starts_with(keyword)) {
        Ok(())
    } else {
        Err(DatafrostError::rejected_statement(allowed))
    }
}

/// Total row count from a `SELECT COUNT(*)` result.
///
/// A missing or non-numeric count is an error; a page is never reported
/// with an invented total.
pub fn count_total(counted: &QueryResult, table: &str) -> Result<u64> {
    counted
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            DatafrostError::query_message(
                format!("Failed to count rows in table '{}'", table),
                "count query returned no rows",
            )
        })
}

/// Quotes an identifier with double quotes, doubling embedded quotes.
pub fn quote_double(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quotes an identifier with backticks, escaping embedded backticks.
pub fn quote_backtick(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "\\`"))
}

/// Escapes a value for use inside a single-quoted SQL string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

enum SlotState<T> {
    Empty,
    Open(T),
    Closed,
}

/// Holds an adapter's live connection handle.
///
/// The slot moves `Empty → Open → Closed`; a closed slot never reopens, so
/// an adapter cannot be reused after `close`. The lock is only held for the
/// duration of a clone or swap and never across an await point.
pub struct ConnectionSlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T> Default for ConnectionSlot<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(SlotState::Empty),
        }
    }
}

impl<T: Clone> ConnectionSlot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly opened connection, returning any it replaced.
    ///
    /// # Errors
    /// Fails once the slot has been closed.
    pub fn install(&self, connection: T) -> Result<Option<T>> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, SlotState::Empty) {
            SlotState::Closed => {
                *state = SlotState::Closed;
                Err(DatafrostError::configuration(
                    "adapter was closed and cannot be reconnected",
                ))
            }
            SlotState::Empty => {
                *state = SlotState::Open(connection);
                Ok(None)
            }
            SlotState::Open(previous) => {
                *state = SlotState::Open(connection);
                Ok(Some(previous))
            }
        }
    }

    /// Returns a handle to the open connection.
    ///
    /// # Errors
    /// `NotConnected` before `install` or after `take`.
    pub fn get(&self) -> Result<T> {
        match &*self.state.read() {
            SlotState::Open(connection) => Ok(connection.clone()),
            SlotState::Empty | SlotState::Closed => Err(DatafrostError::NotConnected),
        }
    }

    /// Closes the slot, handing back the connection if one was open.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, SlotState::Closed) {
            SlotState::Open(connection) => Some(connection),
            SlotState::Empty | SlotState::Closed => None,
        }
    }

    /// True while a connection is installed.
    pub fn is_open(&self) -> bool {
        matches!(&*self.state.read(), SlotState::Open(_))
    }
}
