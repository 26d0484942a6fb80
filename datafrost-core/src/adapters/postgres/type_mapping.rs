//! PostgreSQL wire values to canonical cell values.
//!
//! Conversion is keyed on the runtime type name reported by the driver.
//! Numerics and temporal types are rendered as text to avoid precision loss
//! and timezone surprises; `bytea` becomes standard base64.
//!
//! Results arrive in the binary protocol, so only the types listed in
//! [`decodes_natively`] are read directly. Statements returning any other
//! type are re-run through [`text_projection`], which has the server render
//! those columns in their default text form.

use crate::adapters::helpers::quote_double;
use crate::models::Value;
use base64::Engine;
use sqlx::postgres::PgRow;
use sqlx::postgres::types::{PgInterval, PgMoney, PgTimeTz};
use chrono::Timelike;
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{Row, TypeInfo, ValueRef};

const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_MINUTE: u64 = 60_000_000;
const MICROS_PER_HOUR: u64 = 3_600_000_000;

/// True for type names [`pg_value`] decodes from the binary format.
pub fn decodes_natively(type_name: &str) -> bool {
    matches!(
        type_name,
        "BOOL"
            | "INT2"
            | "INT4"
            | "INT8"
            | "OID"
            | "FLOAT4"
            | "FLOAT8"
            | "NUMERIC"
            | "UUID"
            | "JSON"
            | "JSONB"
            | "TIMESTAMPTZ"
            | "TIMESTAMP"
            | "DATE"
            | "TIME"
            | "TIMETZ"
            | "INTERVAL"
            | "INET"
            | "CIDR"
            | "MONEY"
            | "BYTEA"
            | "TEXT"
            | "VARCHAR"
            | "BPCHAR"
            | "NAME"
            | "UNKNOWN"
    )
}

/// Wraps `sql` so every column whose type is not natively decoded comes
/// back as `text`.
///
/// `columns` holds the statement's `(name, type name)` pairs. Columns are
/// addressed by position, so duplicate or generated names are kept as-is.
/// Returns `None` when no column needs the cast.
pub fn text_projection(sql: &str, columns: &[(String, String)]) -> Option<String> {
    if columns.iter().all(|(_, type_name)| decodes_natively(type_name)) {
        return None;
    }

    let mut select = Vec::with_capacity(columns.len());
    let mut aliases = Vec::with_capacity(columns.len());
    for (position, (name, type_name)) in columns.iter().enumerate() {
        let alias = format!("c{}", position.saturating_add(1));
        let cast = if decodes_natively(type_name) { "" } else { "::text" };
        select.push(format!("{}{} AS {}", alias, cast, quote_double(name)));
        aliases.push(alias);
    }

    // Newlines keep a trailing line comment from swallowing the parenthesis
    let inner = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    Some(format!(
        "SELECT {} FROM (\n{}\n) AS datafrost_rows ({})",
        select.join(", "),
        inner,
        aliases.join(", ")
    ))
}

/// Converts column `index` of `row` into a canonical value.
pub fn pg_value(row: &PgRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool).ok(),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map(|n| Value::Integer(i64::from(n)))
            .ok(),
        "INT4" => row
            .try_get::<i32, _>(index)
            .map(|n| Value::Integer(i64::from(n)))
            .ok(),
        "INT8" => row.try_get::<i64, _>(index).map(Value::Integer).ok(),
        "OID" => row
            .try_get::<sqlx::postgres::types::Oid, _>(index)
            .map(|oid| Value::Integer(i64::from(oid.0)))
            .ok(),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .map(|n| Value::Float(f64::from(n)))
            .ok(),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::Float).ok(),
        "NUMERIC" => text_of::<BigDecimal>(row, index),
        "UUID" => text_of::<Uuid>(row, index),
        "JSON" | "JSONB" => text_of::<JsonValue>(row, index),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|ts| Value::String(ts.to_rfc3339()))
            .ok(),
        "TIMESTAMP" => text_of::<NaiveDateTime>(row, index),
        "DATE" => text_of::<NaiveDate>(row, index),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|time| Value::String(clock_text(time)))
            .ok(),
        "TIMETZ" => row
            .try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)
            .map(|t| Value::String(time_tz_text(t.time, t.offset)))
            .ok(),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(index)
            .map(|interval| Value::String(interval_text(&interval)))
            .ok(),
        "INET" | "CIDR" => row
            .try_get::<IpNetwork, _>(index)
            .map(|network| Value::String(network_text(network, type_name == "CIDR")))
            .ok(),
        "MONEY" => row
            .try_get::<PgMoney, _>(index)
            .map(|money| Value::String(money_text(money.0)))
            .ok(),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .ok(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            row.try_get::<String, _>(index).map(Value::String).ok()
        }
        _ => None,
    };

    value.unwrap_or_else(|| {
        tracing::debug!("No conversion for PostgreSQL type {} at column {}", type_name, index);
        Value::Null
    })
}

fn text_of<T>(row: &PgRow, index: usize) -> Option<Value>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + ToString,
{
    row.try_get::<T, _>(index)
        .map(|value| Value::String(value.to_string()))
        .ok()
}

/// `SS` plus a fraction with trailing zeros removed.
fn seconds_text(seconds: u64, micros: u64) -> String {
    if micros == 0 {
        format!("{:02}", seconds)
    } else {
        let fraction = format!("{:06}", micros);
        format!("{:02}.{}", seconds, fraction.trim_end_matches('0'))
    }
}

/// `HH:MM:SS[.ffffff]`
fn clock_text(time: NaiveTime) -> String {
    // Leap seconds carry past one million microseconds
    let micros = u64::from(time.nanosecond() / 1_000).min(999_999);
    format!(
        "{:02}:{:02}:{}",
        time.hour(),
        time.minute(),
        seconds_text(u64::from(time.second()), micros)
    )
}

/// `HH:MM:SS[.ffffff]+HH[:MM[:SS]]`
fn time_tz_text(time: NaiveTime, offset: FixedOffset) -> String {
    let east = offset.local_minus_utc();
    let sign = if east < 0 { '-' } else { '+' };
    let east = east.unsigned_abs();
    let (hours, minutes, seconds) = (east / 3600, east / 60 % 60, east % 60);

    let mut text = format!("{}{}{:02}", clock_text(time), sign, hours);
    if minutes != 0 || seconds != 0 {
        text.push_str(&format!(":{:02}", minutes));
    }
    if seconds != 0 {
        text.push_str(&format!(":{:02}", seconds));
    }
    text
}

/// Interval in the server's default `postgres` output style, such as
/// `1 year 2 mons -3 days +04:05:06.5`.
fn interval_text(interval: &PgInterval) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut negative_seen = false;

    let fields = [
        (interval.months / 12, "year"),
        (interval.months % 12, "mon"),
        (interval.days, "day"),
    ];
    for (value, unit) in fields {
        if value == 0 {
            continue;
        }
        let sign = if negative_seen && value > 0 { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        parts.push(format!("{}{} {}{}", sign, value, unit, plural));
        negative_seen |= value < 0;
    }

    // The clock part is shown when non-zero or when nothing else is
    let micros = interval.microseconds;
    if parts.is_empty() || micros != 0 {
        let sign = if micros < 0 {
            "-"
        } else if negative_seen {
            "+"
        } else {
            ""
        };
        let micros = micros.unsigned_abs();
        parts.push(format!(
            "{}{:02}:{:02}:{}",
            sign,
            micros / MICROS_PER_HOUR,
            micros / MICROS_PER_MINUTE % 60,
            seconds_text(micros / MICROS_PER_SECOND % 60, micros % MICROS_PER_SECOND)
        ));
    }

    parts.join(" ")
}

/// `inet` omits a full-length prefix; `cidr` always shows it.
fn network_text(network: IpNetwork, always_prefix: bool) -> String {
    let full = match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if always_prefix || network.prefix() != full {
        format!("{}/{}", network.ip(), network.prefix())
    } else {
        network.ip().to_string()
    }
}

/// Cents as `-$1,234.56`, the rendering of the C and `en_US` locales.
fn money_text(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len().saturating_mul(2));
    for (position, digit) in whole.chars().enumerate() {
        if position > 0 && whole.len().saturating_sub(position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000_000;
    const MINUTE: i64 = 60_000_000;

    fn interval(months: i32, days: i32, microseconds: i64) -> String {
        interval_text(&PgInterval {
            months,
            days,
            microseconds,
        })
    }

    #[test]
    fn test_interval_postgres_style() {
        assert_eq!(interval(0, 1, 2 * HOUR + 3 * MINUTE + 4_000_000), "1 day 02:03:04");
        assert_eq!(interval(14, 3, 0), "1 year 2 mons 3 days");
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(interval(0, 0, 1_500_000), "00:00:01.5");
        assert_eq!(interval(0, -3, 4 * HOUR), "-3 days +04:00:00");
        assert_eq!(interval(-1, 0, -MINUTE), "-1 mons -00:01:00");
        assert_eq!(interval(0, 0, 100 * HOUR), "100:00:00");
        assert_eq!(interval(12, 0, 0), "1 year");
    }

    #[test]
    fn test_time_text() {
        let time = NaiveTime::from_hms_micro_opt(9, 5, 7, 250_000).unwrap();
        assert_eq!(clock_text(time), "09:05:07.25");

        let plain = NaiveTime::from_hms_opt(12, 34, 56).unwrap();
        assert_eq!(time_tz_text(plain, FixedOffset::east_opt(2 * 3600).unwrap()), "12:34:56+02");
        assert_eq!(
            time_tz_text(plain, FixedOffset::west_opt(3 * 3600 + 30 * 60).unwrap()),
            "12:34:56-03:30"
        );
        assert_eq!(time_tz_text(plain, FixedOffset::east_opt(0).unwrap()), "12:34:56+00");
    }

    #[test]
    fn test_network_text() {
        let host: IpNetwork = "10.0.0.1/32".parse().unwrap();
        assert_eq!(network_text(host, false), "10.0.0.1");
        assert_eq!(network_text(host, true), "10.0.0.1/32");

        let subnet: IpNetwork = "192.168.0.0/24".parse().unwrap();
        assert_eq!(network_text(subnet, false), "192.168.0.0/24");

        let v6: IpNetwork = "::1/128".parse().unwrap();
        assert_eq!(network_text(v6, false), "::1");
    }

    #[test]
    fn test_money_text() {
        assert_eq!(money_text(123_456), "$1,234.56");
        assert_eq!(money_text(-5), "-$0.05");
        assert_eq!(money_text(100_000_000), "$1,000,000.00");
        assert_eq!(money_text(0), "$0.00");
    }

    #[test]
    fn test_text_projection_casts_unknown_columns() {
        let columns = vec![
            ("id".to_string(), "INT4".to_string()),
            ("flags".to_string(), "BOOL[]".to_string()),
            ("id".to_string(), "mood".to_string()),
        ];
        let sql = text_projection("SELECT a.id, a.flags, b.id FROM a, b -- pairs\n;", &columns).unwrap();
        assert_eq!(
            sql,
            "SELECT c1 AS \"id\", c2::text AS \"flags\", c3::text AS \"id\" FROM (\n\
             SELECT a.id, a.flags, b.id FROM a, b -- pairs\n\
             ) AS datafrost_rows (c1, c2, c3)"
        );

        let native = vec![("n".to_string(), "INT8".to_string())];
        assert_eq!(text_projection("SELECT 1", &native), None);
        assert_eq!(text_projection("SELECT", &[]), None);
    }
}
