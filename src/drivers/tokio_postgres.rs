use std::collections::HashMap;
use std::error::Error;
use std::fmt::Write;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};

use crate::error::{Result, VtRsError};
use crate::traits::DatabaseDriver;
use crate::types::{RawQueryResult, SqlValue, Value, WireTypeTag};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Driver implementation using tokio-postgres.
///
/// Statements prepared through [`DatabaseDriver::prepare`] are kept client
/// side under the adapter's name; dropping one closes it on the server.
pub struct TokioPostgresDriver {
    connection_string: String,
    client: RwLock<Option<Client>>,
    statements: Mutex<HashMap<String, Statement>>,
}

impl TokioPostgresDriver {
    /// Connect to the database.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let client = open(connection_string).await?;
        Ok(Self {
            connection_string: connection_string.to_string(),
            client: RwLock::new(Some(client)),
            statements: Mutex::new(HashMap::new()),
        })
    }

    async fn run(&self, statement: &Statement, params: &[SqlValue]) -> Result<RawQueryResult> {
        // Convert SqlValue params to tokio-postgres compatible types
        let converted_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(sql_value_to_tosql).collect();

        let param_refs: Vec<&(dyn ToSql + Sync)> = converted_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(closed)?;
        let rows = client
            .query(statement, &param_refs)
            .await
            .map_err(query_error)?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let types = statement
            .columns()
            .iter()
            .map(|c| wire_type_tag(c.type_()))
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| {
                        row.try_get::<_, Cell>(i)
                            .map(|cell| cell.0)
                            .map_err(query_error)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawQueryResult::new(columns, types, result_rows))
    }
}

async fn open(connection_string: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
        .await
        .map_err(|e| VtRsError::ConnectionFailed(e.to_string()))?;

    // Spawn the connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "connection error");
        }
    });

    Ok(client)
}

fn closed() -> VtRsError {
    VtRsError::query("connection is closed")
}

fn query_error(e: tokio_postgres::Error) -> VtRsError {
    VtRsError::QueryFailed {
        code: e.code().map(|c| c.code().to_string()),
        message: e.to_string(),
    }
}

#[async_trait]
impl DatabaseDriver for TokioPostgresDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let statement = {
            let guard = self.client.read().await;
            let client = guard.as_ref().ok_or_else(closed)?;
            client.prepare(sql).await.map_err(query_error)?
        };
        self.run(&statement, params).await
    }

    async fn prepare(&self, name: &str, sql: &str) -> Result<()> {
        let statement = {
            let guard = self.client.read().await;
            let client = guard.as_ref().ok_or_else(closed)?;
            client.prepare(sql).await.map_err(query_error)?
        };
        self.statements
            .lock()
            .await
            .insert(name.to_string(), statement);
        Ok(())
    }

    async fn execute_prepared(&self, name: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let statement = self
            .statements
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| {
                VtRsError::server("26000", format!("prepared statement \"{name}\" does not exist"))
            })?;
        self.run(&statement, params).await
    }

    async fn deallocate(&self, name: &str) -> Result<()> {
        // The server-side statement is closed once the last clone drops.
        self.statements.lock().await.remove(name);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        matches!(&*self.client.read().await, Some(client) if !client.is_closed())
    }

    async fn reset(&self) -> Result<()> {
        self.statements.lock().await.clear();
        let client = open(&self.connection_string).await?;
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.statements.lock().await.clear();
        self.client.write().await.take();
        Ok(())
    }
}

/// Convert a SqlValue to a boxed ToSql trait object.
fn sql_value_to_tosql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(None::<String>),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float(f) => Box::new(*f),
        // Sent as text; binds against numeric parameters need an explicit cast.
        SqlValue::Decimal(d) => Box::new(d.clone()),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Date(d) => Box::new(*d),
    }
}

/// Map a server type onto the wire tag table the coercion engine reads.
fn wire_type_tag(ty: &Type) -> WireTypeTag {
    match *ty {
        Type::BOOL => WireTypeTag::BOOLEAN,
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => WireTypeTag::INTEGER,
        Type::FLOAT4 | Type::FLOAT8 => WireTypeTag::FLOAT,
        Type::BPCHAR | Type::CHAR => WireTypeTag::CHAR,
        Type::VARCHAR | Type::NAME => WireTypeTag::VARCHAR,
        Type::TEXT => WireTypeTag::LONG_VARCHAR,
        Type::DATE => WireTypeTag::DATE,
        Type::TIME => WireTypeTag::TIME,
        Type::TIMETZ => WireTypeTag::TIMETZ,
        Type::TIMESTAMP => WireTypeTag::TIMESTAMP,
        Type::TIMESTAMPTZ => WireTypeTag::TIMESTAMPTZ,
        Type::INTERVAL => WireTypeTag::INTERVAL,
        Type::NUMERIC => WireTypeTag::NUMERIC,
        Type::BYTEA => WireTypeTag::VARBINARY,
        Type::MONEY => WireTypeTag::MONEY,
        _ => WireTypeTag(ty.oid()),
    }
}

/// A result cell in the text form the coercion engine expects. Binary
/// columns stay raw bytes; a type with no text rendering is an error.
struct Cell(Value);

impl<'a> FromSql<'a> for Cell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let text = match *ty {
            Type::BOOL => (if bool::from_sql(ty, raw)? { "t" } else { "f" }).to_string(),
            Type::INT2 => i16::from_sql(ty, raw)?.to_string(),
            Type::INT4 => i32::from_sql(ty, raw)?.to_string(),
            Type::INT8 => i64::from_sql(ty, raw)?.to_string(),
            Type::OID => u32::from_sql(ty, raw)?.to_string(),
            Type::FLOAT4 => f32::from_sql(ty, raw)?.to_string(),
            Type::FLOAT8 => f64::from_sql(ty, raw)?.to_string(),
            Type::NUMERIC => decode_numeric(raw)?,
            Type::MONEY => decode_money(raw)?,
            Type::DATE => NaiveDate::from_sql(ty, raw)?.format("%Y-%m-%d").to_string(),
            Type::TIME => NaiveTime::from_sql(ty, raw)?.format("%H:%M:%S%.f").to_string(),
            Type::TIMESTAMP => NaiveDateTime::from_sql(ty, raw)?
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string(),
            Type::TIMESTAMPTZ => DateTime::<Utc>::from_sql(ty, raw)?
                .format("%Y-%m-%d %H:%M:%S%.f%:z")
                .to_string(),
            Type::TIMETZ => decode_timetz(raw)?,
            Type::INTERVAL => decode_interval(raw)?,
            Type::UUID => decode_uuid(raw)?,
            Type::BIT | Type::VARBIT => decode_bits(raw)?,
            Type::CHAR => char::from(i8::from_sql(ty, raw)? as u8).to_string(),
            Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UNKNOWN
            | Type::JSON
            | Type::XML => <&str>::from_sql(&Type::TEXT, raw)?.to_string(),
            Type::JSONB => match raw.split_first() {
                Some((&1, body)) => std::str::from_utf8(body)?.to_string(),
                _ => return Err("unsupported jsonb version".into()),
            },
            Type::BYTEA => return Ok(Cell(Value::Bytes(raw.to_vec()))),
            _ => return Err(format!("cannot render result type {ty} as text").into()),
        };
        Ok(Cell(Value::Text(text)))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, BoxError> {
        Ok(Cell(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn read_u16(raw: &[u8], at: usize) -> std::result::Result<u16, BoxError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

/// Render the binary `numeric` format (base-10000 digit groups) as text.
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let ndigits = read_u16(raw, 0)? as usize;
    let weight = read_u16(raw, 2)? as i16 as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read_u16(raw, 8 + i * 2))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let digit = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit(index))?;
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// `money` travels as a count of cents.
fn decode_money(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| "malformed money value")?;
    let cents = i64::from_be_bytes(bytes);
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    Ok(format!("{sign}{}.{:02}", cents / 100, cents % 100))
}

fn read_i32(raw: &[u8], at: usize) -> std::result::Result<i32, BoxError> {
    raw.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_be_bytes)
        .ok_or_else(|| "truncated value".into())
}

fn read_i64(raw: &[u8], at: usize) -> std::result::Result<i64, BoxError> {
    raw.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_be_bytes)
        .ok_or_else(|| "truncated value".into())
}

fn time_of_day(micros: i64) -> std::result::Result<NaiveTime, BoxError> {
    let secs = u32::try_from(micros.div_euclid(1_000_000))?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000)?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| format!("time of day out of range: {micros}").into())
}

/// `timetz` is microseconds since midnight followed by the zone offset in
/// seconds west of UTC.
fn decode_timetz(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() != 12 {
        return Err("malformed timetz value".into());
    }
    let time = time_of_day(read_i64(raw, 0)?)?;
    let east = -read_i32(raw, 8)?;

    let sign = if east < 0 { '-' } else { '+' };
    let east = east.unsigned_abs();
    let (hours, minutes, seconds) = (east / 3600, east % 3600 / 60, east % 60);
    let mut out = format!("{}{sign}{hours:02}", time.format("%H:%M:%S%.f"));
    if minutes != 0 || seconds != 0 {
        write!(out, ":{minutes:02}")?;
    }
    if seconds != 0 {
        write!(out, ":{seconds:02}")?;
    }
    Ok(out)
}

/// `interval` is microseconds, then days, then months.
fn decode_interval(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() != 16 {
        return Err("malformed interval value".into());
    }
    let micros = read_i64(raw, 0)?;
    let days = read_i32(raw, 8)?;
    let months = read_i32(raw, 12)?;

    let mut parts = Vec::new();
    let unit = |n: i32, one: &str, many: &str| {
        format!("{n} {}", if n == 1 { one } else { many })
    };
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year", "years"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon", "mons"));
    }
    if days != 0 {
        parts.push(unit(days, "day", "days"));
    }

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            write!(clock, ".{}", digits.trim_end_matches('0'))?;
        }
        parts.push(clock);
    }
    Ok(parts.join(" "))
}

fn decode_uuid(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() != 16 {
        return Err("malformed uuid value".into());
    }
    Ok(format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&raw[0..4]),
        hex::encode(&raw[4..6]),
        hex::encode(&raw[6..8]),
        hex::encode(&raw[8..10]),
        hex::encode(&raw[10..16])
    ))
}

/// Bit strings travel as a bit count followed by the packed bits.
fn decode_bits(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let len = usize::try_from(read_i32(raw, 0)?)?;
    let bytes = &raw[4..];
    if bytes.len() * 8 < len {
        return Err("truncated bit string".into());
    }
    Ok((0..len)
        .map(|i| if bytes[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
        .collect())
}
