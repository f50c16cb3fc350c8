//! Value decoding
//!
//! Turns the raw bytes of a text-protocol or binary-protocol row into
//! [`Value`]s, applying the configured [`ZeroDateOption`] to the all-zero
//! `DATE`/`DATETIME`/`TIMESTAMP` sentinel.

use crate::extension::Extensions;
use crate::protocol::constants::{column_types, BINARY_CHARSET};
use crate::protocol::PacketReader;
use crate::row::Column;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the all-zero date sentinel is surfaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDateOption {
    /// Fail decoding with [`Error::Decode`]
    Exception,
    /// Decode as [`Value::Null`]
    #[default]
    UseNull,
    /// Round up to `0001-01-01 00:00:00`
    UseRound,
}

impl fmt::Display for ZeroDateOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception => write!(f, "exception"),
            Self::UseNull => write!(f, "use_null"),
            Self::UseRound => write!(f, "use_round"),
        }
    }
}

impl std::str::FromStr for ZeroDateOption {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "exception" => Ok(Self::Exception),
            "use_null" | "convert_to_null" => Ok(Self::UseNull),
            "use_round" | "round" => Ok(Self::UseRound),
            _ => Err(Error::Config(format!(
                "invalid zero_date '{}': expected exception, use_null, or use_round",
                s
            ))),
        }
    }
}

/// Calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    /// Year
    pub year: u16,
    /// Month (1-12)
    pub month: u8,
    /// Day (1-31)
    pub day: u8,
}

impl Date {
    const ROUNDED: Date = Date {
        year: 1,
        month: 1,
        day: 1,
    };

    fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Time of day or signed duration (MySQL `TIME`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Time {
    /// Negative duration
    pub negative: bool,
    /// Whole hours (may exceed 23)
    pub hours: u32,
    /// Minutes
    pub minutes: u8,
    /// Seconds
    pub seconds: u8,
    /// Microseconds
    pub micros: u32,
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        if self.micros != 0 {
            write!(f, ".{:06}", self.micros)?;
        }
        Ok(())
    }
}

/// Date and time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime {
    /// Date part
    pub date: Date,
    /// Hour
    pub hour: u8,
    /// Minute
    pub minute: u8,
    /// Second
    pub second: u8,
    /// Microseconds
    pub micros: u32,
}

impl DateTime {
    fn at_midnight(date: Date) -> Self {
        Self {
            date,
            hour: 0,
            minute: 0,
            second: 0,
            micros: 0,
        }
    }

    fn is_zero(&self) -> bool {
        self.date.is_zero() && self.hour == 0 && self.minute == 0 && self.second == 0
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date, self.hour, self.minute, self.second
        )?;
        if self.micros != 0 {
            write!(f, ".{:06}", self.micros)?;
        }
        Ok(())
    }
}

/// Decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// FLOAT
    Float(f32),
    /// DOUBLE
    Double(f64),
    /// Character data, including DECIMAL
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// DATE
    Date(Date),
    /// TIME
    Time(Time),
    /// DATETIME / TIMESTAMP
    DateTime(DateTime),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Whether the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Unsigned integer view
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Floating point view
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte view (text or binary)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

/// Row encoding on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Text protocol (COM_QUERY)
    Text,
    /// Binary protocol (COM_STMT_EXECUTE)
    Binary,
}

/// Decoding context shared by all rows of one session
#[derive(Debug, Clone)]
pub struct Decoder {
    zero_date: ZeroDateOption,
    extensions: Extensions,
}

impl Decoder {
    /// Create a decoder
    pub fn new(zero_date: ZeroDateOption, extensions: Extensions) -> Self {
        Self {
            zero_date,
            extensions,
        }
    }

    /// Zero-date policy
    pub fn zero_date(&self) -> ZeroDateOption {
        self.zero_date
    }

    /// Registered extensions
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Decode one raw value (`None` is SQL NULL)
    ///
    /// Extensions are consulted first, in registration order.
    pub fn decode(&self, column: &Column, raw: Option<&[u8]>, format: Format) -> Result<Value> {
        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(Value::Null),
        };
        for ext in self.extensions.iter() {
            if let Some(value) = ext.decode(column, raw, format) {
                return value;
            }
        }
        match format {
            Format::Text => decode_text(column, raw, self.zero_date),
            Format::Binary => decode_binary(column, raw, self.zero_date),
        }
    }
}

fn decode_err(column: &Column, what: impl fmt::Display) -> Error {
    Error::Decode(format!("column '{}': {}", column.name(), what))
}

fn text_str<'a>(column: &Column, raw: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(raw).map_err(|e| decode_err(column, e))
}

fn string_or_bytes(column: &Column, raw: &[u8]) -> Result<Value> {
    if column.charset() == BINARY_CHARSET {
        Ok(Value::Bytes(raw.to_vec()))
    } else {
        Ok(Value::Text(text_str(column, raw)?.to_string()))
    }
}

fn zero_date(column: &Column, option: ZeroDateOption, with_time: bool) -> Result<Value> {
    match option {
        ZeroDateOption::Exception => Err(decode_err(
            column,
            "zero date cannot be represented (zero_date=exception)",
        )),
        ZeroDateOption::UseNull => Ok(Value::Null),
        ZeroDateOption::UseRound if with_time => {
            Ok(Value::DateTime(DateTime::at_midnight(Date::ROUNDED)))
        }
        ZeroDateOption::UseRound => Ok(Value::Date(Date::ROUNDED)),
    }
}

/// Decode a text-protocol value
pub fn decode_text(column: &Column, raw: &[u8], zero: ZeroDateOption) -> Result<Value> {
    match column.column_type() {
        column_types::TINY
        | column_types::SHORT
        | column_types::LONG
        | column_types::INT24
        | column_types::LONGLONG
        | column_types::YEAR => {
            let s = text_str(column, raw)?;
            if column.is_unsigned() {
                s.parse().map(Value::UInt).map_err(|e| decode_err(column, e))
            } else {
                s.parse().map(Value::Int).map_err(|e| decode_err(column, e))
            }
        }
        column_types::FLOAT => text_str(column, raw)?
            .parse()
            .map(Value::Float)
            .map_err(|e| decode_err(column, e)),
        column_types::DOUBLE => text_str(column, raw)?
            .parse()
            .map(Value::Double)
            .map_err(|e| decode_err(column, e)),
        column_types::DATE => {
            let date = parse_date(column, text_str(column, raw)?)?;
            if date.is_zero() {
                zero_date(column, zero, false)
            } else {
                Ok(Value::Date(date))
            }
        }
        column_types::DATETIME | column_types::TIMESTAMP => {
            let dt = parse_datetime(column, text_str(column, raw)?)?;
            if dt.date.is_zero() {
                zero_date(column, zero, true)
            } else {
                Ok(Value::DateTime(dt))
            }
        }
        column_types::TIME => parse_time(column, text_str(column, raw)?).map(Value::Time),
        column_types::BIT | column_types::GEOMETRY => Ok(Value::Bytes(raw.to_vec())),
        column_types::NULL => Ok(Value::Null),
        _ => string_or_bytes(column, raw),
    }
}

/// Decode a binary-protocol value
pub fn decode_binary(column: &Column, raw: &[u8], zero: ZeroDateOption) -> Result<Value> {
    let mut r = PacketReader::new(raw);
    let truncated = |e: std::io::Error| decode_err(column, e);
    let unsigned = column.is_unsigned();

    match column.column_type() {
        column_types::TINY => {
            let b = r.read_u8().map_err(truncated)?;
            Ok(if unsigned {
                Value::UInt(u64::from(b))
            } else {
                Value::Int(i64::from(b as i8))
            })
        }
        column_types::SHORT | column_types::YEAR => {
            let v = r.read_u16().map_err(truncated)?;
            Ok(if unsigned || column.column_type() == column_types::YEAR {
                Value::UInt(u64::from(v))
            } else {
                Value::Int(i64::from(v as i16))
            })
        }
        column_types::LONG | column_types::INT24 => {
            let v = r.read_u32().map_err(truncated)?;
            Ok(if unsigned {
                Value::UInt(u64::from(v))
            } else {
                Value::Int(i64::from(v as i32))
            })
        }
        column_types::LONGLONG => {
            let v = r.read_u64().map_err(truncated)?;
            Ok(if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(v as i64)
            })
        }
        column_types::FLOAT => {
            let v = r.read_u32().map_err(truncated)?;
            Ok(Value::Float(f32::from_bits(v)))
        }
        column_types::DOUBLE => {
            let v = r.read_u64().map_err(truncated)?;
            Ok(Value::Double(f64::from_bits(v)))
        }
        column_types::DATE | column_types::DATETIME | column_types::TIMESTAMP => {
            let with_time = column.column_type() != column_types::DATE;
            if raw.is_empty() {
                return zero_date(column, zero, with_time);
            }
            let date = Date {
                year: r.read_u16().map_err(truncated)?,
                month: r.read_u8().map_err(truncated)?,
                day: r.read_u8().map_err(truncated)?,
            };
            let mut dt = DateTime::at_midnight(date);
            if raw.len() >= 7 {
                dt.hour = r.read_u8().map_err(truncated)?;
                dt.minute = r.read_u8().map_err(truncated)?;
                dt.second = r.read_u8().map_err(truncated)?;
            }
            if raw.len() >= 11 {
                dt.micros = r.read_u32().map_err(truncated)?;
            }
            if dt.is_zero() {
                zero_date(column, zero, with_time)
            } else if with_time {
                Ok(Value::DateTime(dt))
            } else {
                Ok(Value::Date(dt.date))
            }
        }
        column_types::TIME => {
            if raw.is_empty() {
                return Ok(Value::Time(Time::default()));
            }
            let negative = r.read_u8().map_err(truncated)? == 1;
            let days = r.read_u32().map_err(truncated)?;
            let hours = r.read_u8().map_err(truncated)?;
            let minutes = r.read_u8().map_err(truncated)?;
            let seconds = r.read_u8().map_err(truncated)?;
            let micros = if raw.len() >= 12 {
                r.read_u32().map_err(truncated)?
            } else {
                0
            };
            Ok(Value::Time(Time {
                negative,
                hours: days * 24 + u32::from(hours),
                minutes,
                seconds,
                micros,
            }))
        }
        column_types::BIT | column_types::GEOMETRY => Ok(Value::Bytes(raw.to_vec())),
        column_types::NULL => Ok(Value::Null),
        _ => string_or_bytes(column, raw),
    }
}

fn parse_num<T: std::str::FromStr>(column: &Column, s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| decode_err(column, format!("invalid temporal component '{}'", s)))
}

fn parse_date(column: &Column, s: &str) -> Result<Date> {
    let mut parts = s.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => Ok(Date {
            year: parse_num(column, y)?,
            month: parse_num(column, m)?,
            day: parse_num(column, d)?,
        }),
        _ => Err(decode_err(column, format!("invalid DATE '{}'", s))),
    }
}

fn parse_fraction(column: &Column, frac: &str) -> Result<u32> {
    if frac.is_empty() || frac.len() > 6 {
        return Err(decode_err(column, format!("invalid fraction '{}'", frac)));
    }
    let value: u32 = parse_num(column, frac)?;
    Ok(value * 10u32.pow(6 - frac.len() as u32))
}

fn parse_datetime(column: &Column, s: &str) -> Result<DateTime> {
    let (date, time) = s.split_once(' ').unwrap_or((s, "00:00:00"));
    let date = parse_date(column, date)?;
    let t = parse_time(column, time)?;
    if t.negative || t.hours > 23 {
        return Err(decode_err(column, format!("invalid DATETIME '{}'", s)));
    }
    Ok(DateTime {
        date,
        hour: t.hours as u8,
        minute: t.minutes,
        second: t.seconds,
        micros: t.micros,
    })
}

fn parse_time(column: &Column, s: &str) -> Result<Time> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (hms, micros) = match body.split_once('.') {
        Some((hms, frac)) => (hms, parse_fraction(column, frac)?),
        None => (body, 0),
    };
    let mut parts = hms.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(sec)) => Ok(Time {
            negative,
            hours: parse_num(column, h)?,
            minutes: parse_num(column, m)?,
            seconds: parse_num(column, sec)?,
            micros,
        }),
        _ => Err(decode_err(column, format!("invalid TIME '{}'", s))),
    }
}
