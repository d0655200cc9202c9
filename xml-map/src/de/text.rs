// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of element text to scalar and date values.

use chrono::{DateTime, NaiveDateTime};

use crate::schema::ScalarKind;
use crate::value::Value;

/// The format used for writing dates and for the first parsing attempt.
pub(crate) const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The fallback parsing format, with a trailing `±hh:mm` zone offset.
const DATE_TIME_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// XML's whitespace characters. Atomic non-string types collapse whitespace,
/// which for a single token is the same as trimming these.
const XML_WHITESPACE: &[char] = &['\x09', '\x0A', '\x0D', '\x20'];

#[derive(Debug)]
struct SimpleError(String);

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SimpleError {}

/// Converts `text` to a value of the given kind.
///
/// Strings are taken verbatim; other kinds ignore surrounding whitespace.
///
/// ```rust
/// # use xml_map::{de::parse_scalar, schema::ScalarKind, Value};
/// assert_eq!(parse_scalar(ScalarKind::Int, " 42\n").unwrap(), Value::Int(42));
/// assert_eq!(parse_scalar(ScalarKind::Bool, "1").unwrap(), Value::Bool(true));
/// parse_scalar(ScalarKind::Int, "forty-two").unwrap_err();
/// ```
pub fn parse_scalar(kind: ScalarKind, text: &str) -> Result<Value, crate::BoxedStdError> {
    let trimmed = text.trim_matches(XML_WHITESPACE);
    Ok(match kind {
        ScalarKind::String => Value::String(text.to_owned()),
        ScalarKind::Int => Value::Int(trimmed.parse()?),
        ScalarKind::Float => Value::Float(trimmed.parse()?),
        ScalarKind::Double => Value::Double(trimmed.parse()?),

        // https://www.w3.org/TR/xmlschema11-2/#boolean: "booleanRep ::= 'true' | 'false' | '1' | '0'
        ScalarKind::Bool => match trimmed {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(Box::new(SimpleError(format!("invalid bool {:?}", text)))),
        },
    })
}

/// Parses a `YYYY-MM-DDThh:mm:ss` timestamp.
///
/// Anything from the first `.` on (fractional seconds and whatever follows
/// them) is discarded. If the plain form fails, a trailing `±hh:mm` offset is
/// accepted and dropped, keeping the local wall-clock time.
///
/// ```rust
/// # use xml_map::de::parse_date_time;
/// let d = parse_date_time("2021-03-04T05:06:07.890").unwrap();
/// assert_eq!(d.to_string(), "2021-03-04 05:06:07");
/// let d = parse_date_time("2021-03-04T05:06:07+02:00").unwrap();
/// assert_eq!(d.to_string(), "2021-03-04 05:06:07");
/// ```
pub fn parse_date_time(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let text = text.trim_matches(XML_WHITESPACE);
    let text = match text.find('.') {
        Some(i) => &text[..i],
        None => text,
    };
    NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT).or_else(|_| {
        DateTime::parse_from_str(text, DATE_TIME_OFFSET_FORMAT).map(|d| d.naive_local())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(
            parse_scalar(ScalarKind::String, " keep \n").unwrap(),
            Value::String(" keep \n".to_owned())
        );
        assert_eq!(parse_scalar(ScalarKind::Int, "-7").unwrap(), Value::Int(-7));
        assert_eq!(parse_scalar(ScalarKind::Float, "1.5").unwrap(), Value::Float(1.5));
        assert_eq!(parse_scalar(ScalarKind::Double, "\t2.25 ").unwrap(), Value::Double(2.25));
        assert_eq!(parse_scalar(ScalarKind::Bool, " false ").unwrap(), Value::Bool(false));
        assert_eq!(parse_scalar(ScalarKind::Bool, "0").unwrap(), Value::Bool(false));
        assert_eq!(parse_scalar(ScalarKind::Bool, "true").unwrap(), Value::Bool(true));
        parse_scalar(ScalarKind::Bool, "yes").unwrap_err();
        parse_scalar(ScalarKind::Int, "1.5").unwrap_err();
        parse_scalar(ScalarKind::Int, "").unwrap_err();
        parse_scalar(ScalarKind::Double, "abc").unwrap_err();
    }

    #[test]
    fn dates() {
        assert_eq!(
            parse_date_time("1815-12-10T00:00:00").unwrap(),
            date(1815, 12, 10, 0, 0, 0)
        );
        assert_eq!(
            parse_date_time("2020-02-29T23:59:58.123456").unwrap(),
            date(2020, 2, 29, 23, 59, 58)
        );
        assert_eq!(
            parse_date_time("2020-02-29T23:59:58-05:30").unwrap(),
            date(2020, 2, 29, 23, 59, 58)
        );

        // The fraction is cut before the offset is considered.
        assert_eq!(
            parse_date_time("2020-02-29T23:59:58.5+01:00").unwrap(),
            date(2020, 2, 29, 23, 59, 58)
        );
        parse_date_time("2020-02-30T00:00:00").unwrap_err();
        parse_date_time("yesterday").unwrap_err();
        parse_date_time("").unwrap_err();
    }
}
