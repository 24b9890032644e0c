//! PostgreSQL type encoding and decoding.
//!
//! Covers the intrinsic scalar types the driver understands natively and
//! the two capability hooks ([`TextEncoder`], [`BinaryEncoder`]) that let
//! callers supply parameters of any other type.
//!
//! Format negotiation: bool, bytea, int2, int4, int8, float4 and float8
//! travel in binary; text, varchar, date and timestamptz travel in text
//! (dates in text sidestep the binary epoch encodings). Non-intrinsic
//! parameters are binary only when the value carries the binary capability;
//! non-intrinsic result columns are text.

use bytes::{Buf, BytesMut};
use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::{Error, Result};
use crate::protocol::{FieldDescription, Format, MessageWriter};

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub i32);

impl Oid {
    pub const BOOL: Oid = Oid(16);
    pub const BYTEA: Oid = Oid(17);
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);
    pub const TEXT: Oid = Oid(25);
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);
    pub const VARCHAR: Oid = Oid(1043);
    pub const DATE: Oid = Oid(1082);
    pub const TIMESTAMPTZ: Oid = Oid(1184);

    #[inline]
    pub fn from_i32(oid: i32) -> Self {
        Oid(oid)
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Whether the driver has a native codec for this type.
    pub fn is_intrinsic(self) -> bool {
        matches!(
            self,
            Oid::BOOL
                | Oid::BYTEA
                | Oid::INT2
                | Oid::INT4
                | Oid::INT8
                | Oid::FLOAT4
                | Oid::FLOAT8
                | Oid::TEXT
                | Oid::VARCHAR
                | Oid::DATE
                | Oid::TIMESTAMPTZ
        )
    }
}

/// Negotiated wire format for a parameter of the given declared type.
pub fn param_format(oid: Oid, value: &PgValue) -> Format {
    match oid {
        Oid::BOOL | Oid::BYTEA | Oid::INT2 | Oid::INT4 | Oid::INT8 | Oid::FLOAT4
        | Oid::FLOAT8 => Format::Binary,
        Oid::TEXT | Oid::VARCHAR | Oid::DATE | Oid::TIMESTAMPTZ => Format::Text,
        _ => match value {
            PgValue::BinaryExt(_) => Format::Binary,
            _ => Format::Text,
        },
    }
}

/// Negotiated wire format for a result column of the given type.
pub fn result_format(oid: Oid) -> Format {
    match oid {
        Oid::BOOL | Oid::BYTEA | Oid::INT2 | Oid::INT4 | Oid::INT8 | Oid::FLOAT4
        | Oid::FLOAT8 => Format::Binary,
        _ => Format::Text,
    }
}

// ============================================================================
// Encoder capabilities
// ============================================================================

/// Produces the text form of a non-intrinsic parameter.
pub trait TextEncoder: Send + Sync {
    fn encode_text(&self) -> Result<String>;
}

/// Writes the binary form of a non-intrinsic parameter.
pub trait BinaryEncoder: Send + Sync {
    fn encode_binary(&self, buf: &mut BytesMut) -> Result<()>;
}

// ============================================================================
// Values
// ============================================================================

/// A parameter or decoded column value.
///
/// The intrinsic variants map one-to-one onto the OIDs above; the two `Ext`
/// variants carry caller-supplied encoders for everything else.
pub enum PgValue {
    Null,
    Bool(bool),
    Bytea(Vec<u8>),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Date(NaiveDate),
    TimestampTz(DateTime<FixedOffset>),
    TextExt(Box<dyn TextEncoder>),
    BinaryExt(Box<dyn BinaryEncoder>),
}

impl PgValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            PgValue::Null => "null",
            PgValue::Bool(_) => "bool",
            PgValue::Bytea(_) => "bytea",
            PgValue::Int2(_) => "int2",
            PgValue::Int4(_) => "int4",
            PgValue::Int8(_) => "int8",
            PgValue::Float4(_) => "float4",
            PgValue::Float8(_) => "float8",
            PgValue::Text(_) => "text",
            PgValue::Date(_) => "date",
            PgValue::TimestampTz(_) => "timestamptz",
            PgValue::TextExt(_) => "text encoder",
            PgValue::BinaryExt(_) => "binary encoder",
        }
    }
}

impl std::fmt::Debug for PgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgValue::Null => f.write_str("Null"),
            PgValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            PgValue::Bytea(v) => f.debug_tuple("Bytea").field(v).finish(),
            PgValue::Int2(v) => f.debug_tuple("Int2").field(v).finish(),
            PgValue::Int4(v) => f.debug_tuple("Int4").field(v).finish(),
            PgValue::Int8(v) => f.debug_tuple("Int8").field(v).finish(),
            PgValue::Float4(v) => f.debug_tuple("Float4").field(v).finish(),
            PgValue::Float8(v) => f.debug_tuple("Float8").field(v).finish(),
            PgValue::Text(v) => f.debug_tuple("Text").field(v).finish(),
            PgValue::Date(v) => f.debug_tuple("Date").field(v).finish(),
            PgValue::TimestampTz(v) => f.debug_tuple("TimestampTz").field(v).finish(),
            PgValue::TextExt(_) => f.write_str("TextExt(..)"),
            PgValue::BinaryExt(_) => f.write_str("BinaryExt(..)"),
        }
    }
}

impl PartialEq for PgValue {
    fn eq(&self, other: &PgValue) -> bool {
        match (self, other) {
            (PgValue::Null, PgValue::Null) => true,
            (PgValue::Bool(a), PgValue::Bool(b)) => a == b,
            (PgValue::Bytea(a), PgValue::Bytea(b)) => a == b,
            (PgValue::Int2(a), PgValue::Int2(b)) => a == b,
            (PgValue::Int4(a), PgValue::Int4(b)) => a == b,
            (PgValue::Int8(a), PgValue::Int8(b)) => a == b,
            (PgValue::Float4(a), PgValue::Float4(b)) => a == b,
            (PgValue::Float8(a), PgValue::Float8(b)) => a == b,
            (PgValue::Text(a), PgValue::Text(b)) => a == b,
            (PgValue::Date(a), PgValue::Date(b)) => a == b,
            (PgValue::TimestampTz(a), PgValue::TimestampTz(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Parameter encoding
// ============================================================================

const TIMESTAMPTZ_ENCODE: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";
const TIMESTAMPTZ_DECODE: &str = "%Y-%m-%d %H:%M:%S%.f%#z";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encode one bind parameter as its length-prefixed wire form, honoring the
/// negotiated format for the statement's declared type. Null is length -1
/// with no payload.
pub fn encode_param(w: &mut MessageWriter<'_>, oid: Oid, value: &PgValue) -> Result<()> {
    fn mismatch(oid: Oid, value: &PgValue) -> Error {
        Error::Serialization(format!(
            "{} value cannot be encoded as parameter type oid {}",
            value.kind(),
            oid.as_i32()
        ))
    }

    if value.is_null() {
        w.put_i32(-1);
        return Ok(());
    }

    match oid {
        Oid::BOOL => match value {
            PgValue::Bool(v) => {
                w.put_i32(1);
                w.put_u8(*v as u8);
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::BYTEA => match value {
            PgValue::Bytea(v) => {
                w.put_i32(v.len() as i32);
                w.put_bytes(v);
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::INT2 => match value {
            PgValue::Int2(v) => {
                w.put_i32(2);
                w.put_i16(*v);
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::INT4 => match value {
            PgValue::Int4(v) => {
                w.put_i32(4);
                w.put_i32(*v);
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::INT8 => match value {
            PgValue::Int8(v) => {
                w.put_i32(8);
                w.put_bytes(&v.to_be_bytes());
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::FLOAT4 => match value {
            PgValue::Float4(v) => {
                w.put_i32(4);
                w.put_bytes(&v.to_be_bytes());
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::FLOAT8 => match value {
            PgValue::Float8(v) => {
                w.put_i32(8);
                w.put_bytes(&v.to_be_bytes());
            }
            _ => return Err(mismatch(oid, value)),
        },
        Oid::TEXT | Oid::VARCHAR => match value {
            PgValue::Text(v) => put_text(w, v),
            _ => return Err(mismatch(oid, value)),
        },
        Oid::DATE => match value {
            PgValue::Date(v) => put_text(w, &v.format(DATE_FORMAT).to_string()),
            _ => return Err(mismatch(oid, value)),
        },
        Oid::TIMESTAMPTZ => match value {
            PgValue::TimestampTz(v) => put_text(w, &v.format(TIMESTAMPTZ_ENCODE).to_string()),
            _ => return Err(mismatch(oid, value)),
        },
        _ => match value {
            PgValue::BinaryExt(enc) => {
                let mut scratch = BytesMut::new();
                enc.encode_binary(&mut scratch)?;
                w.put_i32(scratch.len() as i32);
                w.put_bytes(&scratch);
            }
            PgValue::TextExt(enc) => put_text(w, &enc.encode_text()?),
            _ => {
                return Err(Error::Serialization(format!(
                    "{} is not an intrinsic type for oid {} and carries no text or binary encoder",
                    value.kind(),
                    oid.as_i32()
                )))
            }
        },
    }

    Ok(())
}

fn put_text(w: &mut MessageWriter<'_>, s: &str) {
    w.put_i32(s.len() as i32);
    w.put_bytes(s.as_bytes());
}

// ============================================================================
// Column decoding
// ============================================================================

pub fn decode_bool(fd: &FieldDescription, data: &[u8]) -> Result<bool> {
    match fd.format {
        Format::Binary => match data {
            [b] => Ok(*b != 0),
            _ => Err(decode_err(fd, "bool", "expected 1 byte")),
        },
        Format::Text => match data {
            b"t" | b"true" => Ok(true),
            b"f" | b"false" => Ok(false),
            _ => Err(decode_err(fd, "bool", "unrecognized literal")),
        },
    }
}

pub fn decode_int2(fd: &FieldDescription, data: &[u8]) -> Result<i16> {
    match fd.format {
        Format::Binary => fixed::<2>(fd, "int2", data).map(i16::from_be_bytes),
        Format::Text => parse_text(fd, "int2", data),
    }
}

pub fn decode_int4(fd: &FieldDescription, data: &[u8]) -> Result<i32> {
    match fd.format {
        Format::Binary => fixed::<4>(fd, "int4", data).map(i32::from_be_bytes),
        Format::Text => parse_text(fd, "int4", data),
    }
}

pub fn decode_int8(fd: &FieldDescription, data: &[u8]) -> Result<i64> {
    match fd.format {
        Format::Binary => fixed::<8>(fd, "int8", data).map(i64::from_be_bytes),
        Format::Text => parse_text(fd, "int8", data),
    }
}

pub fn decode_float4(fd: &FieldDescription, data: &[u8]) -> Result<f32> {
    match fd.format {
        Format::Binary => fixed::<4>(fd, "float4", data).map(f32::from_be_bytes),
        Format::Text => parse_text(fd, "float4", data),
    }
}

pub fn decode_float8(fd: &FieldDescription, data: &[u8]) -> Result<f64> {
    match fd.format {
        Format::Binary => fixed::<8>(fd, "float8", data).map(f64::from_be_bytes),
        Format::Text => parse_text(fd, "float8", data),
    }
}

/// Text columns have identical text and binary forms.
pub fn decode_text(fd: &FieldDescription, data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|_| decode_err(fd, "text", "invalid utf-8"))
}

pub fn decode_bytea(fd: &FieldDescription, data: &[u8]) -> Result<Vec<u8>> {
    match fd.format {
        Format::Binary => Ok(data.to_vec()),
        Format::Text => {
            // Text form is `\x` followed by lowercase hex.
            let hex = data
                .strip_prefix(b"\\x")
                .ok_or_else(|| decode_err(fd, "bytea", "missing \\x prefix"))?;
            if hex.len() % 2 != 0 {
                return Err(decode_err(fd, "bytea", "odd hex length"));
            }
            hex.chunks(2)
                .map(|pair| {
                    let s = std::str::from_utf8(pair)
                        .map_err(|_| decode_err(fd, "bytea", "invalid hex"))?;
                    u8::from_str_radix(s, 16).map_err(|_| decode_err(fd, "bytea", "invalid hex"))
                })
                .collect()
        }
    }
}

pub fn decode_date(fd: &FieldDescription, data: &[u8]) -> Result<NaiveDate> {
    match fd.format {
        Format::Text => {
            let s = std::str::from_utf8(data).map_err(|_| decode_err(fd, "date", "invalid utf-8"))?;
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| decode_err(fd, "date", &e.to_string()))
        }
        // Dates are negotiated as text in both directions.
        Format::Binary => Err(decode_err(fd, "date", "unexpected binary format")),
    }
}

pub fn decode_timestamptz(fd: &FieldDescription, data: &[u8]) -> Result<DateTime<FixedOffset>> {
    match fd.format {
        Format::Text => {
            let s = std::str::from_utf8(data)
                .map_err(|_| decode_err(fd, "timestamptz", "invalid utf-8"))?;
            DateTime::parse_from_str(s, TIMESTAMPTZ_DECODE)
                .map_err(|e| decode_err(fd, "timestamptz", &e.to_string()))
        }
        Format::Binary => Err(decode_err(fd, "timestamptz", "unexpected binary format")),
    }
}

/// Decode a column by its OID: intrinsic types get their native codec, any
/// other text column comes back as its raw string, and any other binary
/// column is undecodable.
pub fn decode_column(fd: &FieldDescription, data: Option<&[u8]>) -> Result<PgValue> {
    let Some(data) = data else {
        return Ok(PgValue::Null);
    };

    match fd.type_oid {
        Oid::BOOL => decode_bool(fd, data).map(PgValue::Bool),
        Oid::BYTEA => decode_bytea(fd, data).map(PgValue::Bytea),
        Oid::INT2 => decode_int2(fd, data).map(PgValue::Int2),
        Oid::INT4 => decode_int4(fd, data).map(PgValue::Int4),
        Oid::INT8 => decode_int8(fd, data).map(PgValue::Int8),
        Oid::FLOAT4 => decode_float4(fd, data).map(PgValue::Float4),
        Oid::FLOAT8 => decode_float8(fd, data).map(PgValue::Float8),
        Oid::TEXT | Oid::VARCHAR => decode_text(fd, data).map(PgValue::Text),
        Oid::DATE => decode_date(fd, data).map(PgValue::Date),
        Oid::TIMESTAMPTZ => decode_timestamptz(fd, data).map(PgValue::TimestampTz),
        _ => match fd.format {
            Format::Text => decode_text(fd, data).map(PgValue::Text),
            Format::Binary => Err(Error::Protocol(format!(
                "unknown format code: no binary decoder for oid {} in column {:?}",
                fd.type_oid.as_i32(),
                fd.name
            ))),
        },
    }
}

fn fixed<const N: usize>(fd: &FieldDescription, ty: &str, data: &[u8]) -> Result<[u8; N]> {
    data.try_into()
        .map_err(|_| decode_err(fd, ty, &format!("expected {N} bytes, got {}", data.len())))
}

fn parse_text<T: std::str::FromStr>(fd: &FieldDescription, ty: &str, data: &[u8]) -> Result<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| decode_err(fd, ty, "unparseable text literal"))
}

fn decode_err(fd: &FieldDescription, ty: &str, detail: &str) -> Error {
    Error::Protocol(format!(
        "cannot decode column {:?} as {ty}: {detail}",
        fd.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn field(oid: Oid, format: Format) -> FieldDescription {
        FieldDescription {
            name: "c".to_string(),
            table_oid: Oid(0),
            attribute_number: 0,
            type_oid: oid,
            type_size: -1,
            type_modifier: -1,
            format,
        }
    }

    /// Encode a parameter and return its payload (without the length prefix).
    fn encoded(oid: Oid, value: &PgValue) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        encode_param(&mut w, oid, value).unwrap();
        let mut buf = buf.freeze();
        let len = buf.get_i32();
        assert_eq!(len as usize, buf.len());
        buf.to_vec()
    }

    #[test]
    fn negotiation_table() {
        for oid in [
            Oid::BOOL,
            Oid::BYTEA,
            Oid::INT2,
            Oid::INT4,
            Oid::INT8,
            Oid::FLOAT4,
            Oid::FLOAT8,
        ] {
            assert_eq!(param_format(oid, &PgValue::Null), Format::Binary);
            assert_eq!(result_format(oid), Format::Binary);
        }
        for oid in [Oid::TEXT, Oid::VARCHAR, Oid::DATE, Oid::TIMESTAMPTZ] {
            assert_eq!(param_format(oid, &PgValue::Null), Format::Text);
            assert_eq!(result_format(oid), Format::Text);
        }
        // Non-intrinsic: binary only with the binary capability.
        struct Point;
        impl BinaryEncoder for Point {
            fn encode_binary(&self, _: &mut BytesMut) -> Result<()> {
                Ok(())
            }
        }
        let numeric = Oid(1700);
        assert_eq!(
            param_format(numeric, &PgValue::BinaryExt(Box::new(Point))),
            Format::Binary
        );
        assert_eq!(
            param_format(numeric, &PgValue::Text("1".to_string())),
            Format::Text
        );
        assert_eq!(result_format(numeric), Format::Text);
    }

    #[test]
    fn null_is_length_minus_one() {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        encode_param(&mut w, Oid::INT4, &PgValue::Null).unwrap();
        assert_eq!(&buf[..], &(-1i32).to_be_bytes());
    }

    #[test]
    fn intrinsic_binary_roundtrips() {
        assert!(decode_bool(&field(Oid::BOOL, Format::Binary), &encoded(Oid::BOOL, &PgValue::Bool(true))).unwrap());
        assert_eq!(
            decode_int2(&field(Oid::INT2, Format::Binary), &encoded(Oid::INT2, &PgValue::Int2(-7))).unwrap(),
            -7
        );
        assert_eq!(
            decode_int4(&field(Oid::INT4, Format::Binary), &encoded(Oid::INT4, &PgValue::Int4(42))).unwrap(),
            42
        );
        assert_eq!(
            decode_int8(&field(Oid::INT8, Format::Binary), &encoded(Oid::INT8, &PgValue::Int8(i64::MAX))).unwrap(),
            i64::MAX
        );
        assert_eq!(
            decode_float4(&field(Oid::FLOAT4, Format::Binary), &encoded(Oid::FLOAT4, &PgValue::Float4(1.5))).unwrap(),
            1.5
        );
        assert_eq!(
            decode_float8(&field(Oid::FLOAT8, Format::Binary), &encoded(Oid::FLOAT8, &PgValue::Float8(-2.25))).unwrap(),
            -2.25
        );
        assert_eq!(
            decode_bytea(&field(Oid::BYTEA, Format::Binary), &encoded(Oid::BYTEA, &PgValue::Bytea(vec![0xde, 0xad]))).unwrap(),
            vec![0xde, 0xad]
        );
    }

    #[test]
    fn intrinsic_text_decoding() {
        assert!(decode_bool(&field(Oid::BOOL, Format::Text), b"t").unwrap());
        assert!(!decode_bool(&field(Oid::BOOL, Format::Text), b"f").unwrap());
        assert_eq!(decode_int4(&field(Oid::INT4, Format::Text), b"-12").unwrap(), -12);
        assert_eq!(
            decode_int8(&field(Oid::INT8, Format::Text), b"9000000000").unwrap(),
            9_000_000_000
        );
        assert_eq!(
            decode_float8(&field(Oid::FLOAT8, Format::Text), b"1.25").unwrap(),
            1.25
        );
        assert_eq!(
            decode_bytea(&field(Oid::BYTEA, Format::Text), b"\\xdead").unwrap(),
            vec![0xde, 0xad]
        );
    }

    #[test]
    fn date_text_roundtrip() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        let wire = encoded(Oid::DATE, &PgValue::Date(d));
        assert_eq!(&wire, b"2021-03-14");
        assert_eq!(decode_date(&field(Oid::DATE, Format::Text), &wire).unwrap(), d);
    }

    #[test]
    fn timestamptz_text_roundtrip() {
        let ts = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2021, 3, 14, 9, 26, 53)
            .unwrap()
            .with_nanosecond(589_793_000)
            .unwrap();
        let wire = encoded(Oid::TIMESTAMPTZ, &PgValue::TimestampTz(ts));
        assert_eq!(&wire, b"2021-03-14 09:26:53.589793+01:00");
        let back = decode_timestamptz(&field(Oid::TIMESTAMPTZ, Format::Text), &wire).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn timestamptz_accepts_server_grammar() {
        let fd = field(Oid::TIMESTAMPTZ, Format::Text);
        // The server omits zero fractions and minutes of whole-hour offsets.
        let plain = decode_timestamptz(&fd, b"2004-10-19 10:23:54+02").unwrap();
        assert_eq!(plain.offset().local_minus_utc(), 7200);
        assert_eq!(plain.time().second(), 54);

        let fractional = decode_timestamptz(&fd, b"2004-10-19 10:23:54.000123+02:30").unwrap();
        assert_eq!(fractional.timestamp_subsec_micros(), 123);
    }

    #[test]
    fn oid_value_mismatch_is_serialization_error() {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        let err = encode_param(&mut w, Oid::INT4, &PgValue::Text("42".to_string())).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn unencodable_non_intrinsic_is_serialization_error() {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        let err = encode_param(&mut w, Oid(1700), &PgValue::Int4(1)).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn text_encoder_capability() {
        struct Numeric(&'static str);
        impl TextEncoder for Numeric {
            fn encode_text(&self) -> Result<String> {
                Ok(self.0.to_string())
            }
        }
        let wire = encoded(Oid(1700), &PgValue::TextExt(Box::new(Numeric("3.14"))));
        assert_eq!(&wire, b"3.14");
    }

    #[test]
    fn unknown_oid_decodes_text_and_rejects_binary() {
        let fd = field(Oid(1700), Format::Text);
        assert_eq!(
            decode_column(&fd, Some(b"12.5")).unwrap(),
            PgValue::Text("12.5".to_string())
        );

        let fd = field(Oid(1700), Format::Binary);
        let err = decode_column(&fd, Some(&[0, 1])).unwrap_err();
        assert!(matches!(err, Error::Protocol(msg) if msg.contains("unknown format code")));
    }

    #[test]
    fn decode_column_null() {
        let fd = field(Oid::INT4, Format::Binary);
        assert!(decode_column(&fd, None).unwrap().is_null());
    }
}
