//! Client-side quoting for the simple-query path.
//!
//! The extended protocol is preferred whenever a statement was prepared;
//! this module only backs the fallback where positional `$n` placeholders
//! are substituted with quoted literals before the SQL travels as a plain
//! 'Q' message.

use crate::error::{Error, Result};
use crate::types::PgValue;

/// Substitute `$1`..`$n` placeholders in `sql` with quoted literals.
/// Placeholders inside single-quoted string literals are left untouched.
pub fn sanitize_sql(sql: &str, args: &[PgValue]) -> Result<String> {
    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' => {
                in_string = !in_string;
                out.push('\'');
                i += 1;
            }
            b'$' if !in_string => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    out.push('$');
                    i += 1;
                    continue;
                }
                let n: usize = sql[start..end]
                    .parse()
                    .map_err(|_| Error::Usage(format!("bad placeholder in {sql:?}")))?;
                let arg = n
                    .checked_sub(1)
                    .and_then(|idx| args.get(idx))
                    .ok_or_else(|| {
                        Error::Usage(format!("no argument supplied for placeholder ${n}"))
                    })?;
                out.push_str(&quote_literal(arg)?);
                i = end;
            }
            _ => {
                // Copy the full UTF-8 character.
                let ch_len = utf8_len(b);
                out.push_str(&sql[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    Ok(out)
}

/// Render a value as a SQL literal.
pub fn quote_literal(value: &PgValue) -> Result<String> {
    Ok(match value {
        PgValue::Null => "null".to_string(),
        PgValue::Bool(v) => if *v { "true" } else { "false" }.to_string(),
        PgValue::Int2(v) => v.to_string(),
        PgValue::Int4(v) => v.to_string(),
        PgValue::Int8(v) => v.to_string(),
        PgValue::Float4(v) => v.to_string(),
        PgValue::Float8(v) => v.to_string(),
        PgValue::Text(v) => quote_string(v),
        PgValue::Bytea(v) => {
            let mut hex = String::with_capacity(v.len() * 2 + 5);
            hex.push_str("'\\x");
            for b in v {
                hex.push_str(&format!("{b:02x}"));
            }
            hex.push('\'');
            hex
        }
        PgValue::Date(v) => quote_string(&v.format("%Y-%m-%d").to_string()),
        PgValue::TimestampTz(v) => {
            quote_string(&v.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string())
        }
        PgValue::TextExt(enc) => quote_string(&enc.encode_text()?),
        PgValue::BinaryExt(_) => {
            return Err(Error::Serialization(
                "binary-encoded values cannot be interpolated into a simple query".to_string(),
            ))
        }
    })
}

/// Single-quote a string, doubling embedded quotes.
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b < 0xe0 => 2,
        b if b < 0xf0 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders() {
        let sql = sanitize_sql(
            "select * from t where id = $1 and name = $2",
            &[PgValue::Int4(7), PgValue::Text("o'brien".to_string())],
        )
        .unwrap();
        assert_eq!(sql, "select * from t where id = 7 and name = 'o''brien'");
    }

    #[test]
    fn multi_digit_placeholders() {
        let args: Vec<PgValue> = (1..=10).map(PgValue::Int4).collect();
        let sql = sanitize_sql("select $10, $1", &args).unwrap();
        assert_eq!(sql, "select 10, 1");
    }

    #[test]
    fn placeholders_inside_strings_are_preserved() {
        let sql = sanitize_sql("select '$1', $1", &[PgValue::Int4(5)]).unwrap();
        assert_eq!(sql, "select '$1', 5");
    }

    #[test]
    fn missing_argument_is_usage_error() {
        let err = sanitize_sql("select $2", &[PgValue::Int4(1)]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn literal_forms() {
        assert_eq!(quote_literal(&PgValue::Null).unwrap(), "null");
        assert_eq!(quote_literal(&PgValue::Bool(true)).unwrap(), "true");
        assert_eq!(
            quote_literal(&PgValue::Bytea(vec![0xde, 0xad])).unwrap(),
            "'\\xdead'"
        );
    }

    #[test]
    fn identifier_quoting() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
