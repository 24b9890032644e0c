//! Streaming query cursor.
//!
//! A [`Rows`] owns the connection's protocol channel from the moment a
//! query starts until it has consumed the ReadyForQuery sentinel. The
//! cursor is generic over its connection handle: a direct `&mut Connection`
//! borrow, or the pool's owned [`PooledConnection`](crate::PooledConnection).
//! Dropping the latter is what releases the connection back to the pool, so
//! the cursor never needs a pool pointer of its own.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::{BackendMessage, FieldDescription};
use crate::types::{self, PgValue};

/// Exclusive access to a [`Connection`] for the duration of a cursor.
pub trait ConnectionHandle: Send {
    fn conn(&mut self) -> &mut Connection;
}

impl ConnectionHandle for &mut Connection {
    fn conn(&mut self) -> &mut Connection {
        self
    }
}

/// A destination for one column of the current row.
///
/// The closed set of variants mirrors the intrinsic types; `Custom` opens
/// the cursor to any caller type that implements [`Scanner`].
pub enum ScanTarget<'a> {
    Bool(&'a mut bool),
    Int2(&'a mut i16),
    Int4(&'a mut i32),
    Int8(&'a mut i64),
    Float4(&'a mut f32),
    Float8(&'a mut f64),
    Text(&'a mut String),
    Bytea(&'a mut Vec<u8>),
    Date(&'a mut NaiveDate),
    TimestampTz(&'a mut DateTime<FixedOffset>),
    Custom(&'a mut dyn Scanner),
}

/// Caller-supplied column decoder; receives the raw payload, including
/// nulls (`None`).
pub trait Scanner: Send {
    fn scan(&mut self, field: &FieldDescription, value: Option<&[u8]>) -> Result<()>;
}

/// Streaming result cursor. See the module docs for the ownership rules.
pub struct Rows<C: ConnectionHandle> {
    handle: C,
    fields: Vec<FieldDescription>,
    row: Option<Vec<Option<Bytes>>>,
    column: usize,
    err: Option<Error>,
    closed: bool,
}

impl<C: ConnectionHandle> Rows<C> {
    /// Begin a query cycle on `handle` and position the cursor before the
    /// first row. A cycle that yields no row description (a non-SELECT)
    /// produces an already-closed cursor.
    pub(crate) async fn start(mut handle: C, sql: &str, params: &[PgValue]) -> Result<Rows<C>> {
        match handle.conn().start_query(sql, params).await? {
            Some(fields) => Ok(Rows {
                handle,
                fields,
                row: None,
                column: 0,
                err: None,
                closed: false,
            }),
            None => Ok(Rows {
                handle,
                fields: Vec::new(),
                row: None,
                column: 0,
                err: None,
                closed: true,
            }),
        }
    }

    /// Field descriptors of the result columns; constant for the cursor's
    /// lifetime.
    pub fn field_descriptions(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// The sticky error, set by any fatal condition on this cursor.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Advance to the next data row. Returns false at end-of-stream or once
    /// the sticky error is set; end-of-stream closes the cursor.
    pub async fn next_row(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            return false;
        }
        self.row = None;
        self.column = 0;

        loop {
            let msg = match self.handle.conn().receive().await {
                Ok(msg) => msg,
                Err(err) => {
                    self.err = Some(err);
                    self.closed = true;
                    return false;
                }
            };
            match msg {
                BackendMessage::DataRow(values) => {
                    if values.len() != self.fields.len() {
                        let err = self.handle.conn().die(Error::Protocol(format!(
                            "row description field count ({}) and data row field count ({}) do not match",
                            self.fields.len(),
                            values.len()
                        )));
                        self.err = Some(err);
                        self.closed = true;
                        return false;
                    }
                    self.row = Some(values);
                    return true;
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.handle.conn().finish_cycle(status);
                    self.closed = true;
                    return false;
                }
                BackendMessage::CommandComplete(_)
                | BackendMessage::BindComplete
                | BackendMessage::ParseComplete
                | BackendMessage::EmptyQueryResponse => {}
                other => {
                    if let Err(err) = self.handle.conn().dispatch_context_free(other) {
                        self.err = Some(err);
                        if self.handle.conn().is_alive() {
                            self.drain().await;
                        } else {
                            self.closed = true;
                        }
                        return false;
                    }
                }
            }
        }
    }

    /// Decode every column of the current row into `targets`, in column
    /// order. A destination-count mismatch and any decode failure set the
    /// sticky error.
    pub fn scan(&mut self, targets: &mut [ScanTarget<'_>]) -> Result<()> {
        let result = self.scan_inner(targets);
        if let Err(err) = &result {
            if self.err.is_none() {
                self.err = Some(err.clone());
            }
        }
        result
    }

    fn scan_inner(&mut self, targets: &mut [ScanTarget<'_>]) -> Result<()> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| Error::Usage("scan called without a current row".to_string()))?;
        if targets.len() != self.fields.len() {
            return Err(Error::Usage(format!(
                "scan received {} destinations for {} columns",
                targets.len(),
                self.fields.len()
            )));
        }

        for (idx, target) in targets.iter_mut().enumerate() {
            let fd = &self.fields[idx];
            let data = row[idx].as_deref();
            match target {
                ScanTarget::Bool(dst) => **dst = types::decode_bool(fd, required(fd, data)?)?,
                ScanTarget::Int2(dst) => **dst = types::decode_int2(fd, required(fd, data)?)?,
                ScanTarget::Int4(dst) => **dst = types::decode_int4(fd, required(fd, data)?)?,
                ScanTarget::Int8(dst) => **dst = types::decode_int8(fd, required(fd, data)?)?,
                ScanTarget::Float4(dst) => **dst = types::decode_float4(fd, required(fd, data)?)?,
                ScanTarget::Float8(dst) => **dst = types::decode_float8(fd, required(fd, data)?)?,
                ScanTarget::Text(dst) => **dst = types::decode_text(fd, required(fd, data)?)?,
                ScanTarget::Bytea(dst) => **dst = types::decode_bytea(fd, required(fd, data)?)?,
                ScanTarget::Date(dst) => **dst = types::decode_date(fd, required(fd, data)?)?,
                ScanTarget::TimestampTz(dst) => {
                    **dst = types::decode_timestamptz(fd, required(fd, data)?)?
                }
                ScanTarget::Custom(scanner) => scanner.scan(fd, data)?,
            }
        }
        self.column = self.fields.len();
        Ok(())
    }

    /// Decode the next column of the current row by its OID. Intrinsic
    /// types produce their native value; any other text column comes back
    /// as [`PgValue::Text`]; any other binary column fails.
    pub fn read_value(&mut self) -> Result<PgValue> {
        let result = self.read_value_inner();
        if let Err(err) = &result {
            if self.err.is_none() {
                self.err = Some(err.clone());
            }
        }
        result
    }

    fn read_value_inner(&mut self) -> Result<PgValue> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| Error::Usage("read_value called without a current row".to_string()))?;
        if self.column >= self.fields.len() {
            return Err(Error::Usage("no next column available".to_string()));
        }
        let fd = &self.fields[self.column];
        let value = types::decode_column(fd, row[self.column].as_deref())?;
        self.column += 1;
        Ok(value)
    }

    /// Close the cursor, draining the response stream to ReadyForQuery so
    /// the connection can be reused. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.drain().await;
    }

    /// Force-close the cursor with a sticky error.
    pub async fn fatal(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
        self.close().await;
    }

    async fn drain(&mut self) {
        loop {
            let msg = match self.handle.conn().receive().await {
                Ok(msg) => msg,
                Err(_) => {
                    self.closed = true;
                    return;
                }
            };
            match msg {
                BackendMessage::ReadyForQuery(status) => {
                    self.handle.conn().finish_cycle(status);
                    self.closed = true;
                    return;
                }
                BackendMessage::RowDescription(_)
                | BackendMessage::DataRow(_)
                | BackendMessage::CommandComplete(_)
                | BackendMessage::BindComplete
                | BackendMessage::ParseComplete
                | BackendMessage::EmptyQueryResponse => {}
                other => {
                    if self.handle.conn().dispatch_context_free(other).is_err()
                        && !self.handle.conn().is_alive()
                    {
                        self.closed = true;
                        return;
                    }
                }
            }
        }
    }
}

fn required<'d>(fd: &FieldDescription, data: Option<&'d [u8]>) -> Result<&'d [u8]> {
    data.ok_or_else(|| {
        Error::Usage(format!(
            "column {:?} is null; scan it with a custom scanner",
            fd.name
        ))
    })
}
