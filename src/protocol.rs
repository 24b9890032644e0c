//! PostgreSQL wire protocol message encoding and decoding.
//!
//! This module implements the PostgreSQL v3 protocol framing: every message
//! is a 1-byte type tag (the startup and SSL-request messages are untagged)
//! followed by a 4-byte big-endian length that includes itself but not the
//! tag, followed by the payload.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::types::Oid;

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 196608; // (3 << 16) | 0

/// Magic code of the 8-byte SSL negotiation request.
pub const SSL_REQUEST_CODE: i32 = 80877103;

/// Format codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Format {
    Text = 0,
    Binary = 1,
}

impl Format {
    pub fn from_i16(code: i16) -> Format {
        if code == 1 { Format::Binary } else { Format::Text }
    }
}

/// Transaction status indicators carried by ReadyForQuery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block), 'I'
    Idle,
    /// In a transaction block, 'T'
    InTransaction,
    /// In a failed transaction block, 'E'
    Failed,
}

impl TransactionStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Failed => b'E',
        }
    }
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

// ============================================================================
// Write Buffer
// ============================================================================

/// Incremental frontend message writer over a shared scratch buffer.
///
/// `start` opens a tagged message and leaves a length placeholder that is
/// back-patched when the next message starts or when the writer is
/// finished. Several messages can be appended back to back, which is what
/// makes the pipelined parse/describe/sync and bind/execute/sync round
/// trips a single transport write.
pub struct MessageWriter<'a> {
    buf: &'a mut BytesMut,
    len_pos: Option<usize>,
}

impl<'a> MessageWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> MessageWriter<'a> {
        MessageWriter { buf, len_pos: None }
    }

    /// Open a new tagged message, closing the previous one.
    pub fn start(&mut self, tag: u8) {
        self.patch_len();
        self.buf.put_u8(tag);
        self.len_pos = Some(self.buf.len());
        self.buf.put_i32(0);
    }

    /// Open a new untagged message (startup, SSL request).
    pub fn start_untagged(&mut self) {
        self.patch_len();
        self.len_pos = Some(self.buf.len());
        self.buf.put_i32(0);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_oid(&mut self, oid: Oid) {
        self.buf.put_i32(oid.as_i32());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Null-terminated string.
    pub fn put_cstr(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
    }

    /// Close the current message, back-patching its length.
    pub fn finish(mut self) {
        self.patch_len();
    }

    fn patch_len(&mut self) {
        if let Some(pos) = self.len_pos.take() {
            // Length includes the 4 length bytes, not the tag.
            let len = (self.buf.len() - pos) as i32;
            self.buf[pos..pos + 4].copy_from_slice(&len.to_be_bytes());
        }
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// Trait for encoding frontend messages into the shared write buffer.
pub trait FrontendMessage {
    fn encode(&self, w: &mut MessageWriter<'_>);
}

/// Startup message sent at connection start (untagged).
#[derive(Debug, Clone)]
pub struct StartupMessage<'a> {
    pub user: &'a str,
    pub database: Option<&'a str>,
}

impl FrontendMessage for StartupMessage<'_> {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start_untagged();
        w.put_i32(PROTOCOL_VERSION);
        w.put_cstr("user");
        w.put_cstr(self.user);
        if let Some(db) = self.database {
            w.put_cstr("database");
            w.put_cstr(db);
        }
        w.put_u8(0);
    }
}

/// The 8-byte SSL negotiation request (untagged).
#[derive(Debug, Clone, Copy)]
pub struct SslRequest;

impl FrontendMessage for SslRequest {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start_untagged();
        w.put_i32(SSL_REQUEST_CODE);
    }
}

/// Password message ('p'), for cleartext or MD5 responses.
#[derive(Debug, Clone)]
pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendMessage for PasswordMessage<'_> {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'p');
        w.put_cstr(self.password);
    }
}

/// Simple query message ('Q')
#[derive(Debug, Clone)]
pub struct QueryMessage<'a> {
    pub sql: &'a str,
}

impl FrontendMessage for QueryMessage<'_> {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'Q');
        w.put_cstr(self.sql);
    }
}

/// Parse message ('P'). Parameter types are never hinted; the server
/// reports them back through ParameterDescription.
#[derive(Debug, Clone)]
pub struct ParseMessage<'a> {
    pub name: &'a str,
    pub sql: &'a str,
}

impl FrontendMessage for ParseMessage<'_> {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'P');
        w.put_cstr(self.name);
        w.put_cstr(self.sql);
        w.put_i16(0);
    }
}

/// Describe message ('D') for a named prepared statement.
#[derive(Debug, Clone)]
pub struct DescribeStatement<'a> {
    pub name: &'a str,
}

impl FrontendMessage for DescribeStatement<'_> {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'D');
        w.put_u8(b'S');
        w.put_cstr(self.name);
    }
}

/// Execute message ('E') on the unnamed portal, unlimited rows.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteMessage;

impl FrontendMessage for ExecuteMessage {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'E');
        w.put_cstr("");
        w.put_i32(0);
    }
}

/// Sync message ('S') - marks the end of an extended-query cycle.
#[derive(Debug, Clone, Copy)]
pub struct SyncMessage;

impl FrontendMessage for SyncMessage {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'S');
    }
}

/// Terminate message ('X') - graceful connection shutdown.
#[derive(Debug, Clone, Copy)]
pub struct TerminateMessage;

impl FrontendMessage for TerminateMessage {
    fn encode(&self, w: &mut MessageWriter<'_>) {
        w.start(b'X');
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Bounded reader over one message body.
///
/// All reads are checked; running off the end of the frame is a protocol
/// error rather than a panic.
pub struct MessageReader {
    body: Bytes,
}

impl MessageReader {
    pub fn new(body: Bytes) -> MessageReader {
        MessageReader { body }
    }

    pub fn remaining(&self) -> usize {
        self.body.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.body.remaining() < n {
            return Err(Error::protocol("message body truncated"));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.body.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.need(2)?;
        Ok(self.body.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.body.get_i32())
    }

    pub fn read_oid(&mut self) -> Result<Oid> {
        Ok(Oid::from_i32(self.read_i32()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.need(len)?;
        Ok(self.body.split_to(len))
    }

    /// Null-terminated UTF-8 string.
    pub fn read_cstr(&mut self) -> Result<String> {
        let end = self
            .body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::protocol("missing null terminator in string"))?;
        let raw = self.body.split_to(end);
        self.body.advance(1);
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::protocol("invalid utf-8 in protocol string"))
    }
}

/// Column metadata from a RowDescription message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: Oid,
    pub attribute_number: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    /// Wire format of the column. For prepared statements this is
    /// overwritten with the negotiated format after describe.
    pub format: Format,
}

/// An asynchronous listen/notify payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Backend pid that sent the notification.
    pub pid: i32,
    /// Channel the notification was delivered on.
    pub channel: String,
    pub payload: String,
}

/// Severity, SQLSTATE and message of an ErrorResponse or NoticeResponse.
/// Remaining fields are consumed and discarded.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    pub severity: String,
    pub code: String,
    pub message: String,
}

impl ErrorFields {
    pub fn into_error(self) -> Error {
        Error::Backend {
            severity: self.severity,
            code: self.code,
            message: self.message,
        }
    }
}

/// Authentication directives the driver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    /// Any other method; rejected during startup.
    Unsupported(i32),
}

/// Backend message types
#[derive(Debug, Clone)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData {
        pid: i32,
        secret_key: i32,
    },
    ParameterStatus {
        name: String,
        value: String,
    },
    ReadyForQuery(TransactionStatus),

    RowDescription(Vec<FieldDescription>),
    ParameterDescription(Vec<Oid>),
    NoData,
    DataRow(Vec<Option<Bytes>>),
    CommandComplete(String),
    EmptyQueryResponse,

    ParseComplete,
    BindComplete,

    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    NotificationResponse(Notification),
}

impl BackendMessage {
    /// Decode one backend message. The buffer must hold the complete frame,
    /// starting with the type tag.
    pub fn decode(frame: Bytes) -> Result<BackendMessage> {
        let mut r = MessageReader::new(frame);
        let tag = r.read_u8()?;
        let len = r.read_i32()?;
        if len < 4 || r.remaining() != len as usize - 4 {
            return Err(Error::protocol("message length does not match frame"));
        }

        match tag {
            b'R' => Self::decode_authentication(r),
            b'K' => Ok(BackendMessage::BackendKeyData {
                pid: r.read_i32()?,
                secret_key: r.read_i32()?,
            }),
            b'S' => Ok(BackendMessage::ParameterStatus {
                name: r.read_cstr()?,
                value: r.read_cstr()?,
            }),
            b'Z' => Ok(BackendMessage::ReadyForQuery(TransactionStatus::from(
                r.read_u8()?,
            ))),
            b'T' => Self::decode_row_description(r),
            b't' => Self::decode_parameter_description(r),
            b'n' => Ok(BackendMessage::NoData),
            b'D' => Self::decode_data_row(r),
            b'C' => Ok(BackendMessage::CommandComplete(r.read_cstr()?)),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'1' => Ok(BackendMessage::ParseComplete),
            b'2' => Ok(BackendMessage::BindComplete),
            b'E' => Ok(BackendMessage::ErrorResponse(Self::decode_error_fields(r)?)),
            b'N' => Ok(BackendMessage::NoticeResponse(Self::decode_error_fields(r)?)),
            b'A' => Ok(BackendMessage::NotificationResponse(Notification {
                pid: r.read_i32()?,
                channel: r.read_cstr()?,
                payload: r.read_cstr()?,
            })),
            _ => Err(Error::Protocol(format!(
                "received unknown message type: {}",
                tag as char
            ))),
        }
    }

    /// Variant name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::Authentication(_) => "Authentication",
            BackendMessage::BackendKeyData { .. } => "BackendKeyData",
            BackendMessage::ParameterStatus { .. } => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::ParameterDescription(_) => "ParameterDescription",
            BackendMessage::NoData => "NoData",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::NotificationResponse(_) => "NotificationResponse",
        }
    }

    fn decode_authentication(mut r: MessageReader) -> Result<BackendMessage> {
        let method = r.read_i32()?;
        let auth = match method {
            0 => Authentication::Ok,
            3 => Authentication::CleartextPassword,
            5 => {
                let raw = r.read_bytes(4)?;
                let mut salt = [0u8; 4];
                salt.copy_from_slice(&raw);
                Authentication::Md5Password { salt }
            }
            other => Authentication::Unsupported(other),
        };
        Ok(BackendMessage::Authentication(auth))
    }

    fn decode_row_description(mut r: MessageReader) -> Result<BackendMessage> {
        let count = r.read_i16()?;
        let mut fields = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            fields.push(FieldDescription {
                name: r.read_cstr()?,
                table_oid: r.read_oid()?,
                attribute_number: r.read_i16()?,
                type_oid: r.read_oid()?,
                type_size: r.read_i16()?,
                type_modifier: r.read_i32()?,
                format: Format::from_i16(r.read_i16()?),
            });
        }
        Ok(BackendMessage::RowDescription(fields))
    }

    fn decode_parameter_description(mut r: MessageReader) -> Result<BackendMessage> {
        let count = r.read_i16()?;
        let mut oids = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            oids.push(r.read_oid()?);
        }
        Ok(BackendMessage::ParameterDescription(oids))
    }

    fn decode_data_row(mut r: MessageReader) -> Result<BackendMessage> {
        let count = r.read_i16()?;
        let mut values = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let len = r.read_i32()?;
            if len < 0 {
                values.push(None);
            } else {
                values.push(Some(r.read_bytes(len as usize)?));
            }
        }
        Ok(BackendMessage::DataRow(values))
    }

    fn decode_error_fields(mut r: MessageReader) -> Result<ErrorFields> {
        let mut fields = ErrorFields::default();
        loop {
            let kind = r.read_u8()?;
            if kind == 0 {
                return Ok(fields);
            }
            let value = r.read_cstr()?;
            match kind {
                b'S' => fields.severity = value,
                b'C' => fields.code = value,
                b'M' => fields.message = value,
                _ => {}
            }
        }
    }
}

// ============================================================================
// Command Tag
// ============================================================================

/// The completion string of a command cycle, e.g. `INSERT 0 3`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTag(pub String);

impl CommandTag {
    /// Rows affected by the command: the last whitespace-separated token of
    /// the tag, or 0 when the command does not report one (`CREATE TABLE`).
    pub fn rows_affected(&self) -> u64 {
        self.0
            .rsplit(' ')
            .next()
            .and_then(|word| word.parse().ok())
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<M: FrontendMessage>(msg: M) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        msg.encode(&mut w);
        w.finish();
        buf
    }

    #[test]
    fn startup_message_layout() {
        let encoded = encode(StartupMessage {
            user: "test",
            database: Some("testdb"),
        });

        // Length field covers the whole message.
        let len = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, encoded.len());

        // Protocol version at bytes 4..8.
        let version = i32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(version, 196608);

        // Terminating zero byte after the parameter pairs.
        assert_eq!(encoded[encoded.len() - 1], 0);
    }

    #[test]
    fn ssl_request_layout() {
        let encoded = encode(SslRequest);
        assert_eq!(&encoded[..], &[0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f]);
    }

    #[test]
    fn query_message_layout() {
        let encoded = encode(QueryMessage { sql: "SELECT 1" });
        assert_eq!(encoded[0], b'Q');
        let len = i32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
        // 4 length + 8 query + 1 null terminator
        assert_eq!(len, 13);
        assert_eq!(len as usize, encoded.len() - 1);
    }

    #[test]
    fn sync_and_terminate_are_minimal() {
        assert_eq!(&encode(SyncMessage)[..], &[b'S', 0, 0, 0, 4]);
        assert_eq!(&encode(TerminateMessage)[..], &[b'X', 0, 0, 0, 4]);
    }

    #[test]
    fn describe_targets_the_statement() {
        let encoded = encode(DescribeStatement { name: "s1" });
        assert_eq!(encoded[0], b'D');
        assert_eq!(encoded[5], b'S');
        assert_eq!(&encoded[6..9], b"s1\0");
    }

    #[test]
    fn pipelined_messages_each_get_their_own_length() {
        let mut buf = BytesMut::new();
        let mut w = MessageWriter::new(&mut buf);
        ParseMessage { name: "s1", sql: "select 1" }.encode(&mut w);
        DescribeStatement { name: "s1" }.encode(&mut w);
        SyncMessage.encode(&mut w);
        w.finish();

        // Walk the frames: tag + length each time.
        let mut offset = 0;
        let mut tags = Vec::new();
        while offset < buf.len() {
            tags.push(buf[offset]);
            let len = i32::from_be_bytes([
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
                buf[offset + 4],
            ]) as usize;
            offset += 1 + len;
        }
        assert_eq!(offset, buf.len());
        assert_eq!(tags, vec![b'P', b'D', b'S']);
    }

    #[test]
    fn decode_authentication_variants() {
        let ok = BackendMessage::decode(Bytes::from_static(&[b'R', 0, 0, 0, 8, 0, 0, 0, 0]))
            .unwrap();
        assert!(matches!(
            ok,
            BackendMessage::Authentication(Authentication::Ok)
        ));

        let md5 = BackendMessage::decode(Bytes::from_static(&[
            b'R', 0, 0, 0, 12, 0, 0, 0, 5, 0x12, 0x34, 0x56, 0x78,
        ]))
        .unwrap();
        match md5 {
            BackendMessage::Authentication(Authentication::Md5Password { salt }) => {
                assert_eq!(salt, [0x12, 0x34, 0x56, 0x78]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let sasl =
            BackendMessage::decode(Bytes::from_static(&[b'R', 0, 0, 0, 8, 0, 0, 0, 10])).unwrap();
        assert!(matches!(
            sasl,
            BackendMessage::Authentication(Authentication::Unsupported(10))
        ));
    }

    #[test]
    fn decode_ready_for_query() {
        let msg =
            BackendMessage::decode(Bytes::from_static(&[b'Z', 0, 0, 0, 5, b'T'])).unwrap();
        assert!(matches!(
            msg,
            BackendMessage::ReadyForQuery(TransactionStatus::InTransaction)
        ));
    }

    #[test]
    fn decode_row_description() {
        let mut data = vec![b'T'];
        let mut body = BytesMut::new();
        body.put_i16(1);
        body.put_slice(b"id\0");
        body.put_i32(0);
        body.put_i16(0);
        body.put_i32(23); // int4
        body.put_i16(4);
        body.put_i32(-1);
        body.put_i16(1); // binary
        data.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        data.extend_from_slice(&body);

        match BackendMessage::decode(Bytes::from(data)).unwrap() {
            BackendMessage::RowDescription(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "id");
                assert_eq!(fields[0].type_oid, Oid::INT4);
                assert_eq!(fields[0].format, Format::Binary);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_data_row_with_null() {
        let mut data = vec![b'D'];
        let mut body = BytesMut::new();
        body.put_i16(2);
        body.put_i32(4);
        body.put_i32(42);
        body.put_i32(-1);
        data.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        data.extend_from_slice(&body);

        match BackendMessage::decode(Bytes::from(data)).unwrap() {
            BackendMessage::DataRow(values) => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].as_deref(), Some(&42i32.to_be_bytes()[..]));
                assert_eq!(values[1], None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_error_response_keeps_core_fields() {
        let mut data = vec![b'E'];
        let mut body = BytesMut::new();
        body.put_slice(b"SERROR\0");
        body.put_slice(b"C42P01\0");
        body.put_slice(b"Mrelation \"foo\" does not exist\0");
        body.put_slice(b"Fparse_relation.c\0"); // discarded
        body.put_u8(0);
        data.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        data.extend_from_slice(&body);

        match BackendMessage::decode(Bytes::from(data)).unwrap() {
            BackendMessage::ErrorResponse(fields) => {
                assert_eq!(fields.severity, "ERROR");
                assert_eq!(fields.code, "42P01");
                assert_eq!(fields.message, "relation \"foo\" does not exist");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_notification() {
        let mut data = vec![b'A'];
        let mut body = BytesMut::new();
        body.put_i32(4711);
        body.put_slice(b"jobs\0");
        body.put_slice(b"payload\0");
        data.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        data.extend_from_slice(&body);

        match BackendMessage::decode(Bytes::from(data)).unwrap() {
            BackendMessage::NotificationResponse(n) => {
                assert_eq!(n.pid, 4711);
                assert_eq!(n.channel, "jobs");
                assert_eq!(n.payload, "payload");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let err = BackendMessage::decode(Bytes::from_static(&[b'?', 0, 0, 0, 4])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn decode_rejects_truncated_body() {
        // Claims 10 bytes of body but carries 1.
        let err =
            BackendMessage::decode(Bytes::from_static(&[b'Z', 0, 0, 0, 10, b'I'])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn command_tag_rows_affected() {
        assert_eq!(CommandTag("INSERT 0 3".to_string()).rows_affected(), 3);
        assert_eq!(CommandTag("UPDATE 7".to_string()).rows_affected(), 7);
        assert_eq!(CommandTag("SELECT 1".to_string()).rows_affected(), 1);
        assert_eq!(CommandTag("CREATE TABLE".to_string()).rows_affected(), 0);
        assert_eq!(CommandTag(String::new()).rows_affected(), 0);
    }
}
