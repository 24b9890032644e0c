//! Connection state machine.
//!
//! A [`Connection`] owns its transport exclusively; it is not safe to share
//! between tasks. Use [`Pool`](crate::Pool) to multiplex callers onto a set
//! of connections.
//!
//! Request/response cycles are strictly serial: after every completed
//! operation the driver has consumed the stream exactly up to and including
//! the ReadyForQuery sentinel. A cursor abandoned mid-stream leaves the
//! sentinel owed; the connection tracks that debt and the next operation
//! drains to it before writing anything new.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info};

use crate::config::{ConnectionConfig, TlsConfig};
use crate::error::{Error, Result};
use crate::protocol::{
    Authentication, BackendMessage, CommandTag, DescribeStatement, FieldDescription,
    FrontendMessage, MessageWriter, Notification, ParseMessage, PasswordMessage, QueryMessage,
    SslRequest, StartupMessage, SyncMessage, TerminateMessage, TransactionStatus,
};
use crate::rows::{Rows, ScanTarget};
use crate::sanitize;
use crate::types::{self, PgValue};

// ============================================================================
// Transport
// ============================================================================

/// The byte stream under a connection: TCP, unix socket, or TLS over TCP.
enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

// ============================================================================
// Prepared statements & transactions
// ============================================================================

/// A server-side prepared statement, created by [`Connection::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Server-side statement name.
    pub name: String,
    /// Parameter type OIDs reported by the server after parse.
    pub parameter_oids: Vec<types::Oid>,
    /// Result column descriptors with negotiated formats; empty when the
    /// statement produces no rows.
    pub fields: Vec<FieldDescription>,
}

/// Transaction isolation levels accepted by
/// [`Connection::transaction_iso`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::ReadUncommitted => "read uncommitted",
        }
    }
}

/// Boxed future returned by a transaction body; resolves to whether the
/// transaction should be committed.
pub type TransactionBody<'c> = Pin<Box<dyn std::future::Future<Output = bool> + Send + 'c>>;

// ============================================================================
// Connection
// ============================================================================

const READ_CHUNK: usize = 8192;

/// A PostgreSQL connection. Not safe for concurrent use by two callers.
pub struct Connection {
    transport: Transport,
    read_buf: BytesMut,
    write_buf: BytesMut,
    pid: i32,
    secret_key: i32,
    runtime_params: HashMap<String, String>,
    prepared: HashMap<String, PreparedStatement>,
    notifications: VecDeque<Notification>,
    tx_status: TransactionStatus,
    alive: bool,
    cause_of_death: Option<Error>,
    /// ReadyForQuery sentinels the server still owes us.
    pending_ready: usize,
}

impl Connection {
    /// Establish a connection: dial, optionally upgrade to TLS, run the
    /// startup/authentication exchange, and wait for ReadyForQuery.
    pub async fn connect(config: ConnectionConfig) -> Result<Connection> {
        let user = config.resolved_user();

        let transport = if let Some(path) = config.unix_socket_path() {
            #[cfg(unix)]
            {
                debug!(path = %path.display(), "dialing unix socket");
                Transport::Unix(UnixStream::connect(&path).await?)
            }
            #[cfg(not(unix))]
            {
                return Err(Error::Config(format!(
                    "unix sockets are unsupported on this platform: {}",
                    path.display()
                )));
            }
        } else {
            debug!(host = %config.host, port = config.port, "dialing tcp");
            let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
            stream.set_nodelay(true)?;
            Transport::Tcp(stream)
        };

        let transport = match (&config.tls, transport) {
            (None, transport) => transport,
            (Some(tls), Transport::Tcp(stream)) => {
                Self::upgrade_tls(stream, tls, &config.host).await?
            }
            (Some(_), _) => {
                return Err(Error::Config(
                    "tls is only supported over tcp transports".to_string(),
                ))
            }
        };

        let mut conn = Connection {
            transport,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(1024),
            pid: 0,
            secret_key: 0,
            runtime_params: HashMap::new(),
            prepared: HashMap::new(),
            notifications: VecDeque::new(),
            tx_status: TransactionStatus::Idle,
            alive: true,
            cause_of_death: None,
            pending_ready: 0,
        };

        conn.startup(&user, config.database.as_deref(), config.password.as_deref())
            .await?;

        info!(pid = conn.pid, "connection established");
        Ok(conn)
    }

    /// Send the 8-byte SSL request and hand the socket to rustls. Anything
    /// but an `'S'` reply is a failure; the driver never downgrades.
    async fn upgrade_tls(
        mut stream: TcpStream,
        tls: &TlsConfig,
        host: &str,
    ) -> Result<Transport> {
        let mut buf = BytesMut::with_capacity(8);
        let mut w = MessageWriter::new(&mut buf);
        SslRequest.encode(&mut w);
        w.finish();
        stream.write_all(&buf).await?;

        let mut reply = [0u8; 1];
        stream.read_exact(&mut reply).await?;
        if reply[0] != b'S' {
            return Err(Error::Tls(format!(
                "server refused the upgrade (reply {:?})",
                reply[0] as char
            )));
        }

        let name = tls.server_name.clone().unwrap_or_else(|| host.to_string());
        let server_name = rustls::pki_types::ServerName::try_from(name)
            .map_err(|e| Error::Tls(format!("invalid server name: {e}")))?;
        let connector = TlsConnector::from(tls.client_config.clone());
        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;
        debug!("tls handshake complete");
        Ok(Transport::Tls(Box::new(stream)))
    }

    async fn startup(
        &mut self,
        user: &str,
        database: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        self.send(&StartupMessage { user, database });
        self.flush().await?;

        loop {
            match self.receive().await? {
                BackendMessage::Authentication(auth) => {
                    self.authenticate(auth, user, password.unwrap_or("")).await?
                }
                BackendMessage::BackendKeyData { pid, secret_key } => {
                    self.pid = pid;
                    self.secret_key = secret_key;
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.tx_status = status;
                    return Ok(());
                }
                other => {
                    self.dispatch_context_free(other)?;
                }
            }
        }
    }

    async fn authenticate(
        &mut self,
        auth: Authentication,
        user: &str,
        password: &str,
    ) -> Result<()> {
        match auth {
            Authentication::Ok => Ok(()),
            Authentication::CleartextPassword => {
                self.send(&PasswordMessage { password });
                self.flush().await
            }
            Authentication::Md5Password { salt } => {
                let digest = md5_password(user, password, salt);
                self.send(&PasswordMessage { password: &digest });
                self.flush().await
            }
            Authentication::Unsupported(method) => Err(Error::Auth(format!(
                "server requested unsupported authentication method {method}"
            ))),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// The error that killed this connection, once dead.
    pub fn cause_of_death(&self) -> Option<&Error> {
        self.cause_of_death.as_ref()
    }

    /// Last transaction status reported through ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.tx_status
    }

    /// Backend process id, for out-of-band cancellation tooling.
    pub fn backend_pid(&self) -> i32 {
        self.pid
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    /// Last server-reported value of a runtime parameter.
    pub fn runtime_parameter(&self, name: &str) -> Option<&str> {
        self.runtime_params.get(name).map(|s| s.as_str())
    }

    pub fn prepared_statement(&self, name: &str) -> Option<&PreparedStatement> {
        self.prepared.get(name)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run `sql` and stream its rows.
    ///
    /// When `sql` names a prepared statement the extended protocol is used
    /// with the negotiated per-column formats; otherwise the SQL travels as
    /// a simple query, with `params` interpolated client-side.
    pub async fn query<'c>(
        &'c mut self,
        sql: &str,
        params: &[PgValue],
    ) -> Result<Rows<&'c mut Connection>> {
        Rows::start(self, sql, params).await
    }

    /// Run a query expected to produce exactly one row and scan it into
    /// `targets`.
    pub async fn query_row(
        &mut self,
        sql: &str,
        params: &[PgValue],
        targets: &mut [ScanTarget<'_>],
    ) -> Result<()> {
        let mut rows = Rows::start(&mut *self, sql, params).await?;
        if !rows.next_row().await {
            return Err(match rows.err().cloned() {
                Some(err) => err,
                None => Error::NotSingleRow { rows: 0 },
            });
        }
        let scanned = rows.scan(targets);
        rows.close().await;
        scanned?;
        match rows.err().cloned() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Execute `sql`, reading the response to completion, and return the
    /// last command-completion tag.
    pub async fn exec(&mut self, sql: &str, params: &[PgValue]) -> Result<CommandTag> {
        let started = std::time::Instant::now();
        match self.exec_inner(sql, params).await {
            Ok(tag) => {
                debug!(sql, elapsed = ?started.elapsed(), tag = %tag, "exec");
                Ok(tag)
            }
            Err(err) => {
                error!(sql, error = %err, "exec failed");
                Err(err)
            }
        }
    }

    async fn exec_inner(&mut self, sql: &str, params: &[PgValue]) -> Result<CommandTag> {
        self.ensure_ready().await?;
        self.send_query(sql, params).await?;

        let mut tag = CommandTag::default();
        let mut soft = None;

        loop {
            match self.receive().await? {
                BackendMessage::ReadyForQuery(status) => {
                    self.finish_cycle(status);
                    return match soft {
                        Some(err) => Err(err),
                        None => Ok(tag),
                    };
                }
                BackendMessage::CommandComplete(t) => tag = CommandTag(t),
                BackendMessage::RowDescription(_)
                | BackendMessage::DataRow(_)
                | BackendMessage::BindComplete
                | BackendMessage::ParseComplete
                | BackendMessage::EmptyQueryResponse => {}
                other => {
                    if let Err(err) = self.dispatch_context_free(other) {
                        self.buffer_soft(err, &mut soft)?;
                    }
                }
            }
        }
    }

    /// Create a named server-side prepared statement from `sql` with a
    /// pipelined parse/describe/sync exchange.
    pub async fn prepare(&mut self, name: &str, sql: &str) -> Result<&PreparedStatement> {
        self.ensure_ready().await?;
        self.send(&ParseMessage { name, sql });
        self.send(&DescribeStatement { name });
        self.send(&SyncMessage);
        self.flush().await?;
        self.begin_cycle();

        let mut statement = PreparedStatement {
            name: name.to_string(),
            parameter_oids: Vec::new(),
            fields: Vec::new(),
        };
        let mut soft = None;

        loop {
            match self.receive().await? {
                BackendMessage::ParseComplete => {}
                BackendMessage::ParameterDescription(oids) => statement.parameter_oids = oids,
                BackendMessage::RowDescription(mut fields) => {
                    for fd in &mut fields {
                        fd.format = types::result_format(fd.type_oid);
                    }
                    statement.fields = fields;
                }
                BackendMessage::NoData => {}
                BackendMessage::ReadyForQuery(status) => {
                    self.finish_cycle(status);
                    if let Some(err) = soft {
                        error!(name, sql, error = %err, "prepare failed");
                        return Err(err);
                    }
                    let slot = match self.prepared.entry(name.to_string()) {
                        Entry::Occupied(mut e) => {
                            e.insert(statement);
                            e.into_mut()
                        }
                        Entry::Vacant(e) => e.insert(statement),
                    };
                    return Ok(slot);
                }
                other => {
                    if let Err(err) = self.dispatch_context_free(other) {
                        self.buffer_soft(err, &mut soft)?;
                    }
                }
            }
        }
    }

    /// Release a prepared statement, server-side and locally.
    pub async fn deallocate(&mut self, name: &str) -> Result<()> {
        self.prepared.remove(name);
        self.exec(
            &format!("deallocate {}", sanitize::quote_identifier(name)),
            &[],
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Subscribe this connection to a notification channel.
    pub async fn listen(&mut self, channel: &str) -> Result<()> {
        self.exec(&format!("listen {channel}"), &[]).await?;
        Ok(())
    }

    /// Wait up to `timeout` for a notification.
    ///
    /// Returns immediately from the pending queue when non-empty. The
    /// deadline only bounds the wait for bytes to arrive; once the stream
    /// has data, frames are read to completion and dispatched through the
    /// context-free handler. Expiry returns
    /// [`Error::NotificationTimeout`] and leaves the connection usable.
    pub async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Notification> {
        if let Some(n) = self.notifications.pop_front() {
            return Ok(n);
        }
        if !self.alive {
            return Err(Error::DeadConnection);
        }
        self.ensure_ready().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.read_buf.is_empty() {
                match tokio::time::timeout_at(deadline, self.fill_read_buf()).await {
                    Ok(result) => result?,
                    Err(_) => return Err(Error::NotificationTimeout),
                }
            }
            let msg = self.receive().await?;
            self.dispatch_context_free(msg)?;
            if let Some(n) = self.notifications.pop_front() {
                return Ok(n);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::NotificationTimeout);
            }
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `body` inside a transaction at the connection's default
    /// isolation level. See [`Connection::transaction_iso`].
    pub async fn transaction<F>(&mut self, body: F) -> Result<bool>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> TransactionBody<'c>,
    {
        self.run_transaction(None, body).await
    }

    /// Run `body` inside a transaction at the given isolation level.
    ///
    /// The body resolves to whether it wants the transaction committed.
    /// The helper commits only when the body asked for it and the server
    /// still reports an open, non-failed transaction; otherwise it rolls
    /// back. The returned bool is whether a commit happened; an explicit
    /// rollback is not an error. A failed commit surfaces its error (and
    /// thus reports not-committed).
    pub async fn transaction_iso<F>(&mut self, level: IsolationLevel, body: F) -> Result<bool>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> TransactionBody<'c>,
    {
        self.run_transaction(Some(level), body).await
    }

    async fn run_transaction<F>(&mut self, level: Option<IsolationLevel>, body: F) -> Result<bool>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> TransactionBody<'c>,
    {
        match level {
            None => self.exec("begin", &[]).await?,
            Some(level) => {
                self.exec(&format!("begin isolation level {}", level.as_sql()), &[])
                    .await?
            }
        };

        let commit = body(self).await;

        if commit && self.tx_status == TransactionStatus::InTransaction {
            self.exec("commit", &[]).await?;
            Ok(true)
        } else {
            self.exec("rollback", &[]).await?;
            Ok(false)
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Close the connection: best-effort terminate message, transport
    /// shutdown, dead with cause [`Error::Closed`]. Safe to call twice.
    pub async fn close(&mut self) -> Result<()> {
        if !self.alive {
            return Ok(());
        }
        self.send(&TerminateMessage);
        let _ = self.flush().await;
        let _ = self.transport.shutdown().await;
        self.die(Error::Closed);
        info!("closed connection");
        Ok(())
    }

    // ========================================================================
    // Protocol plumbing
    // ========================================================================

    /// Kill the connection, recording the first cause, and hand the error
    /// back for propagation.
    pub(crate) fn die(&mut self, err: Error) -> Error {
        if self.alive {
            self.alive = false;
            self.cause_of_death = Some(err.clone());
            if !matches!(err, Error::Closed) {
                error!(error = %err, "connection died");
            }
        }
        err
    }

    /// Handle a message that may arrive in any context: parameter status,
    /// notices, notifications, and errors. Unexpected message kinds are
    /// fatal.
    pub(crate) fn dispatch_context_free(&mut self, msg: BackendMessage) -> Result<()> {
        match msg {
            BackendMessage::ParameterStatus { name, value } => {
                self.runtime_params.insert(name, value);
                Ok(())
            }
            BackendMessage::NoticeResponse(fields) => {
                debug!(severity = %fields.severity, message = %fields.message, "notice");
                Ok(())
            }
            BackendMessage::NotificationResponse(n) => {
                self.notifications.push_back(n);
                Ok(())
            }
            BackendMessage::ErrorResponse(fields) => {
                let err = fields.into_error();
                if err.is_fatal_backend() {
                    self.die(err.clone());
                }
                Err(err)
            }
            other => Err(self.die(Error::Protocol(format!(
                "received unexpected {} message",
                other.name()
            )))),
        }
    }

    /// Buffer a backend error until the cycle drains, or propagate it when
    /// it killed the connection.
    fn buffer_soft(&self, err: Error, soft: &mut Option<Error>) -> Result<()> {
        if !self.alive {
            return Err(err);
        }
        if soft.is_none() {
            *soft = Some(err);
        }
        Ok(())
    }

    pub(crate) fn begin_cycle(&mut self) {
        self.pending_ready += 1;
    }

    pub(crate) fn finish_cycle(&mut self, status: TransactionStatus) {
        self.tx_status = status;
        self.pending_ready = self.pending_ready.saturating_sub(1);
    }

    /// Consume any ReadyForQuery sentinels owed by abandoned cursors so the
    /// next request starts on a clean channel.
    pub(crate) async fn ensure_ready(&mut self) -> Result<()> {
        if !self.alive {
            return Err(Error::DeadConnection);
        }
        while self.pending_ready > 0 {
            match self.receive().await? {
                BackendMessage::ReadyForQuery(status) => self.finish_cycle(status),
                BackendMessage::RowDescription(_)
                | BackendMessage::DataRow(_)
                | BackendMessage::CommandComplete(_)
                | BackendMessage::BindComplete
                | BackendMessage::ParseComplete
                | BackendMessage::ParameterDescription(_)
                | BackendMessage::NoData
                | BackendMessage::EmptyQueryResponse => {}
                other => {
                    if let Err(err) = self.dispatch_context_free(other) {
                        if !self.alive {
                            return Err(err);
                        }
                        debug!(error = %err, "discarded error from abandoned cycle");
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the request for `sql` (extended protocol for prepared
    /// statements, simple query otherwise) and flush it.
    pub(crate) async fn send_query(&mut self, sql: &str, params: &[PgValue]) -> Result<()> {
        if self.prepared.contains_key(sql) {
            self.write_prepared(sql, params)?;
        } else {
            let rendered;
            let sql = if params.is_empty() {
                sql
            } else {
                rendered = sanitize::sanitize_sql(sql, params)?;
                &rendered
            };
            self.send(&QueryMessage { sql });
        }
        self.flush().await?;
        self.begin_cycle();
        Ok(())
    }

    /// Start a query cycle and return its field descriptors. `None` means
    /// the cycle produced no row description and has already drained.
    pub(crate) async fn start_query(
        &mut self,
        sql: &str,
        params: &[PgValue],
    ) -> Result<Option<Vec<FieldDescription>>> {
        self.ensure_ready().await?;

        if let Some(ps) = self.prepared.get(sql) {
            let fields = ps.fields.clone();
            self.write_prepared(sql, params)?;
            self.flush().await?;
            self.begin_cycle();
            return Ok(Some(fields));
        }

        // Simple queries do not know their field descriptions up front;
        // read until they arrive.
        let rendered;
        let text = if params.is_empty() {
            sql
        } else {
            rendered = sanitize::sanitize_sql(sql, params)?;
            &rendered
        };
        self.send(&QueryMessage { sql: text });
        self.flush().await?;
        self.begin_cycle();

        let mut soft = None;
        loop {
            match self.receive().await? {
                BackendMessage::RowDescription(fields) => return Ok(Some(fields)),
                BackendMessage::CommandComplete(_) | BackendMessage::EmptyQueryResponse => {}
                BackendMessage::ReadyForQuery(status) => {
                    self.finish_cycle(status);
                    return match soft {
                        Some(err) => Err(err),
                        None => Ok(None),
                    };
                }
                other => {
                    if let Err(err) = self.dispatch_context_free(other) {
                        self.buffer_soft(err, &mut soft)?;
                    }
                }
            }
        }
    }

    /// Append bind/execute/sync for a prepared statement to the write
    /// buffer. Encoding failures leave the buffer untouched.
    fn write_prepared(&mut self, name: &str, params: &[PgValue]) -> Result<()> {
        let ps = match self.prepared.get(name) {
            Some(ps) => ps,
            None => return Err(Error::Usage(format!("unknown prepared statement {name:?}"))),
        };
        if ps.parameter_oids.len() != params.len() {
            return Err(Error::Usage(format!(
                "prepared statement {:?} requires {} parameters, but {} were provided",
                name,
                ps.parameter_oids.len(),
                params.len()
            )));
        }
        let parameter_oids = ps.parameter_oids.clone();
        let result_formats: Vec<_> = ps.fields.iter().map(|f| f.format).collect();

        let checkpoint = self.write_buf.len();
        let result = (|| -> Result<()> {
            let mut w = MessageWriter::new(&mut self.write_buf);
            w.start(b'B');
            w.put_cstr(""); // unnamed portal
            w.put_cstr(name);
            w.put_i16(parameter_oids.len() as i16);
            for (oid, value) in parameter_oids.iter().zip(params) {
                w.put_i16(types::param_format(*oid, value) as i16);
            }
            w.put_i16(params.len() as i16);
            for (oid, value) in parameter_oids.iter().zip(params) {
                types::encode_param(&mut w, *oid, value)?;
            }
            w.put_i16(result_formats.len() as i16);
            for format in &result_formats {
                w.put_i16(*format as i16);
            }
            w.start(b'E'); // execute the unnamed portal, no row limit
            w.put_cstr("");
            w.put_i32(0);
            w.start(b'S');
            w.finish();
            Ok(())
        })();
        if result.is_err() {
            self.write_buf.truncate(checkpoint);
        }
        result
    }

    pub(crate) fn send<M: FrontendMessage>(&mut self, msg: &M) {
        let mut w = MessageWriter::new(&mut self.write_buf);
        msg.encode(&mut w);
        w.finish();
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if !self.alive {
            self.write_buf.clear();
            return Err(Error::DeadConnection);
        }
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let buf = self.write_buf.split();
        if let Err(e) = self.transport.write_all(&buf).await {
            return Err(self.die(e.into()));
        }
        if let Err(e) = self.transport.flush().await {
            return Err(self.die(e.into()));
        }
        Ok(())
    }

    /// Pull one framed message off the wire.
    pub(crate) async fn receive(&mut self) -> Result<BackendMessage> {
        if !self.alive {
            return Err(Error::DeadConnection);
        }
        loop {
            if let Some(frame) = self.take_frame()? {
                return BackendMessage::decode(frame).map_err(|e| self.die(e));
            }
            self.fill_read_buf().await?;
        }
    }

    /// Split one complete frame out of the read buffer, if present.
    fn take_frame(&mut self) -> Result<Option<Bytes>> {
        if self.read_buf.len() < 5 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
            self.read_buf[4],
        ]);
        if len < 4 {
            return Err(self.die(Error::protocol("invalid message length")));
        }
        let total = len as usize + 1;
        if self.read_buf.len() < total {
            self.read_buf.reserve(total - self.read_buf.len());
            return Ok(None);
        }
        Ok(Some(self.read_buf.split_to(total).freeze()))
    }

    /// Read more bytes into the buffer. Cancel-safe: partial frames stay
    /// buffered across calls.
    async fn fill_read_buf(&mut self) -> Result<()> {
        if self.read_buf.capacity() - self.read_buf.len() < READ_CHUNK {
            self.read_buf.reserve(READ_CHUNK);
        }
        match self.transport.read_buf(&mut self.read_buf).await {
            Ok(0) => Err(self.die(Error::protocol("server closed the connection unexpectedly"))),
            Ok(_) => Ok(()),
            Err(e) => Err(self.die(e.into())),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("pid", &self.pid)
            .field("alive", &self.alive)
            .field("tx_status", &self.tx_status)
            .finish_non_exhaustive()
    }
}

/// The salted double-MD5 password digest of authentication method 5:
/// `"md5" || hex(md5(hex(md5(password || user)) || salt))`.
fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = format!("{password}{user}");
    let inner_hex = format!("{:x}", md5::compute(inner.as_bytes()));

    let mut outer = inner_hex.into_bytes();
    outer.extend_from_slice(&salt);
    format!("md5{:x}", md5::compute(&outer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_digest_shape() {
        let digest = md5_password("postgres", "secret", *b"abcd");
        assert!(digest.starts_with("md5"));
        assert_eq!(digest.len(), 35); // "md5" + 32 hex chars
        assert!(digest[3..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn md5_digest_depends_on_salt() {
        let a = md5_password("postgres", "secret", *b"aaaa");
        let b = md5_password("postgres", "secret", *b"bbbb");
        assert_ne!(a, b);
    }

    #[test]
    fn isolation_levels_render_as_sql() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "serializable");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "repeatable read");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "read committed");
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "read uncommitted");
    }
}
