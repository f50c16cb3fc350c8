//! Core connection type

use super::config::{SessionConfiguration, Target};
use super::state::ConnectionState;
use super::tls::SslPolicy;
use super::transport::Transport;
use crate::auth::{AuthPlugin, AuthStep, Credential};
use crate::batch::TextBatch;
use crate::cache::{CacheStats, PreparedHandle, StatementCaches};
use crate::codec::{Decoder, Format};
use crate::metrics::{counters, histograms, labels};
use crate::protocol::constants::{capabilities, headers, DEFAULT_CHARSET, MAX_PAYLOAD_LEN};
use crate::protocol::{
    decode_auth_response, decode_column_count, decode_column_definition, decode_err,
    decode_handshake, decode_ok, decode_packet, decode_prepare_ok, encode_message, encode_packet,
    AuthResponse, FrontendMessage, Handshake, OkPacket, Packet,
};
use crate::row::{Column, Row};
use crate::statement::Fingerprint;
use crate::stream::ResultStream;
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Upper bound on auth switch requests honoured in one negotiation
pub const MAX_AUTH_SWITCHES: usize = 3;

/// Server identity captured from the greeting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server version string
    pub version: String,
    /// Connection (thread) id
    pub connection_id: u32,
    /// Capabilities advertised by the server
    pub capabilities: u32,
    /// Server default character set
    pub charset: u8,
    /// Mechanism hinted in the greeting
    pub auth_plugin: String,
}

/// First response to a command that produces results
#[derive(Debug)]
pub(crate) enum ResultHeader {
    /// OK packet, no result set
    Done(OkPacket),
    /// A result set with these columns follows
    Rows(Arc<[Column]>),
}

pub(crate) fn malformed(err: io::Error) -> Error {
    Error::Protocol(format!("malformed packet: {}", err))
}

async fn bounded<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::SocketTimeout(limit))?,
        None => fut.await,
    }
}

/// MySQL session
///
/// Owns its transport and statement caches. At most one request is in
/// flight; a [`ResultStream`] borrows the connection until it is consumed.
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    sequence: u8,
    capabilities: u32,
    server: Option<ServerInfo>,
    caches: StatementCaches,
    decoder: Decoder,
    socket_timeout: Option<Duration>,
    server_prepare: bool,
    pending_deallocations: Vec<u32>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("server", &self.server)
            .field("capabilities", &format_args!("{:#010x}", self.capabilities))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect to the configured target and negotiate a ready session
    ///
    /// The SSL policy is validated before any network I/O. The connect
    /// timeout, when set, bounds transport connect and negotiation together.
    pub async fn connect(config: &SessionConfiguration) -> Result<Self> {
        config.ssl_policy()?;
        let started = Instant::now();

        let attempt = async {
            let transport = match config.target() {
                Target::Tcp { host, port } => {
                    Transport::connect_tcp(host, *port, config.tcp_options()).await?
                }
                Target::Unix { path } => Transport::connect_unix(path).await?,
            };
            let mut conn = Connection::new(transport, config);
            conn.startup(config).await?;
            Ok::<_, Error>(conn)
        };

        let conn = match config.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| Error::ConnectTimeout(limit))??,
            None => attempt.await?,
        };

        histograms::connect_duration(started.elapsed().as_millis() as u64);
        Ok(conn)
    }

    /// Create an unauthenticated connection over an established transport
    pub fn new(transport: Transport, config: &SessionConfiguration) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(1024),
            sequence: 0,
            capabilities: 0,
            server: None,
            caches: StatementCaches::new(config.query_cache_size(), config.prepare_cache_size()),
            decoder: Decoder::new(config.zero_date(), config.extensions()),
            socket_timeout: config.socket_timeout(),
            server_prepare: config.server_prepare(),
            pending_deallocations: Vec::new(),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server identity, once the greeting has been read
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Negotiated capability flags
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Whether the transport is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().map_or(false, |t| t.is_tls())
    }

    /// Statement cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.caches.stats()
    }

    /// Perform the handshake and authentication
    ///
    /// On failure the connection is left in [`ConnectionState::Failed`].
    pub async fn startup(&mut self, config: &SessionConfiguration) -> Result<()> {
        let result = self
            .negotiate(config)
            .instrument(tracing::info_span!(
                "startup",
                user = %config.user(),
                target = %config.target()
            ))
            .await;
        if let Err(e) = &result {
            if !self.state.is_terminal() {
                tracing::debug!(state = %self.state, error = %e, "startup failed");
                let _ = self.state.transition(ConnectionState::Failed);
            }
        }
        result
    }

    async fn negotiate(&mut self, config: &SessionConfiguration) -> Result<()> {
        let kind = self
            .transport
            .as_ref()
            .map(|t| t.kind())
            .ok_or(Error::ConnectionClosed)?;
        let policy = SslPolicy::new(config.ssl(), kind)?;

        self.state.transition(ConnectionState::AwaitingGreeting)?;
        let greeting = self.receive_packet().await?;
        if greeting.payload.first() == Some(&headers::ERR) {
            let err = decode_err(&greeting.payload).map_err(malformed)?;
            return Err(err.into());
        }
        let handshake = decode_handshake(&greeting.payload).map_err(malformed)?;
        tracing::debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            plugin = %handshake.auth_plugin_name,
            "greeting received"
        );
        if handshake.capabilities & capabilities::CLIENT_PROTOCOL_41 == 0 {
            return Err(Error::Protocol(
                "server does not support the 4.1 protocol".into(),
            ));
        }
        self.server = Some(ServerInfo {
            version: handshake.server_version.clone(),
            connection_id: handshake.connection_id,
            capabilities: handshake.capabilities,
            charset: handshake.charset,
            auth_plugin: handshake.auth_plugin_name.clone(),
        });

        let mut caps = capabilities::CLIENT_BASE & handshake.capabilities;
        if config.database().is_some() {
            caps |= capabilities::CLIENT_CONNECT_WITH_DB & handshake.capabilities;
        }

        if policy.should_request(handshake.capabilities)? {
            self.state.transition(ConnectionState::NegotiatingSsl)?;
            caps |= capabilities::CLIENT_SSL;
            self.send_message(&FrontendMessage::SslRequest {
                capabilities: caps,
                charset: DEFAULT_CHARSET,
            })
            .await?;

            let hostname = match config.target() {
                Target::Tcp { host, .. } => host.as_str(),
                Target::Unix { .. } => "localhost",
            };
            let transport = self.transport.take().ok_or(Error::ConnectionClosed)?;
            match policy.upgrade(transport, hostname).await {
                Ok(upgraded) => {
                    counters::tls_upgrade(labels::TLS_ESTABLISHED);
                    self.transport = Some(upgraded);
                }
                Err(e) => {
                    counters::tls_upgrade(labels::TLS_FAILED);
                    return Err(e);
                }
            }
        }
        self.capabilities = caps;

        self.state.transition(ConnectionState::AwaitingCredential)?;
        let credential = match config.credential_source() {
            Some(source) => source.credential().await?,
            None => Credential::empty(),
        };
        tracing::debug!("credential resolved");

        self.state.transition(ConnectionState::AwaitingAuthResult)?;
        self.authenticate(config, &handshake, credential).await?;

        self.state.transition(ConnectionState::Ready)?;
        tracing::info!(tls = self.is_tls(), "startup complete");
        Ok(())
    }

    /// Run the authentication exchange; `credential` is wiped when this returns
    async fn authenticate(
        &mut self,
        config: &SessionConfiguration,
        handshake: &Handshake,
        credential: Credential,
    ) -> Result<()> {
        let auth_start = Instant::now();
        let secure = self.transport.as_ref().map_or(false, |t| t.is_secure());
        let mut plugin = AuthPlugin::from_name(&handshake.auth_plugin_name).unwrap_or_else(|_| {
            tracing::debug!(
                hinted = %handshake.auth_plugin_name,
                "unsupported default plugin, answering with mysql_native_password"
            );
            AuthPlugin::Native
        });
        let mut salt = handshake.auth_plugin_data.clone();
        counters::auth_attempted(plugin.metric_label());

        let auth_response = plugin.initial_response(&credential, &salt, secure)?;
        self.send_message(&FrontendMessage::HandshakeResponse {
            capabilities: self.capabilities,
            charset: DEFAULT_CHARSET,
            user: config.user().to_string(),
            auth_response,
            database: config.database().map(str::to_string),
            plugin: plugin.name().to_string(),
        })
        .await?;

        let mut switches = 0;
        loop {
            let packet = self.receive_packet().await?;
            match decode_auth_response(&packet.payload, self.capabilities).map_err(malformed)? {
                AuthResponse::Ok(_) => {
                    tracing::debug!(plugin = plugin.name(), "authentication successful");
                    counters::auth_successful(plugin.metric_label());
                    histograms::auth_duration(
                        plugin.metric_label(),
                        auth_start.elapsed().as_millis() as u64,
                    );
                    return Ok(());
                }
                AuthResponse::Err(err) => {
                    counters::auth_failed(plugin.metric_label(), "server_error");
                    return Err(err.into());
                }
                AuthResponse::Switch { plugin: name, data } => {
                    switches += 1;
                    if switches > MAX_AUTH_SWITCHES {
                        counters::auth_failed(plugin.metric_label(), "too_many_switches");
                        return Err(Error::Authentication(format!(
                            "server requested more than {} authentication switches",
                            MAX_AUTH_SWITCHES
                        )));
                    }
                    self.state.transition(ConnectionState::AwaitingAuthSwitch)?;
                    plugin = AuthPlugin::from_name(&name)?;
                    salt = data;
                    tracing::debug!(plugin = plugin.name(), switches, "auth switch requested");
                    counters::auth_attempted(plugin.metric_label());

                    let response = plugin.initial_response(&credential, &salt, secure)?;
                    self.send_message(&FrontendMessage::AuthData(response)).await?;
                    self.state.transition(ConnectionState::AwaitingAuthResult)?;
                }
                AuthResponse::MoreData(data) => {
                    match plugin.on_more_data(&data, &credential, &salt, secure)? {
                        AuthStep::Send(bytes) => {
                            self.send_message(&FrontendMessage::AuthData(bytes)).await?
                        }
                        AuthStep::Wait => {}
                    }
                }
            }
        }
    }

    /// Start a batch on this session
    pub fn batch(&mut self) -> TextBatch<'_> {
        TextBatch::new(self)
    }

    /// Execute one statement and stream its results
    ///
    /// Uses the query cache, and the prepare cache when server-side
    /// preparation is enabled and the statement is preparable.
    pub async fn execute(&mut self, sql: &str) -> Result<ResultStream<'_>> {
        self.ensure_ready()?;
        self.flush_deallocations().await?;

        let meta = self.caches.query_meta(sql);
        if meta.param_count > 0 {
            return Err(Error::State(format!(
                "statement has {} parameter placeholder(s) but no bindings",
                meta.param_count
            )));
        }

        let started = Instant::now();
        let result = if self.server_prepare && meta.kind.is_preparable() {
            self.execute_prepared(sql).await
        } else {
            self.execute_text(sql).await
        };
        let (header, format, retire) = match self.settle(result) {
            Ok(opened) => opened,
            Err(e) => {
                counters::statement_failed(e.metric_label());
                return Err(e);
            }
        };
        tracing::debug!(kind = %meta.kind, ?format, "statement sent");
        ResultStream::open(self, header, format, retire, started).await
    }

    /// Execute one statement and collect its rows
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.execute(sql).await?.collect().await
    }

    /// Check the session is alive
    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.flush_deallocations().await?;
        let result = self.ping_inner().await;
        self.settle(result)
    }

    async fn ping_inner(&mut self) -> Result<()> {
        self.begin_command(&FrontendMessage::Ping).await?;
        let packet = self.receive_packet().await?;
        match packet.payload.first() {
            Some(&headers::OK) => {
                self.state.transition(ConnectionState::Ready)?;
                Ok(())
            }
            Some(&headers::ERR) => Err(decode_err(&packet.payload).map_err(malformed)?.into()),
            _ => Err(Error::Protocol("unexpected response to COM_PING".into())),
        }
    }

    async fn execute_text(&mut self, sql: &str) -> Result<(ResultHeader, Format, Option<u32>)> {
        self.begin_command(&FrontendMessage::Query(sql.to_string()))
            .await?;
        let header = self.read_result_header().await?;
        Ok((header, Format::Text, None))
    }

    async fn execute_prepared(
        &mut self,
        sql: &str,
    ) -> Result<(ResultHeader, Format, Option<u32>)> {
        let fingerprint = Fingerprint::new(sql);
        let mut retire = None;
        let handle = match self.caches.prepared(&fingerprint) {
            Some(handle) => handle,
            None => {
                let handle = self.prepare(sql).await?;
                if let Some(displaced) = self.caches.insert_prepared(fingerprint, handle.clone()) {
                    if displaced.statement_id == handle.statement_id {
                        // not cached; release once this execution finishes
                        retire = Some(handle.statement_id);
                    } else {
                        self.pending_deallocations.push(displaced.statement_id);
                    }
                }
                self.flush_deallocations().await?;
                handle
            }
        };

        self.begin_command(&FrontendMessage::Execute {
            statement_id: handle.statement_id,
        })
        .await?;
        let header = self.read_result_header().await?;
        Ok((header, Format::Binary, retire))
    }

    async fn prepare(&mut self, sql: &str) -> Result<PreparedHandle> {
        self.begin_command(&FrontendMessage::Prepare(sql.to_string()))
            .await?;
        let packet = self.receive_packet().await?;
        self.state.transition(ConnectionState::ReadingResults)?;
        if packet.payload.first() == Some(&headers::ERR) {
            return Err(decode_err(&packet.payload).map_err(malformed)?.into());
        }
        let ok = decode_prepare_ok(&packet.payload).map_err(malformed)?;
        self.read_definitions(usize::from(ok.num_params)).await?;
        let columns = self.read_definitions(usize::from(ok.num_columns)).await?;
        self.state.transition(ConnectionState::Ready)?;
        tracing::debug!(
            statement_id = ok.statement_id,
            params = ok.num_params,
            columns = ok.num_columns,
            "statement prepared"
        );

        if ok.num_params > 0 {
            self.pending_deallocations.push(ok.statement_id);
            return Err(Error::State(format!(
                "statement has {} parameter(s) but no bindings",
                ok.num_params
            )));
        }
        Ok(PreparedHandle {
            statement_id: ok.statement_id,
            params: ok.num_params,
            columns: columns.into(),
        })
    }

    async fn read_definitions(&mut self, count: usize) -> Result<Vec<Column>> {
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let packet = self.receive_packet().await?;
            let def = decode_column_definition(&packet.payload).map_err(malformed)?;
            columns.push(Column::from(def));
        }
        if count > 0 && !self.deprecate_eof() {
            self.receive_packet().await?;
        }
        Ok(columns)
    }

    /// Read an OK packet or a result set header with its column definitions
    pub(crate) async fn read_result_header(&mut self) -> Result<ResultHeader> {
        let packet = self.receive_packet().await?;
        if self.state == ConnectionState::CommandInProgress {
            self.state.transition(ConnectionState::ReadingResults)?;
        }
        match packet.payload.first() {
            Some(&headers::OK) => Ok(ResultHeader::Done(
                decode_ok(&packet.payload, self.capabilities).map_err(malformed)?,
            )),
            Some(&headers::ERR) => Err(decode_err(&packet.payload).map_err(malformed)?.into()),
            Some(&headers::NULL) => Err(Error::Protocol(
                "LOCAL INFILE requests are not supported".into(),
            )),
            Some(_) => {
                let count = decode_column_count(&packet.payload).map_err(malformed)?;
                let count = usize::try_from(count)
                    .map_err(|_| Error::Protocol(format!("invalid column count {}", count)))?;
                let columns = self.read_definitions(count).await?;
                Ok(ResultHeader::Rows(columns.into()))
            }
            None => Err(Error::Protocol("empty response packet".into())),
        }
    }

    /// Close the session
    ///
    /// Resident prepared statements are deallocated and COM_QUIT is sent when
    /// the session is ready; a failed session is just shut down.
    pub async fn close(mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Ready => {
                let resident = self.caches.drain_prepared();
                self.pending_deallocations
                    .extend(resident.iter().map(|h| h.statement_id));
                if self.flush_deallocations().await.is_ok() {
                    self.sequence = 0;
                    if let Err(e) = self.send_message(&FrontendMessage::Quit).await {
                        tracing::debug!(error = %e, "failed to send COM_QUIT");
                    }
                }
            }
            state if !state.is_terminal() => {
                self.state.transition(ConnectionState::Failed)?;
            }
            _ => {}
        }
        let reason = if self.state == ConnectionState::Failed {
            labels::CLOSE_FAILED
        } else {
            labels::CLOSE_CLIENT
        };
        self.state.transition(ConnectionState::Closed)?;
        counters::session_closed(reason);

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown().await {
                tracing::debug!(error = %e, "transport shutdown failed");
            }
        }
        tracing::debug!("connection closed");
        Ok(())
    }

    /// Drop the transport after a result stream was abandoned mid-statement
    pub(crate) fn abandon(&mut self) {
        self.transport = None;
        if !self.state.is_terminal() {
            let _ = self.state.transition(ConnectionState::Failed);
        }
        if self.state == ConnectionState::Failed {
            let _ = self.state.transition(ConnectionState::Closed);
            counters::session_closed(labels::CLOSE_ABANDONED);
        }
    }

    /// Return to `Ready` after the last packet of a command was read
    pub(crate) fn finish_command(&mut self) -> Result<()> {
        self.state.transition(ConnectionState::Ready)
    }

    /// Queue a prepared statement for deallocation
    pub(crate) fn retire_statement(&mut self, statement_id: u32) {
        self.pending_deallocations.push(statement_id);
    }

    /// Write queued COM_STMT_CLOSE packets
    ///
    /// A rejected deallocation is logged and counted. A transport failure
    /// moves the session to `Failed` and is returned, since a packet may have
    /// been partially written.
    pub(crate) async fn flush_deallocations(&mut self) -> Result<()> {
        if self.state != ConnectionState::Ready || self.pending_deallocations.is_empty() {
            return Ok(());
        }
        for statement_id in std::mem::take(&mut self.pending_deallocations) {
            self.sequence = 0;
            match self
                .send_message(&FrontendMessage::CloseStatement { statement_id })
                .await
            {
                Ok(()) => {
                    tracing::debug!(statement_id, "prepared statement deallocated");
                    self.caches.record_deallocation(true);
                }
                Err(e) => {
                    tracing::warn!(statement_id, error = %e, "failed to deallocate prepared statement");
                    self.caches.record_deallocation(false);
                    if matches!(e, Error::Io(_) | Error::SocketTimeout(_)) {
                        let _ = self.state.transition(ConnectionState::Failed);
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub(crate) fn deprecate_eof(&self) -> bool {
        self.capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0
    }

    /// Move to `Failed` when `result` carries a fatal error
    pub(crate) fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.state.is_terminal() {
                tracing::debug!(state = %self.state, error = %e, "session failed");
                let _ = self.state.transition(ConnectionState::Failed);
            }
        }
        result
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Failed => Err(Error::State(
                "session has failed; establish a new session".into(),
            )),
            state if state.is_busy() => Err(Error::State(
                "a request is already outstanding on this session".into(),
            )),
            state => Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: state.to_string(),
            }),
        }
    }

    async fn begin_command(&mut self, msg: &FrontendMessage) -> Result<()> {
        self.state.transition(ConnectionState::CommandInProgress)?;
        self.sequence = 0;
        self.send_message(msg).await
    }

    fn io_timeout(&self) -> Option<Duration> {
        if self.state.is_negotiating() {
            None
        } else {
            self.socket_timeout
        }
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let payload = encode_message(msg)
            .map_err(|e| Error::Protocol(format!("cannot encode {}: {}", msg.name(), e)))?;
        self.write_buf.clear();
        encode_packet(&mut self.write_buf, &mut self.sequence, &payload);
        tracing::trace!(message = msg.name(), len = payload.len(), "send");

        let limit = self.io_timeout();
        let buf = &self.write_buf;
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        bounded(limit, async {
            transport.write_all(buf).await?;
            transport.flush().await
        })
        .await
    }

    /// Receive one logical packet and check its sequence id
    pub(crate) async fn receive_packet(&mut self) -> Result<Packet> {
        let limit = self.io_timeout();
        loop {
            match decode_packet(&self.read_buf) {
                Ok((packet, consumed)) => {
                    self.read_buf.advance(consumed);
                    let expected = self
                        .sequence
                        .wrapping_add((packet.payload.len() / MAX_PAYLOAD_LEN) as u8);
                    if packet.sequence != expected {
                        return Err(Error::Protocol(format!(
                            "packet out of order: expected sequence {}, got {}",
                            expected, packet.sequence
                        )));
                    }
                    self.sequence = packet.sequence.wrapping_add(1);
                    return Ok(packet);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(malformed(e)),
            }

            let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            let n = bounded(limit, transport.read_buf(&mut self.read_buf)).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    pub(crate) fn record_statement(&self, format: Format, rows: u64, started: Instant) {
        let protocol = match format {
            Format::Text => labels::PROTOCOL_TEXT,
            Format::Binary => labels::PROTOCOL_BINARY,
        };
        counters::statement_executed(protocol);
        histograms::statement_duration(protocol, started.elapsed().as_millis() as u64);
        histograms::rows_per_statement(rows);
    }
}
