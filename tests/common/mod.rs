//! Scripted MySQL-protocol server for integration tests
//!
//! Speaks just enough of the server side to drive the driver: greeting,
//! authentication (with scripted auth switches), COM_QUERY, the prepared
//! statement commands, COM_PING and COM_QUIT. Every client packet is
//! recorded so tests can assert on what was sent and in which order.

#![allow(dead_code)]

use mysql_wire::auth::{scramble_caching_sha2, scramble_native};
use mysql_wire::connection::{Connection, SessionConfiguration, SessionConfigurationBuilder, SslMode};
use mysql_wire::protocol::constants::{capabilities, column_types, commands, status};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;

/// Account accepted by the server
pub const USER: &str = "app";
/// Password accepted by the server
pub const PASSWORD: &str = "secret";
/// Challenge sent in the greeting
pub const SALT: [u8; 20] = *b"abcdefghij0123456789";

const UTF8MB4: u16 = 45;
const NATIVE: &str = "mysql_native_password";
const CACHING_SHA2: &str = "caching_sha2_password";
const CLEAR: &str = "mysql_clear_password";

/// Initialise log output once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Column of a scripted result set
#[derive(Debug, Clone)]
pub struct Col {
    pub name: &'static str,
    pub column_type: u8,
    pub charset: u16,
    pub flags: u16,
}

/// Text column of the given type
pub fn col(name: &'static str, column_type: u8) -> Col {
    Col {
        name,
        column_type,
        charset: UTF8MB4,
        flags: 0,
    }
}

/// Scripted answer to a statement
#[derive(Debug, Clone)]
pub enum Response {
    /// OK packet
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
    },
    /// ERR packet
    Err { code: u16, message: String },
    /// Result set; values use the text representation
    Rows {
        columns: Vec<Col>,
        rows: Vec<Vec<Option<String>>>,
    },
    /// Several results chained with SERVER_MORE_RESULTS_EXISTS
    Multi(Vec<Response>),
    /// Never answer
    Stall,
    /// Drop the connection
    Disconnect,
}

impl Response {
    pub fn ok(affected_rows: u64) -> Self {
        Response::Ok {
            affected_rows,
            last_insert_id: 0,
        }
    }

    pub fn err(code: u16, message: &str) -> Self {
        Response::Err {
            code,
            message: message.to_string(),
        }
    }

    pub fn rows(columns: Vec<Col>, rows: Vec<Vec<Option<&str>>>) -> Self {
        Response::Rows {
            columns,
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }
}

pub type Responder = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Default statement handling
///
/// * anything mentioning `missing` fails with error 1146
/// * `SELECT ... users` returns three users
/// * `SELECT ... big` returns 500 rows
/// * other SELECTs return a single `1`
/// * INSERT/UPDATE/DELETE/REPLACE affect one row; INSERT reports id 42
pub fn default_responder(sql: &str) -> Response {
    let lower = sql.trim().to_ascii_lowercase();
    if lower.contains("missing") {
        return Response::err(1146, "Table 'shop.missing' doesn't exist");
    }
    if lower.starts_with("select") {
        if lower.contains("users") {
            return Response::rows(
                vec![col("id", column_types::LONG), col("name", column_types::VAR_STRING)],
                vec![
                    vec![Some("1"), Some("alice")],
                    vec![Some("2"), Some("bob")],
                    vec![Some("3"), None],
                ],
            );
        }
        if lower.contains("big") {
            return Response::Rows {
                columns: vec![col("n", column_types::LONGLONG)],
                rows: (0..500).map(|i| vec![Some(i.to_string())]).collect(),
            };
        }
        return Response::rows(vec![col("1", column_types::LONGLONG)], vec![vec![Some("1")]]);
    }
    if lower.starts_with("insert") {
        return Response::Ok {
            affected_rows: 1,
            last_insert_id: 42,
        };
    }
    if lower.starts_with("update") || lower.starts_with("delete") || lower.starts_with("replace")
    {
        return Response::ok(1);
    }
    Response::ok(0)
}

/// Server behaviour
#[derive(Clone)]
pub struct Script {
    pub plugin: &'static str,
    pub password: &'static str,
    pub switches: Vec<&'static str>,
    pub advertise_ssl: bool,
    pub deprecate_eof: bool,
    pub full_auth: bool,
    pub greeting_delay: Option<Duration>,
    pub responder: Responder,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            plugin: NATIVE,
            password: PASSWORD,
            switches: Vec::new(),
            advertise_ssl: false,
            deprecate_eof: true,
            full_auth: false,
            greeting_delay: None,
            responder: Arc::new(default_responder),
        }
    }
}

impl Script {
    pub fn plugin(mut self, plugin: &'static str) -> Self {
        self.plugin = plugin;
        self
    }

    pub fn switches(mut self, switches: &[&'static str]) -> Self {
        self.switches = switches.to_vec();
        self
    }

    pub fn advertise_ssl(mut self) -> Self {
        self.advertise_ssl = true;
        self
    }

    pub fn legacy_eof(mut self) -> Self {
        self.deprecate_eof = false;
        self
    }

    pub fn full_auth(mut self) -> Self {
        self.full_auth = true;
        self
    }

    pub fn greeting_delay(mut self, delay: Duration) -> Self {
        self.greeting_delay = Some(delay);
        self
    }

    pub fn respond(mut self, f: impl Fn(&str) -> Response + Send + Sync + 'static) -> Self {
        self.responder = Arc::new(f);
        self
    }
}

/// Client packet as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SslRequest,
    Handshake {
        capabilities: u32,
        user: String,
        database: Option<String>,
        plugin: String,
        auth_response: Vec<u8>,
    },
    AuthData(Vec<u8>),
    Query(String),
    Prepare(String),
    Execute(u32),
    CloseStatement(u32),
    Ping,
    Quit,
}

impl Event {
    /// Whether this is a command sent after authentication
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Event::Query(_)
                | Event::Prepare(_)
                | Event::Execute(_)
                | Event::CloseStatement(_)
                | Event::Ping
                | Event::Quit
        )
    }
}

enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

type Log = Arc<Mutex<Vec<Event>>>;

/// Running fake server; stops when dropped
pub struct FakeServer {
    endpoint: Endpoint,
    events: Log,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Listen on 127.0.0.1 with an ephemeral port
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let events = Log::default();
        let connections = Arc::new(AtomicUsize::new(0));

        let log = Arc::clone(&events);
        let count = Arc::clone(&connections);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = stream.set_nodelay(true);
                tokio::spawn(serve(stream, script.clone(), Arc::clone(&log)));
            }
        });

        Self {
            endpoint: Endpoint::Tcp(addr),
            events,
            connections,
            task,
        }
    }

    /// Listen on a unix socket at `path`
    pub async fn start_unix(script: Script, path: &Path) -> Self {
        let listener = UnixListener::bind(path).expect("bind unix socket");
        let events = Log::default();
        let connections = Arc::new(AtomicUsize::new(0));

        let log = Arc::clone(&events);
        let count = Arc::clone(&connections);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, script.clone(), Arc::clone(&log)));
            }
        });

        Self {
            endpoint: Endpoint::Unix(path.to_path_buf()),
            events,
            connections,
            task,
        }
    }

    /// TCP port, for TCP servers
    pub fn port(&self) -> u16 {
        match &self.endpoint {
            Endpoint::Tcp(addr) => addr.port(),
            Endpoint::Unix(_) => panic!("unix server has no port"),
        }
    }

    /// Connection string pointing at this server
    pub fn url(&self, params: &str) -> String {
        match &self.endpoint {
            Endpoint::Tcp(addr) => format!(
                "mysql://{}:{}@127.0.0.1:{}/shop?sslMode=disabled{}",
                USER,
                PASSWORD,
                addr.port(),
                params
            ),
            Endpoint::Unix(path) => format!(
                "mysql://{}:{}@/shop?socket={}{}",
                USER,
                PASSWORD,
                path.display(),
                params
            ),
        }
    }

    /// Builder for a plaintext session as `app`/`secret` on database `shop`
    pub fn builder(&self) -> SessionConfigurationBuilder {
        let builder = SessionConfiguration::builder()
            .user(USER)
            .password(PASSWORD)
            .database("shop");
        match &self.endpoint {
            Endpoint::Tcp(addr) => builder
                .host("127.0.0.1")
                .port(addr.port())
                .ssl_mode(SslMode::Disabled),
            Endpoint::Unix(path) => builder.unix_socket(path),
        }
    }

    /// Connect with [`builder`](Self::builder) defaults
    pub async fn connect(&self) -> Connection {
        let config = self.builder().build().expect("valid config");
        Connection::connect(&config).await.expect("connect")
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every recorded client packet
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log").clone()
    }

    /// Commands only (no handshake or auth packets)
    pub fn commands(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_command).collect()
    }

    /// COM_QUERY texts in order
    pub fn queries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Query(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded packets matching `pred`
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    /// Wait until the log satisfies `pred`
    ///
    /// Needed for packets the server never answers (COM_STMT_CLOSE, COM_QUIT).
    pub async fn wait_for(&self, pred: impl Fn(&[Event]) -> bool) {
        for _ in 0..200 {
            if pred(&self.events()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached; events: {:?}", self.events());
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct PacketIo<S> {
    stream: S,
    seq: u8,
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketIo<S> {
    async fn read(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await?;
        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        self.seq = header[3].wrapping_add(1);
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(payload)
    }

    async fn write(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = payload.len() as u32;
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.extend_from_slice(&len.to_le_bytes()[..3]);
        frame.push(self.seq);
        frame.extend_from_slice(payload);
        self.seq = self.seq.wrapping_add(1);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await
    }
}

fn put_lenenc_int(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < 1 << 16 {
        out.push(0xFC);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value < 1 << 24 {
        out.push(0xFD);
        out.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        out.push(0xFE);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn put_lenenc_str(out: &mut Vec<u8>, s: &[u8]) {
    put_lenenc_int(out, s.len() as u64);
    out.extend_from_slice(s);
}

fn server_capabilities(script: &Script) -> u32 {
    let mut caps = capabilities::CLIENT_BASE | capabilities::CLIENT_CONNECT_WITH_DB;
    if script.advertise_ssl {
        caps |= capabilities::CLIENT_SSL;
    }
    if !script.deprecate_eof {
        caps &= !capabilities::CLIENT_DEPRECATE_EOF;
    }
    caps
}

fn greeting(script: &Script) -> Vec<u8> {
    let caps = server_capabilities(script);
    let mut p = vec![10];
    p.extend_from_slice(b"8.0.36-fake\0");
    p.extend_from_slice(&7u32.to_le_bytes());
    p.extend_from_slice(&SALT[..8]);
    p.push(0);
    p.extend_from_slice(&(caps as u16).to_le_bytes());
    p.push(UTF8MB4 as u8);
    p.extend_from_slice(&status::SERVER_STATUS_AUTOCOMMIT.to_le_bytes());
    p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0; 10]);
    p.extend_from_slice(&SALT[8..]);
    p.push(0);
    p.extend_from_slice(script.plugin.as_bytes());
    p.push(0);
    p
}

fn ok_packet(affected_rows: u64, last_insert_id: u64, flags: u16) -> Vec<u8> {
    let mut p = vec![0x00];
    put_lenenc_int(&mut p, affected_rows);
    put_lenenc_int(&mut p, last_insert_id);
    p.extend_from_slice(&(status::SERVER_STATUS_AUTOCOMMIT | flags).to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

fn err_packet(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xFF];
    p.extend_from_slice(&code.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(sql_state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

fn end_of_rows(deprecate_eof: bool, flags: u16) -> Vec<u8> {
    let flags = status::SERVER_STATUS_AUTOCOMMIT | flags;
    if deprecate_eof {
        let mut p = vec![0xFE, 0, 0];
        p.extend_from_slice(&flags.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    } else {
        let mut p = vec![0xFE];
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&flags.to_le_bytes());
        p
    }
}

fn column_definition(column: &Col) -> Vec<u8> {
    let mut p = Vec::new();
    put_lenenc_str(&mut p, b"def");
    put_lenenc_str(&mut p, b"shop");
    put_lenenc_str(&mut p, b"t");
    put_lenenc_str(&mut p, b"t");
    put_lenenc_str(&mut p, column.name.as_bytes());
    put_lenenc_str(&mut p, column.name.as_bytes());
    put_lenenc_int(&mut p, 0x0C);
    p.extend_from_slice(&column.charset.to_le_bytes());
    p.extend_from_slice(&255u32.to_le_bytes());
    p.push(column.column_type);
    p.extend_from_slice(&column.flags.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&[0, 0]);
    p
}

fn text_row(values: &[Option<String>]) -> Vec<u8> {
    let mut p = Vec::new();
    for value in values {
        match value {
            Some(v) => put_lenenc_str(&mut p, v.as_bytes()),
            None => p.push(0xFB),
        }
    }
    p
}

/// `YYYY-MM-DD[ HH:MM:SS]` → binary temporal value with its length byte
fn binary_temporal(out: &mut Vec<u8>, value: &str, with_time: bool) {
    let digits: Vec<u32> = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().unwrap_or(0))
        .collect();
    if digits.iter().all(|&d| d == 0) {
        out.push(0);
        return;
    }
    let part = |i: usize| digits.get(i).copied().unwrap_or(0);
    let has_time = with_time && (part(3) != 0 || part(4) != 0 || part(5) != 0);
    out.push(if has_time { 7 } else { 4 });
    out.extend_from_slice(&(part(0) as u16).to_le_bytes());
    out.push(part(1) as u8);
    out.push(part(2) as u8);
    if has_time {
        out.push(part(3) as u8);
        out.push(part(4) as u8);
        out.push(part(5) as u8);
    }
}

fn binary_row(columns: &[Col], values: &[Option<String>]) -> Vec<u8> {
    let mut p = vec![0x00];
    let mut bitmap = vec![0u8; (columns.len() + 7 + 2) / 8];
    let mut data = Vec::new();
    for (i, (column, value)) in columns.iter().zip(values).enumerate() {
        let value = match value {
            Some(v) => v,
            None => {
                let bit = i + 2;
                bitmap[bit / 8] |= 1 << (bit % 8);
                continue;
            }
        };
        let int = || value.parse::<i64>().unwrap_or(0);
        match column.column_type {
            column_types::TINY => data.push(int() as u8),
            column_types::SHORT | column_types::YEAR => {
                data.extend_from_slice(&(int() as u16).to_le_bytes())
            }
            column_types::LONG | column_types::INT24 => {
                data.extend_from_slice(&(int() as u32).to_le_bytes())
            }
            column_types::LONGLONG => data.extend_from_slice(&(int() as u64).to_le_bytes()),
            column_types::DOUBLE => data.extend_from_slice(
                &value.parse::<f64>().unwrap_or(0.0).to_bits().to_le_bytes(),
            ),
            column_types::DATE => binary_temporal(&mut data, value, false),
            column_types::DATETIME | column_types::TIMESTAMP => {
                binary_temporal(&mut data, value, true)
            }
            _ => put_lenenc_str(&mut data, value.as_bytes()),
        }
    }
    p.extend_from_slice(&bitmap);
    p.extend_from_slice(&data);
    p
}

struct HandshakeResponse {
    capabilities: u32,
    user: String,
    database: Option<String>,
    plugin: String,
    auth_response: Vec<u8>,
}

fn take_cstr(p: &[u8], pos: &mut usize) -> String {
    let rest = &p[(*pos).min(p.len())..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    *pos += end + 1;
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

fn parse_handshake_response(p: &[u8]) -> HandshakeResponse {
    let caps = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
    let mut pos = 32;
    let user = take_cstr(p, &mut pos);
    let auth_len = usize::from(p[pos]);
    pos += 1;
    let auth_response = p[pos..pos + auth_len].to_vec();
    pos += auth_len;
    let database = if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
        Some(take_cstr(p, &mut pos))
    } else {
        None
    };
    let plugin = if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        take_cstr(p, &mut pos)
    } else {
        String::new()
    };
    HandshakeResponse {
        capabilities: caps,
        user,
        database,
        plugin,
        auth_response,
    }
}

fn with_nul(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

async fn serve<S>(stream: S, script: Script, log: Log)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut io = PacketIo { stream, seq: 0 };
    let _ = session(&mut io, &script, &log).await;
}

async fn session<S>(io: &mut PacketIo<S>, script: &Script, log: &Log) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let record = |event: Event| log.lock().expect("event log").push(event);

    if let Some(delay) = script.greeting_delay {
        tokio::time::sleep(delay).await;
    }
    io.write(&greeting(script)).await?;

    let payload = io.read().await?;
    if payload.len() == 32 {
        // SSL request; this server cannot do TLS, so hang up
        record(Event::SslRequest);
        return Ok(());
    }
    let hs = parse_handshake_response(&payload);
    let client_caps = hs.capabilities;
    record(Event::Handshake {
        capabilities: hs.capabilities,
        user: hs.user.clone(),
        database: hs.database.clone(),
        plugin: hs.plugin.clone(),
        auth_response: hs.auth_response.clone(),
    });

    let mut plugin = script.plugin;
    let mut response = hs.auth_response;
    for &name in &script.switches {
        let mut switch = vec![0xFE];
        switch.extend_from_slice(&with_nul(name));
        switch.extend_from_slice(&SALT);
        switch.push(0);
        io.write(&switch).await?;
        response = io.read().await?;
        record(Event::AuthData(response.clone()));
        plugin = name;
    }

    let password = script.password.as_bytes();
    let accepted = match plugin {
        NATIVE => hs.user == USER && response == scramble_native(password, &SALT),
        CACHING_SHA2 => {
            if hs.user != USER || response != scramble_caching_sha2(password, &SALT) {
                false
            } else if script.full_auth {
                io.write(&[0x01, 0x04]).await?;
                let cleartext = io.read().await?;
                record(Event::AuthData(cleartext.clone()));
                cleartext == with_nul(script.password)
            } else {
                io.write(&[0x01, 0x03]).await?;
                true
            }
        }
        CLEAR => hs.user == USER && response == with_nul(script.password),
        _ => false,
    };
    if !accepted {
        let message = format!("Access denied for user '{}'@'localhost'", hs.user);
        io.write(&err_packet(1045, "28000", &message)).await?;
        return Ok(());
    }
    io.write(&ok_packet(0, 0, 0)).await?;

    let deprecate_eof = client_caps & capabilities::CLIENT_DEPRECATE_EOF != 0;
    let mut statements: HashMap<u32, String> = HashMap::new();
    let mut next_id = 1u32;

    loop {
        let payload = io.read().await?;
        let (&command, body) = match payload.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        match command {
            commands::COM_QUIT => {
                record(Event::Quit);
                return Ok(());
            }
            commands::COM_PING => {
                record(Event::Ping);
                io.write(&ok_packet(0, 0, 0)).await?;
            }
            commands::COM_QUERY => {
                let sql = String::from_utf8_lossy(body).into_owned();
                record(Event::Query(sql.clone()));
                let response = (script.responder)(&sql);
                if !respond(io, &response, deprecate_eof, false).await? {
                    return Ok(());
                }
            }
            commands::COM_STMT_PREPARE => {
                let sql = String::from_utf8_lossy(body).into_owned();
                record(Event::Prepare(sql.clone()));
                let columns = match (script.responder)(&sql) {
                    Response::Err { code, message } => {
                        io.write(&err_packet(code, "42S02", &message)).await?;
                        continue;
                    }
                    Response::Rows { columns, .. } => columns,
                    _ => Vec::new(),
                };
                let params = sql.matches('?').count();
                let id = next_id;
                next_id += 1;
                statements.insert(id, sql);

                let mut ok = vec![0x00];
                ok.extend_from_slice(&id.to_le_bytes());
                ok.extend_from_slice(&(columns.len() as u16).to_le_bytes());
                ok.extend_from_slice(&(params as u16).to_le_bytes());
                ok.push(0);
                ok.extend_from_slice(&0u16.to_le_bytes());
                io.write(&ok).await?;
                for _ in 0..params {
                    io.write(&column_definition(&col("?", column_types::VAR_STRING)))
                        .await?;
                }
                if params > 0 && !deprecate_eof {
                    io.write(&end_of_rows(false, 0)).await?;
                }
                for column in &columns {
                    io.write(&column_definition(column)).await?;
                }
                if !columns.is_empty() && !deprecate_eof {
                    io.write(&end_of_rows(false, 0)).await?;
                }
            }
            commands::COM_STMT_EXECUTE => {
                let id = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                record(Event::Execute(id));
                let response = match statements.get(&id) {
                    Some(sql) => (script.responder)(sql),
                    None => Response::err(1243, "Unknown prepared statement handler"),
                };
                if !respond(io, &response, deprecate_eof, true).await? {
                    return Ok(());
                }
            }
            commands::COM_STMT_CLOSE => {
                let id = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                record(Event::CloseStatement(id));
                statements.remove(&id);
            }
            _ => {
                io.write(&err_packet(1047, "08S01", "Unknown command")).await?;
            }
        }
    }
}

/// Write a scripted response; `Ok(false)` means hang up
///
/// `binary` selects the binary row format (COM_STMT_EXECUTE).
async fn respond<S>(
    io: &mut PacketIo<S>,
    response: &Response,
    deprecate_eof: bool,
    binary: bool,
) -> io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let parts: Vec<&Response> = match response {
        Response::Multi(parts) => parts.iter().collect(),
        single => vec![single],
    };
    for (i, part) in parts.iter().enumerate() {
        let more = if i + 1 < parts.len() {
            status::SERVER_MORE_RESULTS_EXISTS
        } else {
            0
        };
        match part {
            Response::Ok {
                affected_rows,
                last_insert_id,
            } => io.write(&ok_packet(*affected_rows, *last_insert_id, more)).await?,
            Response::Err { code, message } => {
                io.write(&err_packet(*code, "42S02", message)).await?;
                return Ok(true);
            }
            Response::Rows { columns, rows } => {
                let mut count = Vec::new();
                put_lenenc_int(&mut count, columns.len() as u64);
                io.write(&count).await?;
                for column in columns {
                    io.write(&column_definition(column)).await?;
                }
                if !deprecate_eof {
                    io.write(&end_of_rows(false, 0)).await?;
                }
                for row in rows {
                    let payload = if binary {
                        binary_row(columns, row)
                    } else {
                        text_row(row)
                    };
                    io.write(&payload).await?;
                }
                io.write(&end_of_rows(deprecate_eof, more)).await?;
            }
            Response::Multi(_) => unreachable!("nested multi-result responses"),
            Response::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(false);
            }
            Response::Disconnect => return Ok(false),
        }
    }
    Ok(true)
}
