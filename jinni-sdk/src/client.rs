//! Async IRC client for bots.
//!
//! This is the main entry point for SDK consumers. It manages the TCP
//! connection, IRC registration and keepalive, and emits [`Event`]s.
//! Supports both plaintext and TLS connections.
//!
//! ## Reconnection
//!
//! One connection ends with [`Event::Disconnected`]. [`run_with_reconnect`]
//! wraps that in a loop that doubles its delay up to 30 s and joins the
//! configured channels again after each registration.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};

use crate::event::Event;
use crate::irc::{self, Message};

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "jinni".to_string(),
            user: "jinni".to_string(),
            realname: "jinni".to_string(),
            tls: false,
            tls_insecure: false,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Privmsg { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// A handle that is not attached to any connection. Commands land on the
    /// returned receiver instead of the wire, which is how bot logic is
    /// exercised without a server.
    pub fn loopback(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        (Self { cmd_tx }, cmd_rx)
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Join(channel.to_string())).await?;
        Ok(())
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Quit(message.map(|s| s.to_string())))
            .await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }

    /// Request a nick change.
    pub async fn nick(&self, nick: &str) -> Result<()> {
        self.raw(&format!("NICK {nick}")).await
    }

    /// Join multiple channels at once.
    pub async fn join_many(&self, channels: &[&str]) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        // IRC allows comma-separated JOIN
        let joined = channels.join(",");
        self.raw(&format!("JOIN {joined}")).await
    }

    /// False once the connection task has gone away.
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

/// Dial the server and finish the TLS handshake if there is one.
///
/// Port 6697 implies TLS even when `tls` is false.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    let addr = &config.server_addr;
    let use_tls = config.tls || addr.ends_with(":6697");

    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect to {addr}"))?;
    tracing::debug!(%addr, tls = use_tls, "TCP connected");

    if use_tls {
        if config.tls_insecure {
            tracing::warn!(%addr, "Not verifying the server certificate");
        }
        let connector = TlsConnector::from(Arc::new(tls_config(config.tls_insecure)));
        let host = addr.rsplit_once(':').map_or(addr.as_str(), |(host, _)| host);
        let dns_name = ServerName::try_from(host.to_string())?;
        let tls_stream = connector
            .connect(dns_name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {addr}"))?;
        Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
    } else {
        Ok(EstablishedConnection::Plain(tcp))
    }
}

/// A dialled connection, not yet registered.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Register over `conn` in a spawned task. Events arrive on the returned
/// receiver, starting with [`Event::Connected`].
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let handle = ClientHandle { cmd_tx };

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

/// Dial and register in one go. A failed dial shows up as
/// [`Event::Disconnected`] rather than an `Err`.
pub fn connect(config: ConnectConfig) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let handle = ClientHandle { cmd_tx };

    tokio::spawn(async move {
        if let Err(e) = run_client(config, event_tx.clone(), cmd_rx).await {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

async fn run_client(
    config: ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    cmd_rx: mpsc::Receiver<Command>,
) -> Result<()> {
    let conn = establish_connection(&config).await?;
    let _ = event_tx.send(Event::Connected).await;
    match conn {
        EstablishedConnection::Plain(tcp) => {
            let (reader, writer) = tokio::io::split(tcp);
            run_irc(BufReader::new(reader), writer, &config, event_tx, cmd_rx).await
        }
        EstablishedConnection::Tls(tls) => {
            let (reader, writer) = tokio::io::split(*tls);
            run_irc(BufReader::new(reader), writer, &config, event_tx, cmd_rx).await
        }
    }
}

fn tls_config(insecure: bool) -> rustls::ClientConfig {
    #[cfg(feature = "ring")]
    let _ = rustls::crypto::ring::default_provider().install_default();
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let builder = rustls::ClientConfig::builder();
    if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    } else {
        let roots =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    }
}

/// `tls_insecure`: any certificate is accepted. Signatures are still
/// checked against the schemes of the installed provider.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        match rustls::crypto::CryptoProvider::get_default() {
            Some(provider) => provider.signature_verification_algorithms.supported_schemes(),
            None => Vec::new(),
        }
    }
}

/// Nick-in-use fallbacks tried before registration completes.
const MAX_NICK_TRIES: u32 = 5;

async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let nick = Message::new("NICK", vec![config.nick.clone()]);
    let user = Message::new(
        "USER",
        vec![
            config.user.clone(),
            "0".to_string(),
            "*".to_string(),
            config.realname.clone(),
        ],
    );
    writer.write_all(format!("{nick}\r\n{user}\r\n").as_bytes()).await?;
    writer.flush().await?;

    let mut registered = false;
    let mut nick_tries: u32 = 0;
    let mut pending_commands: Vec<Command> = Vec::new();

    let mut line_buf: Vec<u8> = Vec::new();
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = Duration::from_secs(60);
    let ping_timeout = Duration::from_secs(120);
    let mut next_ping = last_activity + ping_interval;

    loop {
        tokio::select! {
            result = reader.read_until(b'\n', &mut line_buf) => {
                let n = result?;
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                }
                last_activity = tokio::time::Instant::now();
                next_ping = last_activity + ping_interval;

                // Servers relay whatever bytes clients send; don't die on latin-1.
                let line = String::from_utf8_lossy(&line_buf).into_owned();
                line_buf.clear();
                tracing::trace!(line = line.trim_end(), "<<");

                let Some(msg) = Message::parse(&line) else { continue };
                match msg.command.as_str() {
                    // ERR_NICKNAMEINUSE
                    "433" if !registered => {
                        nick_tries = nick_tries.saturating_add(1);
                        if nick_tries <= MAX_NICK_TRIES {
                            let alt = format!("{}{}", config.nick, nick_tries);
                            tracing::warn!(nick = %config.nick, %alt, "Nick in use, trying fallback");
                            writer.write_all(format!("NICK {alt}\r\n").as_bytes()).await?;
                            writer.flush().await?;
                        } else {
                            let _ = event_tx.send(Event::Disconnected { reason: "Nick in use".to_string() }).await;
                            break;
                        }
                    }
                    "001" => {
                        let nick = msg.params.first().cloned().unwrap_or_default();
                        registered = true;
                        let _ = event_tx.send(Event::Registered { nick }).await;
                        // Flush any commands that were queued before registration
                        for cmd in pending_commands.drain(..) {
                            execute_command(&mut writer, cmd).await?;
                        }
                    }
                    "PING" => {
                        let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                        writer.write_all(format!("PONG :{token}\r\n").as_bytes()).await?;
                        writer.flush().await?;
                    }
                    "PONG" => {}
                    "353" => {
                        if msg.params.len() >= 4 {
                            let channel = msg.params[2].clone();
                            let nicks = msg.params[3].split_whitespace().map(|s| s.to_string()).collect();
                            let _ = event_tx.send(Event::Names { channel, nicks }).await;
                        }
                    }
                    "JOIN" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.nick().unwrap_or("").to_string();
                        let _ = event_tx.send(Event::Joined { channel, nick }).await;
                    }
                    "PART" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.nick().unwrap_or("").to_string();
                        let _ = event_tx.send(Event::Parted { channel, nick }).await;
                    }
                    "NICK" => {
                        let old_nick = msg.nick().unwrap_or("").to_string();
                        let new_nick = msg.params.first().cloned().unwrap_or_default();
                        if !old_nick.is_empty() && !new_nick.is_empty() {
                            let _ = event_tx.send(Event::NickChanged { old_nick, new_nick }).await;
                        }
                    }
                    "PRIVMSG" | "NOTICE" => {
                        if msg.params.len() >= 2 {
                            let target = msg.params[0].clone();
                            let text = msg.params[1].clone();
                            if !msg.from_user() {
                                // Server NOTICE (no hostmask in prefix)
                                let _ = event_tx.send(Event::ServerNotice { text }).await;
                            } else {
                                let from = msg.nick().unwrap_or("").to_string();
                                let event = if msg.command == "PRIVMSG" {
                                    Event::Message { from, target, text }
                                } else {
                                    Event::Notice { from, target, text }
                                };
                                let _ = event_tx.send(event).await;
                            }
                        }
                    }
                    "ERROR" => {
                        let text = msg.params.join(" ");
                        let _ = event_tx.send(Event::ServerNotice { text: text.clone() }).await;
                        let _ = event_tx.send(Event::Disconnected { reason: text }).await;
                        break;
                    }
                    _ => {
                        if let Ok(num) = msg.command.parse::<u16>() {
                            // Skip our nick (param[0]) and join the rest
                            let text = if msg.params.len() > 1 {
                                msg.params[1..].join(" ")
                            } else {
                                msg.params.join(" ")
                            };
                            if num == 372 {
                                let text = text.strip_prefix("- ").unwrap_or(&text).to_string();
                                let _ = event_tx.send(Event::Motd { text }).await;
                            } else if (400..600).contains(&num) {
                                let _ = event_tx.send(Event::ServerNotice { text }).await;
                            }
                        }
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    // Every handle dropped; nobody can talk to us any more.
                    writer.write_all(b"QUIT\r\n").await?;
                    writer.flush().await?;
                    break;
                };
                if registered || matches!(cmd, Command::Quit(_)) {
                    let quitting = matches!(cmd, Command::Quit(_));
                    execute_command(&mut writer, cmd).await?;
                    if quitting && !registered {
                        break;
                    }
                } else {
                    // Queue until registered; commands wait silently
                    pending_commands.push(cmd);
                }
            }
            // Periodic client-to-server PING and timeout detection
            _ = tokio::time::sleep_until(next_ping) => {
                if last_activity.elapsed() > ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                writer.write_all(b"PING :keepalive\r\n").await?;
                writer.flush().await?;
                next_ping = tokio::time::Instant::now() + ping_interval;
            }
        }
    }

    Ok(())
}

/// Execute a single IRC command on the wire.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    let line = match cmd {
        Command::Join(channel) => Message::new("JOIN", vec![irc::sanitize(&channel)]).to_string(),
        Command::Privmsg { target, text } => {
            Message::new("PRIVMSG", vec![irc::sanitize(&target), irc::sanitize(&text)]).to_string()
        }
        Command::Raw(line) => irc::sanitize(&line),
        Command::Quit(Some(m)) => Message::new("QUIT", vec![irc::sanitize(&m)]).to_string(),
        Command::Quit(None) => Message::new("QUIT", Vec::new()).to_string(),
    };
    tracing::trace!(%line, ">>");
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Backoff and rejoin settings for [`run_with_reconnect`].
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    /// Ceiling for the backoff.
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Joined with a single JOIN after every 001.
    pub channels: Vec<String>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            channels: Vec::new(),
        }
    }
}

impl ReconnectConfig {
    /// Grow `delay` by the backoff factor plus up to a quarter of jitter.
    fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.mul_f64(self.backoff_factor) + clock_jitter(delay / 4);
        grown.min(self.max_delay)
    }
}

/// Stay connected forever, feeding every event to `handler`.
///
/// Failed connects and dropped sessions both back off before the next
/// attempt; a session that got as far as connecting resets the backoff.
/// Errors returned by `handler` are logged and otherwise ignored.
pub async fn run_with_reconnect<F>(
    config: ConnectConfig,
    reconnect: ReconnectConfig,
    handler: F,
) -> Result<()>
where
    F: Fn(ClientHandle, Event) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
{
    let mut delay = reconnect.initial_delay;
    let mut failures = 0u32;

    loop {
        match establish_connection(&config).await {
            Ok(conn) => {
                failures = 0;
                delay = reconnect.initial_delay;
                let (handle, events) = connect_with_stream(conn, config.clone());
                run_session(handle, events, &reconnect.channels, &handler).await;
                tracing::info!(delay_secs = delay.as_secs(), "Session over, reconnecting");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    error = %e,
                    attempt = failures,
                    delay_secs = delay.as_secs(),
                    "Connection failed, retrying"
                );
            }
        }
        tokio::time::sleep(delay).await;
        delay = reconnect.next_delay(delay);
    }
}

/// Pump one connection's events until it reports a disconnect.
async fn run_session<F>(
    handle: ClientHandle,
    mut events: mpsc::Receiver<Event>,
    channels: &[String],
    handler: &F,
) where
    F: Fn(ClientHandle, Event) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>,
{
    while let Some(event) = events.recv().await {
        // Servers drop JOINs sent before 001.
        if matches!(event, Event::Registered { .. }) {
            let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
            if let Err(e) = handle.join_many(&channels).await {
                tracing::warn!(error = %e, "Failed to join channels");
            }
        }
        let last = matches!(event, Event::Disconnected { .. });
        if let Err(e) = handler(handle.clone(), event).await {
            tracing::error!(error = %e, "Handler error");
        }
        if last {
            return;
        }
    }
}

/// Up to `max` of jitter taken from the sub-second clock.
fn clock_jitter(max: Duration) -> Duration {
    let max_nanos = max.as_nanos() as u64;
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    Duration::from_nanos(nanos % max_nanos)
}
