//! Gateway session client: handshake, frame routing, close classification.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::SplitStream};
use gateway_core::{CommandHandler, Interaction, UsageStats};
use gateway_rest::{CommandDeclaration, RestClient};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tokio::{
    sync::{Mutex, mpsc},
    time,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::{
    SessionConfig, SessionError,
    heartbeat::{ConnectionSignal, HeartbeatDriver, HeartbeatState, HeartbeatTiming},
    protocol::{
        self, Envelope, Frame, GatewayEvent, HelloPayload, IdentifyPayload, OpCode, Presence,
        RESUMABLE_CLIENT_CLOSE, ResumePayload,
    },
    registry::CommandRegistry,
    writer::{FrameWriter, GatewayWriter, WsStream},
};

/// What the caller should do once a connection has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect with a fresh identify.
    Restart,
    /// Shutdown was requested; stop reconnecting.
    Terminate,
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// The peer sent a close frame.
    Closed(Option<u16>),
    /// Transport error or stream ended without a close frame.
    Lost,
    ReconnectRequested,
    InvalidSession { resumable: bool },
    DeadPeer,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decision {
    outcome: ConnectOutcome,
    forget_gateway: bool,
}

fn decide(end: ConnectionEnd, has_resume: bool) -> Decision {
    let resumable = match end {
        ConnectionEnd::Shutdown => {
            return Decision {
                outcome: ConnectOutcome::Terminate,
                forget_gateway: false,
            };
        }
        ConnectionEnd::Closed(Some(code)) if protocol::is_unrecoverable(code) => {
            return Decision {
                outcome: ConnectOutcome::Restart,
                forget_gateway: true,
            };
        }
        ConnectionEnd::InvalidSession { resumable } => resumable,
        ConnectionEnd::Closed(_)
        | ConnectionEnd::Lost
        | ConnectionEnd::ReconnectRequested
        | ConnectionEnd::DeadPeer => true,
    };

    Decision {
        outcome: if resumable && has_resume {
            ConnectOutcome::Resume
        } else {
            ConnectOutcome::Restart
        },
        forget_gateway: false,
    }
}

#[derive(Debug, Clone)]
struct ResumeState {
    gateway_url: String,
    session_id: String,
}

#[derive(Debug, Default)]
struct SessionState {
    gateway_url: Option<String>,
    resume: Option<ResumeState>,
}

/// Per-connection resources, dropped when the connection ends.
struct Connection {
    base_url: String,
    writer: Arc<GatewayWriter>,
    signals: mpsc::UnboundedSender<ConnectionSignal>,
    heartbeat: Option<HeartbeatDriver>,
}

/// A single logical session with the gateway.
///
/// Register handlers first, then call [`connect`](Self::connect) in a loop,
/// feeding back the returned outcome (see [`crate::run_session`]).
pub struct SessionClient {
    config: SessionConfig,
    rest: RestClient,
    registry: CommandRegistry,
    stats: Option<Arc<UsageStats>>,
    heartbeat: Arc<HeartbeatState>,
    state: Mutex<SessionState>,
    active: Mutex<()>,
    shutdown: CancellationToken,
}

impl SessionClient {
    /// Create a client. Nothing is opened until `connect`.
    #[must_use]
    pub fn new(config: SessionConfig, rest: RestClient) -> Self {
        Self {
            config,
            rest,
            registry: CommandRegistry::new(),
            stats: None,
            heartbeat: Arc::new(HeartbeatState::new()),
            state: Mutex::new(SessionState::default()),
            active: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Count every dispatched command in `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<UsageStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Use an externally owned shutdown token.
    #[must_use]
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Register a handler for a command or component identifier.
    ///
    /// With `publish`, commands that carry a type are declared remotely
    /// first. The handler is registered whether or not that succeeds.
    pub async fn register(
        &mut self,
        declaration: CommandDeclaration,
        handler: Arc<dyn CommandHandler>,
        publish: bool,
    ) {
        if publish && declaration.kind.is_some() {
            match self.rest.declare_command(&declaration).await {
                Ok(()) => tracing::info!(command = %declaration.name, "Published command"),
                Err(e) => {
                    tracing::warn!(command = %declaration.name, "Failed to publish command: {e}");
                }
            }
        }
        self.registry.insert(declaration.name, handler);
    }

    #[must_use]
    pub const fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Token that ends the session cleanly when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a clean, non-restarting shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Last sequence number seen.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.heartbeat.sequence()
    }

    /// Session id captured from the ready event, if resumable.
    pub async fn session_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .resume
            .as_ref()
            .map(|r| r.session_id.clone())
    }

    /// Open one connection and run it until it ends.
    ///
    /// Calls are serialized; a second caller waits for the first to finish.
    ///
    /// # Errors
    /// Returns `Discovery` if no gateway URL is known and the lookup fails.
    /// Every other failure is reported through the returned outcome.
    pub async fn connect(&self, resume_requested: bool) -> Result<ConnectOutcome, SessionError> {
        let _active = self.active.lock().await;
        if self.shutdown.is_cancelled() {
            return Ok(ConnectOutcome::Terminate);
        }

        let (base_url, resume) = self.resolve_target(resume_requested).await?;
        if resume.is_none() {
            self.heartbeat.set_sequence(0);
        }
        self.heartbeat.reset_connection();

        let url = protocol::versioned_url(&base_url);
        tracing::info!(url = %url, resume = resume.is_some(), "Connecting to gateway");

        let opened = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => None,
            opened = time::timeout(self.config.connect_timeout, connect_async(url.as_str())) => {
                Some(opened)
            }
        };

        let end = match opened {
            None => {
                tracing::info!("Shutdown requested while connecting");
                ConnectionEnd::Shutdown
            }
            Some(Ok(Ok((stream, _)))) => {
                self.run_connection(stream, base_url, resume.as_ref()).await
            }
            Some(Ok(Err(e))) => {
                tracing::warn!("Failed to open gateway connection: {e}");
                ConnectionEnd::Lost
            }
            Some(Err(_)) => {
                tracing::warn!(
                    timeout_ms = self.config.connect_timeout.as_millis(),
                    "Timed out opening gateway connection"
                );
                ConnectionEnd::Lost
            }
        };

        Ok(self.conclude(end).await)
    }

    async fn resolve_target(
        &self,
        resume_requested: bool,
    ) -> Result<(String, Option<ResumeState>), SessionError> {
        let mut state = self.state.lock().await;

        if resume_requested {
            if let Some(resume) = state.resume.clone() {
                return Ok((resume.gateway_url.clone(), Some(resume)));
            }
            tracing::info!("No session to resume, identifying instead");
        }
        state.resume = None;

        if let Some(url) = &state.gateway_url {
            return Ok((url.clone(), None));
        }

        let url = match &self.config.gateway_url {
            Some(url) => url.clone(),
            None => {
                let info = self
                    .rest
                    .discover_gateway()
                    .await
                    .map_err(SessionError::Discovery)?;
                tracing::info!(url = %info.url, shards = ?info.shards, "Discovered gateway");
                info.url
            }
        };
        state.gateway_url = Some(url.clone());
        Ok((url, None))
    }

    async fn run_connection(
        &self,
        stream: WsStream,
        base_url: String,
        resume: Option<&ResumeState>,
    ) -> ConnectionEnd {
        let (sink, mut stream) = stream.split();
        let (signals, mut signals_rx) = mpsc::unbounded_channel();
        let mut conn = Connection {
            base_url,
            writer: Arc::new(GatewayWriter::new(sink)),
            signals,
            heartbeat: None,
        };

        let end = match self.handshake(conn.writer.as_ref(), resume).await {
            Ok(()) => {
                self.read_loop(&mut stream, &mut signals_rx, &mut conn)
                    .await
            }
            Err(e) => {
                tracing::warn!("Failed to send handshake: {e}");
                ConnectionEnd::Lost
            }
        };

        // The driver must be gone before the writer is closed or dropped.
        if let Some(driver) = conn.heartbeat.take() {
            driver.stop().await;
        }

        let closed = match end {
            ConnectionEnd::Shutdown => conn.writer.close(1000, "shutdown").await,
            ConnectionEnd::DeadPeer => {
                conn.writer
                    .close(RESUMABLE_CLIENT_CLOSE, "heartbeat not acknowledged")
                    .await
            }
            ConnectionEnd::ReconnectRequested | ConnectionEnd::InvalidSession { .. } => {
                conn.writer.close(RESUMABLE_CLIENT_CLOSE, "reconnecting").await
            }
            ConnectionEnd::Closed(_) | ConnectionEnd::Lost => {
                conn.writer.finish().await;
                Ok(())
            }
        };
        if let Err(e) = closed {
            tracing::debug!("Failed to close gateway connection: {e}");
        }

        end
    }

    async fn handshake(
        &self,
        writer: &GatewayWriter,
        resume: Option<&ResumeState>,
    ) -> Result<(), SessionError> {
        let token = self.config.token.expose_secret();
        let text = match resume {
            Some(resume) => {
                let seq = self.heartbeat.sequence();
                tracing::info!(session_id = %resume.session_id, seq, "Resuming session");
                Frame::new(
                    OpCode::Resume,
                    ResumePayload {
                        token,
                        session_id: &resume.session_id,
                        seq,
                    },
                )
                .to_text()?
            }
            None => {
                tracing::info!(shard = ?self.config.shard, "Identifying");
                Frame::new(
                    OpCode::Identify,
                    IdentifyPayload {
                        token,
                        properties: &self.config.properties,
                        presence: Presence::default(),
                        shard: self.config.shard,
                        intents: self.config.intents,
                    },
                )
                .to_text()?
            }
        };
        writer.send_text(text).await
    }

    async fn read_loop(
        &self,
        stream: &mut SplitStream<WsStream>,
        signals: &mut mpsc::UnboundedReceiver<ConnectionSignal>,
        conn: &mut Connection,
    ) -> ConnectionEnd {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return ConnectionEnd::Shutdown,
                Some(signal) = signals.recv() => {
                    return match signal {
                        ConnectionSignal::DeadPeer => ConnectionEnd::DeadPeer,
                        ConnectionSignal::WriteFailed => ConnectionEnd::Lost,
                    };
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.handle_frame(text.as_str(), conn).await {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        let reason = frame.as_ref().map_or("", |f| f.reason.as_str());
                        tracing::warn!(code = ?code, reason, "Gateway closed the connection");
                        return ConnectionEnd::Closed(code);
                    }
                    Some(Ok(Message::Binary(_))) => tracing::debug!("Ignoring binary frame"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Gateway connection error: {e}");
                        return ConnectionEnd::Lost;
                    }
                    None => {
                        tracing::warn!("Gateway stream ended without a close frame");
                        return ConnectionEnd::Lost;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str, conn: &mut Connection) -> Option<ConnectionEnd> {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Dropping frame: {e}");
                return None;
            }
        };

        if let Some(seq) = envelope.s {
            self.heartbeat.set_sequence(seq);
        }

        match envelope.opcode() {
            Some(OpCode::Dispatch) => {
                self.handle_dispatch(envelope, conn).await;
                None
            }
            Some(OpCode::Heartbeat) => {
                tracing::debug!("Gateway requested an immediate heartbeat");
                self.heartbeat.request_immediate();
                None
            }
            Some(OpCode::Reconnect) => {
                tracing::info!("Gateway requested a reconnect");
                Some(ConnectionEnd::ReconnectRequested)
            }
            Some(OpCode::InvalidSession) => {
                let resumable = envelope.d.as_bool().unwrap_or(false);
                tracing::warn!(resumable, "Gateway invalidated the session");
                Some(ConnectionEnd::InvalidSession { resumable })
            }
            Some(OpCode::Hello) => {
                self.start_heartbeat(&envelope.d, conn);
                None
            }
            Some(OpCode::HeartbeatAck) => {
                tracing::trace!("Heartbeat acknowledged");
                self.heartbeat.acknowledge();
                None
            }
            Some(OpCode::Identify | OpCode::Resume) | None => {
                tracing::debug!(op = envelope.op, "Ignoring frame with unhandled opcode");
                None
            }
        }
    }

    fn start_heartbeat(&self, d: &Value, conn: &mut Connection) {
        if conn.heartbeat.is_some() {
            tracing::debug!("Ignoring repeated hello");
            return;
        }
        let hello = match HelloPayload::deserialize(d) {
            Ok(hello) => hello,
            Err(e) => {
                let e = SessionError::ProtocolDesync(format!("hello: {e}"));
                tracing::warn!("Dropping frame: {e}");
                return;
            }
        };

        tracing::info!(interval_ms = hello.heartbeat_interval, "Starting heartbeat");
        let interval = Duration::from_millis(hello.heartbeat_interval);
        let writer: Arc<dyn FrameWriter> = conn.writer.clone();
        conn.heartbeat = Some(HeartbeatDriver::spawn(
            writer,
            Arc::clone(&self.heartbeat),
            HeartbeatTiming::jittered(interval, self.config.heartbeat_poll),
            conn.signals.clone(),
        ));
    }

    async fn handle_dispatch(&self, envelope: Envelope, conn: &Connection) {
        let Some(name) = envelope.t.as_deref() else {
            tracing::debug!("Dispatch without an event name");
            return;
        };

        let event = match GatewayEvent::parse(name, envelope.d) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping frame: {e}");
                return;
            }
        };

        match event {
            GatewayEvent::Ready(ready) => {
                let gateway_url = ready
                    .resume_gateway_url
                    .unwrap_or_else(|| conn.base_url.clone());
                tracing::info!(session_id = %ready.session_id, "Session ready");
                self.state.lock().await.resume = Some(ResumeState {
                    gateway_url,
                    session_id: ready.session_id,
                });
            }
            GatewayEvent::Resumed => tracing::info!("Session resumed"),
            GatewayEvent::InteractionCreate(interaction) => {
                self.dispatch_interaction(*interaction).await;
            }
            GatewayEvent::Other(name) => tracing::trace!(event = %name, "Ignoring dispatch"),
        }
    }

    async fn dispatch_interaction(&self, interaction: Interaction) {
        let Some(identifier) = interaction.command_key().map(|k| k.as_str().to_string()) else {
            tracing::debug!(id = %interaction.id, "Interaction without a command identifier");
            return;
        };
        let Some(handler) = self.registry.get(&identifier) else {
            tracing::debug!(command = %identifier, "No handler registered");
            return;
        };

        if let Some(stats) = &self.stats {
            stats.record(&identifier);
        }
        tracing::debug!(command = %identifier, "Dispatching interaction");
        handler.handle(interaction).await;
    }

    async fn conclude(&self, end: ConnectionEnd) -> ConnectOutcome {
        let mut state = self.state.lock().await;
        let decision = decide(end, state.resume.is_some());

        if decision.outcome == ConnectOutcome::Restart {
            state.resume = None;
        }
        if decision.forget_gateway {
            state.gateway_url = None;
        }

        tracing::info!(end = ?end, outcome = ?decision.outcome, "Gateway connection ended");
        decision.outcome
    }
}
