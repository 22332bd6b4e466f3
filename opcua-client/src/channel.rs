//! C5 Channel Lifecycle: Hello/Acknowledge, OpenSecureChannel (and renewal),
//! CloseSecureChannel, tying together C2 (secure channel framing), C3
//! (transport) and C4 (request multiplexer) behind one handle callers send
//! requests through.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opcua_core::binary::{BinaryDecodable, BinaryEncodable, Decoder};
use opcua_core::comms::chunker::{Chunker, ReassembledMessage};
use opcua_core::comms::message_chunk::MessageType;
use opcua_core::comms::secure_channel::SecureChannel;
use opcua_core::config::TransportConfig;
use opcua_core::messages::{
    CloseSecureChannelRequest, OpenSecureChannelRequest, OpenSecureChannelResponse, RequestHeader,
    SecurityTokenRequestType,
};
use opcua_core::security_policy::SecurityPolicy;
use opcua_core::StatusCode;

use crate::multiplexer::{check_answer, Multiplexer};
use crate::transport::tcp::{TcpConnector, TcpTransport};
use crate::transport::{OutgoingMessage, Transport, TransportPollResult};

/// Revised secure channel lifetime requested on `Issue`/`Renew`. The server
/// may revise it downward; whatever it returns drives renewal scheduling.
const REQUESTED_CHANNEL_LIFETIME_MS: u32 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLifecycleState {
    Disconnected,
    TcpOpen,
    HelloDone,
    Secured,
    Closing,
}

#[derive(Clone)]
pub struct ChannelConfig {
    pub endpoint_url: String,
    pub transport: TransportConfig,
    pub security_policy: Arc<dyn SecurityPolicy>,
    pub default_timeout_ms: u32,
}

/// The owner of the secure channel for one connection: holds the C2 state,
/// the C4 multiplexer, and a handle to the outgoing-frame channel the
/// receive task's transport reads from.
pub struct AsyncSecureChannel {
    config: ChannelConfig,
    secure_channel: Arc<Mutex<SecureChannel>>,
    chunker: Arc<Mutex<Chunker>>,
    multiplexer: Arc<Multiplexer>,
    outgoing: ArcSwapOption<mpsc::Sender<OutgoingMessage>>,
    state: Mutex<ChannelLifecycleState>,
    send_buffer_size: AtomicU32,
    auth_token: ArcSwap<Vec<u8>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSecureChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let security_policy = config.security_policy.clone();
        AsyncSecureChannel {
            config,
            secure_channel: Arc::new(Mutex::new(SecureChannel::new(security_policy))),
            chunker: Arc::new(Mutex::new(Chunker::new())),
            multiplexer: Arc::new(Multiplexer::new()),
            outgoing: ArcSwapOption::from(None),
            state: Mutex::new(ChannelLifecycleState::Disconnected),
            send_buffer_size: AtomicU32::new(0),
            auth_token: ArcSwap::from_pointee(Vec::new()),
            receive_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelLifecycleState {
        *self.state.lock()
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    /// Store the `authentication_token` from a successful `CreateSession`
    /// response so every subsequent request header carries it.
    pub fn set_auth_token(&self, token: Vec<u8>) {
        self.auth_token.store(Arc::new(token));
    }

    fn auth_token(&self) -> Vec<u8> {
        (**self.auth_token.load()).clone()
    }

    /// Hello/Acknowledge, spawn the receive task, then OpenSecureChannel(Issue).
    pub async fn connect(&self) -> Result<(), StatusCode> {
        *self.state.lock() = ChannelLifecycleState::TcpOpen;
        let (tx, rx) = mpsc::channel(1024);
        let (transport, ack) = TcpConnector::connect(&self.config.endpoint_url, &self.config.transport, rx).await?;
        let (effective_send, _effective_recv) = self
            .config
            .transport
            .negotiate(ack.receive_buffer_size, ack.send_buffer_size);
        self.send_buffer_size.store(effective_send, Ordering::Relaxed);
        self.outgoing.store(Some(Arc::new(tx)));
        *self.state.lock() = ChannelLifecycleState::HelloDone;

        let handle = Self::spawn_receive_task(
            transport,
            self.secure_channel.clone(),
            self.chunker.clone(),
            self.multiplexer.clone(),
        );
        *self.receive_task.lock() = Some(handle);

        self.open_secure_channel(SecurityTokenRequestType::Issue).await?;
        Ok(())
    }

    /// Issue a new token (`Issue`) or renew the current one (`Renew`).
    /// Renewal commits the new `(channel_id, token_id)` atomically, while
    /// the previous token remains valid on inbound chunks during the grace
    /// window (see [`SecureChannel::set_channel_params`]).
    pub async fn open_secure_channel(&self, request_type: SecurityTokenRequestType) -> Result<(), StatusCode> {
        let body = self.multiplexer.next_request_handle_or_rollback(|handle| {
            let header = RequestHeader {
                authentication_token: self.auth_token(),
                timestamp: chrono::Utc::now(),
                request_handle: handle,
                return_diagnostics: 0,
                audit_entry_id: String::new(),
                timeout_hint_ms: self.config.default_timeout_ms,
            };
            let request = OpenSecureChannelRequest {
                header,
                client_protocol_version: 0,
                request_type,
                client_nonce: Vec::new(),
                requested_lifetime_ms: REQUESTED_CHANNEL_LIFETIME_MS,
            };
            Ok::<_, StatusCode>(request.encode_to_vec())
        })?;

        let (request_id, rx) = self.multiplexer.register();
        let frames = self.encode_chunks(MessageType::OpenSecureChannel, request_id, &body)?;
        self.send_frames(OutgoingMessage { request_id, frames }).await?;

        let body = self
            .multiplexer
            .await_response(request_id, rx, self.config.default_timeout_ms)
            .await?;
        let body = check_answer(body)?;
        let mut dec = Decoder::new(&body);
        let response =
            OpenSecureChannelResponse::decode(&mut dec).map_err(|_| StatusCode::BadDecodingError)?;

        {
            let mut sc = self.secure_channel.lock();
            sc.set_channel_params(
                response.channel_id,
                response.token_id,
                response.revised_lifetime_ms,
                response.server_nonce,
            );
        }
        *self.state.lock() = ChannelLifecycleState::Secured;
        debug!(
            "secure channel {} {:?}: token {}, revised lifetime {}ms",
            response.channel_id, request_type, response.token_id, response.revised_lifetime_ms
        );
        Ok(())
    }

    /// Fire `CloseSecureChannelRequest` (no response is expected) and tear
    /// down local state immediately after the frame is written.
    pub async fn close(&self) -> Result<(), StatusCode> {
        *self.state.lock() = ChannelLifecycleState::Closing;
        let body = self.multiplexer.next_request_handle_or_rollback(|handle| {
            let header = RequestHeader::new(handle, 0);
            Ok::<_, StatusCode>(CloseSecureChannelRequest { header }.encode_to_vec())
        })?;
        let (request_id, _rx) = self.multiplexer.register();
        // No response is expected for CloseSecureChannel; cancel our own
        // sink so a late frame for this id is dropped silently.
        self.multiplexer.cancel(request_id);

        let frames = self.encode_chunks(MessageType::CloseSecureChannel, request_id, &body)?;
        let send_result = self.send_frames(OutgoingMessage { request_id, frames }).await;

        self.multiplexer.fail_all(StatusCode::BadConnectionClosed);
        self.secure_channel.lock().clear();
        *self.state.lock() = ChannelLifecycleState::Disconnected;
        if let Some(handle) = self.receive_task.lock().take() {
            handle.abort();
        }
        send_result
    }

    /// Submit a generic, already header-aware request body built by
    /// `build_body` (which receives the freshly allocated, rollback-safe
    /// `RequestHeader`) and await its typed response body.
    pub async fn send_request(
        &self,
        message_type: MessageType,
        timeout_ms: u32,
        build_body: impl FnOnce(RequestHeader) -> Result<Vec<u8>, StatusCode>,
    ) -> Result<Vec<u8>, StatusCode> {
        let body = self.multiplexer.next_request_handle_or_rollback(|handle| {
            let header = RequestHeader {
                authentication_token: self.auth_token(),
                timestamp: chrono::Utc::now(),
                request_handle: handle,
                return_diagnostics: 0,
                audit_entry_id: String::new(),
                timeout_hint_ms: timeout_ms,
            };
            build_body(header)
        })?;
        let (request_id, rx) = self.multiplexer.register();
        let frames = self.encode_chunks(message_type, request_id, &body)?;
        self.send_frames(OutgoingMessage { request_id, frames }).await?;
        self.multiplexer.await_response(request_id, rx, timeout_ms).await
    }

    fn encode_chunks(
        &self,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> Result<Vec<Vec<u8>>, StatusCode> {
        let send_buffer_size = self.send_buffer_size.load(Ordering::Relaxed).max(8192) as usize;
        let mut sc = self.secure_channel.lock();
        Chunker::encode(&mut sc, message_type, request_id, body, send_buffer_size)
            .map_err(|e| e.status())
    }

    async fn send_frames(&self, outgoing: OutgoingMessage) -> Result<(), StatusCode> {
        let tx = self
            .outgoing
            .load_full()
            .ok_or(StatusCode::BadConnectionClosed)?;
        tx.send(outgoing)
            .await
            .map_err(|_| StatusCode::BadConnectionClosed)
    }

    fn spawn_receive_task(
        mut transport: TcpTransport,
        secure_channel: Arc<Mutex<SecureChannel>>,
        chunker: Arc<Mutex<Chunker>>,
        multiplexer: Arc<Multiplexer>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match transport.poll().await {
                    TransportPollResult::OutgoingSent => continue,
                    TransportPollResult::Incoming(frame) => match frame.message_type {
                        MessageType::Hello | MessageType::Acknowledge => {
                            warn!("unexpected {:?} frame received after the handshake", frame.message_type);
                        }
                        MessageType::Error => {
                            multiplexer.dispatch(0, Err(StatusCode::BadCommunicationError));
                        }
                        MessageType::OpenSecureChannel
                        | MessageType::Message
                        | MessageType::CloseSecureChannel => {
                            let decoded = {
                                let mut sc = secure_channel.lock();
                                let mut ck = chunker.lock();
                                ck.decode(&mut sc, frame.chunk_flag, frame.payload)
                            };
                            match decoded {
                                Ok(ReassembledMessage::Complete { request_id, body }) => {
                                    multiplexer.dispatch(request_id, Ok(body));
                                }
                                Ok(ReassembledMessage::Pending) => {}
                                Ok(ReassembledMessage::Aborted { request_id }) => {
                                    multiplexer.dispatch(request_id, Err(StatusCode::BadCommunicationError));
                                }
                                Err(e) => {
                                    error!("fatal protocol error, tearing down connection: {e}");
                                    multiplexer.fail_all(e.status());
                                    secure_channel.lock().clear();
                                    transport.close().await;
                                    return;
                                }
                            }
                        }
                    },
                    TransportPollResult::Closed(status) => {
                        debug!("transport closed: {status}");
                        multiplexer.fail_all(status);
                        secure_channel.lock().clear();
                        return;
                    }
                }
            }
        })
    }
}
