use log::{debug, error, trace, warn};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use opcua_core::binary::BinaryEncodable;
use opcua_core::comms::message_chunk::MessageType;
use opcua_core::comms::tcp_codec::TcpCodec;
use opcua_core::comms::tcp_types::{AcknowledgeMessage, HelloMessage};
use opcua_core::comms::url::hostname_port_from_url;
use opcua_core::config::TransportConfig;
use opcua_core::StatusCode;

use futures::StreamExt;

use super::{OutgoingMessage, Transport, TransportPollResult};

const DEFAULT_OPC_UA_PORT: u16 = 4840;

pub struct TcpTransport {
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    outgoing: mpsc::Receiver<OutgoingMessage>,
    should_close: bool,
}

pub struct TcpConnector;

impl TcpConnector {
    /// Perform the `Hello`/`Acknowledge` handshake over a freshly connected
    /// socket and return a ready-to-poll transport plus the negotiated
    /// buffer sizes from the server's acknowledgement.
    pub async fn connect(
        endpoint_url: &str,
        config: &TransportConfig,
        outgoing: mpsc::Receiver<OutgoingMessage>,
    ) -> Result<(TcpTransport, AcknowledgeMessage), StatusCode> {
        let (host, port) = hostname_port_from_url(endpoint_url, DEFAULT_OPC_UA_PORT)?;
        let addr = format!("{host}:{port}");
        debug!("connecting to {addr} ({endpoint_url})");

        let socket = TcpStream::connect(&addr).await.map_err(|e| {
            error!("could not connect to {addr}: {e}");
            StatusCode::BadCommunicationError
        })?;
        let (reader, mut writer) = tokio::io::split(socket);

        let hello = HelloMessage::new(
            endpoint_url,
            config.send_buffer_size,
            config.receive_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        let mut framed_read = FramedRead::new(reader, TcpCodec::new(config.max_message_size as usize));

        writer
            .write_all(&opcua_core::comms::message_chunk::encode_frame(
                MessageType::Hello,
                &hello.encode_to_vec(),
            ))
            .await
            .map_err(|e| {
                error!("failed to send hello: {e}");
                StatusCode::BadCommunicationError
            })?;

        let ack = match framed_read.next().await {
            Some(Ok(frame)) if frame.message_type == MessageType::Acknowledge => {
                let mut dec = opcua_core::binary::Decoder::new(&frame.payload);
                <AcknowledgeMessage as opcua_core::binary::BinaryDecodable>::decode(&mut dec)
                    .map_err(|_| StatusCode::BadDecodingError)?
            }
            Some(Ok(frame)) if frame.message_type == MessageType::Error => {
                error!("server rejected hello with an Error frame");
                let _ = frame;
                return Err(StatusCode::BadCommunicationError);
            }
            other => {
                error!("expected Acknowledge, got {:?}", other.is_some());
                return Err(StatusCode::BadConnectionClosed);
            }
        };
        trace!("received acknowledge: {ack:?}");

        Ok((
            TcpTransport {
                read: framed_read,
                write: writer,
                outgoing,
                should_close: false,
            },
            ack,
        ))
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn poll(&mut self) -> TransportPollResult {
        if self.should_close {
            return TransportPollResult::Closed(StatusCode::Good);
        }
        tokio::select! {
            outgoing = self.outgoing.recv() => {
                let Some(outgoing) = outgoing else {
                    return TransportPollResult::Closed(StatusCode::Good);
                };
                // All chunks of one logical message are written with a single
                // write_all call so they can never interleave with another
                // message's chunks on the wire.
                let mut buf = Vec::new();
                for frame in &outgoing.frames {
                    buf.extend_from_slice(frame);
                }
                if let Err(e) = self.write.write_all(&buf).await {
                    error!("write failed: {e}");
                    return TransportPollResult::Closed(StatusCode::BadCommunicationError);
                }
                TransportPollResult::OutgoingSent
            }
            incoming = self.read.next() => {
                match incoming {
                    Some(Ok(frame)) => TransportPollResult::Incoming(frame),
                    Some(Err(e)) => {
                        warn!("read error: {e}");
                        TransportPollResult::Closed(StatusCode::BadCommunicationError)
                    }
                    None => TransportPollResult::Closed(StatusCode::BadConnectionClosed),
                }
            }
        }
    }

    async fn close(&mut self) {
        self.should_close = true;
        let _ = self.write.shutdown().await;
    }
}
