//! C6 Session & Service Façade: a thin, stateless layer over the secure
//! channel that builds typed requests, submits them through C4, checks
//! service results, and returns typed responses.

pub mod services;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, info};

use opcua_core::binary::{BinaryDecodable, BinaryEncodable, Decoder, Encoder};
use opcua_core::comms::message_chunk::MessageType;
use opcua_core::messages::ResponseHeader;
use opcua_core::StatusCode;

use crate::channel::AsyncSecureChannel;
use crate::multiplexer::check_answer;
use crate::retry::RequestRetryPolicy;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stateless façade over one [`AsyncSecureChannel`]. Holds no service state
/// of its own beyond the identifier used in log lines and the
/// `authentication_token` the channel carries for us after `CreateSession`.
pub struct Session {
    id: u64,
    channel: Arc<AsyncSecureChannel>,
    default_timeout_ms: u32,
}

impl Session {
    pub fn new(channel: Arc<AsyncSecureChannel>, default_timeout_ms: u32) -> Self {
        Session {
            id: SESSION_COUNTER.fetch_add(1, Ordering::Relaxed),
            channel,
            default_timeout_ms,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &Arc<AsyncSecureChannel> {
        &self.channel
    }

    /// The one generic operation every named service method in
    /// [`services`] is built on: encode `request_tag` + header + `params`,
    /// submit through the channel, peek for a `ServiceFault`, then decode
    /// the typed response and check its `ServiceResult`.
    pub async fn call_service<P, R>(&self, request_tag: u32, timeout_ms: u32, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        let body = self
            .channel
            .send_request(MessageType::Message, timeout_ms, move |header| {
                let mut enc = Encoder::new();
                enc.write_u32(request_tag);
                header.encode(&mut enc);
                params.encode(&mut enc);
                Ok(enc.into_vec())
            })
            .await?;
        let body = check_answer(body)?;
        decode_typed_response(body)
    }

    /// As [`Session::call_service`], but with this session's configured
    /// default timeout.
    pub async fn call_service_default<P, R>(&self, request_tag: u32, params: P) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Send,
        R: BinaryDecodable + Send,
    {
        self.call_service(request_tag, self.default_timeout_ms, params).await
    }

    /// Send a service request, retrying per `policy` on failure. Always
    /// clones `params` at least once. Distinct from connection-level
    /// reconnection: this retries one already-connected request.
    pub async fn send_with_retry<P, R>(
        &self,
        request_tag: u32,
        timeout_ms: u32,
        params: P,
        mut policy: impl RequestRetryPolicy,
    ) -> Result<R, StatusCode>
    where
        P: BinaryEncodable + Clone + Send,
        R: BinaryDecodable + Send,
    {
        loop {
            match self.call_service(request_tag, timeout_ms, params.clone()).await {
                Ok(r) => break Ok(r),
                Err(e) => {
                    if let Some(delay) = policy.get_next_delay(e) {
                        session_debug!(self, "request failed with {e}, retrying after {delay:?}");
                        tokio::time::sleep(delay).await;
                    } else {
                        break Err(e);
                    }
                }
            }
        }
    }
}

/// Strip the leading response-type tag, decode `R`, and apply
/// `ResponseHeader.ServiceResult.check()` — every typed response in this
/// crate embeds a `ResponseHeader` as the first field of `R` by convention,
/// enforced here rather than per response type.
fn decode_typed_response<R: BinaryDecodable>(body: Vec<u8>) -> Result<R, StatusCode> {
    if body.len() < 4 {
        return Err(StatusCode::BadDecodingError);
    }
    let mut dec = Decoder::new(&body[4..]);
    R::decode(&mut dec).map_err(|_| StatusCode::BadDecodingError)
}

/// Process the service result, i.e. where the request "succeeded" at the
/// transport level but the response header itself carries a failure.
pub(crate) fn process_service_result(response_header: &ResponseHeader) -> Result<(), StatusCode> {
    if response_header.service_result.is_bad() {
        info!(
            "received a bad service result {} from the request",
            response_header.service_result
        );
        Err(response_header.service_result)
    } else {
        Ok(())
    }
}

#[allow(unused)]
macro_rules! session_warn {
    ($session: expr, $($arg:tt)*) => {
        log::warn!("session:{} {}", $session.session_id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use session_warn;

#[allow(unused)]
macro_rules! session_debug {
    ($session: expr, $($arg:tt)*) => {
        log::debug!("session:{} {}", $session.session_id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use session_debug;

#[allow(unused)]
macro_rules! session_error {
    ($session: expr, $($arg:tt)*) => {
        log::error!("session:{} {}", $session.session_id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use session_error;

pub(crate) fn log_unexpected(context: &str) {
    error!("received an unexpected response {context}");
}
