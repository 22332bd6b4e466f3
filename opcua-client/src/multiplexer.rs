//! C4 Request Multiplexer: request id / request handle bookkeeping, the
//! pending-response map, and the `check_answer` service-fault peek.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;

use opcua_core::binary::{BinaryDecodable, Decoder};
use opcua_core::messages::ResponseHeader;
use opcua_core::StatusCode;

/// Leading 4-byte tag our opaque service bodies use to signal "this is a
/// `ServiceFault`", standing in for the real UA type-id-based dispatch the
/// external codec would perform.
pub const SERVICE_FAULT_TAG: u32 = 0xFFFF_FFFF;

struct PendingEntry {
    sink: oneshot::Sender<Result<Vec<u8>, StatusCode>>,
}

/// Assigns request ids/handles, tracks in-flight requests, and dispatches
/// inbound response bodies back to their caller.
pub struct Multiplexer {
    pending: Mutex<HashMap<u32, PendingEntry>>,
    next_request_id: AtomicU32,
    next_request_handle: AtomicU32,
    hello_sink: Mutex<Option<oneshot::Sender<Result<Vec<u8>, StatusCode>>>>,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Multiplexer {
            pending: Mutex::new(HashMap::new()),
            // request_id 0 is reserved for the Hello/Ack handshake sink.
            next_request_id: AtomicU32::new(1),
            next_request_handle: AtomicU32::new(1),
            hello_sink: Mutex::new(None),
        }
    }
}

impl Multiplexer {
    pub fn new() -> Self {
        Multiplexer::default()
    }

    fn next_request_id(&self) -> u32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate the next request handle, with a caller-supplied closure
    /// whose failure rolls the counter back by one so user-visible handles
    /// stay gap-free for requests that were actually sent.
    pub fn next_request_handle_or_rollback<T, E>(
        &self,
        f: impl FnOnce(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let handle = self.next_request_handle.fetch_add(1, Ordering::SeqCst);
        match f(handle) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.next_request_handle.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Register a pending sink for a freshly allocated `request_id` and
    /// return it alongside a receiver the caller awaits (with the given
    /// timeout, if any).
    pub fn register(&self) -> (u32, oneshot::Receiver<Result<Vec<u8>, StatusCode>>) {
        let request_id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, PendingEntry { sink: tx });
        (request_id, rx)
    }

    /// Register the well-known `request_id == 0` sink used for Hello/Ack.
    pub fn register_hello(&self) -> oneshot::Receiver<Result<Vec<u8>, StatusCode>> {
        let (tx, rx) = oneshot::channel();
        *self.hello_sink.lock() = Some(tx);
        rx
    }

    /// Remove a pending entry without completing it — used on cancellation,
    /// so a subsequent late response is dropped silently.
    pub fn cancel(&self, request_id: u32) {
        self.pending.lock().remove(&request_id);
    }

    /// Await a previously registered response, honoring `timeout_ms` (`0`
    /// meaning no local timeout, used for `Publish`).
    pub async fn await_response(
        &self,
        request_id: u32,
        rx: oneshot::Receiver<Result<Vec<u8>, StatusCode>>,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, StatusCode> {
        let result = if timeout_ms == 0 {
            rx.await
        } else {
            match timeout(Duration::from_millis(timeout_ms as u64), rx).await {
                Ok(r) => r,
                Err(_) => {
                    self.cancel(request_id);
                    return Err(StatusCode::BadTimeout);
                }
            }
        };
        match result {
            Ok(body) => body,
            // Sender dropped without completing: the connection tore down.
            Err(_) => Err(StatusCode::BadConnectionClosed),
        }
    }

    /// Dispatch an inbound `(request_id, body)` pair delivered by the
    /// transport/secure-channel layer.
    pub fn dispatch(&self, request_id: u32, body: Result<Vec<u8>, StatusCode>) {
        if request_id == 0 {
            if let Some(sink) = self.hello_sink.lock().take() {
                let _ = sink.send(body);
            } else {
                warn!("received an unsolicited request_id=0 frame with no registered sink");
            }
            return;
        }
        let entry = self.pending.lock().remove(&request_id);
        match entry {
            Some(entry) => {
                let _ = entry.sink.send(body);
            }
            None => {
                debug!("dropping response for unknown or already-completed request_id={request_id}");
            }
        }
    }

    /// Fail every pending sink (including the hello sink) with `status`,
    /// e.g. because the transport closed.
    pub fn fail_all(&self, status: StatusCode) {
        let mut pending = self.pending.lock();
        for (_, entry) in pending.drain() {
            let _ = entry.sink.send(Err(status));
        }
        if let Some(sink) = self.hello_sink.lock().take() {
            let _ = sink.send(Err(status));
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Peek the leading type tag of a response body; surface a `ServiceFault`'s
/// `ServiceResult` as an error, otherwise pass the body through unchanged
/// for typed decoding by the caller.
pub fn check_answer(body: Vec<u8>) -> Result<Vec<u8>, StatusCode> {
    if body.len() < 4 {
        return Err(StatusCode::BadDecodingError);
    }
    let tag = u32::from_le_bytes(body[0..4].try_into().unwrap());
    if tag != SERVICE_FAULT_TAG {
        return Ok(body);
    }
    let mut dec = Decoder::new(&body[4..]);
    match ResponseHeader::decode(&mut dec) {
        Ok(header) => Err(header.service_result),
        Err(_) => Err(StatusCode::BadDecodingError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_requests_route_to_the_right_caller() {
        let mux = Multiplexer::new();
        let (id_a, rx_a) = mux.register();
        let (id_b, rx_b) = mux.register();
        let (id_c, rx_c) = mux.register();
        assert_eq!((id_a, id_b, id_c), (1, 2, 3));

        // Server replies out of order: c, a, b.
        mux.dispatch(id_c, Ok(b"c".to_vec()));
        mux.dispatch(id_a, Ok(b"a".to_vec()));
        mux.dispatch(id_b, Ok(b"b".to_vec()));

        assert_eq!(rx_a.await.unwrap().unwrap(), b"a".to_vec());
        assert_eq!(rx_b.await.unwrap().unwrap(), b"b".to_vec());
        assert_eq!(rx_c.await.unwrap().unwrap(), b"c".to_vec());
    }

    #[tokio::test]
    async fn timeout_removes_the_pending_entry() {
        let mux = Multiplexer::new();
        let (id, rx) = mux.register();
        assert_eq!(mux.pending_count(), 1);
        let result = mux.await_response(id, rx, 1).await;
        assert_eq!(result, Err(StatusCode::BadTimeout));
        assert_eq!(mux.pending_count(), 0);
    }

    #[test]
    fn request_handle_rolls_back_on_encode_failure() {
        let mux = Multiplexer::new();
        let first: Result<u32, &str> = mux.next_request_handle_or_rollback(|h| Ok(h));
        assert_eq!(first.unwrap(), 1);
        let failed: Result<u32, &str> = mux.next_request_handle_or_rollback(|_h| Err("encode failed"));
        assert!(failed.is_err());
        let next: Result<u32, &str> = mux.next_request_handle_or_rollback(|h| Ok(h));
        assert_eq!(next.unwrap(), 2);
    }

    #[test]
    fn check_answer_surfaces_service_fault_result() {
        let mut body = SERVICE_FAULT_TAG.to_le_bytes().to_vec();
        let header = ResponseHeader {
            timestamp: chrono::Utc::now(),
            request_handle: 1,
            service_result: StatusCode::BadSessionClosed,
        };
        body.extend_from_slice(&opcua_core::binary::BinaryEncodable::encode_to_vec(&header));
        assert_eq!(check_answer(body), Err(StatusCode::BadSessionClosed));
    }
}
