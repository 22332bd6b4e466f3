//! C7 Subscription & Publish Loop.
//!
//! The publish loop keeps at least one `Publish` request in flight for as
//! long as any subscription is alive, self-refilling immediately after
//! each response (success or recoverable failure) so the server always has
//! a request to answer notifications against. Grounded on
//! `_call_publish_callback` in the retrieved `async_ua_client.py`: `BadTimeout`
//! re-issues, `BadNoSubscription` ends the loop quietly, and a callback
//! panic is caught and logged rather than tearing down the subscription.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use opcua_core::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};
use opcua_core::messages::ResponseHeader;
use opcua_core::StatusCode;

use crate::session::services::{CREATE_SUBSCRIPTION, DELETE_SUBSCRIPTIONS, PUBLISH};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

impl BinaryEncodable for SubscriptionAcknowledgement {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.subscription_id);
        enc.write_u32(self.sequence_number);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishRequestParams {
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

impl BinaryEncodable for PublishRequestParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.subscription_acknowledgements.len() as i32);
        for ack in &self.subscription_acknowledgements {
            ack.encode(enc);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub notification_data: Vec<u8>,
}

impl BinaryDecodable for NotificationMessage {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let sequence_number = dec.read_u32()?;
        let len = dec.read_i32()?;
        let notification_data = if len < 0 {
            Vec::new()
        } else {
            dec.read_bytes(len as usize)?.to_vec()
        };
        Ok(NotificationMessage {
            sequence_number,
            notification_data,
        })
    }
}

pub struct PublishResponse {
    pub header: ResponseHeader,
    pub subscription_id: u32,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
}

impl BinaryDecodable for PublishResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = ResponseHeader::decode(dec)?;
        let subscription_id = dec.read_u32()?;
        let available = dec.read_i32()?;
        for _ in 0..available.max(0) {
            let _ = dec.read_u32()?;
        }
        let more_notifications = dec.read_u8()? != 0;
        let notification_message = NotificationMessage::decode(dec)?;
        Ok(PublishResponse {
            header,
            subscription_id,
            more_notifications,
            notification_message,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateSubscriptionParams {
    pub requested_publishing_interval_ms: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
}

impl BinaryEncodable for CreateSubscriptionParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.requested_publishing_interval_ms as u32);
        enc.write_u32(self.requested_lifetime_count);
        enc.write_u32(self.requested_max_keep_alive_count);
    }
}

pub struct CreateSubscriptionResponse {
    pub header: ResponseHeader,
    pub subscription_id: u32,
}

impl BinaryDecodable for CreateSubscriptionResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(CreateSubscriptionResponse {
            header: ResponseHeader::decode(dec)?,
            subscription_id: dec.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteSubscriptionsParams {
    pub subscription_ids: Vec<u32>,
}

impl BinaryEncodable for DeleteSubscriptionsParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.subscription_ids.len() as i32);
        for id in &self.subscription_ids {
            enc.write_u32(*id);
        }
    }
}

pub struct DeleteSubscriptionsResponse {
    pub header: ResponseHeader,
}

impl BinaryDecodable for DeleteSubscriptionsResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(DeleteSubscriptionsResponse {
            header: ResponseHeader::decode(dec)?,
        })
    }
}

type NotificationCallback = Box<dyn Fn(NotificationMessage) + Send + Sync>;

/// Owns the publish loop for one session: callback registry, the live
/// subscription count the loop keys its "should keep publishing" test on,
/// and a [`Notify`] that wakes the loop when the count goes from zero to
/// positive.
pub struct SubscriptionManager {
    session: Arc<Session>,
    callbacks: Mutex<HashMap<u32, NotificationCallback>>,
    live_count: AtomicUsize,
    woken: Notify,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionManager {
    pub fn new(session: Arc<Session>) -> Arc<Self> {
        let manager = Arc::new(SubscriptionManager {
            session,
            callbacks: Mutex::new(HashMap::new()),
            live_count: AtomicUsize::new(0),
            woken: Notify::new(),
            loop_task: Mutex::new(None),
        });
        let handle = Self::spawn_publish_loop(manager.clone());
        *manager.loop_task.lock() = Some(handle);
        manager
    }

    pub async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
        callback: impl Fn(NotificationMessage) + Send + Sync + 'static,
    ) -> Result<u32, StatusCode> {
        let response: CreateSubscriptionResponse =
            self.session.call_service_default(CREATE_SUBSCRIPTION, params).await?;
        crate::session::process_service_result(&response.header)?;
        self.callbacks
            .lock()
            .insert(response.subscription_id, Box::new(callback));
        self.live_count.fetch_add(1, Ordering::SeqCst);
        self.woken.notify_one();
        Ok(response.subscription_id)
    }

    /// Unregisters every given id regardless of its per-id delete status —
    /// once the caller asks to stop receiving notifications, we stop
    /// feeding its callback even if the server reports trouble deleting it.
    pub async fn delete_subscriptions(&self, subscription_ids: Vec<u32>) -> Result<(), StatusCode> {
        let count = subscription_ids.len();
        let result = self
            .session
            .call_service_default::<_, DeleteSubscriptionsResponse>(
                DELETE_SUBSCRIPTIONS,
                DeleteSubscriptionsParams { subscription_ids: subscription_ids.clone() },
            )
            .await;

        let mut callbacks = self.callbacks.lock();
        for id in &subscription_ids {
            callbacks.remove(id);
        }
        drop(callbacks);
        self.live_count.fetch_sub(count.min(self.live_count.load(Ordering::SeqCst)), Ordering::SeqCst);

        match result {
            Ok(response) => crate::session::process_service_result(&response.header),
            Err(e) => Err(e),
        }
    }

    fn spawn_publish_loop(manager: Arc<SubscriptionManager>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending_acks: Vec<SubscriptionAcknowledgement> = Vec::new();
            loop {
                if manager.live_count.load(Ordering::SeqCst) == 0 {
                    manager.woken.notified().await;
                    continue;
                }

                let params = PublishRequestParams {
                    subscription_acknowledgements: std::mem::take(&mut pending_acks),
                };
                // No client-side timeout: the server is expected to hold
                // the request open until a notification or keep-alive is due.
                match manager.session.call_service::<_, PublishResponse>(PUBLISH, 0, params).await {
                    Ok(response) => {
                        if let Err(status) = crate::session::process_service_result(&response.header) {
                            if status == StatusCode::BadNoSubscription {
                                debug!("no subscriptions remain on the server, ending publish loop");
                                return;
                            }
                            warn!("publish response carried a bad service result: {status}");
                            continue;
                        }
                        pending_acks.push(SubscriptionAcknowledgement {
                            subscription_id: response.subscription_id,
                            sequence_number: response.notification_message.sequence_number,
                        });
                        let invoked = {
                            let callbacks = manager.callbacks.lock();
                            callbacks.get(&response.subscription_id).map(|cb| {
                                let notification = response.notification_message.clone_for_dispatch();
                                AssertUnwindSafe(|| cb(notification))
                            })
                        };
                        if let Some(run) = invoked {
                            if let Err(payload) = std::panic::catch_unwind(run) {
                                error!("subscription callback panicked: {}", panic_message(&payload));
                            }
                        } else {
                            debug!("notification for unknown subscription {}", response.subscription_id);
                        }
                    }
                    Err(StatusCode::BadTimeout) => continue,
                    Err(StatusCode::BadDecodingError) => continue,
                    Err(StatusCode::BadNoSubscription) => {
                        debug!("no subscriptions remain on the server, ending publish loop");
                        return;
                    }
                    Err(status) => {
                        error!("publish loop terminating on unrecoverable error: {status}");
                        return;
                    }
                }
            }
        })
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.loop_task.lock().take() {
            handle.abort();
        }
    }
}

impl NotificationMessage {
    fn clone_for_dispatch(&self) -> NotificationMessage {
        NotificationMessage {
            sequence_number: self.sequence_number,
            notification_data: self.notification_data.clone(),
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_ack_round_trips_through_encoder() {
        let ack = SubscriptionAcknowledgement {
            subscription_id: 7,
            sequence_number: 42,
        };
        let mut enc = Encoder::new();
        ack.encode(&mut enc);
        let bytes = enc.into_vec();
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn notification_message_round_trips() {
        let msg = NotificationMessage {
            sequence_number: 5,
            notification_data: vec![9, 9, 9],
        };
        let mut enc = Encoder::new();
        enc.write_u32(msg.sequence_number);
        enc.write_i32(msg.notification_data.len() as i32);
        enc.write_bytes(&msg.notification_data);
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        let back = NotificationMessage::decode(&mut dec).unwrap();
        assert_eq!(back.sequence_number, 5);
        assert_eq!(back.notification_data, vec![9, 9, 9]);
    }
}
