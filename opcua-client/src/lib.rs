//! OPC UA client: transport, secure channel lifecycle, request multiplexer,
//! session service façade and subscription/publish loop.

pub mod channel;
pub mod multiplexer;
pub mod retry;
pub mod session;
pub mod subscriptions;
pub mod transport;

pub use channel::{AsyncSecureChannel, ChannelConfig, ChannelLifecycleState};
pub use session::Session;
