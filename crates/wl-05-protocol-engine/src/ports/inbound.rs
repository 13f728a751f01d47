//! # Driving Ports (Inbound API)

use crate::domain::DecodedMessage;
use async_trait::async_trait;

/// Accepts raw frames from a transport.
///
/// Implemented by [`crate::service::SessionProtocolEngine`]. Failures are
/// logged and the frame dropped; nothing is reported back to the transport.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Process one frame.
    async fn handle_frame(&self, frame: Vec<u8>);
}

/// Receives application messages of one type.
///
/// Called inline from `receive`; long work belongs on a spawned task.
pub trait MessageHandler: Send + Sync {
    /// Handle one decoded message.
    fn handle(&self, message: &DecodedMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&DecodedMessage) + Send + Sync,
{
    fn handle(&self, message: &DecodedMessage) {
        self(message)
    }
}

/// Invoked once for every application message delivered, whatever its
/// type. The settlement hook for external collaborators.
pub trait DeliveryHook: Send + Sync {
    /// A message was decoded and dispatched.
    fn on_delivered(&self, message: &DecodedMessage);
}

impl<F> DeliveryHook for F
where
    F: Fn(&DecodedMessage) + Send + Sync,
{
    fn on_delivered(&self, message: &DecodedMessage) {
        self(message)
    }
}
