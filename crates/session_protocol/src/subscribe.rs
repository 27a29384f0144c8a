use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;
use crate::payload::TurnRequest;

/// Callbacks invoked by the host subscription channel.
///
/// Delivery is in send order. Implementations must not block: the
/// channel drives these synchronously from its own receive path.
pub trait SubscriptionObserver: Send + Sync + 'static {
    fn on_chunk(&self, chunk: Value);
    fn on_error(&self, error: TransportError);
    fn on_complete(&self);
}

/// Handle to one open subscription.
pub trait SubscriptionHandle: Send + 'static {
    /// Stops delivery. Idempotent; safe after the stream already closed.
    fn unsubscribe(&mut self);
}

/// The host-supplied primitive that opens one event stream per turn.
pub trait TurnSubscriber: Send + Sync + 'static {
    fn subscribe(
        &self,
        request: &TurnRequest,
        observer: Arc<dyn SubscriptionObserver>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError>;

    /// Reconnection is not part of this protocol design.
    fn reconnect(&self) -> Option<Box<dyn SubscriptionHandle>> {
        None
    }
}
