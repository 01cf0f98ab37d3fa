use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::message::Mailbox;
use crate::registry::{DecodedEvent, EventTypeRegistry};
use crate::relay::{Deliver, Relay};
use crate::store::MessageStore;

use super::publisher::Publisher;

/// Adapts a [`Publisher`] as the terminal operation of the outbox loop.
pub struct Publishing<P>(P);

#[async_trait]
impl<P: Publisher> Deliver for Publishing<P> {
    const MAILBOX: Mailbox = Mailbox::Outbox;

    async fn ready(&self) -> bool {
        self.0.ready().await
    }

    async fn deliver(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        self.0.publish(event).await
    }
}

/// Polls the outbox table and publishes pending events oldest first.
///
/// Builder methods and [`spawn`](Relay::spawn) come from [`Relay`].
pub type OutboxDispatcher<P> = Relay<Publishing<P>>;

impl<P: Publisher> Relay<Publishing<P>> {
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<EventTypeRegistry>,
        publisher: P,
    ) -> Self {
        Relay::from_parts(store, registry, Publishing(publisher))
    }

    pub fn publisher(&self) -> &P {
        &self.delivery().0
    }
}
