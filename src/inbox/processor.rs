use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::message::Mailbox;
use crate::registry::{DecodedEvent, EventTypeRegistry};
use crate::relay::{Deliver, Relay};
use crate::store::MessageStore;

use super::consumer::Consumer;

/// Adapts a [`Consumer`] as the terminal operation of the inbox loop.
pub struct Consuming<C>(C);

#[async_trait]
impl<C: Consumer> Deliver for Consuming<C> {
    const MAILBOX: Mailbox = Mailbox::Inbox;

    async fn ready(&self) -> bool {
        self.0.ready().await
    }

    async fn deliver(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        self.0.consume(event).await
    }
}

/// Polls the inbox table and consumes pending messages in arrival order.
pub type InboxProcessor<C> = Relay<Consuming<C>>;

impl<C: Consumer> Relay<Consuming<C>> {
    pub fn new(store: Arc<dyn MessageStore>, registry: Arc<EventTypeRegistry>, consumer: C) -> Self {
        Relay::from_parts(store, registry, Consuming(consumer))
    }

    pub fn consumer(&self) -> &C {
        &self.delivery().0
    }
}
