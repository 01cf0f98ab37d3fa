use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::registry::{DecodedEvent, EventPayload};

/// Applies a decoded inbox event to local state.
///
/// Consumers must tolerate seeing the same logical event twice if the
/// producer republished it under a new id; the inbox only deduplicates on
/// transport id.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn ready(&self) -> bool {
        true
    }

    async fn consume(&self, event: &DecodedEvent) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<C: Consumer + ?Sized> Consumer for Arc<C> {
    async fn ready(&self) -> bool {
        (**self).ready().await
    }

    async fn consume(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        (**self).consume(event).await
    }
}

type Handler = Box<dyn Fn(&DecodedEvent) -> Result<(), DeliveryError> + Send + Sync>;

/// Routes events to typed handlers by type tag.
///
/// ```ignore
/// let consumer = HandlerConsumer::new()
///     .on::<OrderCompleted, _>(|event| {
///         shipments.schedule(&event.order_id);
///         Ok(())
///     })
///     .on::<OrderCancelled, _>(|event| refunds.issue(&event.order_id));
/// ```
///
/// An event with no handler fails with [`DeliveryError::NoHandler`].
#[derive(Default)]
pub struct HandlerConsumer {
    handlers: HashMap<String, Handler>,
}

impl HandlerConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `T`, replacing any previous one.
    pub fn on<T, F>(mut self, handler: F) -> Self
    where
        T: EventPayload,
        F: Fn(&T) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            T::TYPE_TAG.to_string(),
            Box::new(move |event: &DecodedEvent| -> Result<(), DeliveryError> {
                let typed = event.downcast_ref::<T>().ok_or_else(|| {
                    DeliveryError::Rejected(format!(
                        "`{}` does not decode to {}",
                        event.type_tag,
                        std::any::type_name::<T>()
                    ))
                })?;
                handler(typed)
            }),
        );
        self
    }

    /// Register a handler that receives the untyped event, with its
    /// message id and metadata.
    pub fn on_event<F>(mut self, type_tag: &str, handler: F) -> Self
    where
        F: Fn(&DecodedEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        self.handlers.insert(type_tag.to_string(), Box::new(handler));
        self
    }

    /// Handled type tags, sorted.
    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }

    pub fn handle(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        let handler = self
            .handlers
            .get(&event.type_tag)
            .ok_or_else(|| DeliveryError::NoHandler(event.type_tag.clone()))?;
        handler(event)
    }
}

#[async_trait]
impl Consumer for HandlerConsumer {
    async fn consume(&self, event: &DecodedEvent) -> Result<(), DeliveryError> {
        self.handle(event)
    }
}
