//! Event routing contract.
//!
//! An [`EventFilter`] extracts the handler an event is addressed to, if any.
//! Dispatchers use it to deliver an event to the listeners registered on that
//! handler; a filter returning `None` means the event only reaches global
//! listeners.

use crate::registry::EntityKind;
use entsync_core::{EntityId, SimTick};
use std::fmt;

/// Maps an event of type `E` to the handler of type `H` it targets.
pub struct EventFilter<E, H> {
    handler: fn(&E) -> Option<H>,
}

impl<E, H> EventFilter<E, H> {
    /// Filter resolving the handler with `getter`.
    pub const fn from(getter: fn(&E) -> Option<H>) -> Self {
        Self { handler: getter }
    }

    /// Filter that never targets a handler.
    pub fn all() -> Self {
        Self { handler: |_| None }
    }

    /// Handler `event` is addressed to.
    pub fn handler(&self, event: &E) -> Option<H> {
        (self.handler)(event)
    }
}

impl<E, H> Clone for EventFilter<E, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, H> Copy for EventFilter<E, H> {}

impl<E, H> fmt::Debug for EventFilter<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter").finish_non_exhaustive()
    }
}

/// Events raised about a single entity.
pub trait EntityEvent {
    /// Entity the event concerns.
    fn entity(&self) -> EntityId;
}

/// Filter routing entity events to the entity they concern.
pub fn entity_filter<E: EntityEvent>() -> EventFilter<E, EntityId> {
    EventFilter::from(|event: &E| Some(event.entity()))
}

/// Attribute changes of one entity were published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataChanged {
    /// Changed entity.
    pub entity: EntityId,
    /// Its type.
    pub kind: EntityKind,
    /// Indices that changed, ascending.
    pub indices: Vec<u8>,
    /// Tick the change was published on.
    pub tick: SimTick,
}

impl EntityEvent for MetadataChanged {
    fn entity(&self) -> EntityId {
        self.entity
    }
}
