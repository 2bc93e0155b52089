//! Live entity instances and their command inbox.
//!
//! Every entity owns an unbounded FIFO inbox. Deferred side effects, attribute
//! writes handed off by other execution contexts and arbitrary closures all go
//! through it and are applied by [`LiveEntity::run_inbox`], so entity state is
//! only ever mutated by its owner.

use crate::registry::{EntityKind, SchemaRegistry};
use crate::views::TypedView;
use entsync_core::{EntityBody, EntityId};
use entsync_metadata::{
    AttributeStore, DeferredEffect, EffectSink, EntitySchema, MetaValue, SideEffectBinder,
    StoreError,
};
use glam::DVec3;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Work queued for an entity.
pub enum EntityCommand {
    /// Side effect of a committed attribute write.
    Effect(DeferredEffect),
    /// Attribute write handed off by another context, already validated.
    Set {
        /// Target index.
        index: u8,
        /// New value.
        value: MetaValue,
    },
    /// Arbitrary mutation run with exclusive access.
    Mutate(Box<dyn FnOnce(&mut LiveEntity) + Send>),
}

impl fmt::Debug for EntityCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityCommand::Effect(effect) => f.debug_tuple("Effect").field(effect).finish(),
            EntityCommand::Set { index, value } => f
                .debug_struct("Set")
                .field("index", index)
                .field("value", value)
                .finish(),
            EntityCommand::Mutate(_) => f.write_str("Mutate(..)"),
        }
    }
}

/// Failure to hand work to an entity.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The write would be rejected by the entity's store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The entity is gone.
    #[error("entity {0} no longer accepts commands")]
    Closed(EntityId),
}

#[derive(Clone)]
struct InboxSink {
    entity: EntityId,
    sender: mpsc::UnboundedSender<EntityCommand>,
}

impl EffectSink for InboxSink {
    fn defer(&self, effect: DeferredEffect) {
        if self.sender.send(EntityCommand::Effect(effect)).is_err() {
            debug!(entity = self.entity, "inbox closed; side effect dropped");
        }
    }
}

/// Cloneable, thread-safe address of a live entity.
///
/// Nothing sent through a handle takes effect until the owner runs its inbox.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    schema: Arc<EntitySchema>,
    sender: mpsc::UnboundedSender<EntityCommand>,
}

impl EntityHandle {
    /// Entity this handle addresses.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Queue an attribute write.
    ///
    /// Index and kind are checked here so misuse fails at the call site, not
    /// later on the owner's context.
    pub fn set(&self, index: u8, value: MetaValue) -> Result<(), HandoffError> {
        AttributeStore::check_write(&self.schema, index, &value)?;
        self.send(EntityCommand::Set { index, value })
    }

    /// Queue a closure to run with exclusive access to the entity.
    pub fn mutate<F>(&self, mutation: F) -> Result<(), HandoffError>
    where
        F: FnOnce(&mut LiveEntity) + Send + 'static,
    {
        self.send(EntityCommand::Mutate(Box::new(mutation)))
    }

    /// Whether the entity has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn send(&self, command: EntityCommand) -> Result<(), HandoffError> {
        self.sender
            .send(command)
            .map_err(|_| HandoffError::Closed(self.id))
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.id)
            .field("schema", &self.schema.name())
            .finish()
    }
}

/// One spawned entity: attributes, physical body and inbox.
pub struct LiveEntity {
    id: EntityId,
    kind: EntityKind,
    store: AttributeStore,
    body: EntityBody,
    sender: mpsc::UnboundedSender<EntityCommand>,
    inbox: mpsc::UnboundedReceiver<EntityCommand>,
}

impl LiveEntity {
    /// Spawn `kind` at `position` with every attribute at its default.
    pub fn spawn(id: EntityId, kind: EntityKind, registry: &SchemaRegistry, position: DVec3) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let binder = SideEffectBinder::new(InboxSink {
            entity: id,
            sender: sender.clone(),
        });
        let store = AttributeStore::with_binder(registry.schema(kind).clone(), binder);
        trace!(entity = id, %kind, "spawned live entity");
        Self {
            id,
            kind,
            store,
            body: EntityBody::new(position, kind.bounding_box()),
            sender,
            inbox,
        }
    }

    /// Network identifier.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Entity type.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Attribute values.
    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    /// Attribute values, mutably.
    pub fn store_mut(&mut self) -> &mut AttributeStore {
        &mut self.store
    }

    /// Physical state.
    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    /// Physical state, mutably.
    pub fn body_mut(&mut self) -> &mut EntityBody {
        &mut self.body
    }

    /// Typed view over the attributes, `None` if the kind lacks its layers.
    pub fn view<'s, V: TypedView<'s>>(&'s mut self) -> Option<V> {
        V::attach(&mut self.store)
    }

    /// Address for other execution contexts.
    pub fn handle(&self) -> EntityHandle {
        EntityHandle {
            id: self.id,
            schema: self.store.schema().clone(),
            sender: self.sender.clone(),
        }
    }

    /// Apply queued commands in arrival order until the inbox is empty.
    ///
    /// Commands queued while draining, such as the side effect of a handed-off
    /// write, run in the same pass. Returns the number of commands applied.
    pub fn run_inbox(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.inbox.try_recv() {
            applied += 1;
            match command {
                EntityCommand::Effect(effect) => {
                    trace!(entity = self.id, index = effect.index(), "applying side effect");
                    effect.apply(&mut self.body);
                }
                EntityCommand::Set { index, value } => {
                    if let Err(err) = self.store.try_set(index, value) {
                        error!(entity = self.id, %err, "handed-off write rejected");
                    }
                }
                EntityCommand::Mutate(mutation) => mutation(self),
            }
        }
        applied
    }
}

impl fmt::Debug for LiveEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveEntity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("body", &self.body)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
