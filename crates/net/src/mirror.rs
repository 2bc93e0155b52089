//! Observer-side replica of tracked entities.

use crate::message::{decode_message, SyncMessage};
use crate::packet::{PacketError, SyncPacket};
use entsync_core::EntityId;
use entsync_entity::{EntityKind, SchemaRegistry};
use entsync_metadata::{EntitySchema, MetaValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Replica of one tracked entity's attributes.
#[derive(Debug, Clone)]
pub struct MirroredEntity {
    kind: Option<EntityKind>,
    schema: Option<Arc<EntitySchema>>,
    values: BTreeMap<u8, MetaValue>,
}

impl MirroredEntity {
    /// Entity type, `None` if the layout fingerprint was not recognised.
    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    /// Last received value at `index`.
    pub fn value(&self, index: u8) -> Option<&MetaValue> {
        self.values.get(&index)
    }

    /// Received value at `index`, or the schema default if none arrived yet.
    pub fn effective_value(&self, index: u8) -> Option<MetaValue> {
        if let Some(value) = self.values.get(&index) {
            return Some(value.clone());
        }
        self.schema
            .as_ref()
            .and_then(|schema| schema.field(index))
            .map(|field| field.default_value())
    }

    /// Every received value, ascending by index.
    pub fn values(&self) -> impl Iterator<Item = (u8, &MetaValue)> + '_ {
        self.values.iter().map(|(index, value)| (*index, value))
    }

    fn apply(&mut self, entity_id: EntityId, entries: Vec<(u8, MetaValue)>) -> usize {
        let entries = match &self.schema {
            Some(schema) => {
                let checked = SyncPacket { entity_id, entries }.check(schema);
                for skipped in &checked.skipped {
                    warn!(
                        entity = entity_id,
                        index = skipped.index,
                        kind = %skipped.kind,
                        expected = ?skipped.expected,
                        "skipping attribute the local layout cannot place"
                    );
                }
                checked.packet.entries
            }
            None => entries,
        };
        let applied = entries.len();
        self.values.extend(entries);
        applied
    }
}

/// All entities an observer currently tracks, fed by framed messages.
#[derive(Debug)]
pub struct EntityMirror {
    registry: SchemaRegistry,
    entities: BTreeMap<EntityId, MirroredEntity>,
    rejected: u64,
}

impl EntityMirror {
    /// Empty mirror resolving layouts through `registry`.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            entities: BTreeMap::new(),
            rejected: 0,
        }
    }

    /// Decode and apply one frame.
    ///
    /// A malformed frame is dropped as a whole and leaves every tracked entity
    /// untouched.
    pub fn receive(&mut self, frame: &[u8]) -> Result<usize, PacketError> {
        match decode_message(frame) {
            Ok(message) => Ok(self.apply(message)),
            Err(err) => {
                self.rejected += 1;
                warn!(%err, len = frame.len(), "dropping malformed sync message");
                Err(err)
            }
        }
    }

    /// Apply a decoded message, returning the number of attributes written.
    pub fn apply(&mut self, message: SyncMessage) -> usize {
        match message {
            SyncMessage::Track {
                entity_id,
                fingerprint,
                entries,
            } => {
                let kind = self.registry.kind_by_fingerprint(fingerprint);
                if kind.is_none() {
                    warn!(
                        entity = entity_id,
                        fingerprint = %format!("{fingerprint:016x}"),
                        "unknown entity layout; mirroring without a schema"
                    );
                }
                let mut entity = MirroredEntity {
                    kind,
                    schema: kind.map(|kind| self.registry.schema(kind).clone()),
                    values: BTreeMap::new(),
                };
                let applied = entity.apply(entity_id, entries);
                debug!(entity = entity_id, ?kind, applied, "tracking entity");
                self.entities.insert(entity_id, entity);
                applied
            }
            SyncMessage::Update(packet) => match self.entities.get_mut(&packet.entity_id) {
                Some(entity) => entity.apply(packet.entity_id, packet.entries),
                None => {
                    debug!(entity = packet.entity_id, "update for untracked entity ignored");
                    0
                }
            },
            SyncMessage::Untrack(entity_id) => {
                if self.entities.remove(&entity_id).is_some() {
                    debug!(entity = entity_id, "untracked entity");
                }
                0
            }
        }
    }

    /// Replica of `entity_id`, if tracked.
    pub fn entity(&self, entity_id: EntityId) -> Option<&MirroredEntity> {
        self.entities.get(&entity_id)
    }

    /// Ids of tracked entities, ascending.
    pub fn tracked(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Number of frames dropped as malformed.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
