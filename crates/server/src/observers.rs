//! Connected observers and the publish stage.

use bevy_ecs::system::{Query, Res, ResMut, Resource};
use entsync_core::EntityId;
use entsync_ecs::{Synced, TickClock};
use entsync_entity::{EntityKind, MetadataChanged};
use entsync_metadata::MetaValue;
use entsync_net::{encode_message, ChunkPos, ObserverTracker, SyncMessage, SyncPacket};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Identifier of a connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Receiving end of an observer's outbound frames.
pub type OutboundFrames = mpsc::UnboundedReceiver<Vec<u8>>;

struct Observer {
    chunk: ChunkPos,
    tracker: ObserverTracker,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: bool,
}

impl Observer {
    fn send(&mut self, message: &SyncMessage) -> bool {
        if self.closed {
            return false;
        }
        if self.outbound.send(encode_message(message)).is_err() {
            self.closed = true;
            return false;
        }
        true
    }
}

/// Every connected observer.
#[derive(Resource, Default)]
pub struct Observers {
    next_id: u64,
    entries: BTreeMap<ObserverId, Observer>,
}

impl Observers {
    /// Register an observer standing in `chunk`.
    pub fn connect(&mut self, chunk: ChunkPos, view_distance: u32) -> (ObserverId, OutboundFrames) {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        let (outbound, frames) = mpsc::unbounded_channel();
        self.entries.insert(
            id,
            Observer {
                chunk,
                tracker: ObserverTracker::new(view_distance),
                outbound,
                closed: false,
            },
        );
        info!(observer = id.0, ?chunk, "observer connected");
        (id, frames)
    }

    /// Move an observer; visibility is recomputed on the next publish.
    pub fn relocate(&mut self, id: ObserverId, chunk: ChunkPos) -> bool {
        match self.entries.get_mut(&id) {
            Some(observer) => {
                observer.chunk = chunk;
                true
            }
            None => false,
        }
    }

    /// Remove an observer.
    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            info!(observer = id.0, "observer disconnected");
        }
        removed
    }

    /// Number of connected observers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `observer` currently tracks `entity`.
    pub fn is_tracking(&self, observer: ObserverId, entity: EntityId) -> bool {
        self.entries
            .get(&observer)
            .is_some_and(|o| o.tracker.is_tracking(entity))
    }
}

/// Changes published during the current tick, drained by the server.
#[derive(Resource, Default)]
pub struct PublishedChanges(pub Vec<MetadataChanged>);

/// Totals of one publish stage.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Entities with at least one changed attribute.
    pub changed_entities: usize,
    /// Frames handed to observers.
    pub frames_sent: usize,
}

struct Snapshot {
    fingerprint: u64,
    entries: Vec<(u8, MetaValue)>,
}

/// Publish stage: flush every dirty store once and fan the result out.
///
/// Newly visible entities get a full snapshot, which already reflects this
/// tick's changes; entities that stay visible get the delta; entities that
/// left the view get an untrack.
pub fn publish(
    clock: Res<TickClock>,
    mut entities: Query<&mut Synced>,
    mut observers: ResMut<Observers>,
    mut published: ResMut<PublishedChanges>,
    mut stats: ResMut<PublishStats>,
) {
    let mut chunks: BTreeMap<EntityId, ChunkPos> = BTreeMap::new();
    let mut kinds: BTreeMap<EntityId, EntityKind> = BTreeMap::new();
    let mut deltas: BTreeMap<EntityId, Vec<(u8, MetaValue)>> = BTreeMap::new();
    for mut entity in &mut entities {
        let id = entity.id();
        chunks.insert(id, entity.body().chunk());
        kinds.insert(id, entity.kind());
        let delta = entity.store_mut().drain_dirty();
        if !delta.is_empty() {
            deltas.insert(id, delta);
        }
    }

    let changes: Vec<_> = observers
        .entries
        .iter_mut()
        .map(|(id, observer)| {
            let change = observer.tracker.update_visibility(observer.chunk, &chunks);
            (*id, change)
        })
        .collect();

    let entering: BTreeSet<EntityId> = changes
        .iter()
        .flat_map(|(_, change)| change.entered.iter().copied())
        .collect();
    let mut snapshots: BTreeMap<EntityId, Snapshot> = BTreeMap::new();
    if !entering.is_empty() {
        for entity in &entities {
            if entering.contains(&entity.id()) {
                snapshots.insert(
                    entity.id(),
                    Snapshot {
                        fingerprint: entity.store().schema().fingerprint(),
                        entries: entity.store().snapshot(),
                    },
                );
            }
        }
    }

    let mut frames_sent = 0;
    for (id, change) in changes {
        let Some(observer) = observers.entries.get_mut(&id) else {
            continue;
        };
        let mut sent = 0;
        for entity_id in change.left {
            sent += usize::from(observer.send(&SyncMessage::Untrack(entity_id)));
        }
        for entity_id in change.entered {
            if let Some(snapshot) = snapshots.get(&entity_id) {
                sent += usize::from(observer.send(&SyncMessage::Track {
                    entity_id,
                    fingerprint: snapshot.fingerprint,
                    entries: snapshot.entries.clone(),
                }));
            }
        }
        for entity_id in change.retained {
            if let Some(delta) = deltas.get(&entity_id) {
                sent += usize::from(observer.send(&SyncMessage::Update(SyncPacket {
                    entity_id,
                    entries: delta.clone(),
                })));
            }
        }
        if sent > 0 {
            trace!(observer = id.0, frames = sent, "published to observer");
        }
        frames_sent += sent;
    }

    let before = observers.entries.len();
    observers
        .entries
        .retain(|_, observer| !observer.closed && !observer.outbound.is_closed());
    if observers.entries.len() < before {
        info!(dropped = before - observers.entries.len(), "dropped closed observers");
    }

    for (entity, delta) in &deltas {
        if let Some(kind) = kinds.get(entity) {
            published.0.push(MetadataChanged {
                entity: *entity,
                kind: *kind,
                indices: delta.iter().map(|(index, _)| *index).collect(),
                tick: clock.0,
            });
        }
    }

    *stats = PublishStats {
        changed_entities: deltas.len(),
        frames_sent,
    };
    if !deltas.is_empty() {
        debug!(
            tick = clock.0 .0,
            changed = deltas.len(),
            frames = frames_sent,
            "published attribute changes"
        );
    }
}
