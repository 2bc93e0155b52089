#![warn(missing_docs)]
//! Authoritative attribute sync host.
//!
//! Owns the ECS world of live entities, runs the tick schedule and fans
//! attribute changes out to connected observers.

pub mod observers;

pub use observers::{ObserverId, Observers, OutboundFrames, PublishStats, PublishedChanges};

use bevy_ecs::entity::Entity;
use bevy_ecs::schedule::{IntoSystemConfigs, Schedules};
use bevy_ecs::system::Resource;
use bevy_ecs::world::World;
use entsync_core::{EntityId, SimTick};
use entsync_ecs::{build_sync_schedule, run_tick, SyncSchedule, SyncSet, Synced};
use entsync_entity::{
    entity_filter, EntityHandle, EntityKind, EventFilter, LiveEntity, MetadataChanged,
    SchemaRegistry,
};
use entsync_net::ChunkPos;
use glam::DVec3;
use std::collections::BTreeMap;
use tracing::{debug, info};

type Listener = Box<dyn FnMut(&MetadataChanged) + Send>;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick that ran.
    pub tick: SimTick,
    /// Entities with at least one published change.
    pub changed_entities: usize,
    /// Frames handed to observers.
    pub frames_sent: usize,
}

/// Server harness: entities, observers, schedule and listeners.
pub struct SyncServer {
    world: World,
    schedules: Schedules,
    current_tick: SimTick,
    registry: SchemaRegistry,
    entities: BTreeMap<EntityId, Entity>,
    next_entity_id: EntityId,
    view_distance: u32,
    filter: EventFilter<MetadataChanged, EntityId>,
    listeners: Vec<(Option<EntityId>, Listener)>,
}

impl SyncServer {
    /// Create a server with the sync schedule and an empty world.
    pub fn new(registry: SchemaRegistry, view_distance: u32) -> Self {
        let mut world = World::default();
        world.init_resource::<Observers>();
        world.init_resource::<PublishedChanges>();
        world.init_resource::<PublishStats>();

        let mut schedules = build_sync_schedule();
        if let Some(schedule) = schedules.get_mut(SyncSchedule) {
            schedule.add_systems(observers::publish.in_set(SyncSet::Publish));
        }

        info!(view_distance, "sync server ready");
        Self {
            world,
            schedules,
            current_tick: SimTick::ZERO,
            registry,
            entities: BTreeMap::new(),
            next_entity_id: 1,
            view_distance,
            filter: entity_filter(),
            listeners: Vec::new(),
        }
    }

    /// Tick the next call to [`tick`](Self::tick) will run.
    pub fn current_tick(&self) -> SimTick {
        self.current_tick
    }

    /// Schema table shared by every entity.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Insert a resource for gameplay systems.
    pub fn insert_resource<R: Resource>(&mut self, resource: R) {
        self.world.insert_resource(resource);
    }

    /// Add gameplay systems to the simulate stage.
    pub fn add_systems<M>(&mut self, systems: impl IntoSystemConfigs<M>) {
        if let Some(schedule) = self.schedules.get_mut(SyncSchedule) {
            schedule.add_systems(systems.in_set(SyncSet::Simulate));
        }
    }

    /// Spawn `kind` at `position` with default attributes.
    pub fn spawn(&mut self, kind: EntityKind, position: DVec3) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        let live = LiveEntity::spawn(id, kind, &self.registry, position);
        let entity = self.world.spawn(Synced(live)).id();
        self.entities.insert(id, entity);
        debug!(entity = id, %kind, "spawned");
        id
    }

    /// Remove an entity; observers untrack it on the next publish.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        match self.entities.remove(&id) {
            Some(entity) => {
                debug!(entity = id, "despawned");
                self.world.despawn(entity)
            }
            None => false,
        }
    }

    /// Read access to a live entity.
    pub fn entity(&self, id: EntityId) -> Option<&LiveEntity> {
        let entity = *self.entities.get(&id)?;
        self.world.get::<Synced>(entity).map(|synced| &synced.0)
    }

    /// Run `f` with exclusive access to a live entity on the server context.
    pub fn with_entity<R>(&mut self, id: EntityId, f: impl FnOnce(&mut LiveEntity) -> R) -> Option<R> {
        let entity = *self.entities.get(&id)?;
        let mut synced = self.world.get_mut::<Synced>(entity)?;
        Some(f(&mut synced.0))
    }

    /// Handle for handing work to an entity from other contexts.
    pub fn handle(&self, id: EntityId) -> Option<EntityHandle> {
        self.entity(id).map(LiveEntity::handle)
    }

    /// Ids of live entities, ascending.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Connect an observer standing in `chunk`.
    pub fn connect_observer(&mut self, chunk: ChunkPos) -> (ObserverId, OutboundFrames) {
        let view_distance = self.view_distance;
        self.world
            .resource_mut::<Observers>()
            .connect(chunk, view_distance)
    }

    /// Move an observer to another chunk.
    pub fn relocate_observer(&mut self, id: ObserverId, chunk: ChunkPos) -> bool {
        self.world.resource_mut::<Observers>().relocate(id, chunk)
    }

    /// Disconnect an observer.
    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        self.world.resource_mut::<Observers>().disconnect(id)
    }

    /// Connected observers.
    pub fn observers(&self) -> &Observers {
        self.world.resource::<Observers>()
    }

    /// Call `listener` for every published change, or only for `target`'s.
    pub fn on_metadata_changed(
        &mut self,
        target: Option<EntityId>,
        listener: impl FnMut(&MetadataChanged) + Send + 'static,
    ) {
        self.listeners.push((target, Box::new(listener)));
    }

    /// Run a single tick: simulate, drain inboxes, publish, dispatch events.
    pub fn tick(&mut self) -> TickSummary {
        let tick = self.current_tick;
        run_tick(&mut self.world, &mut self.schedules, tick);
        self.current_tick = tick.advance(1);

        let events = std::mem::take(&mut self.world.resource_mut::<PublishedChanges>().0);
        for event in &events {
            let target = self.filter.handler(event);
            for (wanted, listener) in &mut self.listeners {
                if wanted.is_none() || *wanted == target {
                    listener(event);
                }
            }
        }

        let stats = *self.world.resource::<PublishStats>();
        TickSummary {
            tick,
            changed_entities: stats.changed_entities,
            frames_sent: stats.frames_sent,
        }
    }
}
