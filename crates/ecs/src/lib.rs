#![warn(missing_docs)]
//! ECS schedule helpers wrapping `bevy_ecs` for the attribute sync tick.
//!
//! A tick runs three ordered stages: gameplay systems mutate entities, every
//! entity drains its inbox, then changes are published to observers.

use bevy_ecs::component::Component;
use bevy_ecs::schedule::{
    IntoSystemConfigs, IntoSystemSetConfigs, Schedule, ScheduleLabel, Schedules, SystemSet,
};
use bevy_ecs::system::{Query, Resource};
use bevy_ecs::world::World;
use entsync_core::SimTick;
use entsync_entity::LiveEntity;
use std::ops::{Deref, DerefMut};

/// Label of the sync schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ScheduleLabel)]
pub struct SyncSchedule;

/// Ordered stages of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SystemSet)]
pub enum SyncSet {
    /// Gameplay writes attributes.
    Simulate,
    /// Entities apply queued commands and side effects.
    ApplyInboxes,
    /// Dirty attributes are sent to observers.
    Publish,
}

/// Tick currently being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Resource)]
pub struct TickClock(pub SimTick);

/// Component wrapping a live entity.
#[derive(Debug, Component)]
pub struct Synced(pub LiveEntity);

impl Deref for Synced {
    type Target = LiveEntity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Synced {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Drain every entity inbox.
pub fn apply_inboxes(mut entities: Query<&mut Synced>) {
    let mut applied = 0;
    for mut entity in &mut entities {
        applied += entity.run_inbox();
    }
    if applied > 0 {
        tracing::trace!(applied, "applied inbox commands");
    }
}

/// Build the sync schedule with its stages chained and the inbox stage filled.
pub fn build_sync_schedule() -> Schedules {
    let mut schedules = Schedules::default();
    let mut schedule = Schedule::new(SyncSchedule);
    schedule.set_apply_final_deferred(true);
    schedule.configure_sets(
        (SyncSet::Simulate, SyncSet::ApplyInboxes, SyncSet::Publish).chain(),
    );
    schedule.add_systems(apply_inboxes.in_set(SyncSet::ApplyInboxes));
    schedules.insert(schedule);
    schedules
}

/// Run the sync schedule for a given tick.
pub fn run_tick(world: &mut World, schedules: &mut Schedules, tick: SimTick) {
    tracing::debug!(tick = tick.0, "running sync schedule");
    world.insert_resource(TickClock(tick));
    if let Some(schedule) = schedules.get_mut(SyncSchedule) {
        schedule.run(world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::system::{Res, ResMut};
    use entsync_core::BoundingBox;
    use entsync_entity::{EntityKind, SchemaRegistry, ZombieView};
    use glam::DVec3;

    #[derive(Resource, Default)]
    struct Seen(Vec<(&'static str, u64)>);

    #[test]
    fn stages_run_in_order() {
        let mut world = World::default();
        world.insert_resource(Seen::default());
        let mut schedules = build_sync_schedule();

        if let Some(schedule) = schedules.get_mut(SyncSchedule) {
            schedule.add_systems((
                (|clock: Res<TickClock>, mut seen: ResMut<Seen>| {
                    seen.0.push(("publish", clock.0 .0))
                })
                .in_set(SyncSet::Publish),
                (|clock: Res<TickClock>, mut seen: ResMut<Seen>| {
                    seen.0.push(("simulate", clock.0 .0))
                })
                .in_set(SyncSet::Simulate),
            ));
        }

        run_tick(&mut world, &mut schedules, SimTick(4));
        assert_eq!(
            world.resource::<Seen>().0,
            vec![("simulate", 4), ("publish", 4)]
        );
    }

    #[test]
    fn inbox_stage_applies_side_effects() {
        let registry = SchemaRegistry::build().unwrap();
        let mut world = World::default();
        let mut schedules = build_sync_schedule();

        let mut zombie = LiveEntity::spawn(1, EntityKind::Zombie, &registry, DVec3::ZERO);
        zombie.body_mut().bounding_box = BoundingBox::new(1.0, 2.0, 1.0);
        let id = world.spawn(Synced(zombie)).id();

        if let Some(schedule) = schedules.get_mut(SyncSchedule) {
            schedule.add_systems(
                (|mut entities: Query<&mut Synced>| {
                    for mut entity in &mut entities {
                        if let Some(mut zombie) = entity.view::<ZombieView>() {
                            zombie.set_baby(true);
                        }
                    }
                })
                .in_set(SyncSet::Simulate),
            );
        }

        run_tick(&mut world, &mut schedules, SimTick::ZERO);
        let zombie = world.get::<Synced>(id).unwrap();
        assert_eq!(zombie.body().bounding_box, BoundingBox::new(0.5, 1.0, 0.5));
        assert!(zombie.store().is_dirty(16));
    }
}
