#![warn(missing_docs)]
//! Entity types built on synchronized attributes: the layer catalogue, the
//! schema registry, typed views and live instances with their inboxes.

pub mod event;
pub mod flags;
pub mod layers;
pub mod live;
pub mod registry;
pub mod views;

pub use event::{entity_filter, EntityEvent, EventFilter, MetadataChanged};
pub use flags::{EntityFlags, HandStates, MobFlags};
pub use live::{EntityCommand, EntityHandle, HandoffError, LiveEntity};
pub use registry::{EntityKind, SchemaRegistry};
pub use views::{
    AgeableView, EntityView, ItemView, LivingView, MobView, PigView, TypedView, VillagerView,
    ZombieView,
};
