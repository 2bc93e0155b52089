#![warn(missing_docs)]
//! Synchronized entity attributes: value kinds, wire codec, index schemas,
//! the per-entity store and its deferred side effects.

pub mod binder;
pub mod codec;
pub mod schema;
pub mod store;
pub mod value;

pub use binder::{DeferredEffect, EffectSink, SideEffectBinder};
pub use codec::{
    decode, decode_value, encode, encode_value, read_entry, write_entry, write_varint, MetaError,
    Reader, MAX_INDEX, TERMINATOR,
};
pub use schema::{
    EffectFn, EntitySchema, FieldDef, LayerDef, OffsetRange, ResolvedField, SchemaBuilder,
    SchemaViolation,
};
pub use store::{AttributeEntry, AttributeStore, StoreError};
pub use value::{
    BlockStateId, ChatComponent, Compound, ItemStack, MetaType, MetaValue, Particle, Pose,
    ValueKind, VillagerData,
};
