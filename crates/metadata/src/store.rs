//! Per-entity attribute storage with change tracking.
//!
//! The store is sparse: an index that was never written reads as its
//! default. Writes that do not change the effective value are ignored
//! entirely; real changes mark the index dirty until the next
//! [`AttributeStore::drain_dirty`] and hand any bound side effect to the
//! owning entity.

use crate::binder::{DeferredEffect, SideEffectBinder};
use crate::codec::{json_len, MAX_PAYLOAD_LEN};
use crate::schema::EntitySchema;
use crate::value::{ItemStack, MetaType, MetaValue, ValueKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Misuse of a store by the code that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The index is not a field of this entity type.
    #[error("index {index} is not declared by schema '{schema}'")]
    IndexOutOfSchema {
        /// Requested index.
        index: u8,
        /// Schema of the store.
        schema: &'static str,
    },
    /// The value's kind differs from the field's declared kind.
    #[error("index {index} stores {expected}, got {found}")]
    KindMismatch {
        /// Requested index.
        index: u8,
        /// Declared kind.
        expected: ValueKind,
        /// Kind of the supplied value.
        found: ValueKind,
    },
    /// The value cannot be represented on the wire.
    #[error("index {index} rejects value: {reason}")]
    InvalidValue {
        /// Requested index.
        index: u8,
        /// What is wrong with the value.
        reason: &'static str,
    },
}

/// Inspection view of a single stored attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
    /// Field index.
    pub index: u8,
    /// Declared kind.
    pub kind: ValueKind,
    /// Current value.
    pub value: MetaValue,
    /// Whether the value changed since the last flush.
    pub dirty: bool,
}

/// Attribute values of one entity instance.
#[derive(Debug)]
pub struct AttributeStore {
    schema: Arc<EntitySchema>,
    values: BTreeMap<u8, MetaValue>,
    dirty: BTreeSet<u8>,
    binder: Option<SideEffectBinder>,
}

impl AttributeStore {
    /// Empty store; side effects are dropped until a binder is attached.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
            binder: None,
        }
    }

    /// Empty store handing side effects to `binder`.
    pub fn with_binder(schema: Arc<EntitySchema>, binder: SideEffectBinder) -> Self {
        let mut store = Self::new(schema);
        store.binder = Some(binder);
        store
    }

    /// Schema this store follows.
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Number of explicitly written entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check_index(&self, index: u8) -> Result<ValueKind, StoreError> {
        self.schema
            .kind_of(index)
            .ok_or(StoreError::IndexOutOfSchema {
                index,
                schema: self.schema.name(),
            })
    }

    /// Check that `value` may be written at `index` under `schema` without
    /// touching any store.
    pub fn check_write(
        schema: &EntitySchema,
        index: u8,
        value: &MetaValue,
    ) -> Result<(), StoreError> {
        let expected = schema.kind_of(index).ok_or(StoreError::IndexOutOfSchema {
            index,
            schema: schema.name(),
        })?;
        if value.kind() != expected {
            return Err(StoreError::KindMismatch {
                index,
                expected,
                found: value.kind(),
            });
        }
        validate(index, value)
    }

    /// Stored value at `index`, or `default` if it was never written.
    pub fn try_get<'s>(
        &'s self,
        index: u8,
        default: &'s MetaValue,
    ) -> Result<&'s MetaValue, StoreError> {
        self.check_index(index)?;
        Ok(self.values.get(&index).unwrap_or(default))
    }

    /// Panicking form of [`try_get`](Self::try_get).
    ///
    /// # Panics
    /// If `index` is not declared by the schema.
    #[track_caller]
    pub fn get<'s>(&'s self, index: u8, default: &'s MetaValue) -> &'s MetaValue {
        match self.try_get(index, default) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Current value at `index`, falling back to the schema default.
    ///
    /// # Panics
    /// If `index` is not declared by the schema.
    #[track_caller]
    pub fn value(&self, index: u8) -> MetaValue {
        match self.values.get(&index) {
            Some(value) => value.clone(),
            None => match self.schema.field(index) {
                Some(field) => field.default_value(),
                None => panic!(
                    "{}",
                    StoreError::IndexOutOfSchema {
                        index,
                        schema: self.schema.name(),
                    }
                ),
            },
        }
    }

    /// Typed read with the schema default.
    ///
    /// # Panics
    /// If `index` is not declared or stores a different kind than `T`.
    #[track_caller]
    pub fn read<T: MetaType>(&self, index: u8) -> T {
        let value = self.value(index);
        match T::from_value(&value) {
            Some(typed) => typed,
            None => panic!(
                "{}",
                StoreError::KindMismatch {
                    index,
                    expected: value.kind(),
                    found: T::KIND,
                }
            ),
        }
    }

    /// Write `value` at `index`.
    ///
    /// Returns `Ok(true)` when the effective value changed; in that case the
    /// index is marked dirty and any bound side effect is handed off after
    /// the new value is in place. Writing the current value returns
    /// `Ok(false)` and has no other effect.
    pub fn try_set(&mut self, index: u8, value: MetaValue) -> Result<bool, StoreError> {
        Self::check_write(&self.schema, index, &value)?;

        let current = self.value(index);
        if current.same_as(&value) {
            return Ok(false);
        }

        let effect = self.schema.field(index).and_then(|field| field.effect());
        let new = effect.map(|_| value.clone());
        self.values.insert(index, value);
        self.dirty.insert(index);

        if let (Some(effect), Some(new)) = (effect, new) {
            match &self.binder {
                Some(binder) => binder.schedule(DeferredEffect::new(index, current, new, effect)),
                None => warn!(
                    schema = self.schema.name(),
                    index, "side effect dropped: store has no binder"
                ),
            }
        }
        Ok(true)
    }

    /// Panicking form of [`try_set`](Self::try_set).
    ///
    /// # Panics
    /// On any [`StoreError`].
    #[track_caller]
    pub fn set(&mut self, index: u8, value: MetaValue) -> bool {
        match self.try_set(index, value) {
            Ok(changed) => changed,
            Err(err) => panic!("{err}"),
        }
    }

    /// Typed write.
    #[track_caller]
    pub fn write<T: MetaType>(&mut self, index: u8, value: T) -> bool {
        self.set(index, value.into_value())
    }

    /// Test `mask` in the byte stored at `index`.
    #[track_caller]
    pub fn flag(&self, index: u8, mask: u8) -> bool {
        (self.read::<i8>(index) as u8) & mask != 0
    }

    /// Set or clear `mask` in the byte stored at `index`.
    #[track_caller]
    pub fn set_flag(&mut self, index: u8, mask: u8, on: bool) -> bool {
        let bits = self.read::<i8>(index) as u8;
        let bits = if on { bits | mask } else { bits & !mask };
        self.write(index, bits as i8)
    }

    /// Whether `index` changed since the last flush.
    pub fn is_dirty(&self, index: u8) -> bool {
        self.dirty.contains(&index)
    }

    /// Whether any index changed since the last flush.
    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Inspect the explicitly written entry at `index`.
    pub fn entry(&self, index: u8) -> Option<AttributeEntry> {
        let value = self.values.get(&index)?;
        Some(AttributeEntry {
            index,
            kind: value.kind(),
            value: value.clone(),
            dirty: self.dirty.contains(&index),
        })
    }

    /// Take every changed entry in ascending index order and clear the dirty set.
    ///
    /// An empty result means no packet is needed this cycle.
    pub fn drain_dirty(&mut self) -> Vec<(u8, MetaValue)> {
        let dirty = std::mem::take(&mut self.dirty);
        let changes: Vec<_> = dirty
            .into_iter()
            .filter_map(|index| self.values.get(&index).map(|v| (index, v.clone())))
            .collect();
        if !changes.is_empty() {
            debug!(
                schema = self.schema.name(),
                changes = changes.len(),
                "drained dirty attributes"
            );
        }
        changes
    }

    /// Copy of every explicitly written entry in ascending index order.
    pub fn snapshot(&self) -> Vec<(u8, MetaValue)> {
        self.values
            .iter()
            .map(|(index, value)| (*index, value.clone()))
            .collect()
    }
}

fn validate(index: u8, value: &MetaValue) -> Result<(), StoreError> {
    let reason = match value {
        MetaValue::OptionalVarInt(Some(v)) if *v < 0 => "optional varint must be non-negative",
        MetaValue::String(s) if s.chars().count() > 32_767 => "string longer than 32767 chars",
        MetaValue::Particle(p) if p.data.len() > MAX_PAYLOAD_LEN => "particle data too large",
        MetaValue::BlockPosition(pos) | MetaValue::OptionalBlockPosition(Some(pos))
            if !pos.is_packable() =>
        {
            "block position outside the packable range"
        }
        MetaValue::Chat(chat) | MetaValue::OptionalChat(Some(chat))
            if json_len(&chat.0) > MAX_PAYLOAD_LEN =>
        {
            "chat payload too large"
        }
        MetaValue::Compound(compound) if json_len(&compound.0) > MAX_PAYLOAD_LEN => {
            "compound payload too large"
        }
        MetaValue::ItemStack(Some(ItemStack {
            tag: Some(tag), ..
        })) if json_len(&tag.0) > MAX_PAYLOAD_LEN => "item tag too large",
        _ => return Ok(()),
    };
    Err(StoreError::InvalidValue { index, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::EffectSink;
    use crate::schema::{FieldDef, LayerDef};
    use crate::value::{ChatComponent, Compound};
    use entsync_core::{BlockPos, BoundingBox, EntityBody};
    use std::sync::Mutex;

    fn zero_byte() -> MetaValue {
        MetaValue::Byte(0)
    }

    fn zero_int() -> MetaValue {
        MetaValue::VarInt(0)
    }

    fn no() -> MetaValue {
        MetaValue::Boolean(false)
    }

    fn none_int() -> MetaValue {
        MetaValue::OptionalVarInt(None)
    }

    fn count_effect(_old: &MetaValue, _new: &MetaValue, body: &mut EntityBody) {
        body.position.x += 1.0;
    }

    static SAMPLE: LayerDef = LayerDef {
        name: "sample",
        count: 9,
        pinned_base: Some(0),
        fields: &[
            FieldDef::new("flags", 0, ValueKind::Byte, zero_byte),
            FieldDef::new("a", 1, ValueKind::VarInt, zero_int),
            FieldDef::new("watched", 2, ValueKind::Boolean, no).with_effect(count_effect),
            FieldDef::new("b", 4, ValueKind::VarInt, zero_int),
            FieldDef::new("target", 5, ValueKind::OptionalVarInt, none_int),
            FieldDef::new("c", 7, ValueKind::VarInt, zero_int),
        ],
    };

    #[derive(Default)]
    struct Queue(Mutex<Vec<DeferredEffect>>);

    impl EffectSink for Arc<Queue> {
        fn defer(&self, effect: DeferredEffect) {
            self.0.lock().unwrap().push(effect);
        }
    }

    fn schema() -> Arc<EntitySchema> {
        Arc::new(EntitySchema::builder("sample").layer(&SAMPLE).build().unwrap())
    }

    fn bound_store() -> (AttributeStore, Arc<Queue>) {
        let queue = Arc::new(Queue::default());
        let store = AttributeStore::with_binder(schema(), SideEffectBinder::new(queue.clone()));
        (store, queue)
    }

    #[test]
    fn get_falls_back_to_default() {
        let store = AttributeStore::new(schema());
        let default = MetaValue::VarInt(42);
        assert_eq!(store.get(1, &default), &MetaValue::VarInt(42));
        assert_eq!(store.read::<i32>(1), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn dirty_delta_is_ordered_and_skips_repeats() {
        let mut store = AttributeStore::new(schema());
        store.set(4, MetaValue::VarInt(9));
        store.drain_dirty();

        assert!(store.set(1, MetaValue::VarInt(5)));
        assert!(!store.set(4, MetaValue::VarInt(9)));
        assert!(!store.set(4, MetaValue::VarInt(9)));
        assert!(store.set(7, MetaValue::VarInt(3)));

        assert_eq!(
            store.drain_dirty(),
            vec![(1, MetaValue::VarInt(5)), (7, MetaValue::VarInt(3))]
        );
        assert!(store.drain_dirty().is_empty());
        assert!(!store.has_changes());
    }

    #[test]
    fn writing_the_default_is_a_no_op() {
        let mut store = AttributeStore::new(schema());
        assert!(!store.set(1, MetaValue::VarInt(0)));
        assert!(store.drain_dirty().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn dirty_set_reports_latest_value() {
        let mut store = AttributeStore::new(schema());
        store.write(1, 1_i32);
        store.write(1, 2_i32);
        assert_eq!(store.drain_dirty(), vec![(1, MetaValue::VarInt(2))]);
    }

    #[test]
    fn reverting_before_flush_still_reports_the_index() {
        let mut store = AttributeStore::new(schema());
        store.write(1, 5_i32);
        store.write(1, 0_i32);
        assert_eq!(store.drain_dirty(), vec![(1, MetaValue::VarInt(0))]);
    }

    #[test]
    fn snapshot_contains_every_written_entry() {
        let mut store = AttributeStore::new(schema());
        store.write(1, 10_i32);
        store.write(4, 20_i32);
        store.write(7, 30_i32);
        store.drain_dirty();

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot,
            vec![
                (1, MetaValue::VarInt(10)),
                (4, MetaValue::VarInt(20)),
                (7, MetaValue::VarInt(30)),
            ]
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn side_effect_deferred_once_per_transition() {
        let (mut store, queue) = bound_store();
        assert!(store.write(2, true));
        assert!(!store.write(2, true));
        assert!(!store.write(2, true));

        let effects: Vec<_> = queue.0.lock().unwrap().drain(..).collect();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].old(), &MetaValue::Boolean(false));
        assert_eq!(effects[0].new_value(), &MetaValue::Boolean(true));

        let mut body = EntityBody::new(Default::default(), BoundingBox::new(1.0, 1.0, 1.0));
        for effect in effects {
            effect.apply(&mut body);
        }
        assert_eq!(body.position.x, 1.0);
    }

    #[test]
    fn side_effect_sees_committed_value() {
        let (mut store, queue) = bound_store();
        store.write(2, true);
        assert_eq!(store.read::<bool>(2), true);
        assert!(store.is_dirty(2));
        assert_eq!(queue.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn out_of_schema_index_fails_fast() {
        let mut store = AttributeStore::new(schema());
        assert_eq!(
            store.try_set(3, MetaValue::VarInt(1)),
            Err(StoreError::IndexOutOfSchema {
                index: 3,
                schema: "sample"
            })
        );
        assert!(store.try_get(200, &MetaValue::VarInt(0)).is_err());
    }

    #[test]
    #[should_panic(expected = "not declared")]
    fn panicking_set_rejects_unknown_index() {
        let mut store = AttributeStore::new(schema());
        store.set(8, MetaValue::VarInt(1));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut store = AttributeStore::new(schema());
        assert_eq!(
            store.try_set(1, MetaValue::Boolean(true)),
            Err(StoreError::KindMismatch {
                index: 1,
                expected: ValueKind::VarInt,
                found: ValueKind::Boolean
            })
        );
        assert!(!store.has_changes());
    }

    #[test]
    fn negative_optional_varint_is_rejected() {
        let mut store = AttributeStore::new(schema());
        assert!(matches!(
            store.try_set(5, MetaValue::OptionalVarInt(Some(-1))),
            Err(StoreError::InvalidValue { index: 5, .. })
        ));
        assert!(store.write(5, Some(0_i32)));
    }

    fn origin() -> MetaValue {
        MetaValue::BlockPosition(BlockPos::new(0, 0, 0))
    }

    fn no_pos() -> MetaValue {
        MetaValue::OptionalBlockPosition(None)
    }

    fn blank_chat() -> MetaValue {
        MetaValue::Chat(ChatComponent::text(""))
    }

    fn no_chat() -> MetaValue {
        MetaValue::OptionalChat(None)
    }

    fn empty_compound() -> MetaValue {
        MetaValue::Compound(Compound::new())
    }

    fn empty_slot() -> MetaValue {
        MetaValue::ItemStack(None)
    }

    static LIMITS: LayerDef = LayerDef {
        name: "limits",
        count: 6,
        pinned_base: Some(0),
        fields: &[
            FieldDef::new("home", 0, ValueKind::BlockPosition, origin),
            FieldDef::new("beam", 1, ValueKind::OptionalBlockPosition, no_pos),
            FieldDef::new("name", 2, ValueKind::Chat, blank_chat),
            FieldDef::new("label", 3, ValueKind::OptionalChat, no_chat),
            FieldDef::new("data", 4, ValueKind::Compound, empty_compound),
            FieldDef::new("held", 5, ValueKind::ItemStack, empty_slot),
        ],
    };

    fn limits() -> EntitySchema {
        EntitySchema::builder("limits").layer(&LIMITS).build().unwrap()
    }

    #[test]
    fn block_positions_outside_packed_range_are_rejected() {
        let schema = limits();
        let edge = BlockPos::new((1 << 25) - 1, -2048, -(1 << 25));
        assert!(AttributeStore::check_write(&schema, 0, &MetaValue::BlockPosition(edge)).is_ok());
        for pos in [
            BlockPos::new(1 << 25, 0, 0),
            BlockPos::new(0, 2048, 0),
            BlockPos::new(0, 0, i32::MIN),
        ] {
            assert!(matches!(
                AttributeStore::check_write(&schema, 0, &MetaValue::BlockPosition(pos)),
                Err(StoreError::InvalidValue { index: 0, .. })
            ));
            assert!(matches!(
                AttributeStore::check_write(&schema, 1, &MetaValue::OptionalBlockPosition(Some(pos))),
                Err(StoreError::InvalidValue { index: 1, .. })
            ));
        }

        let mut store = AttributeStore::new(Arc::new(schema));
        assert!(store.try_set(0, MetaValue::BlockPosition(BlockPos::new(0, 4096, 0))).is_err());
        assert!(!store.has_changes());
    }

    #[test]
    fn oversized_json_payloads_are_rejected() {
        let schema = limits();
        let huge = "a".repeat(3 * 1024 * 1024);
        let chat = ChatComponent::text(huge.clone());
        assert!(matches!(
            AttributeStore::check_write(&schema, 2, &MetaValue::Chat(chat.clone())),
            Err(StoreError::InvalidValue { index: 2, .. })
        ));
        assert!(matches!(
            AttributeStore::check_write(&schema, 3, &MetaValue::OptionalChat(Some(chat))),
            Err(StoreError::InvalidValue { index: 3, .. })
        ));

        let mut compound = Compound::new();
        compound.insert("lore", huge);
        assert!(matches!(
            AttributeStore::check_write(&schema, 4, &MetaValue::Compound(compound.clone())),
            Err(StoreError::InvalidValue { index: 4, .. })
        ));
        let mut stack = ItemStack::new(1, 1);
        stack.tag = Some(compound);
        assert!(matches!(
            AttributeStore::check_write(&schema, 5, &MetaValue::ItemStack(Some(stack))),
            Err(StoreError::InvalidValue { index: 5, .. })
        ));

        let small = ChatComponent::text("a".repeat(1024));
        assert!(AttributeStore::check_write(&schema, 2, &MetaValue::Chat(small)).is_ok());
    }

    #[test]
    fn flags_toggle_individual_bits() {
        let mut store = AttributeStore::new(schema());
        assert!(store.set_flag(0, 0x01, true));
        assert!(store.set_flag(0, 0x20, true));
        assert!(!store.set_flag(0, 0x20, true));
        assert!(store.flag(0, 0x01));
        assert!(store.flag(0, 0x20));
        assert!(!store.flag(0, 0x02));
        assert!(store.set_flag(0, 0x01, false));
        assert_eq!(store.read::<i8>(0), 0x20);
    }

    #[test]
    fn entry_reports_dirty_state() {
        let mut store = AttributeStore::new(schema());
        assert_eq!(store.entry(1), None);
        store.write(1, 3_i32);
        let entry = store.entry(1).unwrap();
        assert_eq!(entry.kind, ValueKind::VarInt);
        assert!(entry.dirty);
        store.drain_dirty();
        assert!(!store.entry(1).unwrap().dirty);
    }
}
