//! Index allocation across an entity type lineage.
//!
//! Each level of a type hierarchy (entity → living → mob → zombie) is a
//! [`LayerDef`] declaring how many indices it reserves. [`SchemaBuilder`]
//! stacks the layers root-first, giving every layer the base
//! `parent.base + parent.count`, validates the result once, and produces an
//! immutable [`EntitySchema`] shared by every instance of the type.

use crate::codec::MAX_INDEX;
use crate::value::{MetaValue, ValueKind};
use entsync_core::EntityBody;
use std::fmt;
use thiserror::Error;

/// Follow-up action bound to a field: `(old, new, body)`.
///
/// Runs on the owning entity's context after the triggering write commits.
pub type EffectFn = fn(old: &MetaValue, new: &MetaValue, body: &mut EntityBody);

/// One field declared by a layer, addressed relative to the layer base.
#[derive(Clone, Copy)]
pub struct FieldDef {
    /// Field name, unique within its layer.
    pub name: &'static str,
    /// Offset from the layer base.
    pub slot: u8,
    /// Value kind stored at this field.
    pub kind: ValueKind,
    /// Value reported while the field has never been written.
    pub default: fn() -> MetaValue,
    /// Side effect run after each value-changing write.
    pub effect: Option<EffectFn>,
}

impl FieldDef {
    /// Field without a side effect.
    pub const fn new(
        name: &'static str,
        slot: u8,
        kind: ValueKind,
        default: fn() -> MetaValue,
    ) -> Self {
        Self {
            name,
            slot,
            kind,
            default,
            effect: None,
        }
    }

    /// Bind a side effect to this field.
    pub const fn with_effect(mut self, effect: EffectFn) -> Self {
        self.effect = Some(effect);
        self
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("kind", &self.kind)
            .field("effect", &self.effect.is_some())
            .finish()
    }
}

/// One level of an entity type hierarchy.
#[derive(Debug)]
pub struct LayerDef {
    /// Layer name, unique within a lineage.
    pub name: &'static str,
    /// Number of indices reserved, including unused slots.
    pub count: u8,
    /// Base this layer expects to receive (protocol-pinned layouts).
    pub pinned_base: Option<u8>,
    /// Declared fields.
    pub fields: &'static [FieldDef],
}

/// Contiguous index range assigned to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetRange {
    /// First index.
    pub base: u8,
    /// Number of indices.
    pub count: u8,
}

impl OffsetRange {
    /// One past the last index.
    pub fn end(&self) -> u16 {
        self.base as u16 + self.count as u16
    }

    /// Whether `index` falls inside the range.
    pub fn contains(&self, index: u8) -> bool {
        index >= self.base && (index as u16) < self.end()
    }
}

/// A field with its absolute index resolved.
#[derive(Clone, Copy)]
pub struct ResolvedField {
    /// Absolute wire index.
    pub index: u8,
    /// Declaring layer.
    pub layer: &'static str,
    /// Field definition.
    pub def: &'static FieldDef,
}

impl ResolvedField {
    /// Field name.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Kind stored at this field.
    pub fn kind(&self) -> ValueKind {
        self.def.kind
    }

    /// Fresh default value.
    pub fn default_value(&self) -> MetaValue {
        (self.def.default)()
    }

    /// Bound side effect, if any.
    pub fn effect(&self) -> Option<EffectFn> {
        self.def.effect
    }
}

impl fmt::Debug for ResolvedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedField")
            .field("index", &self.index)
            .field("layer", &self.layer)
            .field("name", &self.def.name)
            .field("kind", &self.def.kind)
            .finish()
    }
}

/// Structural defect in a schema definition, detected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    /// A schema needs at least one layer.
    #[error("schema '{0}' has no layers")]
    Empty(&'static str),
    /// The root layer must start at index zero.
    #[error("root layer '{layer}' pinned at {base}, roots start at 0")]
    RootNotAtZero {
        /// Offending layer.
        layer: &'static str,
        /// Declared base.
        base: u8,
    },
    /// A layer expects a base below the one its ancestors leave free.
    #[error("layer '{layer}' pinned at {pinned} overlaps its ancestors (computed base {computed})")]
    BaseBelowComputed {
        /// Offending layer.
        layer: &'static str,
        /// Declared base.
        pinned: u8,
        /// Base computed from the ancestors.
        computed: u16,
    },
    /// A layer expects a base above the computed one, leaving a gap.
    #[error("layer '{layer}' pinned at {pinned} leaves a gap after its ancestors (computed base {computed})")]
    GapBeforeLayer {
        /// Offending layer.
        layer: &'static str,
        /// Declared base.
        pinned: u8,
        /// Base computed from the ancestors.
        computed: u16,
    },
    /// The same layer appears twice in one lineage.
    #[error("layer '{0}' appears twice in the lineage")]
    DuplicateLayer(&'static str),
    /// A field slot lies outside its layer's reserved count.
    #[error("field '{field}' in layer '{layer}' uses slot {slot} but the layer reserves {count}")]
    SlotOutOfRange {
        /// Declaring layer.
        layer: &'static str,
        /// Offending field.
        field: &'static str,
        /// Declared slot.
        slot: u8,
        /// Reserved count.
        count: u8,
    },
    /// Two fields claim the same slot.
    #[error("layer '{layer}' declares slot {slot} twice")]
    DuplicateSlot {
        /// Declaring layer.
        layer: &'static str,
        /// Offending slot.
        slot: u8,
    },
    /// The lineage needs more indices than the wire index byte allows.
    #[error("layer '{layer}' ends at {end}, past the last usable index {}", MAX_INDEX)]
    IndexOverflow {
        /// Offending layer.
        layer: &'static str,
        /// One past the layer's last index.
        end: u16,
    },
    /// A field default does not produce the field's declared kind.
    #[error("field '{field}' is declared {expected} but its default is {found}")]
    DefaultKindMismatch {
        /// Offending field.
        field: &'static str,
        /// Declared kind.
        expected: ValueKind,
        /// Kind of the default value.
        found: ValueKind,
    },
}

/// Immutable index layout for one concrete entity type.
#[derive(Debug)]
pub struct EntitySchema {
    name: &'static str,
    layers: Vec<(&'static str, OffsetRange)>,
    fields: Vec<Option<ResolvedField>>,
    fingerprint: u64,
}

impl EntitySchema {
    /// Start a schema for the named entity type.
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            layers: Vec::new(),
        }
    }

    /// Entity type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total number of indices reserved by the lineage.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the lineage reserves no indices.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Layers root-first with their ranges.
    pub fn layers(&self) -> impl Iterator<Item = (&'static str, OffsetRange)> + '_ {
        self.layers.iter().copied()
    }

    /// Range assigned to the named layer.
    pub fn range_of(&self, layer: &str) -> Option<OffsetRange> {
        self.layers
            .iter()
            .find(|(name, _)| *name == layer)
            .map(|(_, range)| *range)
    }

    /// Base index of `layer` if it is part of this lineage.
    pub fn base_of(&self, layer: &LayerDef) -> Option<u8> {
        self.range_of(layer.name).map(|range| range.base)
    }

    /// Field declared at `index`.
    pub fn field(&self, index: u8) -> Option<&ResolvedField> {
        self.fields.get(index as usize).and_then(Option::as_ref)
    }

    /// Every declared field in index order.
    pub fn fields(&self) -> impl Iterator<Item = &ResolvedField> + '_ {
        self.fields.iter().flatten()
    }

    /// Kind stored at `index`.
    pub fn kind_of(&self, index: u8) -> Option<ValueKind> {
        self.field(index).map(ResolvedField::kind)
    }

    /// Hash of the `(index, kind)` layout, for detecting peers on a different layout.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Accumulates layers root-first and validates them into an [`EntitySchema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: &'static str,
    layers: Vec<&'static LayerDef>,
}

impl SchemaBuilder {
    /// Append the next (more derived) layer.
    pub fn layer(mut self, layer: &'static LayerDef) -> Self {
        self.layers.push(layer);
        self
    }

    /// Compute offsets and validate the lineage.
    pub fn build(self) -> Result<EntitySchema, SchemaViolation> {
        if self.layers.is_empty() {
            return Err(SchemaViolation::Empty(self.name));
        }

        let mut layers: Vec<(&'static str, OffsetRange)> = Vec::with_capacity(self.layers.len());
        let mut fields: Vec<Option<ResolvedField>> = Vec::new();
        let mut next_base: u16 = 0;

        for (depth, layer) in self.layers.iter().copied().enumerate() {
            if layers.iter().any(|(name, _)| *name == layer.name) {
                return Err(SchemaViolation::DuplicateLayer(layer.name));
            }
            if let Some(pinned) = layer.pinned_base {
                if depth == 0 && pinned != 0 {
                    return Err(SchemaViolation::RootNotAtZero {
                        layer: layer.name,
                        base: pinned,
                    });
                }
                if (pinned as u16) < next_base {
                    return Err(SchemaViolation::BaseBelowComputed {
                        layer: layer.name,
                        pinned,
                        computed: next_base,
                    });
                }
                if (pinned as u16) > next_base {
                    return Err(SchemaViolation::GapBeforeLayer {
                        layer: layer.name,
                        pinned,
                        computed: next_base,
                    });
                }
            }

            let end = next_base + layer.count as u16;
            if end > MAX_INDEX as u16 + 1 {
                return Err(SchemaViolation::IndexOverflow {
                    layer: layer.name,
                    end,
                });
            }
            let range = OffsetRange {
                base: next_base as u8,
                count: layer.count,
            };
            fields.resize(end as usize, None);

            for def in layer.fields {
                if def.slot >= layer.count {
                    return Err(SchemaViolation::SlotOutOfRange {
                        layer: layer.name,
                        field: def.name,
                        slot: def.slot,
                        count: layer.count,
                    });
                }
                let found = (def.default)().kind();
                if found != def.kind {
                    return Err(SchemaViolation::DefaultKindMismatch {
                        field: def.name,
                        expected: def.kind,
                        found,
                    });
                }
                let index = range.base + def.slot;
                let slot = &mut fields[index as usize];
                if slot.is_some() {
                    return Err(SchemaViolation::DuplicateSlot {
                        layer: layer.name,
                        slot: def.slot,
                    });
                }
                *slot = Some(ResolvedField {
                    index,
                    layer: layer.name,
                    def,
                });
            }

            layers.push((layer.name, range));
            next_base = end;
        }

        let fingerprint = layout_fingerprint(&fields);
        tracing::debug!(
            schema = self.name,
            indices = fields.len(),
            fingerprint = %format!("{fingerprint:016x}"),
            "built entity schema"
        );
        Ok(EntitySchema {
            name: self.name,
            layers,
            fields,
            fingerprint,
        })
    }
}

fn layout_fingerprint(fields: &[Option<ResolvedField>]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(fields.len() as u32).to_le_bytes());
    for field in fields.iter().flatten() {
        hasher.update(&[field.index, field.kind() as u8]);
    }
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
