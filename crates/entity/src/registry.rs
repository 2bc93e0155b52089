//! Entity kinds and the schema table built once at startup.

use crate::layers;
use entsync_core::BoundingBox;
use entsync_metadata::{EntitySchema, LayerDef, SchemaViolation};
use std::fmt;
use std::sync::Arc;

static ZOMBIE_LINEAGE: [&LayerDef; 5] = [
    &layers::ENTITY,
    &layers::LIVING,
    &layers::MOB,
    &layers::MONSTER,
    &layers::ZOMBIE,
];

static VILLAGER_LINEAGE: [&LayerDef; 6] = [
    &layers::ENTITY,
    &layers::LIVING,
    &layers::MOB,
    &layers::AGEABLE,
    &layers::MERCHANT,
    &layers::VILLAGER,
];

static PIG_LINEAGE: [&LayerDef; 5] = [
    &layers::ENTITY,
    &layers::LIVING,
    &layers::MOB,
    &layers::AGEABLE,
    &layers::PIG,
];

static ITEM_LINEAGE: [&LayerDef; 2] = [&layers::ENTITY, &layers::ITEM];

/// Concrete entity types known to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Hostile undead mob.
    Zombie,
    /// Trading mob.
    Villager,
    /// Passive farm animal.
    Pig,
    /// Dropped item stack.
    Item,
}

impl EntityKind {
    /// All kinds, in registry order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Zombie,
        EntityKind::Villager,
        EntityKind::Pig,
        EntityKind::Item,
    ];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Zombie => "zombie",
            EntityKind::Villager => "villager",
            EntityKind::Pig => "pig",
            EntityKind::Item => "item",
        }
    }

    /// Attribute layers root-first.
    pub fn lineage(self) -> &'static [&'static LayerDef] {
        match self {
            EntityKind::Zombie => &ZOMBIE_LINEAGE,
            EntityKind::Villager => &VILLAGER_LINEAGE,
            EntityKind::Pig => &PIG_LINEAGE,
            EntityKind::Item => &ITEM_LINEAGE,
        }
    }

    /// Adult hit-box at spawn.
    pub fn bounding_box(self) -> BoundingBox {
        match self {
            EntityKind::Zombie | EntityKind::Villager => BoundingBox::new(0.6, 1.95, 0.6),
            EntityKind::Pig => BoundingBox::new(0.9, 0.9, 0.9),
            EntityKind::Item => BoundingBox::new(0.25, 0.25, 0.25),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated schemas for every [`EntityKind`], shared by all instances.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Build and validate every schema.
    ///
    /// Any layout defect aborts startup here rather than desyncing clients later.
    pub fn build() -> Result<Self, SchemaViolation> {
        let schemas = EntityKind::ALL
            .iter()
            .map(|kind| {
                kind.lineage()
                    .iter()
                    .copied()
                    .fold(EntitySchema::builder(kind.as_str()), |builder, layer| {
                        builder.layer(layer)
                    })
                    .build()
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(kinds = schemas.len(), "entity schemas registered");
        Ok(Self { schemas })
    }

    /// Schema for `kind`.
    pub fn schema(&self, kind: EntityKind) -> &Arc<EntitySchema> {
        &self.schemas[kind.slot()]
    }

    /// Kind whose schema carries `fingerprint`.
    pub fn kind_by_fingerprint(&self, fingerprint: u64) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| self.schema(*kind).fingerprint() == fingerprint)
    }
}
