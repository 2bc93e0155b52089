//! Attribute layers of the built-in entity hierarchy.
//!
//! Bases are pinned to the protocol layout so a mistake in a parent's count
//! surfaces as a schema violation at startup instead of a client desync.

use entsync_core::EntityBody;
use entsync_metadata::{
    ChatComponent, FieldDef, ItemStack, LayerDef, MetaType, MetaValue, Pose, ValueKind,
    VillagerData,
};

fn byte_zero() -> MetaValue {
    MetaValue::Byte(0)
}

fn varint_zero() -> MetaValue {
    MetaValue::VarInt(0)
}

fn air_supply() -> MetaValue {
    MetaValue::VarInt(300)
}

fn no() -> MetaValue {
    MetaValue::Boolean(false)
}

fn no_name() -> MetaValue {
    None::<ChatComponent>.into_value()
}

fn standing() -> MetaValue {
    MetaValue::Pose(Pose::Standing)
}

fn full_health() -> MetaValue {
    MetaValue::Float(1.0)
}

fn no_bed() -> MetaValue {
    MetaValue::OptionalBlockPosition(None)
}

fn empty_slot() -> MetaValue {
    None::<ItemStack>.into_value()
}

fn plains_novice() -> MetaValue {
    MetaValue::VillagerData(VillagerData::default())
}

/// Halve the hit-box on the transition to juvenile, double it on the way back.
pub fn scale_hitbox_for_juvenile(old: &MetaValue, new: &MetaValue, body: &mut EntityBody) {
    let factor = match (old, new) {
        (MetaValue::Boolean(false), MetaValue::Boolean(true)) => 0.5,
        (MetaValue::Boolean(true), MetaValue::Boolean(false)) => 2.0,
        _ => return,
    };
    body.bounding_box = body.bounding_box.scaled(factor);
    tracing::debug!(factor, bounding_box = ?body.bounding_box, "rescaled juvenile hit-box");
}

/// Every entity.
pub static ENTITY: LayerDef = LayerDef {
    name: "entity",
    count: 8,
    pinned_base: Some(0),
    fields: &[
        FieldDef::new("flags", 0, ValueKind::Byte, byte_zero),
        FieldDef::new("air_ticks", 1, ValueKind::VarInt, air_supply),
        FieldDef::new("custom_name", 2, ValueKind::OptionalChat, no_name),
        FieldDef::new("custom_name_visible", 3, ValueKind::Boolean, no),
        FieldDef::new("silent", 4, ValueKind::Boolean, no),
        FieldDef::new("no_gravity", 5, ValueKind::Boolean, no),
        FieldDef::new("pose", 6, ValueKind::Pose, standing),
        FieldDef::new("ticks_frozen", 7, ValueKind::VarInt, varint_zero),
    ],
};

/// Entities with health.
pub static LIVING: LayerDef = LayerDef {
    name: "living",
    count: 7,
    pinned_base: Some(8),
    fields: &[
        FieldDef::new("hand_states", 0, ValueKind::Byte, byte_zero),
        FieldDef::new("health", 1, ValueKind::Float, full_health),
        FieldDef::new("potion_effect_color", 2, ValueKind::VarInt, varint_zero),
        FieldDef::new("potion_effect_ambient", 3, ValueKind::Boolean, no),
        FieldDef::new("arrow_count", 4, ValueKind::VarInt, varint_zero),
        FieldDef::new("bee_stinger_count", 5, ValueKind::VarInt, varint_zero),
        FieldDef::new("bed_location", 6, ValueKind::OptionalBlockPosition, no_bed),
    ],
};

/// Entities driven by AI.
pub static MOB: LayerDef = LayerDef {
    name: "mob",
    count: 1,
    pinned_base: Some(15),
    fields: &[FieldDef::new("mob_flags", 0, ValueKind::Byte, byte_zero)],
};

/// Mobs that grow up.
pub static AGEABLE: LayerDef = LayerDef {
    name: "ageable",
    count: 1,
    pinned_base: Some(16),
    fields: &[FieldDef::new("baby", 0, ValueKind::Boolean, no)
        .with_effect(scale_hitbox_for_juvenile)],
};

/// Hostile mobs; reserves nothing of its own.
pub static MONSTER: LayerDef = LayerDef {
    name: "monster",
    count: 0,
    pinned_base: Some(16),
    fields: &[],
};

/// Zombies.
pub static ZOMBIE: LayerDef = LayerDef {
    name: "zombie",
    count: 3,
    pinned_base: Some(16),
    fields: &[
        FieldDef::new("baby", 0, ValueKind::Boolean, no).with_effect(scale_hitbox_for_juvenile),
        FieldDef::new("special_type", 1, ValueKind::VarInt, varint_zero),
        FieldDef::new("becoming_drowned", 2, ValueKind::Boolean, no),
    ],
};

/// Trading mobs.
pub static MERCHANT: LayerDef = LayerDef {
    name: "merchant",
    count: 1,
    pinned_base: Some(17),
    fields: &[FieldDef::new("head_shake_timer", 0, ValueKind::VarInt, varint_zero)],
};

/// Villagers.
pub static VILLAGER: LayerDef = LayerDef {
    name: "villager",
    count: 1,
    pinned_base: Some(18),
    fields: &[FieldDef::new("villager_data", 0, ValueKind::VillagerData, plains_novice)],
};

/// Pigs.
pub static PIG: LayerDef = LayerDef {
    name: "pig",
    count: 2,
    pinned_base: Some(17),
    fields: &[
        FieldDef::new("saddled", 0, ValueKind::Boolean, no),
        FieldDef::new("boost_time", 1, ValueKind::VarInt, varint_zero),
    ],
};

/// Dropped item entities.
pub static ITEM: LayerDef = LayerDef {
    name: "item",
    count: 1,
    pinned_base: Some(8),
    fields: &[FieldDef::new("item", 0, ValueKind::ItemStack, empty_slot)],
};

#[cfg(test)]
mod tests {
    use super::*;
    use entsync_core::BoundingBox;

    fn body() -> EntityBody {
        EntityBody::new(Default::default(), BoundingBox::new(1.0, 2.0, 1.0))
    }

    #[test]
    fn juvenile_effect_halves_and_restores() {
        let mut body = body();
        scale_hitbox_for_juvenile(&MetaValue::Boolean(false), &MetaValue::Boolean(true), &mut body);
        assert_eq!(body.bounding_box, BoundingBox::new(0.5, 1.0, 0.5));
        scale_hitbox_for_juvenile(&MetaValue::Boolean(true), &MetaValue::Boolean(false), &mut body);
        assert_eq!(body.bounding_box, BoundingBox::new(1.0, 2.0, 1.0));
    }

    #[test]
    fn juvenile_effect_ignores_non_transitions() {
        let mut body = body();
        scale_hitbox_for_juvenile(&MetaValue::Boolean(true), &MetaValue::Boolean(true), &mut body);
        scale_hitbox_for_juvenile(&MetaValue::VarInt(0), &MetaValue::VarInt(1), &mut body);
        assert_eq!(body.bounding_box, BoundingBox::new(1.0, 2.0, 1.0));
    }
}
