//! Attribute value kinds and the tagged value union.
//!
//! Every synchronized attribute carries exactly one [`ValueKind`]. The kind's
//! numeric tag precedes the value on the wire, so the set of tags is stable:
//! new kinds are appended, existing tags never change meaning.

use entsync_core::{BlockPos, Direction, Rotation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Wire-level discriminant for an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    /// Signed byte (often a bit set).
    Byte = 0,
    /// Variable-length 32-bit integer.
    VarInt = 1,
    /// 32-bit IEEE float.
    Float = 2,
    /// Length-prefixed UTF-8 string.
    String = 3,
    /// JSON text component.
    Chat = 4,
    /// Optional JSON text component.
    OptionalChat = 5,
    /// Item stack slot (may be empty).
    ItemStack = 6,
    /// Boolean.
    Boolean = 7,
    /// Three-float Euler rotation.
    Rotation = 8,
    /// Packed block position.
    BlockPosition = 9,
    /// Optional packed block position.
    OptionalBlockPosition = 10,
    /// Block face direction.
    Direction = 11,
    /// Optional 128-bit identifier (UUID).
    OptionalUuid = 12,
    /// Block state id.
    BlockState = 13,
    /// Structured compound data.
    Compound = 14,
    /// Particle id with its parameters.
    Particle = 15,
    /// Villager type, profession and level.
    VillagerData = 16,
    /// Optional non-negative variable-length integer.
    OptionalVarInt = 17,
    /// Entity pose.
    Pose = 18,
}

impl ValueKind {
    /// Every kind, in tag order.
    pub const ALL: [ValueKind; 19] = [
        ValueKind::Byte,
        ValueKind::VarInt,
        ValueKind::Float,
        ValueKind::String,
        ValueKind::Chat,
        ValueKind::OptionalChat,
        ValueKind::ItemStack,
        ValueKind::Boolean,
        ValueKind::Rotation,
        ValueKind::BlockPosition,
        ValueKind::OptionalBlockPosition,
        ValueKind::Direction,
        ValueKind::OptionalUuid,
        ValueKind::BlockState,
        ValueKind::Compound,
        ValueKind::Particle,
        ValueKind::VillagerData,
        ValueKind::OptionalVarInt,
        ValueKind::Pose,
    ];

    /// Tag written before the value on the wire.
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Resolve a wire tag.
    pub fn from_tag(tag: i32) -> Option<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Canonical snake_case name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueKind::Byte => "byte",
            ValueKind::VarInt => "varint",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Chat => "chat",
            ValueKind::OptionalChat => "optional_chat",
            ValueKind::ItemStack => "item_stack",
            ValueKind::Boolean => "boolean",
            ValueKind::Rotation => "rotation",
            ValueKind::BlockPosition => "block_position",
            ValueKind::OptionalBlockPosition => "optional_block_position",
            ValueKind::Direction => "direction",
            ValueKind::OptionalUuid => "optional_uuid",
            ValueKind::BlockState => "block_state",
            ValueKind::Compound => "compound",
            ValueKind::Particle => "particle",
            ValueKind::VillagerData => "villager_data",
            ValueKind::OptionalVarInt => "optional_varint",
            ValueKind::Pose => "pose",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON text component (`{"text": "..."}` and friends).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatComponent(pub Value);

impl ChatComponent {
    /// Plain text component.
    pub fn text(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String(text.into()));
        Self(Value::Object(map))
    }
}

/// Structured key/value data attached to items and entities.
///
/// Keys iterate in sorted order so the encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Compound(pub Map<String, Value>);

impl Compound {
    /// Empty compound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// A non-empty item stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Numeric item id.
    pub item_id: i32,
    /// Stack size.
    pub count: i8,
    /// Optional item data.
    pub tag: Option<Compound>,
}

impl ItemStack {
    /// Stack without item data.
    pub fn new(item_id: i32, count: i8) -> Self {
        Self {
            item_id,
            count,
            tag: None,
        }
    }
}

/// Block state id (0 is air).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockStateId(pub i32);

/// Particle id plus its opaque, length-prefixed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Particle {
    /// Particle type id.
    pub id: i32,
    /// Type-specific parameters.
    pub data: Vec<u8>,
}

/// Villager appearance and trade tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillagerData {
    /// Biome variant.
    pub villager_type: i32,
    /// Profession id.
    pub profession: i32,
    /// Trade level (1..=5).
    pub level: i32,
}

impl Default for VillagerData {
    fn default() -> Self {
        Self {
            villager_type: 2,
            profession: 0,
            level: 1,
        }
    }
}

/// Entity pose, driving the client's animation and hit-box choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pose {
    /// Upright.
    #[default]
    Standing = 0,
    /// Gliding with elytra.
    FallFlying = 1,
    /// In bed.
    Sleeping = 2,
    /// Swimming.
    Swimming = 3,
    /// Riptide spin.
    SpinAttack = 4,
    /// Crouching.
    Sneaking = 5,
    /// Long jump.
    LongJumping = 6,
    /// Death animation.
    Dying = 7,
}

impl Pose {
    /// Stable numeric representation.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the stable numeric representation.
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Pose::Standing),
            1 => Some(Pose::FallFlying),
            2 => Some(Pose::Sleeping),
            3 => Some(Pose::Swimming),
            4 => Some(Pose::SpinAttack),
            5 => Some(Pose::Sneaking),
            6 => Some(Pose::LongJumping),
            7 => Some(Pose::Dying),
            _ => None,
        }
    }
}

/// A synchronized attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// See [`ValueKind::Byte`].
    Byte(i8),
    /// See [`ValueKind::VarInt`].
    VarInt(i32),
    /// See [`ValueKind::Float`].
    Float(f32),
    /// See [`ValueKind::String`].
    String(String),
    /// See [`ValueKind::Chat`].
    Chat(ChatComponent),
    /// See [`ValueKind::OptionalChat`].
    OptionalChat(Option<ChatComponent>),
    /// See [`ValueKind::ItemStack`]; `None` is an empty slot.
    ItemStack(Option<ItemStack>),
    /// See [`ValueKind::Boolean`].
    Boolean(bool),
    /// See [`ValueKind::Rotation`].
    Rotation(Rotation),
    /// See [`ValueKind::BlockPosition`].
    BlockPosition(BlockPos),
    /// See [`ValueKind::OptionalBlockPosition`].
    OptionalBlockPosition(Option<BlockPos>),
    /// See [`ValueKind::Direction`].
    Direction(Direction),
    /// See [`ValueKind::OptionalUuid`].
    OptionalUuid(Option<u128>),
    /// See [`ValueKind::BlockState`].
    BlockState(BlockStateId),
    /// See [`ValueKind::Compound`].
    Compound(Compound),
    /// See [`ValueKind::Particle`].
    Particle(Particle),
    /// See [`ValueKind::VillagerData`].
    VillagerData(VillagerData),
    /// See [`ValueKind::OptionalVarInt`]; the inner value must be non-negative.
    OptionalVarInt(Option<i32>),
    /// See [`ValueKind::Pose`].
    Pose(Pose),
}

impl MetaValue {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            MetaValue::Byte(_) => ValueKind::Byte,
            MetaValue::VarInt(_) => ValueKind::VarInt,
            MetaValue::Float(_) => ValueKind::Float,
            MetaValue::String(_) => ValueKind::String,
            MetaValue::Chat(_) => ValueKind::Chat,
            MetaValue::OptionalChat(_) => ValueKind::OptionalChat,
            MetaValue::ItemStack(_) => ValueKind::ItemStack,
            MetaValue::Boolean(_) => ValueKind::Boolean,
            MetaValue::Rotation(_) => ValueKind::Rotation,
            MetaValue::BlockPosition(_) => ValueKind::BlockPosition,
            MetaValue::OptionalBlockPosition(_) => ValueKind::OptionalBlockPosition,
            MetaValue::Direction(_) => ValueKind::Direction,
            MetaValue::OptionalUuid(_) => ValueKind::OptionalUuid,
            MetaValue::BlockState(_) => ValueKind::BlockState,
            MetaValue::Compound(_) => ValueKind::Compound,
            MetaValue::Particle(_) => ValueKind::Particle,
            MetaValue::VillagerData(_) => ValueKind::VillagerData,
            MetaValue::OptionalVarInt(_) => ValueKind::OptionalVarInt,
            MetaValue::Pose(_) => ValueKind::Pose,
        }
    }

    /// Decoded-value equality used for no-op detection.
    ///
    /// Floats compare by bit pattern, so `NaN` is stable and `-0.0 != 0.0`
    /// (they encode differently).
    pub fn same_as(&self, other: &MetaValue) -> bool {
        match (self, other) {
            (MetaValue::Float(a), MetaValue::Float(b)) => a.to_bits() == b.to_bits(),
            (MetaValue::Rotation(a), MetaValue::Rotation(b)) => a.bits_eq(b),
            _ => self == other,
        }
    }
}

/// Rust types that map one-to-one onto a [`ValueKind`].
pub trait MetaType: Sized {
    /// Kind stored for this type.
    const KIND: ValueKind;

    /// Wrap into the tagged union.
    fn into_value(self) -> MetaValue;

    /// Extract from the tagged union; `None` when the kind differs.
    fn from_value(value: &MetaValue) -> Option<Self>;
}

macro_rules! meta_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl MetaType for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> MetaValue {
                MetaValue::$variant(self)
            }

            #[allow(clippy::clone_on_copy)]
            fn from_value(value: &MetaValue) -> Option<Self> {
                match value {
                    MetaValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    )*};
}

meta_type! {
    i8 => Byte,
    i32 => VarInt,
    f32 => Float,
    String => String,
    ChatComponent => Chat,
    Option<ChatComponent> => OptionalChat,
    Option<ItemStack> => ItemStack,
    bool => Boolean,
    Rotation => Rotation,
    BlockPos => BlockPosition,
    Option<BlockPos> => OptionalBlockPosition,
    Direction => Direction,
    Option<u128> => OptionalUuid,
    BlockStateId => BlockState,
    Compound => Compound,
    Particle => Particle,
    VillagerData => VillagerData,
    Option<i32> => OptionalVarInt,
    Pose => Pose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable_and_dense() {
        for (i, kind) in ValueKind::ALL.iter().enumerate() {
            assert_eq!(kind.tag(), i as i32);
            assert_eq!(ValueKind::from_tag(i as i32), Some(*kind));
        }
        assert_eq!(ValueKind::from_tag(19), None);
        assert_eq!(ValueKind::from_tag(-1), None);
    }

    #[test]
    fn meta_type_kind_matches_value_kind() {
        assert_eq!(true.into_value().kind(), <bool as MetaType>::KIND);
        assert_eq!(Pose::Sneaking.into_value().kind(), ValueKind::Pose);
        assert_eq!(Some(3_i32).into_value().kind(), ValueKind::OptionalVarInt);
        assert_eq!(<i32 as MetaType>::from_value(&MetaValue::Boolean(true)), None);
    }

    #[test]
    fn same_as_compares_floats_bitwise() {
        let nan = MetaValue::Float(f32::NAN);
        assert!(nan.same_as(&nan.clone()));
        assert!(!MetaValue::Float(0.0).same_as(&MetaValue::Float(-0.0)));
        assert!(MetaValue::Float(1.5).same_as(&MetaValue::Float(1.5)));
    }

    #[test]
    fn same_as_never_matches_across_kinds() {
        assert!(!MetaValue::VarInt(1).same_as(&MetaValue::OptionalVarInt(Some(1))));
    }

    #[test]
    fn pose_round_trips_numeric_form() {
        for raw in 0..8 {
            let pose = Pose::from_i32(raw).expect("valid pose");
            assert_eq!(pose.as_i32(), raw);
        }
        assert_eq!(Pose::from_i32(8), None);
    }
}
