//! Bit-packed byte attributes.

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Status bits shared by every entity.
    pub struct EntityFlags: u8 {
        const ON_FIRE = 0x01;
        const CROUCHING = 0x02;
        const SPRINTING = 0x08;
        const SWIMMING = 0x10;
        const INVISIBLE = 0x20;
        const GLOWING = 0x40;
        const FLYING_WITH_ELYTRA = 0x80;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Item-use state of a living entity.
    pub struct HandStates: u8 {
        const HAND_ACTIVE = 0x01;
        const OFF_HAND = 0x02;
        const RIPTIDE_SPIN = 0x04;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// AI state of a mob.
    pub struct MobFlags: u8 {
        const NO_AI = 0x01;
        const LEFT_HANDED = 0x02;
        const AGGRESSIVE = 0x04;
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        EntityFlags::empty()
    }
}

impl Default for HandStates {
    fn default() -> Self {
        HandStates::empty()
    }
}

impl Default for MobFlags {
    fn default() -> Self {
        MobFlags::empty()
    }
}
