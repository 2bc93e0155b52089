//! Typed accessors over an [`AttributeStore`].
//!
//! Each view resolves its layer's base once when attached and exposes named
//! getters and setters for that layer. Derived views dereference to their
//! parent, so a [`ZombieView`] also answers every [`MobView`], [`LivingView`]
//! and [`EntityView`] method. Attaching fails when the store's schema does not
//! contain the view's layer.

use crate::flags::{EntityFlags, HandStates, MobFlags};
use crate::layers;
use entsync_core::BlockPos;
use entsync_metadata::{AttributeStore, ChatComponent, ItemStack, LayerDef, Pose, VillagerData};
use std::ops::{Deref, DerefMut};

/// A view that can be attached to a store whose schema contains its layers.
pub trait TypedView<'a>: Sized {
    /// Attach to `store`, or `None` if a required layer is missing.
    fn attach(store: &'a mut AttributeStore) -> Option<Self>;
}

fn base(store: &AttributeStore, layer: &LayerDef) -> Option<u8> {
    store.schema().base_of(layer)
}

macro_rules! parent_view {
    ($view:ident => $parent:ident via $field:ident) => {
        impl<'a> Deref for $view<'a> {
            type Target = $parent<'a>;

            fn deref(&self) -> &Self::Target {
                &self.$field
            }
        }

        impl<'a> DerefMut for $view<'a> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.$field
            }
        }
    };
}

/// Fields every entity carries.
#[derive(Debug)]
pub struct EntityView<'a> {
    store: &'a mut AttributeStore,
    base: u8,
}

impl<'a> TypedView<'a> for EntityView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::ENTITY)?;
        Some(Self { store, base })
    }
}

impl EntityView<'_> {
    /// Underlying store.
    pub fn store(&self) -> &AttributeStore {
        &*self.store
    }

    /// Underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut AttributeStore {
        &mut *self.store
    }

    /// Status bits.
    pub fn flags(&self) -> EntityFlags {
        EntityFlags::from_bits_retain(self.store.read::<i8>(self.base) as u8)
    }

    /// Replace all status bits.
    pub fn set_flags(&mut self, flags: EntityFlags) {
        let index = self.base;
        self.store.write(index, flags.bits() as i8);
    }

    fn set_flag(&mut self, flag: EntityFlags, on: bool) {
        let index = self.base;
        self.store.set_flag(index, flag.bits(), on);
    }

    /// Whether the entity renders as burning.
    pub fn is_on_fire(&self) -> bool {
        self.flags().contains(EntityFlags::ON_FIRE)
    }

    /// Set the burning bit.
    pub fn set_on_fire(&mut self, on_fire: bool) {
        self.set_flag(EntityFlags::ON_FIRE, on_fire);
    }

    /// Whether the entity is crouching.
    pub fn is_crouching(&self) -> bool {
        self.flags().contains(EntityFlags::CROUCHING)
    }

    /// Set the crouching bit.
    pub fn set_crouching(&mut self, crouching: bool) {
        self.set_flag(EntityFlags::CROUCHING, crouching);
    }

    /// Whether the entity is sprinting.
    pub fn is_sprinting(&self) -> bool {
        self.flags().contains(EntityFlags::SPRINTING)
    }

    /// Set the sprinting bit.
    pub fn set_sprinting(&mut self, sprinting: bool) {
        self.set_flag(EntityFlags::SPRINTING, sprinting);
    }

    /// Whether the entity is invisible.
    pub fn is_invisible(&self) -> bool {
        self.flags().contains(EntityFlags::INVISIBLE)
    }

    /// Set the invisibility bit.
    pub fn set_invisible(&mut self, invisible: bool) {
        self.set_flag(EntityFlags::INVISIBLE, invisible);
    }

    /// Whether the entity has the glowing outline.
    pub fn is_glowing(&self) -> bool {
        self.flags().contains(EntityFlags::GLOWING)
    }

    /// Set the glowing bit.
    pub fn set_glowing(&mut self, glowing: bool) {
        self.set_flag(EntityFlags::GLOWING, glowing);
    }

    /// Remaining air in ticks.
    pub fn air_ticks(&self) -> i32 {
        self.store.read(self.base + 1)
    }

    /// Set remaining air.
    pub fn set_air_ticks(&mut self, ticks: i32) {
        let index = self.base + 1;
        self.store.write(index, ticks);
    }

    /// Name tag text, if any.
    pub fn custom_name(&self) -> Option<ChatComponent> {
        self.store.read(self.base + 2)
    }

    /// Set or clear the name tag.
    pub fn set_custom_name(&mut self, name: Option<ChatComponent>) {
        let index = self.base + 2;
        self.store.write(index, name);
    }

    /// Whether the name tag renders without looking at the entity.
    pub fn is_custom_name_visible(&self) -> bool {
        self.store.read(self.base + 3)
    }

    /// Set name tag visibility.
    pub fn set_custom_name_visible(&mut self, visible: bool) {
        let index = self.base + 3;
        self.store.write(index, visible);
    }

    /// Whether the entity makes no sounds.
    pub fn is_silent(&self) -> bool {
        self.store.read(self.base + 4)
    }

    /// Set silence.
    pub fn set_silent(&mut self, silent: bool) {
        let index = self.base + 4;
        self.store.write(index, silent);
    }

    /// Whether gravity is disabled.
    pub fn has_no_gravity(&self) -> bool {
        self.store.read(self.base + 5)
    }

    /// Enable or disable gravity.
    pub fn set_no_gravity(&mut self, no_gravity: bool) {
        let index = self.base + 5;
        self.store.write(index, no_gravity);
    }

    /// Body pose.
    pub fn pose(&self) -> Pose {
        self.store.read(self.base + 6)
    }

    /// Set the body pose.
    pub fn set_pose(&mut self, pose: Pose) {
        let index = self.base + 6;
        self.store.write(index, pose);
    }

    /// Ticks spent in powder snow.
    pub fn ticks_frozen(&self) -> i32 {
        self.store.read(self.base + 7)
    }

    /// Set ticks spent in powder snow.
    pub fn set_ticks_frozen(&mut self, ticks: i32) {
        let index = self.base + 7;
        self.store.write(index, ticks);
    }
}

/// Entities with health.
#[derive(Debug)]
pub struct LivingView<'a> {
    entity: EntityView<'a>,
    base: u8,
}

parent_view!(LivingView => EntityView via entity);

impl<'a> TypedView<'a> for LivingView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::LIVING)?;
        Some(Self {
            entity: EntityView::attach(store)?,
            base,
        })
    }
}

impl LivingView<'_> {
    /// Item-use state.
    pub fn hand_states(&self) -> HandStates {
        HandStates::from_bits_retain(self.store().read::<i8>(self.base) as u8)
    }

    /// Replace the item-use state.
    pub fn set_hand_states(&mut self, states: HandStates) {
        let index = self.base;
        self.store_mut().write(index, states.bits() as i8);
    }

    /// Whether an item is being used.
    pub fn is_hand_active(&self) -> bool {
        self.hand_states().contains(HandStates::HAND_ACTIVE)
    }

    /// Current health.
    pub fn health(&self) -> f32 {
        self.store().read(self.base + 1)
    }

    /// Set current health.
    pub fn set_health(&mut self, health: f32) {
        let index = self.base + 1;
        self.store_mut().write(index, health);
    }

    /// Particle color of active potion effects, 0 for none.
    pub fn potion_effect_color(&self) -> i32 {
        self.store().read(self.base + 2)
    }

    /// Set the potion particle color.
    pub fn set_potion_effect_color(&mut self, color: i32) {
        let index = self.base + 2;
        self.store_mut().write(index, color);
    }

    /// Whether potion particles are faint.
    pub fn is_potion_effect_ambient(&self) -> bool {
        self.store().read(self.base + 3)
    }

    /// Set faint potion particles.
    pub fn set_potion_effect_ambient(&mut self, ambient: bool) {
        let index = self.base + 3;
        self.store_mut().write(index, ambient);
    }

    /// Arrows stuck in the body.
    pub fn arrow_count(&self) -> i32 {
        self.store().read(self.base + 4)
    }

    /// Set arrows stuck in the body.
    pub fn set_arrow_count(&mut self, count: i32) {
        let index = self.base + 4;
        self.store_mut().write(index, count);
    }

    /// Bee stingers stuck in the body.
    pub fn bee_stinger_count(&self) -> i32 {
        self.store().read(self.base + 5)
    }

    /// Set bee stingers stuck in the body.
    pub fn set_bee_stinger_count(&mut self, count: i32) {
        let index = self.base + 5;
        self.store_mut().write(index, count);
    }

    /// Bed the entity sleeps in.
    pub fn bed_location(&self) -> Option<BlockPos> {
        self.store().read(self.base + 6)
    }

    /// Set or clear the bed.
    pub fn set_bed_location(&mut self, bed: Option<BlockPos>) {
        let index = self.base + 6;
        self.store_mut().write(index, bed);
    }
}

/// AI-driven entities.
#[derive(Debug)]
pub struct MobView<'a> {
    living: LivingView<'a>,
    base: u8,
}

parent_view!(MobView => LivingView via living);

impl<'a> TypedView<'a> for MobView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::MOB)?;
        Some(Self {
            living: LivingView::attach(store)?,
            base,
        })
    }
}

impl MobView<'_> {
    /// AI state bits.
    pub fn mob_flags(&self) -> MobFlags {
        MobFlags::from_bits_retain(self.store().read::<i8>(self.base) as u8)
    }

    fn set_mob_flag(&mut self, flag: MobFlags, on: bool) {
        let index = self.base;
        self.store_mut().set_flag(index, flag.bits(), on);
    }

    /// Whether the AI is switched off.
    pub fn has_no_ai(&self) -> bool {
        self.mob_flags().contains(MobFlags::NO_AI)
    }

    /// Switch the AI off or on.
    pub fn set_no_ai(&mut self, no_ai: bool) {
        self.set_mob_flag(MobFlags::NO_AI, no_ai);
    }

    /// Whether the main hand is the left one.
    pub fn is_left_handed(&self) -> bool {
        self.mob_flags().contains(MobFlags::LEFT_HANDED)
    }

    /// Set handedness.
    pub fn set_left_handed(&mut self, left_handed: bool) {
        self.set_mob_flag(MobFlags::LEFT_HANDED, left_handed);
    }

    /// Whether the mob is attacking.
    pub fn is_aggressive(&self) -> bool {
        self.mob_flags().contains(MobFlags::AGGRESSIVE)
    }

    /// Set the attacking bit.
    pub fn set_aggressive(&mut self, aggressive: bool) {
        self.set_mob_flag(MobFlags::AGGRESSIVE, aggressive);
    }
}

/// Mobs with a juvenile stage.
#[derive(Debug)]
pub struct AgeableView<'a> {
    mob: MobView<'a>,
    base: u8,
}

parent_view!(AgeableView => MobView via mob);

impl<'a> TypedView<'a> for AgeableView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::AGEABLE)?;
        Some(Self {
            mob: MobView::attach(store)?,
            base,
        })
    }
}

impl AgeableView<'_> {
    /// Whether the mob is juvenile.
    pub fn is_baby(&self) -> bool {
        self.store().read(self.base)
    }

    /// Switch between juvenile and adult; the hit-box follows on the next
    /// inbox run.
    pub fn set_baby(&mut self, baby: bool) {
        let index = self.base;
        self.store_mut().write(index, baby);
    }
}

/// Zombies.
#[derive(Debug)]
pub struct ZombieView<'a> {
    mob: MobView<'a>,
    base: u8,
}

parent_view!(ZombieView => MobView via mob);

impl<'a> TypedView<'a> for ZombieView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::ZOMBIE)?;
        Some(Self {
            mob: MobView::attach(store)?,
            base,
        })
    }
}

impl ZombieView<'_> {
    /// Whether the zombie is juvenile.
    pub fn is_baby(&self) -> bool {
        self.store().read(self.base)
    }

    /// Switch between juvenile and adult; the hit-box follows on the next
    /// inbox run.
    pub fn set_baby(&mut self, baby: bool) {
        let index = self.base;
        self.store_mut().write(index, baby);
    }

    /// Whether the zombie is converting after drowning.
    pub fn is_becoming_drowned(&self) -> bool {
        self.store().read(self.base + 2)
    }

    /// Set the drowning conversion bit.
    pub fn set_becoming_drowned(&mut self, becoming_drowned: bool) {
        let index = self.base + 2;
        self.store_mut().write(index, becoming_drowned);
    }
}

/// Villagers, including the merchant layer.
#[derive(Debug)]
pub struct VillagerView<'a> {
    ageable: AgeableView<'a>,
    merchant_base: u8,
    base: u8,
}

parent_view!(VillagerView => AgeableView via ageable);

impl<'a> TypedView<'a> for VillagerView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let merchant_base = base(store, &layers::MERCHANT)?;
        let base = base(store, &layers::VILLAGER)?;
        Some(Self {
            ageable: AgeableView::attach(store)?,
            merchant_base,
            base,
        })
    }
}

impl VillagerView<'_> {
    /// Ticks left of the "no trade" head shake.
    pub fn head_shake_timer(&self) -> i32 {
        self.store().read(self.merchant_base)
    }

    /// Start or stop the head shake.
    pub fn set_head_shake_timer(&mut self, ticks: i32) {
        let index = self.merchant_base;
        self.store_mut().write(index, ticks);
    }

    /// Biome type, profession and level.
    pub fn villager_data(&self) -> VillagerData {
        self.store().read(self.base)
    }

    /// Replace biome type, profession and level.
    pub fn set_villager_data(&mut self, data: VillagerData) {
        let index = self.base;
        self.store_mut().write(index, data);
    }
}

/// Pigs.
#[derive(Debug)]
pub struct PigView<'a> {
    ageable: AgeableView<'a>,
    base: u8,
}

parent_view!(PigView => AgeableView via ageable);

impl<'a> TypedView<'a> for PigView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::PIG)?;
        Some(Self {
            ageable: AgeableView::attach(store)?,
            base,
        })
    }
}

impl PigView<'_> {
    /// Whether a saddle is equipped.
    pub fn is_saddled(&self) -> bool {
        self.store().read(self.base)
    }

    /// Equip or remove the saddle.
    pub fn set_saddled(&mut self, saddled: bool) {
        let index = self.base;
        self.store_mut().write(index, saddled);
    }

    /// Remaining carrot-on-a-stick boost ticks.
    pub fn boost_time(&self) -> i32 {
        self.store().read(self.base + 1)
    }

    /// Set remaining boost ticks.
    pub fn set_boost_time(&mut self, ticks: i32) {
        let index = self.base + 1;
        self.store_mut().write(index, ticks);
    }
}

/// Dropped item entities.
#[derive(Debug)]
pub struct ItemView<'a> {
    entity: EntityView<'a>,
    base: u8,
}

parent_view!(ItemView => EntityView via entity);

impl<'a> TypedView<'a> for ItemView<'a> {
    fn attach(store: &'a mut AttributeStore) -> Option<Self> {
        let base = base(store, &layers::ITEM)?;
        Some(Self {
            entity: EntityView::attach(store)?,
            base,
        })
    }
}

impl ItemView<'_> {
    /// Carried stack, `None` when empty.
    pub fn item(&self) -> Option<ItemStack> {
        self.store().read(self.base)
    }

    /// Replace the carried stack.
    pub fn set_item(&mut self, item: Option<ItemStack>) {
        let index = self.base;
        self.store_mut().write(index, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EntityKind, SchemaRegistry};
    use entsync_metadata::MetaValue;

    fn store(kind: EntityKind) -> AttributeStore {
        let registry = SchemaRegistry::build().unwrap();
        AttributeStore::new(registry.schema(kind).clone())
    }

    #[test]
    fn defaults_read_through_views() {
        let mut store = store(EntityKind::Zombie);
        let zombie = ZombieView::attach(&mut store).unwrap();
        assert!(!zombie.is_baby());
        assert_eq!(zombie.air_ticks(), 300);
        assert_eq!(zombie.health(), 1.0);
        assert_eq!(zombie.pose(), Pose::Standing);
        assert_eq!(zombie.custom_name(), None);
        assert!(!zombie.has_no_ai());
    }

    #[test]
    fn setters_land_at_layer_offsets() {
        let mut store = store(EntityKind::Zombie);
        {
            let mut zombie = ZombieView::attach(&mut store).unwrap();
            zombie.set_becoming_drowned(true);
            zombie.set_health(12.5);
            zombie.set_aggressive(true);
        }
        assert_eq!(store.value(18), MetaValue::Boolean(true));
        assert_eq!(store.value(9), MetaValue::Float(12.5));
        assert_eq!(store.value(15), MetaValue::Byte(0x04));
        assert_eq!(
            store.drain_dirty().into_iter().map(|(i, _)| i).collect::<Vec<_>>(),
            vec![9, 15, 18]
        );
    }

    #[test]
    fn flag_setters_touch_only_their_bit() {
        let mut store = store(EntityKind::Pig);
        let mut pig = PigView::attach(&mut store).unwrap();
        pig.set_on_fire(true);
        pig.set_glowing(true);
        pig.set_on_fire(false);
        assert_eq!(pig.flags(), EntityFlags::GLOWING);
        assert!(pig.is_glowing());
        assert!(!pig.is_on_fire());
    }

    #[test]
    fn attach_requires_the_layer() {
        let mut store = store(EntityKind::Item);
        assert!(ZombieView::attach(&mut store).is_none());
        assert!(LivingView::attach(&mut store).is_none());
        assert!(EntityView::attach(&mut store).is_some());
        let mut item = ItemView::attach(&mut store).unwrap();
        item.set_item(Some(ItemStack::new(1, 64)));
        assert_eq!(item.item(), Some(ItemStack::new(1, 64)));
    }

    #[test]
    fn villager_reaches_both_its_layers() {
        let mut store = store(EntityKind::Villager);
        let mut villager = VillagerView::attach(&mut store).unwrap();
        let data = VillagerData {
            villager_type: 0,
            profession: 5,
            level: 3,
        };
        villager.set_villager_data(data);
        villager.set_head_shake_timer(40);
        assert_eq!(villager.villager_data(), data);
        assert_eq!(villager.head_shake_timer(), 40);
        assert!(!villager.is_baby());
        assert_eq!(store.value(17), MetaValue::VarInt(40));
    }
}
