//! The in-world actor shared by users and mobs.

pub mod buffs;
pub mod stats;

use crate::{event::ActorRef, item::{Item, ItemTemplate}};
use buffs::{BuffSpec, Buffs};
use lm_common::id::{BuffId, ItemId, MobInstanceId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use strum_macros::{Display, EnumIter, EnumString};

pub use stats::{Alignment, Stat, StatKind, Stats, ALL_STATS};

/// The closed set of equipment slots.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EquipSlot {
  Weapon,
  Offhand,
  Head,
  Neck,
  Body,
  Belt,
  Gloves,
  Ring,
  Legs,
  Feet,
}

/// `rounds_remaining` value for a charm that never wears off.
pub const CHARM_PERMANENT: i32 = -1;

/// A charm: this actor follows the commands of `charmed_by` until the rounds
/// run out, then executes `expire_command` (semicolon-split).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charm {
  pub charmed_by:       lm_common::id::UserId,
  pub rounds_remaining: i32,
  #[serde(default)]
  pub expire_command: String,
}

impl Charm {
  pub fn expired(&self) -> bool {
    self.rounds_remaining != CHARM_PERMANENT && self.rounds_remaining <= 0
  }
}

/// A combat target, with the rounds still to wait before the attack lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggro {
  pub target:         ActorRef,
  pub rounds_waiting: i32,
}

/// Per-tag round counters for command and skill cooldowns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cooldowns(HashMap<String, i32>);

impl Cooldowns {
  /// Remaining rounds for a tag; 0 when not tracked.
  pub fn get(&self, tag: &str) -> i32 { self.0.get(tag).copied().unwrap_or(0).max(0) }

  pub fn set(&mut self, tag: impl Into<String>, rounds: i32) { self.0.insert(tag.into(), rounds); }

  /// Decrements every entry by one round.
  pub fn tick_down(&mut self) {
    for v in self.0.values_mut() {
      *v -= 1;
    }
  }

  /// Drops entries that reached 0.
  pub fn prune(&mut self) { self.0.retain(|_, v| *v > 0); }

  pub fn len(&self) -> usize { self.0.len() }
  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// An actor: a user's character, or the body of a mob instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
  pub name:          String,
  pub room_id:       RoomId,
  pub zone:          String,
  pub level:         u32,
  pub experience:    u64,
  pub action_points: i32,
  pub health:        i32,
  pub mana:          i32,
  /// −100..=100; see [`Alignment`].
  pub alignment: i8,
  pub gold:      u64,
  pub stats:     Stats,
  pub equipment: HashMap<EquipSlot, Item>,
  pub backpack:  Vec<Item>,
  /// Spell name to cast count. Negative means the spell is disabled.
  pub spell_book: HashMap<String, i32>,
  /// Skill name to rank.
  pub skills:     HashMap<String, i32>,
  pub cooldowns:  Cooldowns,
  pub buffs:      Buffs,
  pub adjectives: BTreeSet<String>,
  /// Lock id to the sequence that opens it.
  pub key_ring: HashMap<String, String>,
  #[serde(skip)]
  pub pet: Option<MobInstanceId>,
  #[serde(skip)]
  pub aggro: Option<Aggro>,
  #[serde(skip)]
  pub charm: Option<Charm>,
}

impl Default for Character {
  fn default() -> Self {
    Character {
      name:          String::new(),
      room_id:       RoomId::Void,
      zone:          String::new(),
      level:         1,
      experience:    0,
      action_points: 10,
      health:        1,
      mana:          0,
      alignment:     0,
      gold:          0,
      stats:         Stats::default(),
      equipment:     HashMap::new(),
      backpack:      vec![],
      spell_book:    HashMap::new(),
      skills:        HashMap::new(),
      cooldowns:     Cooldowns::default(),
      buffs:         Buffs::default(),
      adjectives:    BTreeSet::new(),
      key_ring:      HashMap::new(),
      pet:           None,
      aggro:         None,
      charm:         None,
    }
  }
}

impl Character {
  pub fn new(name: impl Into<String>) -> Character {
    Character { name: name.into(), ..Default::default() }
  }

  pub fn health_max(&self) -> i32 { 10 + self.level as i32 * 8 + self.stats.vitality.value_adj * 2 }
  pub fn mana_max(&self) -> i32 { 4 + self.level as i32 * 2 + self.stats.mysticism.value_adj * 2 }
  pub fn action_points_max(&self) -> i32 { 100 }

  pub fn is_downed(&self) -> bool { self.health <= 0 }

  pub fn alignment(&self) -> Alignment { Alignment::from_value(self.alignment) }

  /// Experience needed to finish the given level.
  pub fn experience_for_level(level: u32) -> u64 { (level as u64).pow(2) * 250 }

  /// Adds experience and returns the new level for every level crossed.
  pub fn grant_experience(&mut self, amount: u64) -> Vec<u32> {
    self.experience += amount;
    let mut gained = vec![];
    while self.experience >= Self::experience_for_level(self.level) {
      self.level += 1;
      gained.push(self.level);
    }
    gained
  }

  /// Recomputes stat modifiers (equipment + buffs) and every derived stat
  /// value. Call after anything that changes equipment, buffs, or level.
  pub fn recompute(
    &mut self,
    items: &HashMap<ItemId, ItemTemplate>,
    buff_specs: &HashMap<BuffId, BuffSpec>,
  ) {
    let mut mods: HashMap<StatKind, i32> = HashMap::new();
    for item in self.equipment.values() {
      if let Some(t) = items.get(&item.id) {
        for (stat, amount) in &t.stat_mods {
          if let Ok(kind) = stat.parse::<StatKind>() {
            *mods.entry(kind).or_default() += amount;
          }
        }
      }
    }
    for kind in ALL_STATS {
      let from_buffs = self.buffs.stat_mods(buff_specs, &kind.to_string());
      let total = mods.get(&kind).copied().unwrap_or(0) + from_buffs;
      self.stats.get_mut(kind).mods = total;
    }
    self.stats.recalculate(self.level);
    self.health = self.health.min(self.health_max());
    self.mana = self.mana.min(self.mana_max());
  }

  /// Whether the backpack has room for one more item.
  pub fn can_carry(&self) -> bool { self.backpack.len() < self.stats.carry_capacity() }

  /// Removes the first backpack item whose template matches, returning it.
  pub fn take_item(&mut self, id: ItemId) -> Option<Item> {
    let i = self.backpack.iter().position(|it| it.id == id)?;
    Some(self.backpack.remove(i))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn cooldown_prune_boundaries() {
    let mut cd = Cooldowns::default();
    cd.set("bash", 1);
    cd.set("kick", 0);
    cd.prune();
    // 0 is pruned, 1 survives and decrements to 0 next tick.
    assert_eq!(cd.get("kick"), 0);
    assert_eq!(cd.get("bash"), 1);
    cd.tick_down();
    assert_eq!(cd.get("bash"), 0);
    cd.prune();
    assert!(cd.is_empty());
  }

  #[test]
  fn experience_levels() {
    let mut c = Character::new("test");
    assert_eq!(c.level, 1);
    let gained = c.grant_experience(250);
    assert_eq!(gained, vec![2]);
    let gained = c.grant_experience(10);
    assert!(gained.is_empty());
  }

  #[test]
  fn charm_expiry() {
    let mut charm = Charm {
      charmed_by:       lm_common::id::UserId(1),
      rounds_remaining: 1,
      expire_command:   "emote shakes its head;flee".into(),
    };
    assert!(!charm.expired());
    charm.rounds_remaining -= 1;
    assert!(charm.expired());
    charm.rounds_remaining = CHARM_PERMANENT;
    assert!(!charm.expired());
  }
}
