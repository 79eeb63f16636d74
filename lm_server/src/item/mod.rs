//! Items: the template/instance split.
//!
//! An [`ItemTemplate`] is a passive content record under `items/<id>.yaml`.
//! An [`Item`] is one copy of it in the world, owned by exactly one container
//! at a time (a backpack, an equipment slot, a floor, a room container, or a
//! corpse).

use crate::character::EquipSlot;
use lm_common::id::{ItemId, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `N d S + B` dice, used for weapon damage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceRoll {
  pub count: u32,
  pub sides: u32,
  pub bonus: i32,
}

impl DiceRoll {
  pub fn roll(&self, rng: &mut impl Rng) -> i32 {
    let mut total = self.bonus;
    for _ in 0..self.count {
      if self.sides > 0 {
        total += rng.gen_range(1..=self.sides) as i32;
      }
    }
    total
  }

  pub fn max(&self) -> i32 { self.bonus + (self.count * self.sides) as i32 }
}

/// A passive item record. See `data` for how these are loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTemplate {
  pub id:   ItemId,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Which slot this equips into; `None` for items that can't be worn.
  #[serde(default)]
  pub slot: Option<EquipSlot>,
  #[serde(default)]
  pub damage: DiceRoll,
  /// Base value in gold.
  #[serde(default)]
  pub value: u64,
  #[serde(default)]
  pub stat_mods: HashMap<String, i32>,
  /// Charges for usable items. −1 means unlimited.
  #[serde(default = "unlimited")]
  pub uses: i32,
}

fn unlimited() -> i32 { -1 }

/// One item in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
  pub id: ItemId,
  #[serde(default = "unlimited")]
  pub uses: i32,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub enchantments: Vec<String>,
  /// Set when the item lies on a room floor but is visible only to the user
  /// who stashed it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stashed_by: Option<UserId>,
}

impl Item {
  pub fn of(template: &ItemTemplate) -> Item {
    Item { id: template.id, uses: template.uses, enchantments: vec![], stashed_by: None }
  }

  /// Spends one charge. Returns false when the item is out of charges.
  pub fn spend_use(&mut self) -> bool {
    if self.uses < 0 {
      return true;
    }
    if self.uses == 0 {
      return false;
    }
    self.uses -= 1;
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dice_bounds() {
    let d = DiceRoll { count: 2, sides: 6, bonus: 1 };
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
      let v = d.roll(&mut rng);
      assert!((3..=13).contains(&v));
    }
    assert_eq!(d.max(), 13);
  }

  #[test]
  fn charges() {
    let t = ItemTemplate {
      id:          ItemId(1),
      name:        "torch".into(),
      description: String::new(),
      slot:        None,
      damage:      DiceRoll::default(),
      value:       2,
      stat_mods:   HashMap::new(),
      uses:        2,
    };
    let mut item = Item::of(&t);
    assert!(item.spend_use());
    assert!(item.spend_use());
    assert!(!item.spend_use());
  }
}
