//! Rooms and everything that lives inside one.

use crate::{data::Record, event::ActorRef, item::Item, mutator::Mutator};
use lm_common::id::{ItemId, MobId, MobInstanceId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  path::PathBuf,
};

/// A lock on an exit or a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
  /// The id key rings remember solved sequences under.
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub difficulty: u8,
  #[serde(default)]
  pub unlocked: bool,
}

/// One exit out of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
  pub target: RoomId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lock: Option<Lock>,
  /// Secret exits don't show up in the room description.
  #[serde(default)]
  pub secret: bool,
  /// Set for script-made temporary exits; pruned once the round passes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temp_until_round: Option<u64>,
}

impl Exit {
  pub fn to(target: RoomId) -> Exit { Exit { target, ..Default::default() } }

  pub fn expired(&self, round: u64) -> bool {
    self.temp_until_round.map(|r| round >= r).unwrap_or(false)
  }
}

/// A container in a room: items, gold, an optional lock, and crafting
/// recipes (result item id to required ingredient ids).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
  pub items:   Vec<Item>,
  pub gold:    u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lock:    Option<Lock>,
  pub recipes: BTreeMap<ItemId, Vec<ItemId>>,
}

impl Container {
  /// The first recipe whose ingredient list is fully present, as
  /// (result, ingredients).
  pub fn ready_recipe(&self) -> Option<(ItemId, &[ItemId])> {
    self
      .recipes
      .iter()
      .find(|(_, needed)| self.missing_for(needed).is_empty())
      .map(|(result, needed)| (*result, needed.as_slice()))
  }

  /// Which ingredients of `needed` are not in the container yet, respecting
  /// multiplicity.
  pub fn missing_for(&self, needed: &[ItemId]) -> Vec<ItemId> {
    let mut have: HashMap<ItemId, usize> = HashMap::new();
    for item in &self.items {
      *have.entry(item.id).or_default() += 1;
    }
    let mut missing = vec![];
    for id in needed {
      match have.get_mut(id) {
        Some(n) if *n > 0 => *n -= 1,
        _ => missing.push(*id),
      }
    }
    missing
  }

  /// Removes one item per ingredient id. Call only after `missing_for`
  /// returned empty for the same list.
  pub fn consume(&mut self, needed: &[ItemId]) {
    for id in needed {
      if let Some(i) = self.items.iter().position(|it| it.id == *id) {
        self.items.remove(i);
      }
    }
  }
}

/// User-written text on a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sign {
  pub text: String,
  /// `None` for a public sign, else only this user sees it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visible_to: Option<UserId>,
  pub expires_round: u64,
}

/// What a room respawns over time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnInfo {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mob: Option<MobId>,
  pub items: Vec<ItemId>,
  pub gold:  u64,
  /// Rounds after a kill before the spawn comes back.
  pub respawn_rounds: u64,
  /// The live instance, if the spawned mob is currently alive.
  #[serde(skip)]
  pub instance: Option<MobInstanceId>,
  /// The round the spawned mob died. 0 when it never spawned.
  #[serde(skip)]
  pub cleared_round: u64,
}

/// A dead actor's remains, holding its loot until it decays.
#[derive(Debug, Clone)]
pub struct Corpse {
  pub name:        String,
  pub source:      ActorRef,
  pub items:       Vec<Item>,
  pub gold:        u64,
  pub decay_round: u64,
}

/// A node in the world graph. Template fields are persisted; everything the
/// simulation scribbles on at runtime is skipped and rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Room {
  pub id:    RoomId,
  pub zone:  String,
  pub title: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub biome: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub map_symbol: Option<char>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub map_legend: Option<String>,
  pub exits:      BTreeMap<String, Exit>,
  pub containers: BTreeMap<String, Container>,
  /// Loose items on the floor, stashed ones included.
  pub items: Vec<Item>,
  pub gold:  u64,
  pub signs: Vec<Sign>,
  pub spawns: Vec<SpawnInfo>,
  pub mutators: Vec<Mutator>,
  /// Script state that survives restarts (via the instance diff).
  pub perm_data: BTreeMap<String, String>,

  /// Script state that lives until the room unloads.
  #[serde(skip)]
  pub temp_data: HashMap<String, String>,
  #[serde(skip)]
  pub players: BTreeSet<UserId>,
  #[serde(skip)]
  pub mobs: Vec<MobInstanceId>,
  #[serde(skip)]
  pub corpses: Vec<Corpse>,
  /// Everyone who has been here, and the round they last were.
  #[serde(skip)]
  pub visitors: HashMap<ActorRef, u64>,
  #[serde(skip)]
  pub last_visited_round: u64,
  /// Set once the room has seeded its spawns after load.
  #[serde(skip)]
  pub prepared: bool,
}

impl Default for Room {
  fn default() -> Self {
    Room {
      id:    RoomId::Void,
      zone:  String::new(),
      title: String::new(),
      description: String::new(),
      biome: None,
      map_symbol: None,
      map_legend: None,
      exits: BTreeMap::new(),
      containers: BTreeMap::new(),
      items: vec![],
      gold: 0,
      signs: vec![],
      spawns: vec![],
      mutators: vec![],
      perm_data: BTreeMap::new(),
      temp_data: HashMap::new(),
      players: BTreeSet::new(),
      mobs: vec![],
      corpses: vec![],
      visitors: HashMap::new(),
      last_visited_round: 0,
      prepared: false,
    }
  }
}

impl Room {
  /// Records that an actor is here this round. Keeps `visitors` and
  /// `last_visited_round` in step; S1-style queries read both.
  pub fn mark_visited(&mut self, actor: ActorRef, round: u64) {
    self.visitors.insert(actor, round);
    self.last_visited_round = round;
  }

  /// A usable exit by name: present, not expired, not blocked by a live
  /// room mutator.
  pub fn exit(&self, name: &str, round: u64) -> Option<&Exit> {
    let exit = self.exits.get(name)?;
    if exit.expired(round) {
      return None;
    }
    Some(exit)
  }

  /// Exit names a player can see (secret and expired ones excluded).
  pub fn visible_exits(&self, round: u64) -> Vec<&str> {
    self
      .exits
      .iter()
      .filter(|(_, e)| !e.secret && !e.expired(round))
      .map(|(name, _)| name.as_str())
      .collect()
  }

  /// Floor items `user` can see: unstashed ones, plus their own stash.
  pub fn visible_items(&self, user: UserId) -> impl Iterator<Item = &Item> {
    self.items.iter().filter(move |i| i.stashed_by.map(|u| u == user).unwrap_or(true))
  }

  /// Signs `user` can read.
  pub fn visible_signs(&self, user: UserId) -> impl Iterator<Item = &Sign> {
    self.signs.iter().filter(move |s| s.visible_to.map(|u| u == user).unwrap_or(true))
  }

  /// Drops expired signs. Part of per-turn maintenance.
  pub fn prune_signs(&mut self, round: u64) {
    self.signs.retain(|s| s.expires_round > round);
  }

  /// Drops expired temporary exits. Part of per-turn maintenance.
  pub fn prune_temp_exits(&mut self, round: u64) {
    self.exits.retain(|_, e| !e.expired(round));
  }

  /// Drops decayed corpses, returning them so their loot can spill out.
  pub fn prune_corpses(&mut self, round: u64) -> Vec<Corpse> {
    let (gone, keep) = self.corpses.drain(..).partition(|c| c.decay_round <= round);
    self.corpses = keep;
    gone
  }
}

impl Record for Room {
  type Id = RoomId;

  fn id(&self) -> RoomId { self.id }
  fn validate(&self) -> Result<(), String> {
    if !matches!(self.id, RoomId::Persistent(_)) {
      return Err("room template ids must be persistent (below the ephemeral range)".into());
    }
    if self.zone.is_empty() {
      return Err("room has no zone".into());
    }
    if self.title.is_empty() {
      return Err("room has no title".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("rooms/{}/{}.yaml", self.zone, self.id).into() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn recipe_matching_s5() {
    let mut c = Container::default();
    c.recipes.insert(ItemId(9), vec![ItemId(3), ItemId(3), ItemId(5)]);

    let item = |id| Item { id: ItemId(id), uses: -1, enchantments: vec![], stashed_by: None };
    // One #3 and one #5: the duplicate ingredient is respected, so one #3 is
    // still missing.
    c.items.push(item(3));
    c.items.push(item(5));
    assert_eq!(c.ready_recipe(), None);
    assert_eq!(c.missing_for(&[ItemId(3), ItemId(3), ItemId(5)]), vec![ItemId(3)]);

    c.items.push(item(3));
    let (result, needed) = c.ready_recipe().expect("recipe should be ready");
    assert_eq!(result, ItemId(9));
    let needed = needed.to_vec();
    c.consume(&needed);
    assert!(c.items.is_empty());
  }

  #[test]
  fn temp_exit_expiry() {
    let mut room = Room { id: RoomId::Persistent(1), ..Default::default() };
    room.exits.insert("north".into(), Exit::to(RoomId::Persistent(2)));
    room
      .exits
      .insert("rift".into(), Exit { temp_until_round: Some(10), ..Exit::to(RoomId::Persistent(3)) });

    assert!(room.exit("rift", 9).is_some());
    assert!(room.exit("rift", 10).is_none());
    room.prune_temp_exits(10);
    assert_eq!(room.exits.len(), 1);
    assert_eq!(room.visible_exits(10), vec!["north"]);
  }

  #[test]
  fn sign_visibility() {
    let mut room = Room::default();
    room.signs.push(Sign { text: "public".into(), visible_to: None, expires_round: 100 });
    room.signs.push(Sign {
      text:          "private".into(),
      visible_to:    Some(UserId(7)),
      expires_round: 100,
    });

    assert_eq!(room.visible_signs(UserId(7)).count(), 2);
    assert_eq!(room.visible_signs(UserId(8)).count(), 1);
    room.prune_signs(100);
    assert!(room.signs.is_empty());
  }
}
