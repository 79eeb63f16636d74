//! Mobs: templates on disk, instances in memory.

use crate::{
  character::Character,
  data::{Record, Registries},
  item::{DiceRoll, Item},
};
use lm_common::id::{ItemId, MobId, MobInstanceId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

/// A passive mob record, `mobs/<zone>/<id>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobTemplate {
  pub id:   MobId,
  pub zone: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default = "default_level")]
  pub level: u32,
  /// Stat name to base value.
  #[serde(default)]
  pub stats: HashMap<String, i32>,
  /// Hostile mobs attack players on sight.
  #[serde(default)]
  pub hostile: bool,
  /// Commands the mob runs when idle, chosen at random.
  #[serde(default)]
  pub idle_commands: Vec<String>,
  #[serde(default)]
  pub damage: DiceRoll,
  /// Experience granted to the killer.
  #[serde(default)]
  pub experience: u64,
  #[serde(default)]
  pub gold: u64,
  /// Items spawned into the mob's backpack (and dropped in its corpse).
  #[serde(default)]
  pub items: Vec<ItemId>,
}

fn default_level() -> u32 { 1 }

impl Record for MobTemplate {
  type Id = MobId;

  fn id(&self) -> MobId { self.id }
  fn validate(&self) -> Result<(), String> {
    if self.name.is_empty() {
      return Err("mob has no name".into());
    }
    if self.zone.is_empty() {
      return Err("mob has no zone".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("mobs/{}/{}.yaml", self.zone, self.id).into() }
}

/// One live mob. Owned by the world store; the room only holds its id.
#[derive(Debug, Clone)]
pub struct Mob {
  pub template_id: MobId,
  pub instance_id: MobInstanceId,
  pub character:   Character,
  /// Player id to rounds of remaining hostility.
  pub hostility: HashMap<UserId, i32>,
  pub idle_commands: Vec<String>,
}

impl Mob {
  /// Builds an instance from its template, at full health, in the given
  /// room.
  pub fn spawn(
    template: &MobTemplate,
    instance_id: MobInstanceId,
    room_id: RoomId,
    reg: &Registries,
  ) -> Mob {
    let mut character = Character::new(template.name.clone());
    character.level = template.level;
    character.room_id = room_id;
    character.zone = template.zone.clone();
    character.gold = template.gold;
    for (name, base) in &template.stats {
      if let Ok(kind) = name.parse::<crate::character::StatKind>() {
        character.stats.get_mut(kind).base = *base;
      }
    }
    for id in &template.items {
      if let Some(t) = reg.items.get(id) {
        character.backpack.push(Item::of(t));
      }
    }
    character.recompute(&reg.items, &reg.buffs);
    character.health = character.health_max();
    character.mana = character.mana_max();
    Mob {
      template_id: template.id,
      instance_id,
      character,
      hostility: HashMap::new(),
      idle_commands: template.idle_commands.clone(),
    }
  }

  /// Marks a player hostile for the given number of rounds.
  pub fn add_hostility(&mut self, user: UserId, rounds: i32) {
    let entry = self.hostility.entry(user).or_insert(0);
    *entry = (*entry).max(rounds);
  }

  /// Decrements hostility clocks, dropping the expired ones.
  pub fn tick_hostility(&mut self) {
    self.hostility.retain(|_, rounds| {
      *rounds -= 1;
      *rounds > 0
    });
  }
}

/// Runs a semicolon-separated command string as a mob. Used for idle
/// commands, charm expiry, and the script `command` API.
pub fn execute_mob_commands(
  world: &crate::world::WorldStore,
  bus: &crate::event::EventBus,
  instance_id: MobInstanceId,
  commands: &str,
) {
  for cmd in commands.split(';') {
    let cmd = cmd.trim();
    if !cmd.is_empty() {
      execute_mob_command(world, bus, instance_id, cmd);
    }
  }
}

/// The small verb set mobs understand. Anything beyond this belongs in a
/// mob script.
fn execute_mob_command(
  world: &crate::world::WorldStore,
  bus: &crate::event::EventBus,
  instance_id: MobInstanceId,
  line: &str,
) {
  use crate::{
    character::Aggro,
    event::{ActorRef, CommsKind, Event, MessageTarget},
  };
  use rand::seq::SliceRandom;

  let mob = match world.mob(instance_id) {
    Some(m) => m,
    None => return,
  };
  let (name, room_id) = {
    let m = mob.lock();
    (m.character.name.clone(), m.character.room_id)
  };
  let (verb, rest) = match line.split_once(' ') {
    Some((v, r)) => (v, r.trim()),
    None => (line, ""),
  };
  match verb {
    "say" if !rest.is_empty() => {
      bus.enqueue(Event::Message {
        target: MessageTarget::Room(room_id, None),
        text:   format!("{name} says, \"{rest}\""),
      });
      bus.enqueue(Event::Communication {
        source:  ActorRef::Mob(instance_id),
        kind:    CommsKind::Say,
        name,
        message: rest.to_string(),
      });
    }
    "emote" if !rest.is_empty() => {
      bus.enqueue(Event::Message {
        target: MessageTarget::Room(room_id, None),
        text:   format!("{name} {rest}"),
      });
    }
    "go" | "wander" | "flee" => {
      let room = match world.room_if_loaded(room_id) {
        Some(r) => r,
        None => return,
      };
      let round = world.round();
      let target = {
        let room = room.lock();
        if verb == "go" && !rest.is_empty() {
          room.exit(rest, round).map(|e| e.target)
        } else {
          let exits: Vec<_> =
            room.exits.values().filter(|e| !e.expired(round) && e.lock.is_none()).collect();
          exits.choose(&mut rand::thread_rng()).map(|e| e.target)
        }
      };
      if let Some(target) = target {
        let _ = world.move_mob(bus, instance_id, target);
      }
    }
    "attack" if !rest.is_empty() => {
      let target = {
        let room = match world.room_if_loaded(room_id) {
          Some(r) => r,
          None => return,
        };
        let players: Vec<UserId> = room.lock().players.iter().copied().collect();
        players.into_iter().find(|id| {
          world
            .user(*id)
            .map(|u| u.name.to_ascii_lowercase().starts_with(&rest.to_ascii_lowercase()))
            .unwrap_or(false)
        })
      };
      if let Some(target) = target {
        mob.lock().character.aggro =
          Some(Aggro { target: ActorRef::User(target), rounds_waiting: 1 });
      }
    }
    _ => debug!("mob {instance_id} can't `{line}`"),
  }
}
