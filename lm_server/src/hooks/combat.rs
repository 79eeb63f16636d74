//! Attack resolution, once per round.
//!
//! Anyone (user or mob) carrying an aggro descriptor swings this round once
//! their wait runs out: attacks-per-round comes from Speed, hit chance from
//! the speed differential, damage from the weapon dice plus Strength.

use crate::{
  character::{buffs::BuffFlag, Character},
  command::builtin::combat::CORPSE_DECAY_ROUNDS,
  event::{ActorRef, Event, Flow},
  item::DiceRoll,
  script::{SMob, SRoom, SUser},
  world::Corpse,
  Game,
};
use lm_common::id::{MobInstanceId, UserId};
use rand::Rng;
use rhai::Dynamic;

/// Base chance (percent) to land a swing before the speed differential.
const BASE_HIT_CHANCE: i32 = 70;
/// Bonus from the Accuracy buff flag.
const ACCURACY_BONUS: i32 = 10;

struct Swing {
  attacker: ActorRef,
  target:   ActorRef,
}

pub(super) fn do_combat(_ev: &Event, game: &Game) -> Flow {
  // Collect due swings first; resolution mutates freely afterwards.
  let mut swings = vec![];
  for user in game.world.users() {
    let mut character = user.character.lock();
    if let Some(aggro) = &mut character.aggro {
      aggro.rounds_waiting -= 1;
      if aggro.rounds_waiting <= 0 {
        swings.push(Swing { attacker: ActorRef::User(user.id), target: aggro.target });
        aggro.rounds_waiting = 1;
      }
    }
  }
  for (instance_id, mob) in game.world.mob_instances() {
    let mut mob = mob.lock();
    if let Some(aggro) = &mut mob.character.aggro {
      aggro.rounds_waiting -= 1;
      if aggro.rounds_waiting <= 0 {
        swings.push(Swing { attacker: ActorRef::Mob(instance_id), target: aggro.target });
        aggro.rounds_waiting = 1;
      }
    }
  }

  for swing in swings {
    resolve_swing(game, &swing);
  }
  Flow::Continue
}

/// A point-in-time view of an actor, enough to resolve an attack.
struct Combatant {
  name:      String,
  room_id:   lm_common::id::RoomId,
  speed_adj: i32,
  str_adj:   i32,
  accuracy:  bool,
  weapon:    DiceRoll,
  alive:     bool,
}

fn snapshot(game: &Game, actor: ActorRef) -> Option<Combatant> {
  let build = |ch: &Character, weapon: DiceRoll| Combatant {
    name:      ch.name.clone(),
    room_id:   ch.room_id,
    speed_adj: ch.stats.speed.value_adj,
    str_adj:   ch.stats.strength.value_adj,
    accuracy:  ch.buffs.flag_active(BuffFlag::Accuracy),
    weapon,
    alive:     !ch.is_downed(),
  };
  match actor {
    ActorRef::User(id) => {
      let user = game.world.user(id)?;
      let character = user.character.lock();
      let weapon = character
        .equipment
        .get(&crate::character::EquipSlot::Weapon)
        .and_then(|item| game.world.registries.items.get(&item.id))
        .map(|t| t.damage)
        .unwrap_or(DiceRoll { count: 1, sides: 2, bonus: 0 });
      Some(build(&character, weapon))
    }
    ActorRef::Mob(id) => {
      let mob = game.world.mob(id)?;
      let mob = mob.lock();
      let weapon = game
        .world
        .registries
        .mobs
        .get(&mob.template_id)
        .map(|t| t.damage)
        .unwrap_or_default();
      Some(build(&mob.character, weapon))
    }
  }
}

fn clear_aggro(game: &Game, actor: ActorRef) {
  match actor {
    ActorRef::User(id) => {
      if let Some(user) = game.world.user(id) {
        user.character.lock().aggro = None;
      }
    }
    ActorRef::Mob(id) => {
      if let Some(mob) = game.world.mob(id) {
        mob.lock().character.aggro = None;
      }
    }
  }
}

fn resolve_swing(game: &Game, swing: &Swing) {
  let attacker = match snapshot(game, swing.attacker) {
    Some(a) if a.alive => a,
    _ => return,
  };
  let defender = match snapshot(game, swing.target) {
    Some(d) => d,
    None => {
      clear_aggro(game, swing.attacker);
      return;
    }
  };
  // Fights only happen face to face.
  if attacker.room_id != defender.room_id || !defender.alive {
    clear_aggro(game, swing.attacker);
    return;
  }

  // Starting a fight burns stealth and concentration.
  expire_combat_buffs(game, swing.attacker);

  let attacks = 1 + attacker.speed_adj / 50;
  let mut total_damage = 0;
  let mut hits = 0;
  let mut rng = rand::thread_rng();
  for _ in 0..attacks.max(1) {
    let mut chance = BASE_HIT_CHANCE + attacker.speed_adj - defender.speed_adj;
    if attacker.accuracy {
      chance += ACCURACY_BONUS;
    }
    let chance = chance.clamp(5, 95);
    if rng.gen_range(0..100) >= chance {
      continue;
    }
    hits += 1;
    total_damage += (attacker.weapon.roll(&mut rng) + attacker.str_adj / 10).max(1);
  }

  announce_swing(game, swing, &attacker.name, &defender.name, hits, total_damage);
  if total_damage == 0 {
    return;
  }

  let dead = apply_damage(game, swing.target, total_damage);
  if dead {
    match swing.target {
      ActorRef::Mob(instance_id) => {
        kill_mob(game, instance_id, swing.attacker.user_id());
        clear_aggro(game, swing.attacker);
      }
      ActorRef::User(user_id) => {
        player_downed(game, user_id, swing.attacker);
        clear_aggro(game, swing.attacker);
      }
    }
  } else if let ActorRef::Mob(instance_id) = swing.target {
    // Getting hit makes a mob fight back.
    if let (Some(mob), Some(attacker_id)) = (game.world.mob(instance_id), swing.attacker.user_id())
    {
      let mut mob = mob.lock();
      if mob.character.aggro.is_none() {
        mob.character.aggro =
          Some(crate::character::Aggro { target: swing.attacker, rounds_waiting: 1 });
      }
      mob.add_hostility(attacker_id, 30);
    }
  }
}

fn expire_combat_buffs(game: &Game, actor: ActorRef) {
  let apply = |ch: &mut Character| {
    ch.buffs.expire_flagged(BuffFlag::CancelIfCombat);
    ch.buffs.expire_flagged(BuffFlag::CancelOnAction);
    ch.buffs.expire_flagged(BuffFlag::Hidden);
  };
  match actor {
    ActorRef::User(id) => {
      if let Some(user) = game.world.user(id) {
        apply(&mut user.character.lock());
      }
    }
    ActorRef::Mob(id) => {
      if let Some(mob) = game.world.mob(id) {
        apply(&mut mob.lock().character);
      }
    }
  }
}

fn announce_swing(
  game: &Game,
  swing: &Swing,
  attacker: &str,
  defender: &str,
  hits: i32,
  damage: i32,
) {
  let (att_text, def_text) = if hits == 0 {
    (format!("You swing at {defender} and miss."), format!("{attacker} swings at you and misses."))
  } else {
    (
      format!("You hit {defender} for {{red}}{damage}{{/}} damage."),
      format!("{attacker} hits you for {{red}}{damage}{{/}} damage!"),
    )
  };
  if let Some(id) = swing.attacker.user_id() {
    game.send_user(id, att_text);
  }
  if let Some(id) = swing.target.user_id() {
    game.send_user(id, def_text);
  }
}

/// Applies damage; returns true if the target went down.
fn apply_damage(game: &Game, target: ActorRef, damage: i32) -> bool {
  match target {
    ActorRef::User(id) => match game.world.user(id) {
      Some(user) => {
        let mut character = user.character.lock();
        character.health -= damage;
        character.is_downed()
      }
      None => false,
    },
    ActorRef::Mob(id) => match game.world.mob(id) {
      Some(mob) => {
        let mut mob = mob.lock();
        mob.character.health -= damage;
        mob.character.is_downed()
      }
      None => false,
    },
  }
}

/// A player hit the floor. They stay down (the round tick turns it into a
/// death) so revives get a window; mob scripts hear about it right away.
fn player_downed(game: &Game, user_id: UserId, by: ActorRef) {
  if let Some(user) = game.world.user(user_id) {
    user.send_line("{red}You collapse!{/}");
    let room_id = user.character.lock().room_id;
    game.send_room(room_id, Some(user_id), format!("{} collapses!", user.name));
  }
  if let ActorRef::Mob(instance_id) = by {
    if let Some(mob) = game.world.mob(instance_id) {
      let (template_id, zone, room_id) = {
        let m = mob.lock();
        (m.template_id, m.character.zone.clone(), m.character.room_id)
      };
      let ctx = game.script_ctx();
      let args: Vec<Dynamic> = vec![
        Dynamic::from(SUser::wrap(&ctx, user_id)),
        Dynamic::from(SMob::wrap(&ctx, instance_id)),
        Dynamic::from(SRoom::wrap(&ctx, room_id)),
      ];
      game.scripts.mob_event(instance_id, template_id, &zone, "on_player_downed", args);
    }
  }
}

/// A mob dies: corpse with its carry, experience for the killer, script
/// farewell, instance teardown, VM prune.
pub(crate) fn kill_mob(game: &Game, instance_id: MobInstanceId, killer: Option<UserId>) {
  let mob_arc = match game.world.mob(instance_id) {
    Some(m) => m,
    None => return,
  };
  let round = game.world.round();
  let (template_id, zone, room_id, corpse, experience) = {
    let mut mob = mob_arc.lock();
    let items = mob.character.backpack.drain(..).collect();
    let experience = game
      .world
      .registries
      .mobs
      .get(&mob.template_id)
      .map(|t| t.experience)
      .unwrap_or(0);
    (
      mob.template_id,
      mob.character.zone.clone(),
      mob.character.room_id,
      Corpse {
        name: mob.character.name.clone(),
        source: ActorRef::Mob(instance_id),
        items,
        gold: mob.character.gold,
        decay_round: round + CORPSE_DECAY_ROUNDS,
      },
      experience,
    )
  };

  let ctx = game.script_ctx();
  let args: Vec<Dynamic> = vec![
    Dynamic::from(SMob::wrap(&ctx, instance_id)),
    Dynamic::from(SRoom::wrap(&ctx, room_id)),
  ];
  game.scripts.mob_event(instance_id, template_id, &zone, "on_death", args);

  game.send_room(room_id, None, format!("{{red}}{} dies!{{/}}", corpse.name));
  if let Some(room) = game.world.room_if_loaded(room_id) {
    room.lock().corpses.push(corpse);
  }

  if let Some(killer_id) = killer {
    if let Some(user) = game.world.user(killer_id) {
      let gained = user.character.lock().grant_experience(experience);
      for level in gained {
        game.bus.enqueue(Event::LevelUp { user_id: killer_id, new_level: level });
      }
    }
  }

  game.world.destroy_mob(instance_id);
  game.scripts.prune_mob_vm(instance_id);
}
