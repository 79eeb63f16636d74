//! The `NewRound` pipeline bodies.

use crate::{
  character::{buffs::BuffFlag, Character},
  event::{ActorRef, Event, Flow},
  mob,
  script::{SMob, SRoom, SUser},
  Game,
};
use rand::Rng;
use rhai::Dynamic;
use std::sync::atomic::Ordering;

/// Poison damage per trigger.
const POISON_DAMAGE: i32 = 2;

fn round_of(ev: &Event) -> Option<u64> {
  match ev {
    Event::NewRound { round } => Some(*round),
    _ => None,
  }
}

/// Kicks users idle past the inactivity threshold and flags AFK ones.
pub(super) fn inactive_players(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  let afk_rounds = game.config.get::<_, u64>("users.afk-rounds");
  let evict_rounds = game.config.get::<_, u64>("users.inactivity-rounds");
  for user in game.world.users() {
    if user.is_zombie() {
      continue;
    }
    let idle = round.saturating_sub(user.last_input_round.load(Ordering::SeqCst));
    if idle >= afk_rounds {
      if !user.afk.swap(true, Ordering::SeqCst) {
        user.send_line("You drift off... (afk)");
      }
    } else {
      user.afk.store(false, Ordering::SeqCst);
    }
    if idle >= evict_rounds && !user.role.lock().is_admin() {
      info!("evicting {} (idle {idle} rounds)", user.name);
      user.send_line("The world tires of waiting for you.");
      let room_id = user.character.lock().room_id;
      game.bus.enqueue(Event::PlayerDrop { user_id: user.id, room_id });
      game.bus.enqueue(Event::PlayerDespawn { user_id: user.id });
      continue;
    }
    // The zone murmurs at people who linger.
    if user.afk.load(Ordering::SeqCst) && rand::thread_rng().gen_ratio(1, 10) {
      let zone = user.character.lock().zone.clone();
      let message = game.world.zone(&zone).and_then(|z| {
        use rand::seq::SliceRandom;
        z.lock().idle_messages.choose(&mut rand::thread_rng()).cloned()
      });
      if let Some(message) = message {
        user.send_line(&message);
      }
    }
  }
  Flow::Continue
}

/// Steps zone and room mutator decay clocks.
pub(super) fn update_mutators(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  let reg = &game.world.registries;
  for zone in game.world.zones() {
    let mut zone = zone.lock();
    for m in &mut zone.mutators {
      if m.started_round == 0 {
        m.started_round = round;
      }
    }
    zone
      .mutators
      .retain(|m| reg.mutators.get(&m.spec_id).map(|s| !m.decayed(s, round)).unwrap_or(false));
  }
  for (_, room) in game.world.resident_rooms() {
    let mut room = room.lock();
    for m in &mut room.mutators {
      if m.started_round == 0 {
        m.started_round = round;
      }
    }
    room
      .mutators
      .retain(|m| reg.mutators.get(&m.spec_id).map(|s| !m.decayed(s, round)).unwrap_or(false));
  }
  Flow::Continue
}

/// Flips day and night on the configured cadence.
pub(super) fn check_new_day(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  let day_rounds = game.config.get::<_, u64>("gameplay.day-rounds").max(1);
  let night_rounds = game.config.get::<_, u64>("gameplay.night-rounds").max(1);
  let phase = round % (day_rounds + night_rounds);
  let is_day = phase < day_rounds;
  if is_day != game.world.is_day() {
    game.world.set_day(is_day);
    game.bus.enqueue(Event::DayNightCycle { is_day });
  }
  Flow::Continue
}

/// Every so often, a loot goblin appears in an occupied room.
pub(super) fn spawn_loot_goblin(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  let cadence = game.config.get::<_, u64>("gameplay.loot-goblin-rounds");
  let template = game.config.get::<_, i64>("gameplay.loot-goblin-mob");
  if cadence == 0 || template <= 0 || round % cadence != 0 {
    return Flow::Continue;
  }
  let occupied: Vec<_> = game
    .world
    .resident_rooms()
    .into_iter()
    .filter(|(id, room)| !id.is_ephemeral() && !room.lock().players.is_empty())
    .collect();
  if occupied.is_empty() {
    return Flow::Continue;
  }
  let (room_id, _) = &occupied[rand::thread_rng().gen_range(0..occupied.len())];
  if let Some(instance) =
    game.world.spawn_mob(lm_common::id::MobId(template as u32), *room_id)
  {
    debug!("loot goblin {instance} spawned in room {room_id}");
    game.send_room(*room_id, None, "{yellow}Something small and greedy scurries in!{/}");
  }
  Flow::Continue
}

/// Shared per-round upkeep for one character. Returns the buff ids that
/// triggered this round.
fn character_round_tick(character: &mut Character, game: &Game) -> Vec<lm_common::id::BuffId> {
  character.cooldowns.tick_down();
  let triggered = character.buffs.trigger(&game.world.registries.buffs, None);
  character.cooldowns.prune();
  character.recompute(&game.world.registries.items, &game.world.registries.buffs);
  triggered
}

pub(super) fn user_round_tick(_ev: &Event, game: &Game) -> Flow {
  for user in game.world.users() {
    let (triggered, downed) = {
      let mut character = user.character.lock();
      if let Some(charm) = &mut character.charm {
        if charm.rounds_remaining != crate::character::CHARM_PERMANENT {
          charm.rounds_remaining -= 1;
        }
        if charm.expired() {
          character.charm = None;
        }
      }
      let triggered = character_round_tick(&mut character, game);
      (triggered, character.is_downed())
    };
    if !triggered.is_empty() {
      game.bus.enqueue(Event::BuffsTriggered {
        actor:    ActorRef::User(user.id),
        buff_ids: triggered,
      });
    }
    if downed {
      // Self-death resolves through the ordinary command path.
      game.bus.enqueue(Event::Input { user_id: user.id, text: "suicide".into(), ready_turn: 0 });
    }
  }
  Flow::Continue
}

pub(super) fn mob_round_tick(_ev: &Event, game: &Game) -> Flow {
  for (instance_id, mob_arc) in game.world.mob_instances() {
    let (triggered, dead, expired_charm) = {
      let mut mob = mob_arc.lock();
      mob.tick_hostility();
      let mut expired_charm = None;
      if let Some(charm) = &mut mob.character.charm {
        if charm.rounds_remaining != crate::character::CHARM_PERMANENT {
          charm.rounds_remaining -= 1;
        }
        if charm.expired() {
          expired_charm = Some(charm.expire_command.clone());
          mob.character.charm = None;
        }
      }
      let triggered = character_round_tick(&mut mob.character, game);
      (triggered, mob.character.is_downed(), expired_charm)
    };
    if let Some(commands) = expired_charm {
      mob::execute_mob_commands(&game.world, &game.bus, instance_id, &commands);
    }
    if !triggered.is_empty() {
      game.bus.enqueue(Event::BuffsTriggered {
        actor:    ActorRef::Mob(instance_id),
        buff_ids: triggered,
      });
    }
    if dead {
      super::kill_mob(game, instance_id, None);
    }
  }
  Flow::Continue
}

/// Re-seeds room spawns whose respawn timers have elapsed.
pub(super) fn handle_respawns(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  for (_, room_arc) in game.world.resident_rooms() {
    let mut room = room_arc.lock();
    if !room.prepared {
      continue;
    }
    for i in 0..room.spawns.len() {
      let spawn = &room.spawns[i];
      if spawn.instance.is_some() || spawn.mob.is_none() {
        continue;
      }
      if spawn.cleared_round == 0 || round < spawn.cleared_round + spawn.respawn_rounds {
        continue;
      }
      let spawn = room.spawns[i].clone();
      room.spawns[i].instance = game.world.seed_spawn(&mut room, &spawn);
      room.spawns[i].cleared_round = 0;
    }
  }
  Flow::Continue
}

/// Out-of-combat recovery.
pub(super) fn auto_heal(_ev: &Event, game: &Game) -> Flow {
  let in_combat: Vec<ActorRef> = combat_targets(game);
  for user in game.world.users() {
    if in_combat.contains(&ActorRef::User(user.id)) {
      continue;
    }
    let mut character = user.character.lock();
    if character.is_downed() {
      continue;
    }
    if character.aggro.is_some() {
      continue;
    }
    let heal = (character.stats.vitality.value_adj / 20).max(1);
    character.health = (character.health + heal).min(character.health_max());
    let mana = (character.stats.mysticism.value_adj / 20).max(1);
    character.mana = (character.mana + mana).min(character.mana_max());
  }
  Flow::Continue
}

/// Everyone currently targeted by someone's aggro.
fn combat_targets(game: &Game) -> Vec<ActorRef> {
  let mut out = vec![];
  for user in game.world.users() {
    if let Some(aggro) = user.character.lock().aggro {
      out.push(aggro.target);
    }
  }
  for (_, mob) in game.world.mob_instances() {
    if let Some(aggro) = mob.lock().character.aggro {
      out.push(aggro.target);
    }
  }
  out
}

/// Rolls idleness for mobs with nothing better to do.
pub(super) fn idle_mobs(_ev: &Event, game: &Game) -> Flow {
  let mut rng = rand::thread_rng();
  for (instance_id, mob) in game.world.mob_instances() {
    let busy = {
      let mob = mob.lock();
      mob.character.aggro.is_some() || mob.character.charm.is_some()
    };
    if !busy && rng.gen_ratio(1, 4) {
      game.bus.enqueue(Event::MobIdle { mob_instance_id: instance_id });
    }
  }
  Flow::Continue
}

/// `MobIdle` handler: hostile mobs pick fights, scripted mobs run
/// `on_idle`, and the rest mutter an idle command.
pub(super) fn handle_mob_idle(ev: &Event, game: &Game) -> Flow {
  let instance_id = match ev {
    Event::MobIdle { mob_instance_id } => *mob_instance_id,
    _ => return Flow::Continue,
  };
  let mob_arc = match game.world.mob(instance_id) {
    Some(m) => m,
    None => return Flow::Continue,
  };
  let (template_id, zone, room_id, hostile_to) = {
    let mob = mob_arc.lock();
    let hostile = game
      .world
      .registries
      .mobs
      .get(&mob.template_id)
      .map(|t| t.hostile)
      .unwrap_or(false);
    let hostile_to = if hostile || !mob.hostility.is_empty() {
      game
        .world
        .room_if_loaded(mob.character.room_id)
        .and_then(|room| room.lock().players.iter().next().copied())
    } else {
      None
    };
    (mob.template_id, mob.character.zone.clone(), mob.character.room_id, hostile_to)
  };

  if let Some(target) = hostile_to {
    mob_arc.lock().character.aggro = Some(crate::character::Aggro {
      target:         ActorRef::User(target),
      rounds_waiting: 1,
    });
    if let Some(user) = game.world.user(target) {
      let name = mob_arc.lock().character.name.clone();
      user.send_line(&format!("{{red}}{name} turns on you!{{/}}"));
    }
    return Flow::Continue;
  }

  let ctx = game.script_ctx();
  let args: Vec<Dynamic> = vec![
    Dynamic::from(SMob::wrap(&ctx, instance_id)),
    Dynamic::from(SRoom::wrap(&ctx, room_id)),
  ];
  let handled = game
    .scripts
    .mob_event(instance_id, template_id, &zone, "on_idle", args)
    .and_then(|d| d.as_bool().ok())
    .unwrap_or(false);
  if handled {
    return Flow::Continue;
  }

  let idle = {
    use rand::seq::SliceRandom;
    let mob = mob_arc.lock();
    mob.idle_commands.choose(&mut rand::thread_rng()).cloned()
  };
  if let Some(cmd) = idle {
    mob::execute_mob_commands(&game.world, &game.bus, instance_id, &cmd);
  }
  Flow::Continue
}

/// Spills decayed corpses onto the floor.
pub(super) fn decay_corpses(ev: &Event, game: &Game) -> Flow {
  let round = match round_of(ev) {
    Some(r) => r,
    None => return Flow::Continue,
  };
  for (_, room) in game.world.resident_rooms() {
    let mut room = room.lock();
    let gone = room.prune_corpses(round);
    for corpse in gone {
      room.items.extend(corpse.items);
      room.gold += corpse.gold;
    }
  }
  Flow::Continue
}

/// `Buff` event handler: deliver the start notification and the script's
/// `on_start`.
pub(super) fn buff_started(ev: &Event, game: &Game) -> Flow {
  let (actor, buff_id) = match ev {
    Event::Buff { actor, buff_id, .. } => (*actor, *buff_id),
    _ => return Flow::Continue,
  };
  let spec = match game.world.registries.buffs.get(&buff_id) {
    Some(s) => s,
    None => return Flow::Continue,
  };
  let ctx = game.script_ctx();
  let args: Vec<Dynamic> = match actor {
    ActorRef::User(id) => vec![Dynamic::from(SUser::wrap(&ctx, id))],
    ActorRef::Mob(id) => vec![Dynamic::from(SMob::wrap(&ctx, id))],
  };
  game.scripts.buff_event(buff_id, "on_start", args);
  with_buffs(game, actor, |buffs| buffs.started(buff_id));
  if !spec.secret {
    if let ActorRef::User(user_id) = actor {
      game.send_user(user_id, format!("{{cyan}}{} takes hold of you.{{/}}", spec.name));
    }
  }
  Flow::Continue
}

/// `BuffsTriggered` handler: scripts and the built-in poison effect.
pub(super) fn buffs_triggered(ev: &Event, game: &Game) -> Flow {
  let (actor, buff_ids) = match ev {
    Event::BuffsTriggered { actor, buff_ids } => (*actor, buff_ids.clone()),
    _ => return Flow::Continue,
  };
  let ctx = game.script_ctx();
  for buff_id in buff_ids {
    let spec = match game.world.registries.buffs.get(&buff_id) {
      Some(s) => s.clone(),
      None => continue,
    };
    let args: Vec<Dynamic> = match actor {
      ActorRef::User(id) => vec![Dynamic::from(SUser::wrap(&ctx, id))],
      ActorRef::Mob(id) => vec![Dynamic::from(SMob::wrap(&ctx, id))],
    };
    game.scripts.buff_event(buff_id, "on_trigger", args);
    if spec.flags.contains(&BuffFlag::Poison) {
      with_character(game, actor, |ch| ch.health -= POISON_DAMAGE);
      if let ActorRef::User(user_id) = actor {
        game.send_user(user_id, "{green}Poison burns through your veins.{/}");
      }
    }
  }
  Flow::Continue
}

fn with_buffs(game: &Game, actor: ActorRef, f: impl FnOnce(&mut crate::character::buffs::Buffs)) {
  with_character(game, actor, |ch| f(&mut ch.buffs));
}

fn with_character(game: &Game, actor: ActorRef, f: impl FnOnce(&mut Character)) {
  match actor {
    ActorRef::User(id) => {
      if let Some(user) = game.world.user(id) {
        f(&mut user.character.lock());
      }
    }
    ActorRef::Mob(id) => {
      if let Some(mob) = game.world.mob(id) {
        f(&mut mob.lock().character);
      }
    }
  }
}
