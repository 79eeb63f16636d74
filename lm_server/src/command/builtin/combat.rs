use crate::{
  character::{buffs::BuffFlag, Aggro},
  command::{matches_name, CommandCtx, CommandError, CommandSpec, Commands},
  event::ActorRef,
  script::{SRoom, SUser},
  world::Corpse,
  Game,
};
use lm_common::id::UserId;
use rhai::Dynamic;

/// Action points one swing of intent costs.
const ATTACK_AP_COST: i32 = 2;
/// Rounds a fled-from mob stays angry.
const FLEE_GRUDGE_ROUNDS: i32 = 30;
/// Rounds a corpse lingers before decaying.
pub(crate) const CORPSE_DECAY_ROUNDS: u64 = 120;

pub(super) fn register(c: &mut Commands) {
  c.add(
    CommandSpec::new("attack", "attack <target> - start a fight", attack)
      .blocked_by(&[BuffFlag::NoCombat]),
  );
  c.add(CommandSpec::new("flee", "flee - run from a fight", flee).blocked_by(&[BuffFlag::NoFlee]));
  c.add(
    CommandSpec::new("cast", "cast <spell> [target] - cast a spell", cast)
      .blocked_by(&[BuffFlag::NoCombat]),
  );
  c.add(CommandSpec::new("suicide", "suicide - give up the ghost", suicide).when_downed());
}

fn attack(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Attack what?");
    return Ok(true);
  }
  {
    let mut character = ctx.user.character.lock();
    if character.action_points < ATTACK_AP_COST {
      drop(character);
      ctx.reply("You're too winded to attack.");
      return Ok(true);
    }
    character.action_points -= ATTACK_AP_COST;
  }

  // Mobs first, then players (if PVP is on).
  let room = ctx.room.lock();
  for instance_id in room.mobs.clone() {
    if let Some(mob) = ctx.game.world.mob(instance_id) {
      let name = mob.lock().character.name.clone();
      if matches_name(&name, rest) {
        drop(room);
        ctx.user.character.lock().aggro =
          Some(Aggro { target: ActorRef::Mob(instance_id), rounds_waiting: 1 });
        mob.lock().add_hostility(ctx.user.id, FLEE_GRUDGE_ROUNDS);
        ctx.reply(format!("You size up {name} and move to attack!"));
        ctx.reply_room(format!("{} moves to attack {name}!", ctx.user.name));
        return Ok(true);
      }
    }
  }
  for other in room.players.clone() {
    if other == ctx.user.id {
      continue;
    }
    if let Some(target) = ctx.game.world.user(other) {
      if matches_name(&target.name, rest) {
        drop(room);
        if !ctx.game.config.get::<_, bool>("gameplay.pvp") {
          ctx.reply("This is a peaceful place; no fighting other players.");
          return Ok(true);
        }
        ctx.user.character.lock().aggro =
          Some(Aggro { target: ActorRef::User(other), rounds_waiting: 1 });
        ctx.reply(format!("You move to attack {}!", target.name));
        target.send_line(&format!("{} moves to attack you!", ctx.user.name));
        return Ok(true);
      }
    }
  }
  drop(room);
  ctx.reply("You don't see that here.");
  Ok(true)
}

fn flee(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  use rand::seq::SliceRandom;
  let round = ctx.game.world.round();
  let target = {
    let room = ctx.room.lock();
    let exits: Vec<_> = room
      .exits
      .values()
      .filter(|e| !e.expired(round) && e.lock.as_ref().map(|l| l.unlocked).unwrap_or(true))
      .map(|e| e.target)
      .collect();
    exits.choose(&mut rand::thread_rng()).copied()
  };
  let target = match target {
    Some(t) => t,
    None => {
      ctx.reply("There's nowhere to run!");
      return Ok(true);
    }
  };
  ctx.user.character.lock().aggro = None;
  ctx.reply_room(format!("{} flees!", ctx.user.name));
  match ctx.game.world.move_to_room(&ctx.game.bus, ctx.user.id, target) {
    Ok(arrived) => {
      ctx.reply("You run for it!");
      if let Some(room) = ctx.game.world.room_if_loaded(arrived) {
        ctx.room = room;
        super::look::show_room(ctx);
      }
    }
    Err(_) => ctx.reply("You stumble and get nowhere."),
  }
  Ok(true)
}

fn cast(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let (spell, target) = match rest.split_once(' ') {
    Some((s, t)) => (s, t.trim()),
    None => (rest, ""),
  };
  if spell.is_empty() {
    ctx.reply("Cast what?");
    return Ok(true);
  }
  let spell = spell.to_ascii_lowercase();
  {
    let character = ctx.user.character.lock();
    match character.spell_book.get(&spell) {
      Some(count) if *count >= 0 => {}
      Some(_) => {
        drop(character);
        ctx.reply("That spell refuses to come to mind.");
        return Ok(true);
      }
      None => {
        drop(character);
        ctx.reply("You don't know that spell.");
        return Ok(true);
      }
    }
    if character.cooldowns.get(&spell) > 0 {
      let left = character.cooldowns.get(&spell);
      drop(character);
      ctx.reply(format!("You can't cast that again yet ({left} rounds)."));
      return Ok(true);
    }
  }

  let sctx = ctx.game.script_ctx();
  let args: Vec<Dynamic> = vec![
    Dynamic::from(SUser::wrap(&sctx, ctx.user.id)),
    Dynamic::from(SRoom::wrap(&sctx, ctx.room_id())),
    target.into(),
  ];
  let allowed = ctx
    .game
    .scripts
    .spell_event(&spell, "on_cast", args)
    .and_then(|d| d.as_bool().ok())
    .unwrap_or(false);
  if !allowed {
    ctx.reply("The magic fizzles.");
    return Ok(true);
  }
  {
    let mut character = ctx.user.character.lock();
    *character.spell_book.entry(spell.clone()).or_insert(0) += 1;
    character.cooldowns.set(spell.clone(), 2);
  }
  Ok(true)
}

fn suicide(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  kill_user(ctx.game, ctx.user.id);
  Ok(true)
}

/// A user dies: their carried items spill into a corpse where they fell,
/// and they wake up in a fresh copy of the recovery room at partial health.
pub(crate) fn kill_user(game: &Game, user_id: UserId) {
  let user = match game.world.user(user_id) {
    Some(u) => u,
    None => return,
  };
  let round = game.world.round();
  let (room_id, corpse) = {
    let mut character = user.character.lock();
    let mut items: Vec<_> = character.backpack.drain(..).collect();
    // Equipment under PermaGear stays on.
    if !character.buffs.flag_active(BuffFlag::PermaGear) {
      let slots: Vec<_> = character.equipment.keys().copied().collect();
      for slot in slots {
        if let Some(item) = character.equipment.remove(&slot) {
          items.push(item);
        }
      }
    }
    let gold = character.gold;
    character.gold = 0;
    character.aggro = None;
    (
      character.room_id,
      Corpse {
        name: character.name.clone(),
        source: ActorRef::User(user_id),
        items,
        gold,
        decay_round: round + CORPSE_DECAY_ROUNDS,
      },
    )
  };

  // ReviveOnDeath consumes itself instead of the trip to the recovery room.
  let revived = user.character.lock().buffs.has_flag(
    BuffFlag::ReviveOnDeath,
    true,
    &game.world.registries.buffs,
  );
  if revived {
    let mut character = user.character.lock();
    character.health = character.health_max() / 2;
    character.backpack = corpse.items;
    character.gold = corpse.gold;
    user.send_line("Death reaches for you, and is denied!");
    return;
  }

  if let Some(room) = game.world.room_if_loaded(room_id) {
    room.lock().corpses.push(corpse);
  }
  user.send_line("{red}Everything goes dark.{/}");
  game.send_room(room_id, Some(user_id), format!("{} collapses!", user.name));

  let death_room = game.world.death_room_id();
  if let Err(e) = game.world.move_to_room(&game.bus, user_id, death_room) {
    warn!("could not move {} to the recovery room: {e}", user.name);
  }
  let mut character = user.character.lock();
  character.health = (character.health_max() / 2).max(1);
  character.mana = 0;
}
