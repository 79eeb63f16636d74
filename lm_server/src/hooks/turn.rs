//! The `NewTurn` pipeline bodies.

use crate::{
  event::{Event, Flow},
  script::{SMob, SUser},
  tick, Game,
};
use rhai::Dynamic;
use std::sync::atomic::Ordering;

fn turn_of(ev: &Event) -> Option<u64> {
  match ev {
    Event::NewTurn { turn } => Some(*turn),
    _ => None,
  }
}

/// Feeds queued player input into the bus, one line per user per turn.
/// Runs first so commands resolve inside this turn's drain pass.
pub(super) fn drain_inputs(ev: &Event, game: &Game) -> Flow {
  let turn = match turn_of(ev) {
    Some(t) => t,
    None => return Flow::Continue,
  };
  let round = game.world.round();
  for user in game.world.users() {
    if user.is_zombie() {
      continue;
    }
    if let Some(line) = user.pop_input() {
      user.last_input_round.store(round, Ordering::SeqCst);
      game.bus.enqueue(Event::Input { user_id: user.id, text: line, ready_turn: turn });
    }
  }
  Flow::Continue
}

/// Drops zombies whose grace period ran out, saving them first.
pub(super) fn cleanup_zombies(_ev: &Event, game: &Game) -> Flow {
  let round = game.world.round();
  let logout_rounds = game.config.get::<_, u64>("users.logout-rounds");
  for user in game.world.users() {
    let since = user.zombie_since_round.load(Ordering::SeqCst);
    if since != 0 && round.saturating_sub(since) >= logout_rounds {
      info!("zombie {} timed out", user.name);
      game.bus.enqueue(Event::PlayerDespawn { user_id: user.id });
    }
  }
  Flow::Continue
}

/// Saves users and the round counter on the configured cadence.
pub(super) fn auto_save(ev: &Event, game: &Game) -> Flow {
  let turn = match turn_of(ev) {
    Some(t) => t,
    None => return Flow::Continue,
  };
  let cadence = game.config.get::<_, u64>("saves.autosave-turns").max(1);
  if turn % cadence != 0 {
    return Flow::Continue;
  }
  let careful = game.config.get::<_, bool>("saves.careful");
  game.world.save_all_users(&game.save_pool, careful);
  tick::write_round_count(game.world.data_dir(), game.world.round());
  debug!("autosaved at turn {turn}");
  Flow::Continue
}

/// Physically removes expired buffs everywhere, with expiry notices and the
/// scripts' `on_end`.
pub(super) fn prune_buffs(_ev: &Event, game: &Game) -> Flow {
  let reg = &game.world.registries;
  let ctx = game.script_ctx();

  for user in game.world.users() {
    let removed = {
      let mut character = user.character.lock();
      if character.buffs.is_empty() {
        continue;
      }
      character.buffs.prune(&reg.buffs)
    };
    if removed.is_empty() {
      continue;
    }
    for buff in removed {
      let args: Vec<Dynamic> = vec![Dynamic::from(SUser::wrap(&ctx, user.id))];
      game.scripts.buff_event(buff.spec_id, "on_end", args);
      if let Some(spec) = reg.buffs.get(&buff.spec_id) {
        if !spec.secret {
          user.send_line(&format!("{{cyan}}{} wears off.{{/}}", spec.name));
        }
      }
    }
    user.character.lock().recompute(&reg.items, &reg.buffs);
  }

  for (instance_id, mob) in game.world.mob_instances() {
    let removed = {
      let mut mob = mob.lock();
      mob.character.buffs.prune(&reg.buffs)
    };
    for buff in removed {
      let args: Vec<Dynamic> = vec![Dynamic::from(SMob::wrap(&ctx, instance_id))];
      game.scripts.buff_event(buff.spec_id, "on_end", args);
    }
  }
  Flow::Continue
}

/// Action points trickle back every turn.
pub(super) fn regen_action_points(_ev: &Event, game: &Game) -> Flow {
  for user in game.world.users() {
    let mut character = user.character.lock();
    let max = character.action_points_max();
    character.action_points = (character.action_points + 1).min(max);
  }
  for (_, mob) in game.world.mob_instances() {
    let mut mob = mob.lock();
    let max = mob.character.action_points_max();
    mob.character.action_points = (mob.character.action_points + 1).min(max);
  }
  Flow::Continue
}

/// World upkeep: sign/exit pruning, occasional ephemeral cleanup, and idle
/// room unload (batched). Script VMs for anything that went away are
/// pruned here too.
pub(super) fn room_maintenance(_ev: &Event, game: &Game) -> Flow {
  let mut rng = rand::thread_rng();
  let freed = game.world.maintenance(&mut rng);
  if !freed.is_empty() {
    game.scripts.prune_room_vms(&freed);
  }
  let threshold = game.config.get::<_, u64>("rooms.unload-rounds");
  let batch = game.config.get::<_, usize>("rooms.unload-batch");
  let careful = game.config.get::<_, bool>("saves.careful");
  let evicted = game.world.unload_idle_rooms(threshold, batch, careful);
  if !evicted.is_empty() {
    game.scripts.prune_room_vms(&evicted);
  }
  Flow::Continue
}
