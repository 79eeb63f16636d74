//! The canonical simulation pipeline.
//!
//! Everything the simulation does per tick is a listener on the bus,
//! registered here in a fixed order. On `NewRound`:
//! prune script VMs → inactive players → zone mutators → day/night → loot
//! goblin → user round tick → mob round tick → respawns → combat → auto
//! heal → idle mobs. On `NewTurn`: input drain (first) → zombie cleanup →
//! autosave → buff prune → action point regen → room maintenance (last).

mod combat;
mod round;
mod session;
mod turn;

use crate::{
  event::{EventType, Flow, Priority},
  Game,
};

pub(crate) use combat::kill_mob;

/// Wires every listener. Called once from `Game::new`.
pub fn register(game: &Game) {
  let bus = &game.bus;

  // Session lifecycle and message delivery.
  bus.register(EventType::LoginRequest, Priority::Default, "login", session::on_login);
  bus.register(EventType::Disconnect, Priority::Default, "disconnect", session::on_disconnect);
  bus.register(EventType::PlayerDespawn, Priority::Last, "despawn", session::on_despawn);
  bus.register(EventType::Message, Priority::Last, "deliver-message", session::deliver_message);
  bus.register(EventType::Broadcast, Priority::Last, "deliver-broadcast", session::deliver_broadcast);
  bus.register(EventType::RoomChange, Priority::Default, "room-change", session::on_room_change);

  // Commands.
  bus.register(EventType::Input, Priority::Default, "dispatch-input", |ev, game| {
    if let crate::event::Event::Input { user_id, text, ready_turn } = ev {
      if *ready_turn > game.world.turn() {
        // Not ready yet: back to the head of the user's queue, retried by
        // next turn's input drain.
        if let Some(user) = game.world.user(*user_id) {
          user.requeue_input(text.clone());
        }
        return Flow::Continue;
      }
      crate::command::dispatch(game, *user_id, text);
    }
    Flow::Continue
  });

  // Round pipeline, in pipeline order.
  bus.register(EventType::NewRound, Priority::Default, "prune-script-vms", |_, game| {
    game.scripts.prune_stale_vms();
    Flow::Continue
  });
  bus.register(EventType::NewRound, Priority::Default, "inactive-players", round::inactive_players);
  bus.register(EventType::NewRound, Priority::Default, "zone-mutators", round::update_mutators);
  bus.register(EventType::NewRound, Priority::Default, "check-new-day", round::check_new_day);
  bus.register(EventType::NewRound, Priority::Default, "loot-goblin", round::spawn_loot_goblin);
  bus.register(EventType::NewRound, Priority::Default, "user-round-tick", round::user_round_tick);
  bus.register(EventType::NewRound, Priority::Default, "mob-round-tick", round::mob_round_tick);
  bus.register(EventType::NewRound, Priority::Default, "respawns", round::handle_respawns);
  bus.register(EventType::NewRound, Priority::Default, "combat", combat::do_combat);
  bus.register(EventType::NewRound, Priority::Default, "auto-heal", round::auto_heal);
  bus.register(EventType::NewRound, Priority::Default, "idle-mobs", round::idle_mobs);
  bus.register(EventType::NewRound, Priority::Last, "decay-corpses", round::decay_corpses);
  bus.register(EventType::MobIdle, Priority::Default, "handle-idle-mobs", round::handle_mob_idle);

  // Turn pipeline.
  bus.register(EventType::NewTurn, Priority::First, "drain-inputs", turn::drain_inputs);
  bus.register(EventType::NewTurn, Priority::Default, "cleanup-zombies", turn::cleanup_zombies);
  bus.register(EventType::NewTurn, Priority::Default, "auto-save", turn::auto_save);
  bus.register(EventType::NewTurn, Priority::Default, "prune-buffs", turn::prune_buffs);
  bus.register(EventType::NewTurn, Priority::Default, "regen-action-points", turn::regen_action_points);
  bus.register(EventType::NewTurn, Priority::Last, "room-maintenance", turn::room_maintenance);

  // Buffs and items talking to their scripts.
  bus.register(EventType::Buff, Priority::Default, "buff-started", round::buff_started);
  bus.register(EventType::BuffsTriggered, Priority::Default, "buffs-triggered", round::buffs_triggered);
  bus.register(EventType::ItemOwnership, Priority::Default, "item-scripts", |ev, game| {
    if let crate::event::Event::ItemOwnership { actor, item, gained } = ev {
      let func = if *gained { "on_found" } else { "on_lost" };
      let ctx = game.script_ctx();
      let mut args: Vec<rhai::Dynamic> = vec![];
      if let Some(user_id) = actor.user_id() {
        args.push(rhai::Dynamic::from(crate::script::SUser::wrap(&ctx, user_id)));
      }
      game.scripts.item_event(*item, func, args);
    }
    Flow::Continue
  });

  // Small fry.
  bus.register(EventType::Quest, Priority::Default, "quest-notify", |ev, game| {
    if let crate::event::Event::Quest { user_id, token } = ev {
      game.send_user(*user_id, format!("{{yellow}}Your journal gains a note: {token}{{/}}"));
    }
    Flow::Continue
  });
  bus.register(EventType::LevelUp, Priority::Default, "level-up", |ev, game| {
    if let crate::event::Event::LevelUp { user_id, new_level } = ev {
      if let Some(user) = game.world.user(*user_id) {
        user.send_line(&format!("{{bold}}{{green}}You are now level {new_level}!{{/}}"));
        game.broadcast(format!("{} has reached level {new_level}!", user.name), false);
      }
    }
    Flow::Continue
  });
  bus.register(EventType::DayNightCycle, Priority::Default, "day-night", |ev, game| {
    if let crate::event::Event::DayNightCycle { is_day } = ev {
      let text = if *is_day {
        "{yellow}The sun crests the horizon.{/}"
      } else {
        "{blue}Darkness settles over the land.{/}"
      };
      game.broadcast(text, false);
    }
    Flow::Continue
  });
  bus.register(EventType::Shutdown, Priority::First, "shutdown-notice", |_, game| {
    game.broadcast("{red}The world fades...{/}", true);
    Flow::Continue
  });
}
