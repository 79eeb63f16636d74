//! Session lifecycle listeners: login, disconnect, despawn, and message
//! delivery. All of these run on the simulation thread; the net layer only
//! enqueues.

use crate::{
  event::{ActorRef, Event, Flow, MessageTarget},
  script::{SRoom, SUser},
  user::User,
  Game,
};
use lm_common::id::RoomId;
use rhai::Dynamic;
use std::sync::Arc;

pub(super) fn on_login(ev: &Event, game: &Game) -> Flow {
  let (conn_id, name, sender) = match ev {
    Event::LoginRequest { conn_id, name, sender } => (*conn_id, name, sender),
    _ => return Flow::Continue,
  };
  let round = game.world.round();

  // Reconnect takeover: a zombie (or even a live session) with this name
  // hands the character to the new connection.
  if let Some(existing) = game.world.user_by_name(name) {
    let old_conn = existing.conn_id();
    existing.kick();
    existing.attach(conn_id, sender.clone(), round);
    game.world.rebind_user_conn(old_conn, conn_id, existing.id);
    existing.send_line("You snap back into your body.");
    info!("{} reconnected", existing.name);
    return Flow::Continue;
  }

  let record = game.world.load_or_create_user(name);
  let user_id = record.id;
  let spawn_room = match record.character.room_id {
    RoomId::Void => RoomId::START_ALIAS,
    // Ephemeral rooms don't survive restarts or logouts.
    id if id.is_ephemeral() => RoomId::START_ALIAS,
    id => id,
  };
  let user = Arc::new(User::new(record, conn_id, sender.clone(), round));
  game.world.register_user(user.clone());

  if let Err(e) = game.world.move_to_room(&game.bus, user_id, spawn_room) {
    error!("could not spawn {} into the world: {e}", user.name);
    user.send_line("The world refuses you entry. Try again later.");
    game.world.remove_user(user_id);
    return Flow::Continue;
  }
  {
    let mut character = user.character.lock();
    character.buffs.validate(&game.world.registries.buffs, true);
    character.recompute(&game.world.registries.items, &game.world.registries.buffs);
  }
  user.send_line(&format!("Welcome, {}.", user.name));
  game.bus.enqueue(Event::PlayerSpawn { user_id, conn_id });
  game.bus.enqueue(Event::Input { user_id, text: "look".into(), ready_turn: 0 });
  info!("{} joined (user {user_id})", user.name);
  Flow::Continue
}

pub(super) fn on_disconnect(ev: &Event, game: &Game) -> Flow {
  let conn_id = match ev {
    Event::Disconnect { conn_id } => *conn_id,
    _ => return Flow::Continue,
  };
  let user = match game.world.user_by_conn(conn_id) {
    Some(u) => u,
    None => return Flow::Continue,
  };
  // Only zombify if this is still the user's active connection (a
  // reconnect may have already taken over).
  if user.conn_id() == conn_id && !user.is_zombie() {
    user.detach(game.world.round());
    let room_id = user.character.lock().room_id;
    game.send_room(room_id, Some(user.id), format!("{} loses their grip on the world.", user.name));
    info!("{} disconnected (zombie until cleanup)", user.name);
  }
  Flow::Continue
}

/// Final removal: save the character and drop the user from the resident
/// set. Fired by `quit`, zombie cleanup, and idle eviction.
pub(super) fn on_despawn(ev: &Event, game: &Game) -> Flow {
  let user_id = match ev {
    Event::PlayerDespawn { user_id } => *user_id,
    _ => return Flow::Continue,
  };
  let user = match game.world.user(user_id) {
    Some(u) => u,
    None => return Flow::Continue,
  };
  let careful = game.config.get::<_, bool>("saves.careful");
  game.world.save_user(&user, careful);
  let room_id = user.character.lock().room_id;
  game.send_room(room_id, Some(user_id), format!("{} leaves the world.", user.name));
  user.kick();
  game.world.remove_user(user_id);
  info!("{} left (user {user_id})", user.name);
  Flow::Continue
}

pub(super) fn deliver_message(ev: &Event, game: &Game) -> Flow {
  let (target, text) = match ev {
    Event::Message { target, text } => (target, text),
    _ => return Flow::Continue,
  };
  match target {
    MessageTarget::User(id) => {
      if let Some(user) = game.world.user(*id) {
        user.send_line(text);
      }
    }
    MessageTarget::Room(room_id, exclude) => {
      let players = match game.world.room_if_loaded(*room_id) {
        Some(room) => room.lock().players.iter().copied().collect::<Vec<_>>(),
        None => return Flow::Continue,
      };
      for id in players {
        if Some(id) == *exclude {
          continue;
        }
        if let Some(user) = game.world.user(id) {
          user.send_line(text);
        }
      }
    }
  }
  Flow::Continue
}

pub(super) fn deliver_broadcast(ev: &Event, game: &Game) -> Flow {
  if let Event::Broadcast { text, .. } = ev {
    for user in game.world.users() {
      user.send_line(text);
    }
  }
  Flow::Continue
}

/// Announces arrivals/departures and fires the room scripts' enter/exit
/// handlers.
pub(super) fn on_room_change(ev: &Event, game: &Game) -> Flow {
  let (actor, from, to, unseen) = match ev {
    Event::RoomChange { actor, from, to, unseen } => (*actor, *from, *to, *unseen),
    _ => return Flow::Continue,
  };
  let name = match actor {
    ActorRef::User(id) => game.world.user(id).map(|u| u.name.clone()),
    ActorRef::Mob(id) => game.world.mob(id).map(|m| m.lock().character.name.clone()),
  };
  let name = match name {
    Some(n) => n,
    None => return Flow::Continue,
  };
  if !unseen {
    let exclude = actor.user_id();
    if !from.is_void() {
      game.send_room(from, exclude, format!("{name} leaves."));
    }
    game.send_room(to, exclude, format!("{name} arrives."));
  }

  if let Some(user_id) = actor.user_id() {
    let ctx = game.script_ctx();
    if !from.is_void() {
      let args: Vec<Dynamic> = vec![
        Dynamic::from(SUser::wrap(&ctx, user_id)),
        Dynamic::from(SRoom::wrap(&ctx, from)),
      ];
      game.scripts.room_event(from, "on_exit", args);
    }
    let args: Vec<Dynamic> = vec![
      Dynamic::from(SUser::wrap(&ctx, user_id)),
      Dynamic::from(SRoom::wrap(&ctx, to)),
    ];
    game.scripts.room_event(to, "on_enter", args);
  }
  Flow::Continue
}
