//! The capability surface scripts see.
//!
//! Scripts get handles (user/mob/room) that carry ids, never references;
//! every call goes back through the world store. Side effects happen right
//! away, under the current event's locks; messages and events go onto the
//! bus and are delivered in the same drain pass.

use crate::{
  character::Aggro,
  event::{ActorRef, Event, EventBus, MessageTarget},
  item::Item,
  world::{Exit, WorldStore},
};
use lm_common::{
  id::{ItemId, MobId, MobInstanceId, RoomId, UserId},
  util::ansi,
};
use rhai::{Array, Dynamic, Engine, INT};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiCtx {
  world: Arc<WorldStore>,
  bus:   Arc<EventBus>,
}

impl ApiCtx {
  pub fn new(world: Arc<WorldStore>, bus: Arc<EventBus>) -> ApiCtx { ApiCtx { world, bus } }
}

/// A user handle.
#[derive(Clone)]
pub struct SUser {
  ctx: ApiCtx,
  pub id: UserId,
}

/// A mob instance handle.
#[derive(Clone)]
pub struct SMob {
  ctx: ApiCtx,
  pub id: MobInstanceId,
}

/// A room handle.
#[derive(Clone)]
pub struct SRoom {
  ctx: ApiCtx,
  pub id: RoomId,
}

impl SUser {
  pub fn wrap(ctx: &ApiCtx, id: UserId) -> SUser { SUser { ctx: ctx.clone(), id } }
}
impl SMob {
  pub fn wrap(ctx: &ApiCtx, id: MobInstanceId) -> SMob { SMob { ctx: ctx.clone(), id } }
}
impl SRoom {
  pub fn wrap(ctx: &ApiCtx, id: RoomId) -> SRoom { SRoom { ctx: ctx.clone(), id } }
}

/// Registers every type and function the sandbox exposes.
pub fn register(engine: &mut Engine, ctx: ApiCtx) {
  engine.register_type_with_name::<SUser>("User");
  engine.register_type_with_name::<SMob>("Mob");
  engine.register_type_with_name::<SRoom>("Room");

  // --- globals ------------------------------------------------------------

  let c = ctx.clone();
  engine.register_fn("get_user", move |id: INT| -> Dynamic {
    match c.world.user(UserId(id as u32)) {
      Some(_) => Dynamic::from(SUser::wrap(&c, UserId(id as u32))),
      None => Dynamic::UNIT,
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_mob", move |id: INT| -> Dynamic {
    match c.world.mob(MobInstanceId(id as u64)) {
      Some(_) => Dynamic::from(SMob::wrap(&c, MobInstanceId(id as u64))),
      None => Dynamic::UNIT,
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_room", move |id: INT| -> Dynamic {
    match c.world.room(RoomId::from_number(id)) {
      Some(_) => Dynamic::from(SRoom::wrap(&c, RoomId::from_number(id))),
      None => Dynamic::UNIT,
    }
  });

  let c = ctx.clone();
  engine.register_fn("send_user_message", move |id: INT, text: &str| {
    c.bus.enqueue(Event::Message {
      target: MessageTarget::User(UserId(id as u32)),
      text:   text.to_string(),
    });
  });
  let c = ctx.clone();
  engine.register_fn("send_room_message", move |id: INT, text: &str| {
    c.bus.enqueue(Event::Message {
      target: MessageTarget::Room(RoomId::from_number(id), None),
      text:   text.to_string(),
    });
  });
  let c = ctx.clone();
  engine.register_fn("send_broadcast", move |text: &str| {
    c.bus.enqueue(Event::Broadcast { text: text.to_string(), source_is_mod: false });
  });

  let c = ctx.clone();
  engine.register_fn("util_get_round_number", move || c.world.round() as INT);
  engine.register_fn("util_get_time", || {
    std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .map(|d| d.as_secs() as INT)
      .unwrap_or(0)
  });
  engine.register_fn("util_dice_roll", |n: INT, sides: INT| -> INT {
    let mut rng = rand::thread_rng();
    crate::item::DiceRoll { count: n.max(0) as u32, sides: sides.max(0) as u32, bonus: 0 }
      .roll(&mut rng) as INT
  });
  engine.register_fn("util_find_match_in", |needle: &str, hay: Array| -> Dynamic {
    let needle = needle.to_ascii_lowercase();
    let names: Vec<String> = hay.into_iter().map(|d| d.to_string()).collect();
    // Exact match wins, then a unique prefix.
    if let Some(name) = names.iter().find(|n| n.to_ascii_lowercase() == needle) {
      return name.clone().into();
    }
    let prefixed: Vec<_> =
      names.iter().filter(|n| n.to_ascii_lowercase().starts_with(&needle)).collect();
    match prefixed.len() {
      1 => prefixed[0].clone().into(),
      _ => Dynamic::UNIT,
    }
  });
  engine.register_fn(
    "util_apply_color_pattern",
    |text: &str, colors: Array, per_word: bool| -> String {
      let colors: Vec<ansi::Color> =
        colors.into_iter().filter_map(|c| c.to_string().parse().ok()).collect();
      let mode = if per_word { ansi::PatternMode::PerWord } else { ansi::PatternMode::PerCharacter };
      ansi::apply_color_pattern(text, &colors, mode)
    },
  );

  let c = ctx.clone();
  engine.register_fn("raise_event", move |name: &str, arg: Dynamic| {
    raise_event(&c, name, arg);
  });

  // --- room methods --------------------------------------------------------

  engine.register_fn("id", |r: &mut SRoom| r.id.as_number() as INT);
  let c = ctx.clone();
  engine.register_fn("get_players", move |r: &mut SRoom| -> Array {
    match c.world.room_if_loaded(r.id) {
      Some(room) => room
        .lock()
        .players
        .iter()
        .map(|id| Dynamic::from(SUser::wrap(&c, *id)))
        .collect(),
      None => Array::new(),
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_mobs", move |r: &mut SRoom| -> Array {
    match c.world.room_if_loaded(r.id) {
      Some(room) => {
        room.lock().mobs.iter().map(|id| Dynamic::from(SMob::wrap(&c, *id))).collect()
      }
      None => Array::new(),
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_items", move |r: &mut SRoom| -> Array {
    match c.world.room_if_loaded(r.id) {
      Some(room) => room.lock().items.iter().map(|i| Dynamic::from(i.id.0 as INT)).collect(),
      None => Array::new(),
    }
  });
  let c = ctx.clone();
  engine.register_fn("spawn_mob", move |r: &mut SRoom, template: INT| -> Dynamic {
    match c.world.spawn_mob(MobId(template as u32), r.id) {
      Some(id) => Dynamic::from(SMob::wrap(&c, id)),
      None => Dynamic::UNIT,
    }
  });
  let c = ctx.clone();
  engine.register_fn("spawn_item", move |r: &mut SRoom, template: INT| -> bool {
    let t = match c.world.registries.items.get(&ItemId(template as u32)) {
      Some(t) => t,
      None => return false,
    };
    match c.world.room_if_loaded(r.id) {
      Some(room) => {
        room.lock().items.push(Item::of(t));
        true
      }
      None => false,
    }
  });
  let c = ctx.clone();
  engine.register_fn(
    "add_temporary_exit",
    move |r: &mut SRoom, name: &str, target: INT, rounds: INT| {
      if let Some(room) = c.world.room_if_loaded(r.id) {
        let until = c.world.round() + rounds.max(1) as u64;
        room.lock().exits.insert(
          name.to_string(),
          Exit {
            target: RoomId::from_number(target),
            temp_until_round: Some(until),
            ..Default::default()
          },
        );
      }
    },
  );
  let c = ctx.clone();
  engine.register_fn("remove_temporary_exit", move |r: &mut SRoom, name: &str| {
    if let Some(room) = c.world.room_if_loaded(r.id) {
      let mut room = room.lock();
      if room.exits.get(name).map(|e| e.temp_until_round.is_some()).unwrap_or(false) {
        room.exits.remove(name);
      }
    }
  });
  let c = ctx.clone();
  engine.register_fn("set_temp_data", move |r: &mut SRoom, key: &str, value: &str| {
    if let Some(room) = c.world.room_if_loaded(r.id) {
      room.lock().temp_data.insert(key.to_string(), value.to_string());
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_temp_data", move |r: &mut SRoom, key: &str| -> Dynamic {
    match c.world.room_if_loaded(r.id) {
      Some(room) => match room.lock().temp_data.get(key) {
        Some(v) => v.clone().into(),
        None => Dynamic::UNIT,
      },
      None => Dynamic::UNIT,
    }
  });
  let c = ctx.clone();
  engine.register_fn("set_perm_data", move |r: &mut SRoom, key: &str, value: &str| {
    if let Some(room) = c.world.room_if_loaded(r.id) {
      room.lock().perm_data.insert(key.to_string(), value.to_string());
    }
  });
  let c = ctx.clone();
  engine.register_fn("get_perm_data", move |r: &mut SRoom, key: &str| -> Dynamic {
    match c.world.room_if_loaded(r.id) {
      Some(room) => match room.lock().perm_data.get(key) {
        Some(v) => v.clone().into(),
        None => Dynamic::UNIT,
      },
      None => Dynamic::UNIT,
    }
  });
  let c = ctx.clone();
  engine.register_fn("set_locked", move |r: &mut SRoom, name: &str, locked: bool| {
    if let Some(room) = c.world.room_if_loaded(r.id) {
      let mut room = room.lock();
      if let Some(exit) = room.exits.get_mut(name) {
        if let Some(lock) = &mut exit.lock {
          lock.unlocked = !locked;
        }
      }
      if let Some(container) = room.containers.get_mut(name) {
        if let Some(lock) = &mut container.lock {
          lock.unlocked = !locked;
        }
      }
    }
  });

  // --- actor methods -------------------------------------------------------

  register_actor_fns(engine, &ctx);
}

/// The actor surface, implemented for both user and mob handles.
fn register_actor_fns(engine: &mut Engine, ctx: &ApiCtx) {
  macro_rules! with_character {
    ($c:expr, $handle:expr, $f:expr) => {
      match $handle {
        ActorRef::User(id) => {
          if let Some(user) = $c.world.user(id) {
            let mut character = user.character.lock();
            #[allow(clippy::redundant_closure_call)]
            $f(&mut character);
          }
        }
        ActorRef::Mob(id) => {
          if let Some(mob) = $c.world.mob(id) {
            let mut mob = mob.lock();
            #[allow(clippy::redundant_closure_call)]
            $f(&mut mob.character);
          }
        }
      }
    };
  }

  macro_rules! actor_api {
    ($ty:ty, $actor:expr) => {
      let c = ctx.clone();
      engine.register_fn("name", move |h: &mut $ty| -> String {
        let mut name = String::new();
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          name = ch.name.clone()
        });
        name
      });
      let c = ctx.clone();
      engine.register_fn("room_id", move |h: &mut $ty| -> INT {
        let mut out = -1;
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          out = ch.room_id.as_number()
        });
        out as INT
      });
      let c = ctx.clone();
      engine.register_fn("health", move |h: &mut $ty| -> INT {
        let mut out = 0;
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| out = ch.health);
        out as INT
      });
      let c = ctx.clone();
      engine.register_fn("set_health", move |h: &mut $ty, v: INT| {
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          ch.health = (v as i32).min(ch.health_max())
        });
      });
      let c = ctx.clone();
      engine.register_fn("set_mana", move |h: &mut $ty, v: INT| {
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          ch.mana = (v as i32).min(ch.mana_max())
        });
      });
      let c = ctx.clone();
      engine.register_fn("give_gold", move |h: &mut $ty, v: INT| {
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          ch.gold += v.max(0) as u64
        });
      });
      let c = ctx.clone();
      engine.register_fn("take_gold", move |h: &mut $ty, v: INT| -> bool {
        let mut ok = false;
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          let v = v.max(0) as u64;
          if ch.gold >= v {
            ch.gold -= v;
            ok = true;
          }
        });
        ok
      });
      let c = ctx.clone();
      engine.register_fn("give_item", move |h: &mut $ty, template: INT| -> bool {
        let t = match c.world.registries.items.get(&ItemId(template as u32)) {
          Some(t) => t.clone(),
          None => return false,
        };
        let mut ok = false;
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          ch.backpack.push(Item::of(&t));
          ok = true;
        });
        if ok {
          c.bus.enqueue(Event::ItemOwnership {
            actor:  $actor(h),
            item:   ItemId(template as u32),
            gained: true,
          });
        }
        ok
      });
      let c = ctx.clone();
      engine.register_fn("take_item", move |h: &mut $ty, template: INT| -> bool {
        let mut ok = false;
        with_character!(c, $actor(h), |ch: &mut crate::character::Character| {
          ok = ch.take_item(ItemId(template as u32)).is_some();
        });
        if ok {
          c.bus.enqueue(Event::ItemOwnership {
            actor:  $actor(h),
            item:   ItemId(template as u32),
            gained: false,
          });
        }
        ok
      });
    };
  }

  actor_api!(SUser, |h: &mut SUser| ActorRef::User(h.id));
  actor_api!(SMob, |h: &mut SMob| ActorRef::Mob(h.id));

  // send_text and command differ per kind.
  let c = ctx.clone();
  engine.register_fn("send_text", move |h: &mut SUser, text: &str| {
    c.bus.enqueue(Event::Message { target: MessageTarget::User(h.id), text: text.to_string() });
  });
  engine.register_fn("send_text", |_h: &mut SMob, _text: &str| {});

  let c = ctx.clone();
  engine.register_fn("command", move |h: &mut SUser, text: &str| {
    let ready_turn = c.world.turn();
    c.bus.enqueue(Event::Input { user_id: h.id, text: text.to_string(), ready_turn });
  });
  let c = ctx.clone();
  engine.register_fn("command", move |h: &mut SMob, text: &str| {
    crate::mob::execute_mob_commands(&c.world, &c.bus, h.id, text);
  });

  let c = ctx.clone();
  engine.register_fn("attack", move |h: &mut SMob, target: SUser| {
    if let Some(mob) = c.world.mob(h.id) {
      mob.lock().character.aggro =
        Some(Aggro { target: ActorRef::User(target.id), rounds_waiting: 1 });
    }
  });
}

/// The event names scripts may raise directly.
fn raise_event(ctx: &ApiCtx, name: &str, arg: Dynamic) {
  let ev = match name {
    "quest" => {
      // arg: #{ user: id, token: "..." }
      let map = match arg.try_cast::<rhai::Map>() {
        Some(m) => m,
        None => return,
      };
      let user = map.get("user").and_then(|v| v.as_int().ok()).unwrap_or(0);
      let token = map.get("token").map(|v| v.to_string()).unwrap_or_default();
      Event::Quest { user_id: UserId(user as u32), token }
    }
    "broadcast" => Event::Broadcast { text: arg.to_string(), source_is_mod: false },
    "day-night" => Event::DayNightCycle { is_day: arg.as_bool().unwrap_or(true) },
    "rebuild-map" => Event::RebuildMap {
      root_room_id:   RoomId::from_number(arg.as_int().unwrap_or(0)),
      skip_if_exists: true,
    },
    "log" => Event::Log { level: log::Level::Info, message: arg.to_string() },
    _ => {
      warn!("script raised unknown event `{name}`");
      return;
    }
  };
  ctx.bus.enqueue(ev);
}
