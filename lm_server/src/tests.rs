//! End-to-end scenarios, driven through the real event bus and command
//! dispatch (no sockets; sessions are captured in memory).

use crate::{
  character::buffs::{BuffFlag, BuffSpec},
  data,
  event::{ActorRef, Event, EventType, Flow, Priority},
  item::ItemTemplate,
  mob::MobTemplate,
  test_util::{self, clear_output, login, output_text, run_command, write_room},
  tick,
};
use lm_common::id::{BuffId, ItemId, MobId, RoomId};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{collections::HashMap, sync::Arc};

fn item(id: u32, name: &str) -> ItemTemplate {
  ItemTemplate {
    id: ItemId(id),
    name: name.into(),
    description: String::new(),
    slot: None,
    damage: Default::default(),
    value: 1,
    stat_mods: HashMap::new(),
    uses: -1,
  }
}

fn mob(id: u32, zone: &str, name: &str) -> MobTemplate {
  MobTemplate {
    id: MobId(id),
    zone: zone.into(),
    name: name.into(),
    description: String::new(),
    level: 1,
    stats: HashMap::new(),
    hostile: false,
    idle_commands: vec![],
    damage: Default::default(),
    experience: 10,
    gold: 0,
    items: vec![],
  }
}

fn buff(id: u32, name: &str, flags: &[BuffFlag]) -> BuffSpec {
  BuffSpec {
    id: BuffId(id),
    name: name.into(),
    description: String::new(),
    secret: false,
    round_interval: 2,
    trigger_count: 3,
    stat_mods: HashMap::new(),
    flags: flags.to_vec(),
  }
}

/// S1: moving through an exit maintains both rooms' player sets and the
/// source room's visitor log, and emits RoomChange.
#[test]
fn move_and_visit_tracking() {
  let dir = test_util::temp_dir("s1-move");
  write_room(&dir, "fields", 1, &[("north", 2)]);
  write_room(&dir, "fields", 2, &[("south", 1)]);
  let game = test_util::game(&dir);

  let changes: Arc<Mutex<Vec<(ActorRef, RoomId, RoomId)>>> = Arc::new(Mutex::new(vec![]));
  {
    let changes = changes.clone();
    game.bus.register(EventType::RoomChange, Priority::Last, "capture", move |ev, _| {
      if let Event::RoomChange { actor, from, to, .. } = ev {
        changes.lock().push((*actor, *from, *to));
      }
      Flow::Continue
    });
  }

  let (user_id, _buf) = login(&game, "ana");
  game.world.set_round(500);
  run_command(&game, user_id, "north");

  let room1 = game.world.room_if_loaded(RoomId::Persistent(1)).unwrap();
  let room2 = game.world.room_if_loaded(RoomId::Persistent(2)).unwrap();
  assert!(!room1.lock().players.contains(&user_id));
  assert!(room2.lock().players.contains(&user_id));
  assert_eq!(room1.lock().visitors.get(&ActorRef::User(user_id)), Some(&500));
  assert_eq!(room1.lock().last_visited_round, 500);
  assert_eq!(game.world.user(user_id).unwrap().character.lock().room_id, RoomId::Persistent(2));

  let changes = changes.lock();
  assert!(changes
    .iter()
    .any(|(a, f, t)| *a == ActorRef::User(user_id)
      && *f == RoomId::Persistent(1)
      && *t == RoomId::Persistent(2)));
}

/// S4: ephemeral copies land in one chunk, internal exits are rewritten,
/// external ones aren't, and an empty chunk frees wholesale (VMs included).
#[test]
fn ephemeral_tutorial() {
  let dir = test_util::temp_dir("s4-ephemeral");
  write_room(&dir, "fields", 1, &[]);
  write_room(&dir, "tutorial", 100, &[("north", 101)]);
  write_room(&dir, "tutorial", 101, &[("north", 102)]);
  write_room(&dir, "tutorial", 102, &[("out", 1)]);
  std::fs::write(dir.join("rooms/tutorial/100.rhai"), "fn on_enter(user, room) { }\n").unwrap();
  let game = test_util::game(&dir);

  let sources = [RoomId::Persistent(100), RoomId::Persistent(101), RoomId::Persistent(102)];
  let mapping = game.world.create_ephemeral_rooms(&sources).unwrap();
  assert_eq!(mapping.len(), 3);
  let chunk = mapping[&sources[0]].chunk().unwrap();
  assert!(mapping.values().all(|id| id.chunk() == Some(chunk)));

  // The copy of 100 points at the copy of 101; the way out still points at
  // the real room 1.
  let copy_100 = game.world.room_if_loaded(mapping[&sources[0]]).unwrap();
  assert_eq!(copy_100.lock().exits["north"].target, mapping[&sources[1]]);
  let copy_102 = game.world.room_if_loaded(mapping[&sources[2]]).unwrap();
  assert_eq!(copy_102.lock().exits["out"].target, RoomId::Persistent(1));

  // Walk a player in (binding the copy's script VM), then out again.
  let (user_id, _buf) = login(&game, "ana");
  game.world.move_to_room(&game.bus, user_id, mapping[&sources[0]]).unwrap();
  game.bus.drain(&game);
  assert!(game.scripts.vm_count() >= 1);
  game.world.move_to_room(&game.bus, user_id, RoomId::Persistent(1)).unwrap();
  game.bus.drain(&game);

  // Occupied chunks never free; empty ones do, as a whole.
  let freed = game.world.cleanup_ephemeral();
  assert_eq!(freed.len(), 3);
  game.scripts.prune_room_vms(&freed);
  for id in mapping.values() {
    assert!(game.world.room_if_loaded(*id).is_none());
    assert_eq!(game.world.ephemeral_original(*id), None);
  }
}

/// S5: container recipes respect ingredient multiplicity; a complete set is
/// consumed and the result appears.
#[test]
fn container_recipe() {
  let dir = test_util::temp_dir("s5-recipe");
  let mut room = write_room(&dir, "fields", 1, &[]);
  let mut container = crate::world::Container::default();
  container
    .recipes
    .insert(ItemId(9), vec![ItemId(3), ItemId(3), ItemId(5)]);
  room.containers.insert("box".into(), container);
  data::save_record(&dir, &room, false).unwrap();
  data::save_record(&dir, &item(3, "iron nail"), false).unwrap();
  data::save_record(&dir, &item(5, "oak plank"), false).unwrap();
  data::save_record(&dir, &item(9, "birdhouse"), false).unwrap();

  let game = test_util::game(&dir);
  let (user_id, buf) = login(&game, "ana");
  {
    let user = game.world.user(user_id).unwrap();
    let mut character = user.character.lock();
    let reg = &game.world.registries;
    character.backpack.push(crate::item::Item::of(&reg.items[&ItemId(3)]));
    character.backpack.push(crate::item::Item::of(&reg.items[&ItemId(3)]));
    character.backpack.push(crate::item::Item::of(&reg.items[&ItemId(5)]));
  }

  run_command(&game, user_id, "put nail box");
  run_command(&game, user_id, "put plank box");
  clear_output(&buf);
  run_command(&game, user_id, "use box");
  let out = output_text(&buf);
  assert!(out.contains("still needs"), "{out}");
  assert!(out.contains("iron nail"), "{out}");

  run_command(&game, user_id, "put nail box");
  clear_output(&buf);
  run_command(&game, user_id, "use box");
  let out = output_text(&buf);
  assert!(out.contains("birdhouse"), "{out}");

  let room = game.world.room_if_loaded(RoomId::Persistent(1)).unwrap();
  let room = room.lock();
  let container = &room.containers["box"];
  assert_eq!(container.items.len(), 1);
  assert_eq!(container.items[0].id, ItemId(9));
}

/// S6: a NoCombat buff gates `attack` before any world mutation.
#[test]
fn input_gating() {
  let dir = test_util::temp_dir("s6-gating");
  write_room(&dir, "fields", 1, &[]);
  data::save_record(&dir, &mob(12, "fields", "sewer rat"), false).unwrap();
  data::save_record(&dir, &buff(40, "rooted", &[BuffFlag::NoCombat]), false).unwrap();

  let game = test_util::game(&dir);
  let instance = game.world.spawn_mob(MobId(12), RoomId::Persistent(1)).unwrap();
  let (user_id, buf) = login(&game, "ana");
  {
    let user = game.world.user(user_id).unwrap();
    let spec = game.world.registries.buffs[&BuffId(40)].clone();
    user.character.lock().buffs.add_buff(&spec, false);
  }
  let health_before = game.world.mob(instance).unwrap().lock().character.health;

  clear_output(&buf);
  run_command(&game, user_id, "attack rat");
  let out = output_text(&buf);
  assert!(out.contains("You cannot initiate combat right now."), "{out}");

  assert!(game.world.user(user_id).unwrap().character.lock().aggro.is_none());
  assert_eq!(game.world.mob(instance).unwrap().lock().character.health, health_before);
  let mob = game.world.mob(instance).unwrap();
  assert!(mob.lock().hostility.is_empty());
}

/// Buffs trigger on their cadence through the real round pipeline.
#[test]
fn buff_cadence_through_rounds() {
  let dir = test_util::temp_dir("buff-rounds");
  write_room(&dir, "fields", 1, &[]);
  data::save_record(&dir, &buff(41, "slow burn", &[]), false).unwrap();
  let game = test_util::game(&dir);
  let (user_id, _buf) = login(&game, "ana");
  {
    let user = game.world.user(user_id).unwrap();
    let spec = game.world.registries.buffs[&BuffId(41)].clone();
    user.character.lock().buffs.add_buff(&spec, false);
  }

  let triggered: Arc<Mutex<Vec<Vec<BuffId>>>> = Arc::new(Mutex::new(vec![]));
  {
    let triggered = triggered.clone();
    game.bus.register(EventType::BuffsTriggered, Priority::Last, "capture", move |ev, _| {
      if let Event::BuffsTriggered { buff_ids, .. } = ev {
        triggered.lock().push(buff_ids.clone());
      }
      Flow::Continue
    });
  }

  // interval 2, count 3: triggers on rounds 2, 4, 6 and then expires.
  for round in 1..=6 {
    game.bus.enqueue(Event::NewRound { round });
    game.bus.drain(&game);
  }
  assert_eq!(triggered.lock().len(), 3);
  let user = game.world.user(user_id).unwrap();
  // The turn pipeline prunes it away.
  game.bus.enqueue(Event::NewTurn { turn: 1 });
  game.bus.drain(&game);
  assert!(!user.character.lock().buffs.has_buff(BuffId(41)));
}

/// Disconnect leaves a zombie; the turn pipeline logs it out after the
/// grace period, saving the character.
#[test]
fn zombie_cleanup() {
  let dir = test_util::temp_dir("zombies");
  write_room(&dir, "fields", 1, &[]);
  let game = test_util::game(&dir);
  let (user_id, _buf) = login(&game, "ana");
  let conn_id = game.world.user(user_id).unwrap().conn_id();

  game.world.set_round(1000);
  game.bus.enqueue(Event::Disconnect { conn_id });
  game.bus.drain(&game);
  assert!(game.world.user(user_id).unwrap().is_zombie());

  // Not yet past the grace period.
  game.bus.enqueue(Event::NewTurn { turn: 1 });
  game.bus.drain(&game);
  assert!(game.world.user(user_id).is_some());

  game.world.set_round(1000 + game.config.get::<_, u64>("users.logout-rounds"));
  game.bus.enqueue(Event::NewTurn { turn: 2 });
  game.bus.drain(&game);
  assert!(game.world.user(user_id).is_none());
  assert!(dir.join("users/ana.yaml").exists());
}

/// The round counter restores at its floor, and survives a save.
#[test]
fn round_counter_floor() {
  let dir = test_util::temp_dir("round-floor");
  assert_eq!(tick::read_round_count(&dir), tick::ROUND_FLOOR);
  tick::write_round_count(&dir, tick::ROUND_FLOOR + 17);
  assert_eq!(tick::read_round_count(&dir), tick::ROUND_FLOOR + 17);
  tick::write_round_count(&dir, 3);
  assert_eq!(tick::read_round_count(&dir), tick::ROUND_FLOOR);
}

/// Death redirects into a fresh ephemeral copy of the recovery room.
#[test]
fn death_goes_to_a_private_recovery_room() {
  let dir = test_util::temp_dir("death-recovery");
  write_room(&dir, "fields", 1, &[]);
  write_room(&dir, "sanctum", 75, &[]);
  let game = test_util::game(&dir);
  let (user_id, _buf) = login(&game, "ana");

  {
    let user = game.world.user(user_id).unwrap();
    user.character.lock().health = 0;
  }
  run_command(&game, user_id, "suicide");

  let user = game.world.user(user_id).unwrap();
  let character = user.character.lock();
  assert!(character.room_id.is_ephemeral());
  assert_eq!(game.world.ephemeral_original(character.room_id), Some(RoomId::Persistent(75)));
  assert!(character.health > 0);
}
