//! Helpers shared by the test modules.

use crate::{
  data,
  event::Event,
  net::SessionSender,
  world::{Exit, Room},
  Game,
};
use lm_common::{
  id::{ConnId, RoomId, UserId},
  Config,
};
use parking_lot::Mutex;
use std::{
  fs,
  path::PathBuf,
  sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
  },
};

static COUNTER: AtomicU32 = AtomicU32::new(0);
static CONNS: AtomicU64 = AtomicU64::new(1);

/// A fresh, empty directory under the system temp dir. Each call gets its
/// own; tests running in parallel never collide.
pub fn temp_dir(name: &str) -> PathBuf {
  let n = COUNTER.fetch_add(1, Ordering::SeqCst);
  let dir = std::env::temp_dir().join(format!("loam-test-{name}-{}-{n}", std::process::id()));
  if dir.exists() {
    fs::remove_dir_all(&dir).unwrap();
  }
  fs::create_dir_all(&dir).unwrap();
  dir
}

/// A game over a fresh data directory, using the compiled-in default
/// config. Seed content with [`write_room`] and `data::save_record` BEFORE
/// calling this (registries load once, at boot).
pub fn game(dir: &PathBuf) -> Game {
  let config = Arc::new(Config::new_src("{}", include_str!("default.yaml")));
  Game::new(config, dir).expect("test game should boot")
}

/// Writes a minimal room template to disk.
pub fn write_room(dir: &PathBuf, zone: &str, id: i64, exits: &[(&str, i64)]) -> Room {
  let mut room = Room {
    id: RoomId::from_number(id),
    zone: zone.into(),
    title: format!("Test room {id}"),
    description: "A perfectly ordinary test room.".into(),
    ..Default::default()
  };
  for (name, target) in exits {
    room.exits.insert((*name).to_string(), Exit::to(RoomId::from_number(*target)));
  }
  data::save_record(dir, &room, false).unwrap();
  room
}

/// Logs a user in through the real event path, returning their id and the
/// captured output buffer.
pub fn login(game: &Game, name: &str) -> (UserId, Arc<Mutex<Vec<String>>>) {
  let (sender, buf) = SessionSender::capture();
  let conn_id = ConnId(CONNS.fetch_add(1, Ordering::SeqCst));
  game.bus.enqueue(Event::LoginRequest { conn_id, name: name.into(), sender });
  game.bus.drain(game);
  let user = game.world.user_by_name(name).expect("login should create the user");
  (user.id, buf)
}

/// Queues one command for a user and drains the bus.
pub fn run_command(game: &Game, user_id: UserId, line: &str) {
  game.bus.enqueue(Event::Input { user_id, text: line.into(), ready_turn: 0 });
  game.bus.drain(game);
}

/// Everything the captured session has printed, joined.
pub fn output_text(buf: &Arc<Mutex<Vec<String>>>) -> String { buf.lock().join("") }

/// Clears the captured output.
pub fn clear_output(buf: &Arc<Mutex<Vec<String>>>) { buf.lock().clear(); }
