#[macro_use]
extern crate log;

pub mod character;
pub mod command;
pub mod data;
pub mod event;
pub mod hooks;
pub mod item;
pub mod mob;
pub mod mutator;
pub mod net;
pub mod script;
pub mod tick;
pub mod user;
pub mod world;

#[cfg(test)]
pub(crate) mod test_util;
#[cfg(test)]
mod tests;

use crate::{
  command::Commands,
  event::{Event, EventBus, MessageTarget},
  script::ScriptRuntime,
  world::WorldStore,
};
use lm_common::{
  id::{RoomId, UserId},
  util::ThreadPool,
  Config,
};
use std::{path::Path, sync::Arc};

/// Handles on every long-lived part of the server. This is sort of the global
/// Loam type: one per server, cheap to clone, passed to every listener and
/// command handler.
#[derive(Clone)]
pub struct Game {
  pub world:    Arc<WorldStore>,
  pub bus:      Arc<EventBus>,
  pub scripts:  Arc<ScriptRuntime>,
  pub commands: Arc<Commands>,
  pub config:   Arc<Config>,
  /// Worker pool for flat-file saves.
  pub save_pool: Arc<ThreadPool<()>>,
}

impl Game {
  /// Boots the server state: loads every content registry from the data
  /// directory, and wires up the scripting runtime. Fatal on invalid or
  /// duplicate content records, per the boot contract.
  pub fn new(config: Arc<Config>, data_dir: &Path) -> Result<Game, data::DataError> {
    let registries = data::Registries::load(data_dir)?;
    let world = Arc::new(WorldStore::new(config.clone(), data_dir.to_path_buf(), registries));
    let bus = Arc::new(EventBus::new());
    let scripts = Arc::new(ScriptRuntime::new(
      world.clone(),
      bus.clone(),
      config.clone(),
      data_dir.to_path_buf(),
    ));
    let commands = Arc::new(Commands::new());
    let save_pool = Arc::new(ThreadPool::auto("flat-file-save", || ()));
    let game = Game { world, bus, scripts, commands, config, save_pool };
    hooks::register(&game);
    Ok(game)
  }

  /// A fresh capability context for handing world access to scripts.
  pub fn script_ctx(&self) -> script::ApiCtx {
    script::ApiCtx::new(self.world.clone(), self.bus.clone())
  }

  /// Enqueues text for one user. Delivered (rendered per the user's ANSI
  /// mode) when the bus drains.
  pub fn send_user(&self, user_id: UserId, text: impl Into<String>) {
    self
      .bus
      .enqueue(Event::Message { target: MessageTarget::User(user_id), text: text.into() });
  }

  /// Enqueues text for everyone in a room, optionally skipping one user.
  pub fn send_room(&self, room_id: RoomId, exclude: Option<UserId>, text: impl Into<String>) {
    self
      .bus
      .enqueue(Event::Message { target: MessageTarget::Room(room_id, exclude), text: text.into() });
  }

  /// Enqueues text for everyone connected.
  pub fn broadcast(&self, text: impl Into<String>, source_is_mod: bool) {
    self.bus.enqueue(Event::Broadcast { text: text.into(), source_is_mod });
  }
}
