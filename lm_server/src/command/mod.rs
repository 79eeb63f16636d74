//! Input parsing and command dispatch.
//!
//! A line of input resolves, in order: alias table → built-in command →
//! exit name on the current room → room script `on_command_<verb>` (or
//! `on_command`) → each room mob's script → each inventory item's script.
//! Nothing handled it? The verb is tallied for content authors and the user
//! gets a short shrug.

pub mod builtin;

use crate::{
  character::buffs::BuffFlag,
  script::{SRoom, SUser},
  user::User,
  world::Room,
  Game,
};
use lm_common::id::{RoomId, UserId};
use parking_lot::Mutex;
use rhai::Dynamic;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error("user is not in a loaded room")]
  NoRoom,
  #[error("{0}")]
  Failed(String),
}

/// Everything a handler gets to work with.
pub struct CommandCtx<'a> {
  pub game: &'a Game,
  pub user: Arc<User>,
  pub room: Arc<Mutex<Room>>,
}

impl CommandCtx<'_> {
  /// Queues a reply line for the commanding user.
  pub fn reply(&self, text: impl Into<String>) { self.game.send_user(self.user.id, text); }

  /// Queues a line for everyone else in the room.
  pub fn reply_room(&self, text: impl Into<String>) {
    let room_id = self.room.lock().id;
    self.game.send_room(room_id, Some(self.user.id), text);
  }

  pub fn room_id(&self) -> RoomId { self.room.lock().id }
}

type HandlerFn = fn(&str, &mut CommandCtx) -> Result<bool, CommandError>;

pub struct CommandSpec {
  pub name: &'static str,
  pub help: &'static str,
  pub admin_only: bool,
  pub allowed_when_downed: bool,
  /// Buff flags that block this command outright.
  pub blocked_by: &'static [BuffFlag],
  handler: HandlerFn,
}

impl CommandSpec {
  pub fn new(name: &'static str, help: &'static str, handler: HandlerFn) -> CommandSpec {
    CommandSpec {
      name,
      help,
      admin_only: false,
      allowed_when_downed: false,
      blocked_by: &[],
      handler,
    }
  }

  pub fn admin(mut self) -> Self {
    self.admin_only = true;
    self
  }
  pub fn when_downed(mut self) -> Self {
    self.allowed_when_downed = true;
    self
  }
  pub fn blocked_by(mut self, flags: &'static [BuffFlag]) -> Self {
    self.blocked_by = flags;
    self
  }
}

/// The command table: canonical commands plus the alias map.
pub struct Commands {
  commands: HashMap<&'static str, CommandSpec>,
  aliases:  HashMap<&'static str, &'static str>,
}

impl Commands {
  pub fn new() -> Commands {
    let mut c = Commands { commands: HashMap::new(), aliases: HashMap::new() };
    builtin::register_all(&mut c);
    c
  }

  pub fn add(&mut self, spec: CommandSpec) {
    self.commands.insert(spec.name, spec);
  }

  pub fn alias(&mut self, from: &'static str, to: &'static str) {
    self.aliases.insert(from, to);
  }

  pub fn get(&self, name: &str) -> Option<&CommandSpec> {
    let canonical = self.aliases.get(name).copied().unwrap_or(name);
    self.commands.get(canonical)
  }

  pub fn all(&self) -> impl Iterator<Item = &CommandSpec> { self.commands.values() }
}

impl Default for Commands {
  fn default() -> Self { Commands::new() }
}

/// Case-insensitive "does this name answer to that needle": an exact match,
/// or a prefix of the name or of any of its words (`nail` finds the
/// "iron nail").
pub fn matches_name(name: &str, needle: &str) -> bool {
  let name = name.to_ascii_lowercase();
  let needle = needle.to_ascii_lowercase();
  !needle.is_empty()
    && (name == needle
      || name.starts_with(&needle)
      || name.split_whitespace().any(|w| w.starts_with(&needle)))
}

/// Dispatches one line of input for a user. This is the `Input` event
/// listener's body; it runs on the simulation thread.
pub fn dispatch(game: &Game, user_id: UserId, input: &str) {
  let user = match game.world.user(user_id) {
    Some(u) => u,
    None => return,
  };
  let input = input.trim();
  if input.is_empty() {
    return;
  }
  let (verb_raw, rest) = match input.split_once(' ') {
    Some((v, r)) => (v, r.trim()),
    None => (input, ""),
  };
  let verb = verb_raw.to_ascii_lowercase();

  let room = match game.world.room_if_loaded(user.character.lock().room_id) {
    Some(r) => r,
    None => {
      warn!("user {} has no loaded room, respawning at start", user.name);
      let _ = game.world.move_to_room(&game.bus, user_id, RoomId::START_ALIAS);
      return;
    }
  };
  let mut ctx = CommandCtx { game, user: user.clone(), room: room.clone() };

  // 1. Built-in commands, with gating.
  if let Some(spec) = game.commands.get(&verb) {
    if spec.admin_only && !user.role.lock().is_admin() {
      // Generic refusal; don't advertise that the command exists.
      info!("{} tried admin command `{verb}`", user.name);
      ctx.reply("That doesn't make sense.");
      game.world.track_bad_command(&verb);
      return;
    }
    if !spec.allowed_when_downed && user.character.lock().is_downed() {
      ctx.reply("You can't do that while you're down.");
      return;
    }
    let blocked = {
      let character = user.character.lock();
      spec.blocked_by.iter().copied().find(|f| character.buffs.flag_active(*f))
    };
    if let Some(flag) = blocked {
      ctx.reply(blocked_message(flag));
      return;
    }
    match (spec.handler)(rest, &mut ctx) {
      Ok(true) => return,
      Ok(false) => {}
      Err(e) => {
        debug!("command `{verb}` failed for {}: {e}", user.name);
        ctx.reply("Something went wrong with that.");
        return;
      }
    }
  }

  // 2. Exit names move you, as a shorthand for `go`.
  {
    let round = game.world.round();
    let is_exit = room.lock().exit(&verb, round).is_some();
    if is_exit {
      if user.character.lock().buffs.flag_active(BuffFlag::NoMovement) {
        ctx.reply(blocked_message(BuffFlag::NoMovement));
        return;
      }
      builtin::movement::move_through_exit(&mut ctx, &verb);
      return;
    }
  }

  // 3. The room's script.
  let room_id = room.lock().id;
  if script_command(game, user_id, room_id, None, &verb, rest) {
    return;
  }

  // 4. Each mob in the room.
  let mobs: Vec<_> = room.lock().mobs.clone();
  for instance_id in mobs {
    if let Some(mob) = game.world.mob(instance_id) {
      let (template, zone) = {
        let m = mob.lock();
        (m.template_id, m.character.zone.clone())
      };
      if script_command(game, user_id, room_id, Some((instance_id, template, zone)), &verb, rest) {
        return;
      }
    }
  }

  // 5. Each item in the user's backpack.
  let item_ids: Vec<_> = user.character.lock().backpack.iter().map(|i| i.id).collect();
  for item_id in item_ids {
    let args: Vec<Dynamic> = vec![
      rest.into(),
      Dynamic::from(SUser::wrap(&game.script_ctx(), user_id)),
    ];
    let handled = game
      .scripts
      .item_event(item_id, &format!("on_command_{verb}"), args.clone())
      .or_else(|| {
        let mut with_cmd: Vec<Dynamic> = vec![verb.clone().into()];
        with_cmd.extend(args);
        game.scripts.item_event(item_id, "on_command", with_cmd)
      })
      .and_then(|d| d.as_bool().ok())
      .unwrap_or(false);
    if handled {
      return;
    }
  }

  // 6. Nobody wanted it.
  game.world.track_bad_command(&verb);
  ctx.reply("That doesn't make sense.");
}

/// Tries `on_command_<verb>` then `on_command` on a room or mob script.
fn script_command(
  game: &Game,
  user_id: UserId,
  room_id: RoomId,
  mob: Option<(lm_common::id::MobInstanceId, lm_common::id::MobId, String)>,
  verb: &str,
  rest: &str,
) -> bool {
  let ctx = game.script_ctx();
  let args: Vec<Dynamic> = vec![
    rest.into(),
    Dynamic::from(SUser::wrap(&ctx, user_id)),
    Dynamic::from(SRoom::wrap(&ctx, room_id)),
  ];
  let specific = format!("on_command_{verb}");
  let result = match &mob {
    Some((instance, template, zone)) => game
      .scripts
      .mob_event(*instance, *template, zone, &specific, args.clone())
      .or_else(|| {
        let mut with_cmd: Vec<Dynamic> = vec![verb.into()];
        with_cmd.extend(args.clone());
        game.scripts.mob_event(*instance, *template, zone, "on_command", with_cmd)
      }),
    None => game.scripts.room_event(room_id, &specific, args.clone()).or_else(|| {
      let mut with_cmd: Vec<Dynamic> = vec![verb.into()];
      with_cmd.extend(args.clone());
      game.scripts.room_event(room_id, "on_command", with_cmd)
    }),
  };
  result.and_then(|d| d.as_bool().ok()).unwrap_or(false)
}

fn blocked_message(flag: BuffFlag) -> &'static str {
  match flag {
    BuffFlag::NoCombat => "You cannot initiate combat right now.",
    BuffFlag::NoMovement => "You can't move right now.",
    BuffFlag::Muted => "You've been muted.",
    BuffFlag::Deafened => "You can't hear a thing.",
    _ => "Something prevents you from doing that.",
  }
}
