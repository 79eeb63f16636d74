use crate::{
  command::{CommandCtx, CommandError, CommandSpec, Commands},
  tick,
};
use lm_common::id::{MobId, RoomId};
use std::str::FromStr;

pub(super) fn register(c: &mut Commands) {
  c.add(
    CommandSpec::new(
      "config",
      "config [<key>] | config set <key> <value> - inspect or change config",
      config,
    )
    .admin(),
  );
  c.add(CommandSpec::new("goto", "goto <room id> - teleport", goto).admin());
  c.add(CommandSpec::new("spawn", "spawn <mob id> - spawn a mob here", spawn).admin());
  c.add(CommandSpec::new("save", "save - save everything now", save).admin());
  c.add(CommandSpec::new("shutdown", "shutdown - stop the server", shutdown).admin());
}

fn config(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let config = &ctx.game.config;
  let mut words = rest.split_whitespace();
  match words.next() {
    None => {
      let mut out = String::from("{bold}Config:{/}\r\n");
      for key in config.all_keys() {
        out.push_str(&format!("  {key} = {}\r\n", config.display_value(&key)));
      }
      ctx.user.send_text(&out);
    }
    Some("set") => {
      let key = match words.next() {
        Some(k) => k,
        None => {
          ctx.reply("config set <key> <value>");
          return Ok(true);
        }
      };
      let value = words.collect::<Vec<_>>().join(" ");
      if value.is_empty() {
        ctx.reply("config set <key> <value>");
        return Ok(true);
      }
      match config.set(key, &value) {
        Ok(canonical) => {
          ctx.reply(format!("{canonical} = {}", config.display_value(&canonical)))
        }
        Err(e) => ctx.reply(e.to_string()),
      }
    }
    Some(key) => match config.resolve_key(key) {
      Ok(canonical) => {
        ctx.reply(format!("{canonical} = {}", config.display_value(&canonical)))
      }
      Err(e) => ctx.reply(e.to_string()),
    },
  }
  Ok(true)
}

fn goto(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let target = match RoomId::from_str(rest.trim()) {
    Ok(id) => id,
    Err(_) => {
      ctx.reply("goto <room id>");
      return Ok(true);
    }
  };
  match ctx.game.world.move_to_room(&ctx.game.bus, ctx.user.id, target) {
    Ok(arrived) => {
      if let Some(room) = ctx.game.world.room_if_loaded(arrived) {
        ctx.room = room;
        super::look::show_room(ctx);
      }
    }
    Err(e) => ctx.reply(e.to_string()),
  }
  Ok(true)
}

fn spawn(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let id = match rest.trim().parse::<u32>() {
    Ok(n) => MobId(n),
    Err(_) => {
      ctx.reply("spawn <mob id>");
      return Ok(true);
    }
  };
  match ctx.game.world.spawn_mob(id, ctx.room_id()) {
    Some(instance) => ctx.reply(format!("Spawned mob {id} as instance {instance}.")),
    None => ctx.reply("No such mob template."),
  }
  Ok(true)
}

fn save(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let game = ctx.game;
  let careful = game.config.get::<_, bool>("saves.careful");
  game.world.save_all_users(&game.save_pool, careful);
  game.world.save_all_rooms(careful);
  crate::tick::write_round_count(game.world.data_dir(), game.world.round());
  ctx.reply("Saved.");
  Ok(true)
}

fn shutdown(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  info!("{} requested shutdown", ctx.user.name);
  ctx.game.broadcast("{red}The world is closing down.{/}", true);
  tick::request_shutdown();
  Ok(true)
}
