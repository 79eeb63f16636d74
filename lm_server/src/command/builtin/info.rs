use crate::{
  command::{CommandCtx, CommandError, CommandSpec, Commands},
  event::Event,
  world::Sign,
};
use std::sync::atomic::Ordering;

/// Rounds a written sign lasts.
const SIGN_ROUNDS: u64 = 9000;

pub(super) fn register(c: &mut Commands) {
  c.add(CommandSpec::new("who", "who - who's online", who).when_downed());
  c.add(CommandSpec::new("help", "help [command] - this", help).when_downed());
  c.add(CommandSpec::new("score", "score - your character sheet", score).when_downed());
  c.add(CommandSpec::new("write", "write <text> - leave a sign here", write));
  c.add(CommandSpec::new("read", "read - read the signs here", read));
  c.add(CommandSpec::new("quit", "quit - leave the world", quit).when_downed());
}

fn who(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let mut out = String::from("{bold}Adventurers about:{/}\r\n");
  for user in ctx.game.world.users() {
    if user.is_zombie() {
      continue;
    }
    let level = user.character.lock().level;
    let afk = if user.afk.load(Ordering::SeqCst) { " (afk)" } else { "" };
    out.push_str(&format!("  {} [level {level}]{afk}\r\n", user.name));
  }
  ctx.user.send_text(&out);
  Ok(true)
}

fn help(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let is_admin = ctx.user.role.lock().is_admin();
  if !rest.is_empty() {
    match ctx.game.commands.get(&rest.to_ascii_lowercase()) {
      Some(spec) if !spec.admin_only || is_admin => {
        ctx.reply(spec.help);
      }
      _ => ctx.reply("No help for that."),
    }
    return Ok(true);
  }
  let mut names: Vec<&str> = ctx
    .game
    .commands
    .all()
    .filter(|s| !s.admin_only || is_admin)
    .map(|s| s.name)
    .collect();
  names.sort_unstable();
  ctx.reply(format!("Commands: {}", names.join(", ")));
  Ok(true)
}

fn score(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let reg = &ctx.game.world.registries;
  let character = ctx.user.character.lock();
  let mut out = format!(
    "{{bold}}{}{{/}}  level {}  ({} xp)\r\n",
    character.name, character.level, character.experience
  );
  out.push_str(&format!(
    "Health {}/{}  Mana {}/{}  AP {}\r\n",
    character.health,
    character.health_max(),
    character.mana,
    character.mana_max(),
    character.action_points
  ));
  out.push_str(&format!("You feel {}.\r\n", character.alignment()));
  for kind in crate::character::ALL_STATS {
    let stat = character.stats.get(kind);
    out.push_str(&format!("  {kind}: {} ({})\r\n", stat.value_adj, stat.value));
  }
  let buffs: Vec<String> = character
    .buffs
    .iter()
    .filter_map(|b| reg.buffs.get(&b.spec_id))
    .filter(|s| !s.secret)
    .map(|s| s.name.clone())
    .collect();
  if !buffs.is_empty() {
    out.push_str(&format!("Affected by: {}\r\n", buffs.join(", ")));
  }
  drop(character);
  ctx.user.send_text(&out);
  Ok(true)
}

fn write(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Write what?");
    return Ok(true);
  }
  let round = ctx.game.world.round();
  let (visible_to, text) = match rest.strip_prefix("private ") {
    Some(t) => (Some(ctx.user.id), t),
    None => (None, rest),
  };
  ctx.room.lock().signs.push(Sign {
    text: text.to_string(),
    visible_to,
    expires_round: round + SIGN_ROUNDS,
  });
  ctx.reply("You scratch your message into a sign.");
  if visible_to.is_none() {
    ctx.reply_room(format!("{} scratches out a sign.", ctx.user.name));
  }
  Ok(true)
}

fn read(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let room = ctx.room.lock();
  let signs: Vec<String> = room.visible_signs(ctx.user.id).map(|s| s.text.clone()).collect();
  drop(room);
  if signs.is_empty() {
    ctx.reply("There's nothing to read here.");
    return Ok(true);
  }
  for text in signs {
    ctx.reply(format!("{{yellow}}A sign reads:{{/}} {text}"));
  }
  Ok(true)
}

fn quit(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  ctx.reply("Fare well.");
  ctx
    .game
    .bus
    .enqueue(Event::PlayerDespawn { user_id: ctx.user.id });
  Ok(true)
}
