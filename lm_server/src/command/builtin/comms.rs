use crate::{
  character::buffs::BuffFlag,
  command::{matches_name, CommandCtx, CommandError, CommandSpec, Commands},
  event::{ActorRef, CommsKind, Event},
};

pub(super) fn register(c: &mut Commands) {
  c.add(
    CommandSpec::new("say", "say <message> - speak to the room", say)
      .blocked_by(&[BuffFlag::Muted]),
  );
  c.add(
    CommandSpec::new("shout", "shout <message> - shout across the zone", shout)
      .blocked_by(&[BuffFlag::Muted]),
  );
  c.add(
    CommandSpec::new("whisper", "whisper <name> <message> - speak privately", whisper)
      .blocked_by(&[BuffFlag::Muted]),
  );
}

fn say(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Say what?");
    return Ok(true);
  }
  ctx.reply(format!("You say, \"{rest}\""));
  ctx.reply_room(format!("{} says, \"{rest}\"", ctx.user.name));
  ctx.game.bus.enqueue(Event::Communication {
    source:  ActorRef::User(ctx.user.id),
    kind:    CommsKind::Say,
    name:    ctx.user.name.clone(),
    message: rest.to_string(),
  });
  Ok(true)
}

fn shout(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Shout what?");
    return Ok(true);
  }
  let zone = ctx.room.lock().zone.clone();
  let text = format!("{} shouts, \"{rest}\"", ctx.user.name);
  for user in ctx.game.world.users() {
    if user.character.lock().zone == zone && user.id != ctx.user.id {
      if user.character.lock().buffs.flag_active(BuffFlag::Deafened) {
        continue;
      }
      ctx.game.send_user(user.id, text.clone());
    }
  }
  ctx.reply(format!("You shout, \"{rest}\""));
  ctx.game.bus.enqueue(Event::Communication {
    source:  ActorRef::User(ctx.user.id),
    kind:    CommsKind::Shout,
    name:    ctx.user.name.clone(),
    message: rest.to_string(),
  });
  Ok(true)
}

fn whisper(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let (name, message) = match rest.split_once(' ') {
    Some((n, m)) if !m.trim().is_empty() => (n, m.trim()),
    _ => {
      ctx.reply("Whisper to whom, what?");
      return Ok(true);
    }
  };
  let target = ctx.game.world.users().into_iter().find(|u| matches_name(&u.name, name));
  let target = match target {
    Some(t) if t.id != ctx.user.id => t,
    Some(_) => {
      ctx.reply("Muttering to yourself again?");
      return Ok(true);
    }
    None => {
      ctx.reply("They don't seem to be around.");
      return Ok(true);
    }
  };
  if target.character.lock().buffs.flag_active(BuffFlag::Deafened) {
    ctx.reply(format!("{} doesn't seem to hear you.", target.name));
    return Ok(true);
  }
  ctx.game.send_user(target.id, format!("{} whispers, \"{message}\"", ctx.user.name));
  ctx.reply(format!("You whisper to {}, \"{message}\"", target.name));
  ctx.game.bus.enqueue(Event::Communication {
    source:  ActorRef::User(ctx.user.id),
    kind:    CommsKind::Whisper,
    name:    ctx.user.name.clone(),
    message: message.to_string(),
  });
  Ok(true)
}
