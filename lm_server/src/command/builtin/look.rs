use crate::{
  character::buffs::BuffFlag,
  command::{matches_name, CommandCtx, CommandError, CommandSpec, Commands},
  event::Event,
};

pub(super) fn register(c: &mut Commands) {
  c.add(CommandSpec::new("look", "look [target] - look around, or at something", look));
}

fn look(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    show_room(ctx);
    return Ok(true);
  }
  look_at(ctx, rest);
  Ok(true)
}

/// Renders the user's current room. Also used after movement.
pub(crate) fn show_room(ctx: &mut CommandCtx) {
  let game = ctx.game;
  let user_id = ctx.user.id;
  let round = game.world.round();
  let reg = &game.world.registries;

  let mut out = String::new();
  let room = ctx.room.lock();

  // Dark biomes need night vision or a light source.
  let dark = room
    .biome
    .as_deref()
    .and_then(|b| reg.biomes.get(b))
    .map(|b| b.dark)
    .unwrap_or(false);
  if dark && !game.world.is_day() {
    let character = ctx.user.character.lock();
    let can_see = character.buffs.flag_active(BuffFlag::NightVision)
      || character.buffs.flag_active(BuffFlag::EmitsLight);
    if !can_see {
      drop(character);
      drop(room);
      ctx.reply("It's pitch dark here.");
      return;
    }
  }

  out.push_str(&format!("{{bold}}{{cyan}}{}{{/}}\r\n", room.title));

  // Mutators decorate the description: the room's own first, then the
  // zone's.
  let mut description = room.description.clone();
  for m in &room.mutators {
    if let Some(spec) = reg.mutators.get(&m.spec_id) {
      description = spec.decorated_text(&description);
    }
  }
  if let Some(zone) = game.world.zone(&room.zone) {
    for m in &zone.lock().mutators {
      if let Some(spec) = reg.mutators.get(&m.spec_id) {
        description = spec.decorated_text(&description);
      }
    }
  }
  out.push_str(&description);
  out.push_str("\r\n");

  let exits = room.visible_exits(round);
  if exits.is_empty() {
    out.push_str("There are no obvious exits.\r\n");
  } else {
    out.push_str(&format!("{{green}}Exits:{{/}} {}\r\n", exits.join(", ")));
  }

  for sign in room.visible_signs(user_id) {
    out.push_str(&format!("{{yellow}}A sign reads:{{/}} {}\r\n", sign.text));
  }

  if room.gold > 0 {
    out.push_str(&format!("{} gold coins are scattered here.\r\n", room.gold));
  }
  for item in room.visible_items(user_id) {
    if let Some(t) = reg.items.get(&item.id) {
      out.push_str(&format!("  {} lies here.\r\n", t.name));
    }
  }
  for corpse in &room.corpses {
    out.push_str(&format!("  The corpse of {} lies here.\r\n", corpse.name));
  }
  for instance_id in &room.mobs {
    if let Some(mob) = game.world.mob(*instance_id) {
      out.push_str(&format!("  {} is here.\r\n", mob.lock().character.name));
    }
  }
  for other in &room.players {
    if *other == user_id {
      continue;
    }
    if let Some(u) = game.world.user(*other) {
      out.push_str(&format!("  {} is here.\r\n", u.name));
    }
  }

  let room_id = room.id;
  drop(room);

  ctx.user.send_text(&out);
  game.bus.enqueue(Event::Looking {
    user_id,
    room_id,
    target: String::new(),
    hidden: false,
  });
}

fn look_at(ctx: &mut CommandCtx, target: &str) {
  let game = ctx.game;
  let reg = &game.world.registries;
  let (room_id, mobs, players, item_ids) = {
    let room = ctx.room.lock();
    (
      room.id,
      room.mobs.clone(),
      room.players.clone(),
      room.visible_items(ctx.user.id).map(|i| i.id).collect::<Vec<_>>(),
    )
  };

  // Mobs, players, then items.
  for instance_id in mobs {
    if let Some(mob) = game.world.mob(instance_id) {
      let mob = mob.lock();
      if matches_name(&mob.character.name, target) {
        let desc = reg
          .mobs
          .get(&mob.template_id)
          .map(|t| t.description.clone())
          .unwrap_or_default();
        let text = if desc.is_empty() {
          format!("{} doesn't look very remarkable.", mob.character.name)
        } else {
          desc
        };
        drop(mob);
        ctx.reply(text);
        game.bus.enqueue(Event::Looking {
          user_id: ctx.user.id,
          room_id,
          target: target.to_string(),
          hidden: false,
        });
        return;
      }
    }
  }
  for other in players {
    if other == ctx.user.id {
      continue;
    }
    if let Some(u) = game.world.user(other) {
      if matches_name(&u.name, target) {
        let level = u.character.lock().level;
        ctx.reply(format!("{} is here, looking about level {level}.", u.name));
        return;
      }
    }
  }
  for id in item_ids {
    if let Some(t) = reg.items.get(&id) {
      if matches_name(&t.name, target) {
        let text =
          if t.description.is_empty() { format!("It's {}.", t.name) } else { t.description.clone() };
        ctx.reply(text);
        return;
      }
    }
  }
  ctx.reply("You don't see that here.");
}
