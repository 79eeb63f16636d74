use crate::{
  command::{matches_name, CommandCtx, CommandError, CommandSpec, Commands},
  event::{ActorRef, Event},
  item::Item,
  script::SUser,
};
use lm_common::id::ItemId;
use rhai::Dynamic;

pub(super) fn register(c: &mut Commands) {
  c.add(CommandSpec::new("inventory", "inventory - what you're carrying", inventory));
  c.add(CommandSpec::new("get", "get <item> [<container>] - pick something up", get));
  c.add(CommandSpec::new("drop", "drop <item> - put something down", drop_cmd));
  c.add(CommandSpec::new("stash", "stash <item> - hide something here for later", stash));
  c.add(CommandSpec::new("put", "put <item> <container> - put something in a container", put));
  c.add(CommandSpec::new("use", "use <item or container> - use something", use_cmd));
  c.add(CommandSpec::new("equip", "equip <item> - wear or wield something", equip));
  c.add(CommandSpec::new("remove", "remove <item> - take something off", remove));
}

/// Whether a container is still locked for this user. A remembered key-ring
/// sequence opens it on the spot, like it does for exits.
fn container_locked(ctx: &CommandCtx, container: &mut crate::world::Container) -> bool {
  match &mut container.lock {
    Some(lock) if !lock.unlocked => {
      if ctx.user.character.lock().key_ring.contains_key(&lock.id) {
        lock.unlocked = true;
        false
      } else {
        true
      }
    }
    _ => false,
  }
}

/// The first backpack index whose template name answers to `needle`.
fn find_in_backpack(ctx: &CommandCtx, needle: &str) -> Option<usize> {
  let reg = &ctx.game.world.registries;
  let character = ctx.user.character.lock();
  character.backpack.iter().position(|item| {
    reg.items.get(&item.id).map(|t| matches_name(&t.name, needle)).unwrap_or(false)
  })
}

fn item_name(ctx: &CommandCtx, id: ItemId) -> String {
  ctx
    .game
    .world
    .registries
    .items
    .get(&id)
    .map(|t| t.name.clone())
    .unwrap_or_else(|| format!("item #{id}"))
}

fn inventory(_rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let character = ctx.user.character.lock();
  let mut out = String::from("{bold}You are carrying:{/}\r\n");
  if character.backpack.is_empty() {
    out.push_str("  nothing at all\r\n");
  }
  for item in &character.backpack {
    out.push_str(&format!("  {}\r\n", item_name(ctx, item.id)));
  }
  if !character.equipment.is_empty() {
    out.push_str("{bold}Equipped:{/}\r\n");
    for (slot, item) in &character.equipment {
      out.push_str(&format!("  [{slot}] {}\r\n", item_name(ctx, item.id)));
    }
  }
  out.push_str(&format!("Gold: {}\r\n", character.gold));
  drop(character);
  ctx.user.send_text(&out);
  Ok(true)
}

fn get(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Get what?");
    return Ok(true);
  }
  let (item_needle, container_needle) = match rest.split_once(' ') {
    Some((a, b)) => (a, Some(b.trim())),
    None => (rest, None),
  };
  if !ctx.user.character.lock().can_carry() {
    ctx.reply("Your hands are full.");
    return Ok(true);
  }
  let reg = &ctx.game.world.registries;

  let taken = {
    let mut room = ctx.room.lock();
    match container_needle {
      Some(needle) => {
        let name = room.containers.keys().find(|n| matches_name(n, needle)).cloned();
        match name {
          Some(name) => {
            let container = room.containers.get_mut(&name).unwrap();
            if container_locked(ctx, container) {
              drop(room);
              ctx.reply(format!("The {name} is locked."));
              return Ok(true);
            }
            let idx = container.items.iter().position(|item| {
              reg.items.get(&item.id).map(|t| matches_name(&t.name, item_needle)).unwrap_or(false)
            });
            idx.map(|i| container.items.remove(i))
          }
          None => {
            drop(room);
            ctx.reply("There's no container like that here.");
            return Ok(true);
          }
        }
      }
      None => {
        let user_id = ctx.user.id;
        let idx = room.items.iter().position(|item| {
          item.stashed_by.map(|u| u == user_id).unwrap_or(true)
            && reg.items.get(&item.id).map(|t| matches_name(&t.name, item_needle)).unwrap_or(false)
        });
        idx.map(|i| {
          let mut item = room.items.remove(i);
          item.stashed_by = None;
          item
        })
      }
    }
  };

  let mut item = match taken {
    Some(i) => i,
    None => {
      ctx.reply("You don't see that here.");
      return Ok(true);
    }
  };
  item.stashed_by = None;
  let id = item.id;
  ctx.user.character.lock().backpack.push(item);
  ctx.reply(format!("You pick up {}.", item_name(ctx, id)));
  ctx.reply_room(format!("{} picks up {}.", ctx.user.name, item_name(ctx, id)));
  ctx.game.bus.enqueue(Event::ItemOwnership {
    actor:  ActorRef::User(ctx.user.id),
    item:   id,
    gained: true,
  });
  Ok(true)
}

fn drop_cmd(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  drop_or_stash(rest, ctx, false)
}

fn stash(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  drop_or_stash(rest, ctx, true)
}

fn drop_or_stash(rest: &str, ctx: &mut CommandCtx, stashed: bool) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply(if stashed { "Stash what?" } else { "Drop what?" });
    return Ok(true);
  }
  let idx = match find_in_backpack(ctx, rest) {
    Some(i) => i,
    None => {
      ctx.reply("You aren't carrying that.");
      return Ok(true);
    }
  };
  let mut item = ctx.user.character.lock().backpack.remove(idx);
  let id = item.id;
  item.stashed_by = if stashed { Some(ctx.user.id) } else { None };
  ctx.room.lock().items.push(item);
  if stashed {
    ctx.reply(format!("You hide {} away here.", item_name(ctx, id)));
  } else {
    ctx.reply(format!("You drop {}.", item_name(ctx, id)));
    ctx.reply_room(format!("{} drops {}.", ctx.user.name, item_name(ctx, id)));
  }
  ctx.game.bus.enqueue(Event::ItemOwnership {
    actor:  ActorRef::User(ctx.user.id),
    item:   id,
    gained: false,
  });
  Ok(true)
}

fn put(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  let (item_needle, container_needle) = match rest.split_once(' ') {
    Some((a, b)) if !b.trim().is_empty() => (a, b.trim()),
    _ => {
      ctx.reply("Put what where?");
      return Ok(true);
    }
  };
  let idx = match find_in_backpack(ctx, item_needle) {
    Some(i) => i,
    None => {
      ctx.reply("You aren't carrying that.");
      return Ok(true);
    }
  };
  let mut room = ctx.room.lock();
  let name = match room.containers.keys().find(|n| matches_name(n, container_needle)).cloned() {
    Some(n) => n,
    None => {
      drop(room);
      ctx.reply("There's no container like that here.");
      return Ok(true);
    }
  };
  let container = room.containers.get_mut(&name).unwrap();
  if container_locked(ctx, container) {
    drop(room);
    ctx.reply(format!("The {name} is locked."));
    return Ok(true);
  }
  let item = ctx.user.character.lock().backpack.remove(idx);
  let id = item.id;
  container.items.push(item);
  drop(room);
  ctx.reply(format!("You put {} in the {name}.", item_name(ctx, id)));
  ctx.game.bus.enqueue(Event::ItemOwnership {
    actor:  ActorRef::User(ctx.user.id),
    item:   id,
    gained: false,
  });
  Ok(true)
}

fn use_cmd(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Use what?");
    return Ok(true);
  }

  // Containers first: `use box` runs its crafting recipes.
  let container_name = {
    let room = ctx.room.lock();
    room.containers.keys().find(|n| matches_name(n, rest)).cloned()
  };
  if let Some(name) = container_name {
    return use_container(ctx, &name);
  }

  // Then backpack items: spend a charge and fire the script.
  let idx = match find_in_backpack(ctx, rest) {
    Some(i) => i,
    None => {
      ctx.reply("You don't have that, and don't see it here.");
      return Ok(true);
    }
  };
  let id = ctx.user.character.lock().backpack[idx].id;
  {
    let mut character = ctx.user.character.lock();
    if !character.backpack[idx].spend_use() {
      drop(character);
      ctx.reply(format!("{} is used up.", item_name(ctx, id)));
      return Ok(true);
    }
  }
  let sctx = ctx.game.script_ctx();
  let args: Vec<Dynamic> = vec![Dynamic::from(SUser::wrap(&sctx, ctx.user.id))];
  match ctx.game.scripts.item_event(id, "on_use", args) {
    Some(_) => {}
    None => ctx.reply(format!("You fiddle with {}, to no effect.", item_name(ctx, id))),
  }
  Ok(true)
}

/// S5-style recipe handling: a complete ingredient list is consumed and the
/// result appears in the container; an incomplete one reports what's
/// missing.
fn use_container(ctx: &mut CommandCtx, name: &str) -> Result<bool, CommandError> {
  let reg = &ctx.game.world.registries;
  let mut room = ctx.room.lock();
  let container = match room.containers.get_mut(name) {
    Some(c) => c,
    None => return Ok(true),
  };
  if container_locked(ctx, container) {
    drop(room);
    ctx.reply(format!("The {name} is locked."));
    return Ok(true);
  }
  if container.recipes.is_empty() {
    drop(room);
    ctx.reply(format!("The {name} doesn't do anything."));
    return Ok(true);
  }

  if let Some((result, needed)) = container.ready_recipe() {
    let needed = needed.to_vec();
    container.consume(&needed);
    if let Some(t) = reg.items.get(&result) {
      container.items.push(Item::of(t));
    }
    drop(room);
    ctx.reply(format!("The {name} shudders, and produces {}!", item_name(ctx, result)));
    ctx.reply_room(format!("The {name} shudders as {} works it.", ctx.user.name));
    return Ok(true);
  }

  // Report the first recipe's gaps.
  let missing: Vec<String> = container
    .recipes
    .iter()
    .next()
    .map(|(_, needed)| container.missing_for(needed))
    .unwrap_or_default()
    .into_iter()
    .map(|id| {
      reg.items.get(&id).map(|t| t.name.clone()).unwrap_or_else(|| format!("item #{id}"))
    })
    .collect();
  drop(room);
  ctx.reply(format!("Nothing happens. It still needs: {}.", missing.join(", ")));
  Ok(true)
}

fn equip(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Equip what?");
    return Ok(true);
  }
  let idx = match find_in_backpack(ctx, rest) {
    Some(i) => i,
    None => {
      ctx.reply("You aren't carrying that.");
      return Ok(true);
    }
  };
  let reg = &ctx.game.world.registries;
  let mut character = ctx.user.character.lock();
  let id = character.backpack[idx].id;
  let slot = match reg.items.get(&id).and_then(|t| t.slot) {
    Some(s) => s,
    None => {
      drop(character);
      ctx.reply("You can't wear that.");
      return Ok(true);
    }
  };
  let item = character.backpack.remove(idx);
  if let Some(old) = character.equipment.insert(slot, item) {
    character.backpack.push(old);
  }
  character.recompute(&reg.items, &reg.buffs);
  drop(character);
  ctx.reply(format!("You equip {}.", item_name(ctx, id)));
  Ok(true)
}

fn remove(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Remove what?");
    return Ok(true);
  }
  let reg = &ctx.game.world.registries;
  let mut character = ctx.user.character.lock();
  let slot = character
    .equipment
    .iter()
    .find(|(slot, item)| {
      matches_name(&slot.to_string(), rest)
        || reg.items.get(&item.id).map(|t| matches_name(&t.name, rest)).unwrap_or(false)
    })
    .map(|(slot, _)| *slot);
  let slot = match slot {
    Some(s) => s,
    None => {
      drop(character);
      ctx.reply("You aren't wearing that.");
      return Ok(true);
    }
  };
  let item = character.equipment.remove(&slot).unwrap();
  let id = item.id;
  character.backpack.push(item);
  character.recompute(&reg.items, &reg.buffs);
  drop(character);
  ctx.reply(format!("You remove {}.", item_name(ctx, id)));
  Ok(true)
}
