use crate::{
  character::buffs::BuffFlag,
  command::{CommandCtx, CommandError, CommandSpec, Commands},
};

pub(super) fn register(c: &mut Commands) {
  c.add(
    CommandSpec::new("go", "go <exit> - move through an exit", go)
      .blocked_by(&[BuffFlag::NoMovement]),
  );
}

fn go(rest: &str, ctx: &mut CommandCtx) -> Result<bool, CommandError> {
  if rest.is_empty() {
    ctx.reply("Go where?");
    return Ok(true);
  }
  move_through_exit(ctx, &rest.to_ascii_lowercase());
  Ok(true)
}

/// Moves the user through a named exit on their current room. Shared by the
/// `go` command and bare exit names.
pub(crate) fn move_through_exit(ctx: &mut CommandCtx, exit_name: &str) {
  let game = ctx.game;
  let round = game.world.round();

  let target = {
    let mut room = ctx.room.lock();
    let exit = match room.exits.get_mut(exit_name) {
      Some(e) if !e.expired(round) => e,
      _ => {
        drop(room);
        ctx.reply("You can't go that way.");
        return;
      }
    };
    if let Some(lock) = &mut exit.lock {
      if !lock.unlocked {
        let known = ctx.user.character.lock().key_ring.contains_key(&lock.id);
        if known {
          lock.unlocked = true;
        } else {
          drop(room);
          ctx.reply("It's locked.");
          return;
        }
      }
    }
    exit.target
  };

  match game.world.move_to_room(&game.bus, ctx.user.id, target) {
    Ok(arrived) => {
      // Re-point the ctx at the new room and show it.
      if let Some(room) = game.world.room_if_loaded(arrived) {
        ctx.room = room;
        super::look::show_room(ctx);
      }
    }
    Err(e) => {
      debug!("move through `{exit_name}` failed for {}: {e}", ctx.user.name);
      ctx.reply("You can't go that way.");
    }
  }
}
