//! The built-in command set. Most gameplay verbs are thin: they validate,
//! mutate the world under the current locks, and queue messages/events.

mod admin;
pub(crate) mod combat;
mod comms;
mod info;
mod items;
mod look;
pub(crate) mod movement;

use super::Commands;

pub fn register_all(c: &mut Commands) {
  look::register(c);
  movement::register(c);
  comms::register(c);
  items::register(c);
  combat::register(c);
  info::register(c);
  admin::register(c);

  // Aliases resolve before command lookup.
  c.alias("l", "look");
  c.alias("i", "inventory");
  c.alias("inv", "inventory");
  c.alias("kill", "attack");
  c.alias("k", "attack");
  c.alias("'", "say");
  c.alias("wear", "equip");
  c.alias("wield", "equip");
  c.alias("take", "get");
  c.alias("exit", "quit");
  c.alias("logout", "quit");
}
