use crate::test_util;
use lm_common::id::RoomId;
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn room_script_compiles_once_and_memoizes_functions() {
  let dir = test_util::temp_dir("script-memo");
  test_util::write_room(&dir, "zone", 1, &[]);
  fs::write(
    dir.join("rooms/zone/1.rhai"),
    r#"
fn on_command_ping(rest, user, room) {
  user.send_text("pong " + rest);
  true
}
"#,
  )
  .unwrap();

  let game = test_util::game(&dir);
  let (user_id, buf) = test_util::login(&game, "tester");
  test_util::clear_output(&buf);

  test_util::run_command(&game, user_id, "ping one");
  test_util::run_command(&game, user_id, "ping two");
  assert_eq!(game.scripts.vm_count(), 1);
  let out = test_util::output_text(&buf);
  assert!(out.contains("pong one"), "{out}");
  assert!(out.contains("pong two"), "{out}");

  // A function the script doesn't export falls through to "bad command",
  // and the missing lookup is memoized rather than retried.
  test_util::clear_output(&buf);
  test_util::run_command(&game, user_id, "dance");
  assert!(test_util::output_text(&buf).contains("doesn't make sense"));
}

#[test]
fn on_load_runs_once() {
  let dir = test_util::temp_dir("script-on-load");
  test_util::write_room(&dir, "zone", 1, &[]);
  fs::write(
    dir.join("rooms/zone/1.rhai"),
    r#"
fn on_load(room) {
  room.set_temp_data("loads", "once");
}
fn on_command_poke(rest, user, room) {
  true
}
"#,
  )
  .unwrap();

  let game = test_util::game(&dir);
  let (user_id, _buf) = test_util::login(&game, "tester");
  test_util::run_command(&game, user_id, "poke");
  test_util::run_command(&game, user_id, "poke");

  let room = game.world.room_if_loaded(RoomId::Persistent(1)).unwrap();
  assert_eq!(room.lock().temp_data.get("loads").map(String::as_str), Some("once"));
}

#[test]
fn runaway_scripts_are_interrupted() {
  let dir = test_util::temp_dir("script-timeout");
  test_util::write_room(&dir, "zone", 1, &[]);
  fs::write(
    dir.join("rooms/zone/1.rhai"),
    r#"
fn on_command_spin(rest, user, room) {
  loop { }
  true
}
"#,
  )
  .unwrap();

  let game = test_util::game(&dir);
  let (user_id, buf) = test_util::login(&game, "tester");
  test_util::clear_output(&buf);

  let started = std::time::Instant::now();
  test_util::run_command(&game, user_id, "spin");
  // The 50 ms call budget cut it off, and the engine still works.
  assert!(started.elapsed() < std::time::Duration::from_secs(2));
  test_util::run_command(&game, user_id, "look");
  assert!(test_util::output_text(&buf).contains("Test room 1"));
}

#[test]
fn vms_prune_with_their_entities() {
  let dir = test_util::temp_dir("script-prune");
  test_util::write_room(&dir, "zone", 1, &[]);
  fs::write(dir.join("rooms/zone/1.rhai"), "fn on_enter(user, room) { }\n").unwrap();

  let game = test_util::game(&dir);
  let (_user_id, _buf) = test_util::login(&game, "tester");
  assert_eq!(game.scripts.vm_count(), 1);

  game.scripts.prune_room_vm(RoomId::Persistent(1));
  assert_eq!(game.scripts.vm_count(), 0);
}
