//! The tick scheduler.
//!
//! One thread drives the whole simulation: every iteration advances the
//! turn counter, emits `NewRound` when a round boundary is crossed, always
//! emits `NewTurn`, drains the bus, then sleeps out the rest of the tick.
//! Everything interesting happens in listeners (see `hooks`).

use crate::{event::Event, Game};
use std::{
  fs,
  path::Path,
  sync::atomic::{AtomicBool, Ordering},
  time::{Duration, Instant},
};

/// Rounds never restart below this. It keeps "rounds ago" arithmetic on
/// saved data valid across restarts; the exact value is policy, not load-
/// bearing.
pub const ROUND_FLOOR: u64 = 1_300_000;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Flags the main loop to stop after the current tick.
pub fn request_shutdown() { SHUTDOWN.store(true, Ordering::SeqCst); }

pub fn shutdown_requested() -> bool { SHUTDOWN.load(Ordering::SeqCst) }

/// Routes SIGINT/SIGTERM to `request_shutdown`, so the loop gets to save
/// before exiting.
#[cfg(target_family = "unix")]
pub fn install_signal_handler() {
  use nix::sys::signal::{signal, SigHandler, Signal};

  extern "C" fn handle(_sig: nix::libc::c_int) { request_shutdown(); }

  let handler = SigHandler::Handler(handle);
  unsafe {
    let _ = signal(Signal::SIGINT, handler);
    let _ = signal(Signal::SIGTERM, handler);
  }
}

#[cfg(not(target_family = "unix"))]
pub fn install_signal_handler() {}

fn round_file(data_dir: &Path) -> std::path::PathBuf { data_dir.join(".roundcount") }

/// The last persisted round, floored. Missing or garbage files start at the
/// floor.
pub fn read_round_count(data_dir: &Path) -> u64 {
  let n = fs::read_to_string(round_file(data_dir))
    .ok()
    .and_then(|s| s.trim().parse::<u64>().ok())
    .unwrap_or(0);
  n.max(ROUND_FLOOR)
}

pub fn write_round_count(data_dir: &Path, round: u64) {
  if let Err(e) = fs::write(round_file(data_dir), round.to_string()) {
    error!("could not persist the round counter: {e}");
  }
}

pub struct Ticker {
  game: Game,
}

impl Ticker {
  pub fn new(game: Game) -> Ticker { Ticker { game } }

  /// Runs the simulation until shutdown. Restores the round counter first.
  pub fn run(self) {
    let game = &self.game;
    let data_dir = game.world.data_dir().clone();
    let round = read_round_count(&data_dir);
    game.world.set_round(round);
    info!("simulation starting at round {round}");

    let tick = Duration::from_millis(game.config.get::<_, u64>("timing.turn-ms").max(1));
    let turns_per_round = game.config.get::<_, u64>("timing.turns-per-round");

    let mut start = Instant::now();
    loop {
      if shutdown_requested() {
        self.shutdown();
        return;
      }
      let began = Instant::now();

      let (turn, new_round) = game.world.advance_turn(turns_per_round);
      if let Some(round) = new_round {
        game.bus.enqueue(Event::NewRound { round });
      }
      game.bus.enqueue(Event::NewTurn { turn });
      game.bus.drain(game);

      let passed = Instant::now().duration_since(start);
      start += tick;
      match tick.checked_sub(passed) {
        Some(t) => spin_sleep::sleep(t),
        None => {
          warn!("turn {turn} took {:?} (more than {tick:?})", began.elapsed());
          // Don't try to catch up; reschedule from now.
          start = Instant::now();
        }
      }
    }
  }

  /// The orderly way down: tell everyone, drain with a hard deadline, save
  /// the world.
  fn shutdown(self) {
    let game = &self.game;
    info!("shutting down");
    game.bus.enqueue(Event::Shutdown);

    let deadline = Instant::now() + Duration::from_secs(5);
    game.bus.drain(game);
    if game.bus.queued() > 0 && Instant::now() < deadline {
      game.bus.drain(game);
    }

    let careful = game.config.get::<_, bool>("saves.careful");
    for user in game.world.users() {
      game.world.save_user(&user, careful);
    }
    game.world.save_all_rooms(careful);
    write_round_count(game.world.data_dir(), game.world.round());
    game.world.dump_bad_commands();
    info!("world saved; goodbye");
  }
}
