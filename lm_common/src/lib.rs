#[macro_use]
extern crate log;

pub mod config;
pub mod id;
pub mod util;

pub use config::Config;

use log::LevelFilter;
use std::io;

/// Initializes logging to stdout. Lines are formatted with the same tag
/// markup the game sends to players (see [`util::ansi`]), rendered in color
/// when stdout is a terminal and stripped when it isn't.
pub fn init(level: LevelFilter) { init_with_writer(level, io::stdout()); }

/// Like [`init`], but logging into an arbitrary sink. Colors are stripped.
/// Calling this (or `init`) more than once is a no-op, which keeps tests
/// that each build their own world from fighting over the global logger.
pub fn init_with_writer<W: io::Write + Send + 'static>(level: LevelFilter, writer: W) {
  use crate::util::ansi::{self, RenderMode};
  use log::{Level, Metadata, Record};
  use parking_lot::Mutex;

  #[cfg(unix)]
  let tty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
  #[cfg(not(unix))]
  let tty = false;

  struct TagLogger<W> {
    out:  Mutex<W>,
    mode: RenderMode,
  }

  impl<W: io::Write + Send> log::Log for TagLogger<W> {
    fn enabled(&self, _metadata: &Metadata) -> bool { true }

    fn log(&self, record: &Record) {
      let tag = match record.level() {
        Level::Error => "{bright-red}error{/}",
        Level::Warn => "{yellow} warn{/}",
        Level::Info => "{green} info{/}",
        Level::Debug => "{blue}debug{/}",
        Level::Trace => "{bright-black}trace{/}",
      };
      let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
      let line = format!(
        "{{bright-black}}{stamp}{{/}} {tag} {}] {}\n",
        record.target(),
        record.args()
      );
      let mut out = self.out.lock();
      let _ = out.write_all(ansi::render(&line, self.mode).as_bytes());
    }

    fn flush(&self) { let _ = self.out.lock().flush(); }
  }

  let mode = if tty { RenderMode::Default } else { RenderMode::Strip };
  let logger = TagLogger { out: Mutex::new(writer), mode };
  if log::set_boxed_logger(Box::new(logger)).is_ok() {
    log::set_max_level(level);
  }
}
