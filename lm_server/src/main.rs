#[macro_use]
extern crate log;

use clap::Parser;
use lm_common::Config;
use lm_server::{net::ConnectionManager, tick, Game};
use std::{path::PathBuf, sync::Arc, thread};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
  /// Path to the config file.
  #[clap(long, default_value = "config.yaml")]
  config: String,
  /// Path to the runtime overrides file (written by `config set`).
  #[clap(long, default_value = "config-overrides.yaml")]
  overrides: String,
  /// Data directory. Overrides the `data-dir` config key.
  #[clap(long)]
  data_dir: Option<PathBuf>,
}

fn main() {
  let args = Args::parse();
  let config = Config::new(&args.config, &args.overrides, include_str!("default.yaml"));
  config.apply_env();
  let config = Arc::new(config);

  let level = config.get("log-level");
  lm_common::init(level);

  let addr = match config.get::<_, String>("address").parse() {
    Ok(v) => v,
    Err(e) => {
      error!("invalid address: {e}");
      return;
    }
  };
  let data_dir = args.data_dir.unwrap_or_else(|| config.get::<_, String>("data-dir").into());

  let game = match Game::new(config, &data_dir) {
    Ok(g) => g,
    Err(e) => {
      error!("could not boot the world: {e}");
      return;
    }
  };

  tick::install_signal_handler();

  let net_game = game.clone();
  thread::spawn(move || {
    let mut conn = ConnectionManager::new(net_game);
    info!("listening on {addr}");
    match conn.run(addr) {
      Ok(_) => {}
      Err(e) => error!("error in connection manager: {e}"),
    }
  });

  // The simulation owns the main thread; when it returns, we're saved and
  // done.
  tick::Ticker::new(game).run();
}
