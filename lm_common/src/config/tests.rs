use super::{Config, ConfigSetError};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn parse_simple_values() {
  let config = Config::new_src(
    r#"
foo: 3
bar: 4
options:
  baz: 2
  other: 100
"#,
    "",
  );

  assert_eq!(config.get::<_, i64>("foo"), 3);
  assert_eq!(config.get::<_, i64>("bar"), 4);

  let config = Arc::new(config);
  let section = config.section("options");
  assert_eq!(section.get::<_, i64>("baz"), 2);
  assert_eq!(section.get::<_, i64>("other"), 100);
}

#[test]
fn default_fallback() {
  let config = Config::new_src(
    "timing:\n  turn-ms: 250\n",
    "timing:\n  turn-ms: 100\n  turns-per-round: 4\n",
  );
  assert_eq!(config.get::<_, u64>("timing.turn-ms"), 250);
  assert_eq!(config.get::<_, u64>("timing.turns-per-round"), 4);
}

#[test]
fn wrong_type_falls_back_to_default() {
  let config = Config::new_src("port: not-a-number\n", "port: 4000\n");
  assert_eq!(config.get::<_, u16>("port"), 4000);
}

#[test]
fn sequences_index_by_number() {
  let config = Config::new_src("", "exits:\n  - north\n  - south\n");
  assert_eq!(config.get::<_, String>("exits.1"), "south");
  assert_eq!(config.get::<_, Vec<String>>("exits"), vec!["north".to_string(), "south".into()]);
}

#[test]
fn set_overrides_and_resolution() {
  let config = Config::new_src(
    "",
    "server:\n  mud-name: Loam\n  seed: abc\ngameplay:\n  pvp: false\n",
  );

  // Fuzzy, case-insensitive resolution down to the canonical path.
  assert_eq!(config.resolve_key("PVP").unwrap(), "gameplay.pvp");
  assert_eq!(config.resolve_key("gameplay.pvp").unwrap(), "gameplay.pvp");
  assert_eq!(config.resolve_key("mudname"), Err(ConfigSetError::UnknownKey("mudname".into())));

  config.set("pvp", "true").unwrap();
  assert_eq!(config.get::<_, bool>("gameplay.pvp"), true);

  // Locked keys refuse mutation.
  assert_eq!(config.set("seed", "oops"), Err(ConfigSetError::Locked("server.seed".into())));
}

#[test]
fn secrets_are_redacted() {
  let config = Config::new_src("", "server:\n  seed: sekrit\n");
  assert_eq!(config.display_value("server.seed"), "<redacted>");
  assert!(Config::is_secret("server.seed"));
  assert!(!Config::is_secret("server.mud-name"));
}
