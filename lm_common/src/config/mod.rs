//! Server configuration.
//!
//! A [`Config`] is three layers of YAML deep: runtime overrides (written by
//! the in-game `config` admin command), the config file the operator edits,
//! and the compiled-in default. Lookups check the layers in that order, so a
//! key always resolves as long as it exists in the default source.

mod types;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use serde_yaml::Value;
use std::{fs, path::PathBuf, sync::Arc};

pub use types::YamlValue;

/// Keys that may never be changed at runtime.
pub const LOCKED_KEYS: &[&str] = &["server.seed"];
/// Keys whose values are redacted in any user-visible output. These can also
/// be populated from the environment, see [`Config::apply_env`].
pub const SECRET_KEYS: &[&str] = &["server.seed", "integrations.webhook-url"];

pub struct Config {
  overrides_path: Option<PathBuf>,
  overrides:      RwLock<Value>,
  primary:        Value,
  default:        Value,
}

/// A dot-path into the config. To index into maps, use the name of a section.
/// To index into an array, use a number. Example:
///
/// ```yaml
/// foo: bar
/// hello:
///   name: world
///   times: 1
/// items:
///   - 3
///   - 4
/// ```
///
/// These are valid keys: `foo`, `hello.name`, `items.0`.
pub trait YamlKey {
  fn sections(&self) -> Vec<&str>;
}

impl YamlKey for str {
  fn sections(&self) -> Vec<&str> { self.split('.').collect() }
}
impl YamlKey for [&str] {
  fn sections(&self) -> Vec<&str> { self.to_vec() }
}

/// A view into one section of the config. Created with [`Config::section`].
#[derive(Clone)]
pub struct ConfigSection {
  config: Arc<Config>,
  prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSetError {
  /// The key didn't resolve to anything in the default tree.
  UnknownKey(String),
  /// The key resolved to more than one path.
  Ambiguous(Vec<String>),
  /// The key is in [`LOCKED_KEYS`].
  Locked(String),
  /// The overrides file could not be written.
  Io(String),
}

impl std::fmt::Display for ConfigSetError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self {
      Self::UnknownKey(k) => write!(f, "unknown config key `{k}`"),
      Self::Ambiguous(all) => write!(f, "ambiguous config key, could be any of {all:?}"),
      Self::Locked(k) => write!(f, "config key `{k}` is locked"),
      Self::Io(e) => write!(f, "could not save config overrides: {e}"),
    }
  }
}
impl std::error::Error for ConfigSetError {}

impl Config {
  /// Creates a new config. `path` is the operator's config file, and
  /// `overrides_path` holds runtime overrides written by the `config` admin
  /// command. Both may be missing on disk; the compiled-in `default_src` is
  /// the final fallback, and must parse.
  pub fn new(path: &str, overrides_path: &str, default_src: &str) -> Self {
    Config {
      overrides_path: Some(overrides_path.into()),
      overrides:      RwLock::new(Self::load_yaml(overrides_path, false)),
      primary:        Self::load_yaml(path, true),
      default:        Self::load_yaml_src(default_src),
    }
  }

  /// Creates a config from yaml source, without any file backing. Used in
  /// tests, and for tools that don't want a config file.
  pub fn new_src(primary: &str, default_src: &str) -> Self {
    Config {
      overrides_path: None,
      overrides:      RwLock::new(Value::Null),
      primary:        Self::load_yaml_src(primary),
      default:        Self::load_yaml_src(default_src),
    }
  }

  fn load_yaml(path: &str, warn_missing: bool) -> Value {
    let src = match fs::read_to_string(path) {
      Ok(v) => v,
      Err(e) => {
        if warn_missing {
          warn!("error loading yaml at `{path}`: {e}");
        }
        return Value::Null;
      }
    };
    Self::load_yaml_src(&src)
  }
  fn load_yaml_src(src: &str) -> Value {
    match serde_yaml::from_str(src) {
      Ok(v) => v,
      Err(e) => {
        error!("error parsing yaml: {e}");
        Value::Null
      }
    }
  }

  /// Reads the config value at the given key. This will always return a
  /// value. If the value doesn't exist in the overrides or the primary config
  /// (or the value is the wrong type), then the default config is used. If it
  /// doesn't exist there (or if it's the wrong type), this function panics.
  ///
  /// Every key that can be loaded must be present in the default config, so
  /// that it is easy for operators to discover keys by reading that file.
  pub fn get<K: ?Sized, T>(&self, key: &K) -> T
  where
    K: YamlKey,
    T: YamlValue,
  {
    let sections = key.sections();
    {
      let over = self.overrides.read();
      if let Some(v) = T::from_yaml(Self::get_val(&over, &sections)) {
        return v;
      }
    }
    let val = Self::get_val(&self.primary, &sections);
    match T::from_yaml(val) {
      Some(v) => v,
      None => {
        if !val.is_null() {
          warn!(
            "unexpected value at `{}`: {:?}, expected a {}",
            sections.join("."),
            val,
            T::name()
          );
        }
        self.get_default(key)
      }
    }
  }

  /// Gets the default value at the given key. Panics if the key does not
  /// exist, or if it is the wrong type.
  pub fn get_default<K: ?Sized, T>(&self, key: &K) -> T
  where
    K: YamlKey,
    T: YamlValue,
  {
    let sections = key.sections();
    let val = Self::get_val(&self.default, &sections);
    match T::from_yaml(val) {
      Some(v) => v,
      None => panic!(
        "default does not contain key `{}` (or it is not a {})",
        sections.join("."),
        T::name()
      ),
    }
  }

  fn get_val<'a>(mut val: &'a Value, sections: &[&str]) -> &'a Value {
    for s in sections {
      val = match val {
        Value::Mapping(m) => match m.get(&Value::String((*s).into())) {
          Some(v) => v,
          None => return &Value::Null,
        },
        Value::Sequence(items) => match s.parse::<usize>().ok().and_then(|i| items.get(i)) {
          Some(v) => v,
          None => return &Value::Null,
        },
        _ => return &Value::Null,
      };
    }
    val
  }

  /// Returns a view into the given section. `section.get("foo")` is the same
  /// as `config.get("<name>.foo")`.
  pub fn section(self: &Arc<Self>, name: &str) -> ConfigSection {
    ConfigSection { config: self.clone(), prefix: name.into() }
  }

  /// All the dot-paths of leaf values in the default tree, sorted. This is
  /// the set of keys `get` may be called with.
  pub fn all_keys(&self) -> Vec<String> {
    let mut out = vec![];
    fn walk(v: &Value, path: &mut Vec<String>, out: &mut Vec<String>) {
      match v {
        Value::Mapping(m) => {
          for (k, v) in m {
            if let Value::String(k) = k {
              path.push(k.clone());
              walk(v, path, out);
              path.pop();
            }
          }
        }
        _ => out.push(path.join(".")),
      }
    }
    walk(&self.default, &mut vec![], &mut out);
    out.sort();
    out
  }

  /// Resolves user input to a canonical config key, case-insensitively.
  /// Tries, in order: an exact path match, a unique leaf-name match, and a
  /// unique substring match.
  pub fn resolve_key(&self, input: &str) -> Result<String, ConfigSetError> {
    let needle = input.to_ascii_lowercase();
    let keys = self.all_keys();
    if let Some(k) = keys.iter().find(|k| k.to_ascii_lowercase() == needle) {
      return Ok(k.clone());
    }
    let by_leaf: Vec<_> = keys
      .iter()
      .filter(|k| k.rsplit('.').next().unwrap().to_ascii_lowercase() == needle)
      .cloned()
      .collect();
    match by_leaf.len() {
      1 => return Ok(by_leaf.into_iter().next().unwrap()),
      n if n > 1 => return Err(ConfigSetError::Ambiguous(by_leaf)),
      _ => {}
    }
    let by_sub: Vec<_> =
      keys.iter().filter(|k| k.to_ascii_lowercase().contains(&needle)).cloned().collect();
    match by_sub.len() {
      0 => Err(ConfigSetError::UnknownKey(input.into())),
      1 => Ok(by_sub.into_iter().next().unwrap()),
      _ => Err(ConfigSetError::Ambiguous(by_sub)),
    }
  }

  pub fn is_locked(key: &str) -> bool { LOCKED_KEYS.contains(&key) }
  pub fn is_secret(key: &str) -> bool { SECRET_KEYS.contains(&key) }

  /// Renders the value at `key` for user output, redacting secrets.
  pub fn display_value(&self, key: &str) -> String {
    if Self::is_secret(key) {
      return "<redacted>".into();
    }
    let sections = key.sections();
    let over = self.overrides.read();
    let mut val = Self::get_val(&over, &sections);
    if val.is_null() {
      val = Self::get_val(&self.primary, &sections);
    }
    if val.is_null() {
      val = Self::get_val(&self.default, &sections);
    }
    serde_yaml::to_string(val).map(|s| s.trim().to_string()).unwrap_or_default()
  }

  /// Sets a runtime override. `input` is resolved with [`Self::resolve_key`];
  /// the value string is parsed as a YAML scalar (so `true`, `3`, and plain
  /// strings all do what you'd expect). The override is persisted to the
  /// overrides file right away.
  pub fn set(&self, input: &str, value: &str) -> Result<String, ConfigSetError> {
    let key = self.resolve_key(input)?;
    if Self::is_locked(&key) {
      return Err(ConfigSetError::Locked(key));
    }
    let parsed: Value = serde_yaml::from_str(value).unwrap_or(Value::String(value.into()));
    self.set_raw(&key, parsed);
    self.persist_overrides()?;
    Ok(key)
  }

  /// Inserts an override without touching disk.
  fn set_raw(&self, key: &str, value: Value) {
    let mut over = self.overrides.write();
    if !over.is_mapping() {
      *over = Value::Mapping(Default::default());
    }
    let mut cur = &mut *over;
    let sections = key.sections();
    for (i, s) in sections.iter().enumerate() {
      let m = cur.as_mapping_mut().unwrap();
      let k = Value::String((*s).into());
      if i == sections.len() - 1 {
        m.insert(k, value);
        return;
      }
      if !m.get(&k).map(Value::is_mapping).unwrap_or(false) {
        m.insert(k.clone(), Value::Mapping(Default::default()));
      }
      cur = m.get_mut(&k).unwrap();
    }
  }

  fn persist_overrides(&self) -> Result<(), ConfigSetError> {
    let path = match &self.overrides_path {
      Some(p) => p,
      None => return Ok(()),
    };
    let src = serde_yaml::to_string(&*self.overrides.read())
      .map_err(|e| ConfigSetError::Io(e.to_string()))?;
    fs::write(path, src).map_err(|e| ConfigSetError::Io(e.to_string()))
  }

  /// Populates secret keys from the environment. The variable name for
  /// `server.seed` is `LM_SERVER_SEED`. Values loaded this way are runtime
  /// overrides and are never written back to disk.
  pub fn apply_env(&self) {
    for key in SECRET_KEYS {
      let var = format!("LM_{}", key.replace(['.', '-'], "_").to_ascii_uppercase());
      if let Ok(v) = std::env::var(&var) {
        self.set_raw(key, Value::String(v));
      }
    }
  }
}

impl ConfigSection {
  pub fn get<K: ?Sized, T>(&self, key: &K) -> T
  where
    K: YamlKey,
    T: YamlValue,
  {
    let mut sections: Vec<&str> = self.prefix.split('.').collect();
    sections.extend(key.sections());
    self.config.get(&sections[..])
  }

  pub fn section(&self, name: &str) -> ConfigSection {
    ConfigSection { config: self.config.clone(), prefix: format!("{}.{name}", self.prefix) }
  }
}
