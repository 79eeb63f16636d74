//! Flat-file persistence and the boot-time content registries.
//!
//! Every loadable entity implements [`Record`]: it knows its id, how to
//! validate itself, and where it lives relative to the data directory. On
//! boot, each content directory is loaded into a typed map keyed by id;
//! duplicate ids and validation failures are fatal there, and logged-and-
//! skipped on live reload.

use crate::{
  character::buffs::{BuffSpec, MARKER_SPEC_ID},
  item::ItemTemplate,
  mob::MobTemplate,
  mutator::MutatorSpec,
};
use lm_common::{
  id::{BuffId, ItemId, MobId},
  util::ThreadPool,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
  collections::HashMap,
  fmt, fs, io,
  path::{Path, PathBuf},
};

/// A flat-file entity.
pub trait Record: Serialize + DeserializeOwned {
  type Id: Eq + std::hash::Hash + Clone + fmt::Debug;

  fn id(&self) -> Self::Id;
  /// Checked on load. Fatal on boot, logged and skipped on live reload.
  fn validate(&self) -> Result<(), String>;
  /// Path relative to the data directory. The path a record was actually
  /// read from must end in this, or the load fails (path consistency).
  fn filepath(&self) -> PathBuf;
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
  #[error("io error under `{path}`: {err}")]
  Io { path: PathBuf, err: io::Error },
  #[error("could not parse `{path}`: {err}")]
  Parse { path: PathBuf, err: serde_yaml::Error },
  #[error("invalid record at `{path}`: {msg}")]
  Validation { path: PathBuf, msg: String },
  #[error("duplicate id {id} at `{path}`")]
  Duplicate { path: PathBuf, id: String },
  #[error("record at `{path}` does not match its canonical path `{expected}`")]
  PathMismatch { path: PathBuf, expected: PathBuf },
}

/// Recursively collects every `.yaml` file under `dir`. A missing directory
/// is an empty content set, not an error.
fn walk_yaml(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
  let iter = match fs::read_dir(dir) {
    Ok(v) => v,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };
  for entry in iter {
    let entry = entry?;
    let path = entry.path();
    if entry.file_type()?.is_dir() {
      walk_yaml(&path, out)?;
    } else if path.extension().map(|e| e == "yaml" || e == "yml").unwrap_or(false) {
      out.push(path);
    }
  }
  Ok(())
}

/// Loads every record under `<root>/<dir>` into an id-keyed map.
pub fn load_all<R: Record>(root: &Path, dir: &str) -> Result<HashMap<R::Id, R>, DataError> {
  let base = root.join(dir);
  let mut paths = vec![];
  walk_yaml(&base, &mut paths).map_err(|err| DataError::Io { path: base.clone(), err })?;
  paths.sort();

  let mut out = HashMap::new();
  for path in paths {
    let record = load_one::<R>(root, &path)?;
    let id = record.id();
    if out.contains_key(&id) {
      return Err(DataError::Duplicate { path, id: format!("{id:?}") });
    }
    out.insert(id, record);
  }
  Ok(out)
}

/// Loads and checks a single record file.
pub fn load_one<R: Record>(root: &Path, path: &Path) -> Result<R, DataError> {
  let src = fs::read_to_string(path)
    .map_err(|err| DataError::Io { path: path.to_path_buf(), err })?;
  let record: R = serde_yaml::from_str(&src)
    .map_err(|err| DataError::Parse { path: path.to_path_buf(), err })?;
  record
    .validate()
    .map_err(|msg| DataError::Validation { path: path.to_path_buf(), msg })?;
  let expected = record.filepath();
  if !path.ends_with(&expected) {
    return Err(DataError::PathMismatch { path: path.to_path_buf(), expected });
  }
  Ok(record)
}

/// Writes one record under the data directory. In careful mode the file is
/// written to a `.new` sibling and atomically renamed. A failed write is
/// retried once before giving up.
pub fn save_record<R: Record>(root: &Path, record: &R, careful: bool) -> io::Result<()> {
  let path = root.join(record.filepath());
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let src = serde_yaml::to_string(record)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
  let mut res = write_file(&path, &src, careful);
  if res.is_err() {
    res = write_file(&path, &src, careful);
  }
  res
}

fn write_file(path: &Path, src: &str, careful: bool) -> io::Result<()> {
  if careful {
    let tmp = path.with_extension("yaml.new");
    fs::write(&tmp, src)?;
    fs::rename(&tmp, path)
  } else {
    fs::write(path, src)
  }
}

/// Deletes a record's file, ignoring "already gone".
pub fn delete_record<R: Record>(root: &Path, record: &R) -> io::Result<()> {
  match fs::remove_file(root.join(record.filepath())) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

/// Saves a batch of records across the worker pool. Errors are logged, not
/// returned; the pool is waited on before this returns.
pub fn save_all<R: Record + Send + Sync + 'static>(
  root: &Path,
  records: Vec<R>,
  pool: &ThreadPool<()>,
  careful: bool,
) {
  let root = root.to_path_buf();
  for record in records {
    let root = root.clone();
    pool.execute(move |_| {
      if let Err(e) = save_record(&root, &record, careful) {
        error!("could not save `{}`: {e}", record.filepath().display());
      }
    });
  }
  pool.wait();
}

/// A player race, `races/<id>.yaml`. Sets the base line of the six stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
  pub id:   u32,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Stat name to base value.
  #[serde(default)]
  pub stats: HashMap<String, i32>,
}

/// A biome, `biomes/<id>.yaml`. Rooms reference these by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Biome {
  pub id:   String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Map symbol for renderers.
  #[serde(default)]
  pub symbol: Option<char>,
  /// Dark biomes need a light source or night vision.
  #[serde(default)]
  pub dark: bool,
}

impl Record for Race {
  type Id = u32;

  fn id(&self) -> u32 { self.id }
  fn validate(&self) -> Result<(), String> {
    if self.name.is_empty() {
      return Err("race has no name".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("races/{}.yaml", self.id).into() }
}

impl Record for Biome {
  type Id = String;

  fn id(&self) -> String { self.id.clone() }
  fn validate(&self) -> Result<(), String> {
    if self.id.is_empty() {
      return Err("biome has no id".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("biomes/{}.yaml", self.id).into() }
}

impl Record for ItemTemplate {
  type Id = ItemId;

  fn id(&self) -> ItemId { self.id }
  fn validate(&self) -> Result<(), String> {
    if self.name.is_empty() {
      return Err("item has no name".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("items/{}.yaml", self.id).into() }
}

impl Record for BuffSpec {
  type Id = BuffId;

  fn id(&self) -> BuffId { self.id }
  fn validate(&self) -> Result<(), String> {
    if self.id == MARKER_SPEC_ID {
      return Err("buff id 0 is reserved".into());
    }
    if self.round_interval == 0 {
      return Err("round-interval must be at least 1".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf {
    format!("buffs/{}-{}.yaml", self.id, slug(&self.name)).into()
  }
}

impl Record for MutatorSpec {
  type Id = String;

  fn id(&self) -> String { self.id.clone() }
  fn validate(&self) -> Result<(), String> {
    if self.decay_rounds == 0 {
      return Err("decay-rounds must be at least 1".into());
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("mutators/{}.yaml", self.id).into() }
}

/// Lowercases and dashes a display name for use in a file name.
pub fn slug(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
    .collect()
}

/// Every passive content registry, loaded once at boot. These are the
/// explicit singletons the rest of the engine reads specs from; nothing here
/// changes after startup (live reload swaps whole maps).
pub struct Registries {
  pub races:    HashMap<u32, Race>,
  pub items:    HashMap<ItemId, ItemTemplate>,
  pub mobs:     HashMap<MobId, MobTemplate>,
  pub buffs:    HashMap<BuffId, BuffSpec>,
  pub biomes:   HashMap<String, Biome>,
  pub mutators: HashMap<String, MutatorSpec>,
}

impl Registries {
  pub fn load(root: &Path) -> Result<Registries, DataError> {
    let reg = Registries {
      races:    load_all(root, "races")?,
      items:    load_all(root, "items")?,
      mobs:     load_all(root, "mobs")?,
      buffs:    load_all(root, "buffs")?,
      biomes:   load_all(root, "biomes")?,
      mutators: load_all(root, "mutators")?,
    };
    info!(
      "loaded {} races, {} items, {} mobs, {} buffs, {} biomes, {} mutators",
      reg.races.len(),
      reg.items.len(),
      reg.mobs.len(),
      reg.buffs.len(),
      reg.biomes.len(),
      reg.mutators.len()
    );
    Ok(reg)
  }

  /// An empty set of registries, for tests and tools.
  pub fn empty() -> Registries {
    Registries {
      races:    HashMap::new(),
      items:    HashMap::new(),
      mobs:     HashMap::new(),
      buffs:    HashMap::new(),
      biomes:   HashMap::new(),
      mutators: HashMap::new(),
    }
  }
}

#[cfg(test)]
mod tests;
