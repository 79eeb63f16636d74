//! Room persistence: the template/instance split.
//!
//! `rooms/<zone>/<id>.yaml` is the authoritative template. A sibling under
//! `rooms.instances/` holds only the fields that differ from it; loading
//! overlays the instance onto the template, and saving writes the structural
//! diff (deleting the file when the diff is empty, so a pristine room leaves
//! no instance behind).

use super::room::Room;
use crate::data::{self, DataError, Record};
use lm_common::id::RoomId;
use serde_yaml::{Mapping, Value};
use std::{
  collections::HashMap,
  fs, io,
  path::{Path, PathBuf},
};

/// Scans `rooms/` once and maps every room id to its template path, and
/// every zone name to its config path. Rooms themselves load lazily.
pub fn scan_room_files(
  data_dir: &Path,
) -> io::Result<(HashMap<RoomId, PathBuf>, Vec<PathBuf>)> {
  let mut rooms = HashMap::new();
  let mut zones = vec![];
  let base = data_dir.join("rooms");
  let zone_dirs = match fs::read_dir(&base) {
    Ok(v) => v,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((rooms, zones)),
    Err(e) => return Err(e),
  };
  for zone_dir in zone_dirs {
    let zone_dir = zone_dir?;
    if !zone_dir.file_type()?.is_dir() {
      continue;
    }
    for entry in fs::read_dir(zone_dir.path())? {
      let path = entry?.path();
      if path.extension().map(|e| e != "yaml").unwrap_or(true) {
        continue;
      }
      let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
      if stem == "zone-config" {
        zones.push(path);
      } else if let Ok(n) = stem.parse::<i64>() {
        rooms.insert(RoomId::from_number(n), path);
      } else {
        warn!("ignoring room file with a non-numeric name: {}", path.display());
      }
    }
  }
  Ok((rooms, zones))
}

/// Where a room's instance diff lives.
pub fn instance_path(data_dir: &Path, zone: &str, id: RoomId) -> PathBuf {
  data_dir.join(format!("rooms.instances/{zone}/{id}.yaml"))
}

/// Loads a room template and overlays its instance diff, if one exists.
/// An unreadable instance file is warned about and ignored (the template
/// still loads).
pub fn load_room(data_dir: &Path, template_path: &Path) -> Result<Room, DataError> {
  let template: Room = data::load_one(data_dir, template_path)?;
  let inst_path = instance_path(data_dir, &template.zone, template.id);
  let src = match fs::read_to_string(&inst_path) {
    Ok(v) => v,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(template),
    Err(e) => {
      warn!("could not read instance file `{}`: {e}", inst_path.display());
      return Ok(template);
    }
  };
  let overlay: Value = match serde_yaml::from_str(&src) {
    Ok(v) => v,
    Err(e) => {
      warn!("could not parse instance file `{}`: {e}", inst_path.display());
      return Ok(template);
    }
  };
  let mut merged = match serde_yaml::to_value(&template) {
    Ok(v) => v,
    Err(e) => return Err(DataError::Parse { path: template_path.to_path_buf(), err: e }),
  };
  if let (Value::Mapping(m), Value::Mapping(over)) = (&mut merged, overlay) {
    for (k, v) in over {
      m.insert(k, v);
    }
  }
  let mut room: Room = serde_yaml::from_value(merged)
    .map_err(|err| DataError::Parse { path: inst_path, err })?;
  // The overlay can't change identity fields.
  room.id = template.id;
  room.zone = template.zone;
  Ok(room)
}

/// The structural diff between a live room and its template: every
/// top-level field whose serialized form differs. Runtime-only fields never
/// serialize, so they can't leak in.
pub fn room_diff(template: &Room, live: &Room) -> Result<Mapping, serde_yaml::Error> {
  let t = serde_yaml::to_value(template)?;
  let l = serde_yaml::to_value(live)?;
  let mut diff = Mapping::new();
  if let (Value::Mapping(t), Value::Mapping(l)) = (t, l) {
    for (k, v) in l {
      if t.get(&k) != Some(&v) {
        diff.insert(k, v);
      }
    }
  }
  Ok(diff)
}

/// Saves a room's instance diff. An empty diff deletes the instance file.
/// Ephemeral rooms are never saved.
pub fn save_room_instance(
  data_dir: &Path,
  template_path: &Path,
  live: &Room,
  careful: bool,
) -> io::Result<()> {
  if live.id.is_ephemeral() {
    return Ok(());
  }
  let template: Room = data::load_one(data_dir, template_path)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
  let diff = room_diff(&template, live)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
  let path = instance_path(data_dir, &live.zone, live.id);
  if diff.is_empty() {
    return match fs::remove_file(&path) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    };
  }
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let src = serde_yaml::to_string(&Value::Mapping(diff))
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
  if careful {
    let tmp = path.with_extension("yaml.new");
    fs::write(&tmp, src)?;
    fs::rename(&tmp, path)
  } else {
    fs::write(path, src)
  }
}

/// Writes a room's template file. This is a template-only write: instance
/// state (signs, stashes, temporary exits) is untouched, and the live room
/// keeps its runtime fields.
pub fn save_room_template(data_dir: &Path, room: &Room, careful: bool) -> io::Result<()> {
  data::save_record(data_dir, room, careful)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::world::room::Exit;
  use pretty_assertions::assert_eq;

  fn room(id: i64) -> Room {
    Room {
      id: RoomId::from_number(id),
      zone: "testzone".into(),
      title: "A test room".into(),
      description: "Nothing to see.".into(),
      ..Default::default()
    }
  }

  #[test]
  fn diff_of_identical_rooms_is_empty() {
    let a = room(1);
    let mut b = a.clone();
    // Runtime fields don't count.
    b.last_visited_round = 99;
    b.players.insert(lm_common::id::UserId(1));
    assert!(room_diff(&a, &b).unwrap().is_empty());
  }

  #[test]
  fn diff_captures_changed_fields_only() {
    let a = room(1);
    let mut b = a.clone();
    b.gold = 50;
    b.exits.insert("north".into(), Exit::to(RoomId::Persistent(2)));
    let diff = room_diff(&a, &b).unwrap();
    assert_eq!(diff.len(), 2);
    assert!(diff.contains_key(&Value::String("gold".into())));
    assert!(diff.contains_key(&Value::String("exits".into())));
  }

  #[test]
  fn instance_round_trip() {
    let dir = crate::test_util::temp_dir("storage-round-trip");
    let template = room(7);
    save_room_template(&dir, &template, true).unwrap();
    let template_path = dir.join("rooms/testzone/7.yaml");

    // Fresh load: identical to the template, so saving writes no instance.
    let live = load_room(&dir, &template_path).unwrap();
    save_room_instance(&dir, &template_path, &live, true).unwrap();
    assert!(!instance_path(&dir, "testzone", live.id).exists());

    // Mutate, save, and reload: the change survives, the template doesn't
    // move.
    let mut live = live;
    live.gold = 123;
    save_room_instance(&dir, &template_path, &live, true).unwrap();
    assert!(instance_path(&dir, "testzone", live.id).exists());
    let back = load_room(&dir, &template_path).unwrap();
    assert_eq!(back.gold, 123);
    let on_disk: Room = crate::data::load_one(&dir, &template_path).unwrap();
    assert_eq!(on_disk.gold, 0);

    // Reverting the change deletes the instance file again.
    live.gold = 0;
    save_room_instance(&dir, &template_path, &live, true).unwrap();
    assert!(!instance_path(&dir, "testzone", live.id).exists());
  }
}
