use super::*;
use crate::test_util;
use lm_common::util::ThreadPool;
use pretty_assertions::assert_eq;

fn item(id: u32, name: &str) -> ItemTemplate {
  ItemTemplate {
    id: ItemId(id),
    name: name.into(),
    description: String::new(),
    slot: None,
    damage: Default::default(),
    value: 1,
    stat_mods: HashMap::new(),
    uses: -1,
  }
}

#[test]
fn save_and_load_round_trip() {
  let dir = test_util::temp_dir("data-round-trip");
  save_record(&dir, &item(3, "rusty nail"), true).unwrap();
  save_record(&dir, &item(5, "old plank"), true).unwrap();

  let items = load_all::<ItemTemplate>(&dir, "items").unwrap();
  assert_eq!(items.len(), 2);
  assert_eq!(items[&ItemId(3)].name, "rusty nail");
}

#[test]
fn duplicate_ids_are_fatal() {
  let dir = test_util::temp_dir("data-duplicates");
  // The same mob id in two zones: both paths are canonical for their
  // record, but the id collides.
  let mob = |zone: &str| MobTemplate {
    id: MobId(12),
    zone: zone.into(),
    name: "rat".into(),
    description: String::new(),
    level: 1,
    stats: HashMap::new(),
    hostile: false,
    idle_commands: vec![],
    damage: Default::default(),
    experience: 0,
    gold: 0,
    items: vec![],
  };
  save_record(&dir, &mob("sewers"), false).unwrap();
  save_record(&dir, &mob("fields"), false).unwrap();

  let err = load_all::<MobTemplate>(&dir, "mobs").unwrap_err();
  assert!(matches!(err, DataError::Duplicate { .. }), "{err}");
}

#[test]
fn path_consistency_is_enforced() {
  let dir = test_util::temp_dir("data-path-check");
  // A record claiming id 3, sitting in 9.yaml.
  fs::create_dir_all(dir.join("items")).unwrap();
  fs::write(
    dir.join("items/9.yaml"),
    serde_yaml::to_string(&item(3, "misplaced")).unwrap(),
  )
  .unwrap();
  let err = load_all::<ItemTemplate>(&dir, "items").unwrap_err();
  assert!(matches!(err, DataError::PathMismatch { .. }), "{err}");
}

#[test]
fn validation_failures_are_fatal_on_load() {
  let dir = test_util::temp_dir("data-validation");
  fs::create_dir_all(dir.join("items")).unwrap();
  fs::write(
    dir.join("items/4.yaml"),
    serde_yaml::to_string(&item(4, "")).unwrap(),
  )
  .unwrap();
  let err = load_all::<ItemTemplate>(&dir, "items").unwrap_err();
  assert!(matches!(err, DataError::Validation { .. }), "{err}");
}

#[test]
fn buff_spec_zero_is_refused() {
  let spec = BuffSpec {
    id: lm_common::id::BuffId(0),
    name: "nope".into(),
    description: String::new(),
    secret: false,
    round_interval: 1,
    trigger_count: 1,
    stat_mods: HashMap::new(),
    flags: vec![],
  };
  assert!(spec.validate().is_err());
}

#[test]
fn save_all_goes_wide() {
  let dir = test_util::temp_dir("data-save-all");
  let pool = ThreadPool::new("test-save", 4, || ());
  let records: Vec<ItemTemplate> = (1..=40).map(|i| item(i, "bulk item")).collect();
  save_all(&dir, records, &pool, true);
  let items = load_all::<ItemTemplate>(&dir, "items").unwrap();
  assert_eq!(items.len(), 40);
}

#[test]
fn missing_directory_is_empty_not_fatal() {
  let dir = test_util::temp_dir("data-missing-dir");
  let items = load_all::<ItemTemplate>(&dir, "items").unwrap();
  assert!(items.is_empty());
}
