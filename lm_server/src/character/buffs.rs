//! Active status effects and their bookkeeping.
//!
//! A [`Buffs`] collection keeps two index maps next to its list: spec id to
//! list index, and flag to the indices of live buffs carrying that flag.
//! Every mutator here keeps those maps in sync; anything that mutates the
//! list some other way must call [`Buffs::validate`] with a forced rebuild.

use lm_common::id::BuffId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// `triggers_left` value for a buff that never runs out.
pub const TRIGGERS_UNLIMITED: i32 = -1;

/// Spec id reserved for engine-minted marker buffs. Content files may not
/// use it, and `add_buff` refuses it.
pub const MARKER_SPEC_ID: BuffId = BuffId(0);

/// Symbolic tags on a buff spec that drive rules elsewhere in the engine.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab_case")]
#[serde(rename_all = "kebab-case")]
pub enum BuffFlag {
  NoCombat,
  NoMovement,
  NoFlee,
  CancelIfCombat,
  CancelOnAction,
  CancelOnWater,
  ReviveOnDeath,
  PermaGear,
  RemoveCurse,
  Poison,
  Drunk,
  Hidden,
  Accuracy,
  Blink,
  EmitsLight,
  SuperHearing,
  NightVision,
  SeeHidden,
  SeeNouns,
  Warmed,
  Hydrated,
  Thirsty,
  Muted,
  Deafened,
}

/// A buff spec, loaded from `buffs/<id>-<name>.yaml`. The optional script
/// sibling is discovered by the scripting runtime, not stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuffSpec {
  pub id:   BuffId,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Secret buffs are hidden from the owner's status output.
  #[serde(default)]
  pub secret: bool,
  /// The buff triggers every this many rounds.
  #[serde(default = "default_interval")]
  pub round_interval: u64,
  /// How many times the buff triggers before expiring.
  #[serde(default = "default_triggers")]
  pub trigger_count: i32,
  #[serde(default)]
  pub stat_mods: HashMap<String, i32>,
  #[serde(default)]
  pub flags: Vec<BuffFlag>,
}

fn default_interval() -> u64 { 1 }
fn default_triggers() -> i32 { 1 }

impl BuffSpec {
  /// Total rounds a fresh, non-permanent instance of this spec lasts.
  pub fn total_rounds(&self) -> i64 { self.trigger_count as i64 * self.round_interval as i64 }
}

/// One active buff on an actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buff {
  pub spec_id: BuffId,
  #[serde(default)]
  pub source: String,
  /// Incremented once per round by `trigger`.
  #[serde(default)]
  pub round_counter: u64,
  pub triggers_left: i32,
  /// Set between `add_buff` and the delivery of the start event.
  #[serde(default)]
  pub on_start_waiting: bool,
  #[serde(default)]
  pub permanent: bool,
  /// For engine-minted markers (spec id 0): the single flag they carry.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub marker_flag: Option<BuffFlag>,
}

impl Buff {
  pub fn expired(&self) -> bool { !self.permanent && self.triggers_left <= 0 }

  /// Marks the buff expired. It is physically removed on the next prune.
  pub fn expire(&mut self) {
    self.permanent = false;
    self.triggers_left = 0;
  }

  /// Rounds until this buff runs out. Negative after the final trigger.
  pub fn rounds_left(&self, spec: &BuffSpec) -> i64 {
    spec.total_rounds() - self.round_counter as i64
  }
}

/// An actor's buff collection. See the module docs for the index invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buffs {
  list: Vec<Buff>,
  #[serde(skip)]
  buff_ids: HashMap<BuffId, usize>,
  #[serde(skip)]
  buff_flags: HashMap<BuffFlag, Vec<usize>>,
}

impl Buffs {
  /// Adds the buff, or refreshes it if already present. Refreshing resets
  /// `triggers_left` (to unlimited when permanent, else the spec's trigger
  /// count). Returns false for the reserved marker spec id.
  pub fn add_buff(&mut self, spec: &BuffSpec, permanent: bool) -> bool {
    if spec.id == MARKER_SPEC_ID {
      warn!("refusing to add a buff with the reserved spec id 0");
      return false;
    }
    let triggers = if permanent { TRIGGERS_UNLIMITED } else { spec.trigger_count };
    if let Some(&i) = self.buff_ids.get(&spec.id) {
      let b = &mut self.list[i];
      b.triggers_left = triggers;
      b.permanent = permanent;
      return true;
    }
    let idx = self.list.len();
    self.list.push(Buff {
      spec_id: spec.id,
      source: String::new(),
      round_counter: 0,
      triggers_left: triggers,
      on_start_waiting: true,
      permanent,
      marker_flag: None,
    });
    self.buff_ids.insert(spec.id, idx);
    for &flag in &spec.flags {
      self.buff_flags.entry(flag).or_default().push(idx);
    }
    true
  }

  /// Mints an engine-internal marker carrying a single flag. Markers use the
  /// reserved spec id 0 and are removed bodily by
  /// `has_flag(flag, expire_on_read: true)`.
  pub fn add_flag_marker(&mut self, flag: BuffFlag, triggers: i32) {
    let idx = self.list.len();
    self.list.push(Buff {
      spec_id: MARKER_SPEC_ID,
      source: String::new(),
      round_counter: 0,
      triggers_left: triggers,
      on_start_waiting: false,
      permanent: false,
      marker_flag: Some(flag),
    });
    self.buff_flags.entry(flag).or_default().push(idx);
  }

  /// O(1) presence check. Expired-but-unpruned entries don't count.
  pub fn has_buff(&self, id: BuffId) -> bool {
    self.buff_ids.get(&id).map(|&i| !self.list[i].expired()).unwrap_or(false)
  }

  pub fn get(&self, id: BuffId) -> Option<&Buff> {
    self.buff_ids.get(&id).map(|&i| &self.list[i]).filter(|b| !b.expired())
  }

  /// Marks the buff's start event as delivered.
  pub fn started(&mut self, id: BuffId) {
    if let Some(&i) = self.buff_ids.get(&id) {
      self.list[i].on_start_waiting = false;
    }
  }

  /// Whether any live buff carries the flag, without consuming anything.
  pub fn flag_active(&self, flag: BuffFlag) -> bool {
    self
      .buff_flags
      .get(&flag)
      .map(|v| v.iter().any(|&i| !self.list[i].expired()))
      .unwrap_or(false)
  }

  /// Whether any live buff carries the flag. With `expire_on_read`, the
  /// first hit is consumed: markers (spec id 0) are removed bodily (which
  /// rebuilds the index maps), anything else is marked expired.
  pub fn has_flag(
    &mut self,
    flag: BuffFlag,
    expire_on_read: bool,
    specs: &HashMap<BuffId, BuffSpec>,
  ) -> bool {
    let indices = match self.buff_flags.get(&flag) {
      Some(v) => v,
      None => return false,
    };
    let hit = indices.iter().copied().find(|&i| !self.list[i].expired());
    let i = match hit {
      Some(i) => i,
      None => return false,
    };
    if expire_on_read {
      if self.list[i].spec_id == MARKER_SPEC_ID {
        self.list.remove(i);
        self.rebuild_indexes(specs);
      } else {
        self.list[i].expire();
      }
    }
    true
  }

  /// Expires every live buff carrying the flag (markers included). Returns
  /// the spec ids that went out.
  pub fn expire_flagged(&mut self, flag: BuffFlag) -> Vec<BuffId> {
    let indices = match self.buff_flags.get(&flag) {
      Some(v) => v.clone(),
      None => return vec![],
    };
    let mut out = vec![];
    for i in indices {
      if !self.list[i].expired() {
        self.list[i].expire();
        out.push(self.list[i].spec_id);
      }
    }
    out
  }

  /// Marks the buff expired; physical removal happens in `prune`. Returns
  /// whether the buff was present and live.
  pub fn remove_buff(&mut self, id: BuffId) -> bool {
    match self.buff_ids.get(&id) {
      Some(&i) if !self.list[i].expired() => {
        self.list[i].expire();
        true
      }
      _ => false,
    }
  }

  /// Advances every live buff by one round and returns the spec ids of
  /// those that crossed their round interval. Each triggered buff loses one
  /// of its remaining triggers (unless unlimited). Pass `only` to restrict
  /// to specific spec ids.
  pub fn trigger(
    &mut self,
    specs: &HashMap<BuffId, BuffSpec>,
    only: Option<&[BuffId]>,
  ) -> Vec<BuffId> {
    let mut out = vec![];
    for b in &mut self.list {
      if b.expired() || b.spec_id == MARKER_SPEC_ID {
        continue;
      }
      if let Some(only) = only {
        if !only.contains(&b.spec_id) {
          continue;
        }
      }
      let spec = match specs.get(&b.spec_id) {
        Some(s) => s,
        None => continue,
      };
      b.round_counter += 1;
      if b.round_counter % spec.round_interval.max(1) == 0 {
        if b.triggers_left != TRIGGERS_UNLIMITED {
          b.triggers_left -= 1;
        }
        out.push(b.spec_id);
      }
    }
    out
  }

  /// Removes expired entries and entries whose spec no longer exists, in
  /// reverse order, then rebuilds the index maps if anything was removed.
  /// Returns the removed buffs so callers can send expiry notices.
  pub fn prune(&mut self, specs: &HashMap<BuffId, BuffSpec>) -> Vec<Buff> {
    let mut removed = vec![];
    for i in (0..self.list.len()).rev() {
      let b = &self.list[i];
      let spec_missing = b.spec_id != MARKER_SPEC_ID && !specs.contains_key(&b.spec_id);
      if spec_missing || b.expired() {
        removed.push(self.list.remove(i));
      }
    }
    if !removed.is_empty() {
      self.rebuild_indexes(specs);
    }
    removed
  }

  /// Checks the index invariant and rebuilds if it fails (or if forced).
  /// Entries with an unknown spec id are dropped with a warning. Call after
  /// loading a collection from disk.
  pub fn validate(&mut self, specs: &HashMap<BuffId, BuffSpec>, force_rebuild: bool) {
    let markers = self.list.iter().filter(|b| b.spec_id == MARKER_SPEC_ID).count();
    if force_rebuild || self.list.len() - markers != self.buff_ids.len() {
      let before = self.list.len();
      self
        .list
        .retain(|b| b.spec_id == MARKER_SPEC_ID || specs.contains_key(&b.spec_id));
      if self.list.len() != before {
        warn!("dropped {} buffs with unknown spec ids", before - self.list.len());
      }
      self.rebuild_indexes(specs);
    }
  }

  /// All live buffs, oldest first.
  pub fn iter(&self) -> impl Iterator<Item = &Buff> {
    self.list.iter().filter(|b| !b.expired())
  }

  pub fn is_empty(&self) -> bool { self.iter().next().is_none() }

  /// Sums every live buff's modifier for one stat name.
  pub fn stat_mods(&self, specs: &HashMap<BuffId, BuffSpec>, stat: &str) -> i32 {
    self
      .iter()
      .filter_map(|b| specs.get(&b.spec_id))
      .filter_map(|s| s.stat_mods.get(stat))
      .sum()
  }

  fn rebuild_indexes(&mut self, specs: &HashMap<BuffId, BuffSpec>) {
    self.buff_ids.clear();
    self.buff_flags.clear();
    for (i, b) in self.list.iter().enumerate() {
      if let Some(flag) = b.marker_flag {
        if !b.expired() {
          self.buff_flags.entry(flag).or_default().push(i);
        }
        continue;
      }
      self.buff_ids.insert(b.spec_id, i);
      if b.expired() {
        continue;
      }
      if let Some(spec) = specs.get(&b.spec_id) {
        for &flag in &spec.flags {
          self.buff_flags.entry(flag).or_default().push(i);
        }
      }
    }
  }

  #[cfg(test)]
  pub(crate) fn index_maps(&self) -> (&HashMap<BuffId, usize>, &HashMap<BuffFlag, Vec<usize>>) {
    (&self.buff_ids, &self.buff_flags)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn spec(id: u32, interval: u64, triggers: i32, flags: &[BuffFlag]) -> BuffSpec {
    BuffSpec {
      id: BuffId(id),
      name: format!("buff-{id}"),
      description: String::new(),
      secret: false,
      round_interval: interval,
      trigger_count: triggers,
      stat_mods: HashMap::new(),
      flags: flags.to_vec(),
    }
  }

  fn registry(specs: &[BuffSpec]) -> HashMap<BuffId, BuffSpec> {
    specs.iter().map(|s| (s.id, s.clone())).collect()
  }

  fn check_invariants(b: &Buffs, specs: &HashMap<BuffId, BuffSpec>) {
    let (ids, flags) = b.index_maps();
    for (id, &i) in ids {
      assert_eq!(b.list[i].spec_id, *id);
    }
    for (flag, indices) in flags {
      for &i in indices {
        if b.list[i].expired() {
          continue;
        }
        let has = match b.list[i].marker_flag {
          Some(f) => f == *flag,
          None => specs[&b.list[i].spec_id].flags.contains(flag),
        };
        assert!(has, "index {i} listed under {flag:?} without carrying it");
      }
    }
  }

  #[test]
  fn trigger_cadence_s2() {
    // TriggerCount 3, RoundInterval 2: triggers at rounds 2, 4 and 6, then
    // expires.
    let s = spec(5, 2, 3, &[]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, false);

    assert_eq!(buffs.trigger(&reg, None), vec![]);
    assert_eq!(buffs.trigger(&reg, None), vec![BuffId(5)]);
    assert_eq!(buffs.get(BuffId(5)).unwrap().triggers_left, 2);

    for _ in 0..4 {
      buffs.trigger(&reg, None);
    }
    assert!(buffs.get(BuffId(5)).is_none());
    assert!(!buffs.has_buff(BuffId(5)));
    let removed = buffs.prune(&reg);
    assert_eq!(removed.len(), 1);
    assert!(removed[0].expired());
    check_invariants(&buffs, &reg);
  }

  #[test]
  fn add_twice_is_refresh() {
    let s = spec(3, 1, 4, &[]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, false);
    buffs.trigger(&reg, None);
    assert_eq!(buffs.get(BuffId(3)).unwrap().triggers_left, 3);

    buffs.add_buff(&s, false);
    let live: Vec<_> = buffs.iter().collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].triggers_left, 4);
    check_invariants(&buffs, &reg);
  }

  #[test]
  fn permanent_never_expires() {
    let s = spec(9, 1, 1, &[]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, true);
    for _ in 0..10 {
      buffs.trigger(&reg, None);
    }
    assert!(buffs.has_buff(BuffId(9)));
    assert!(buffs.prune(&reg).is_empty());
  }

  #[test]
  fn flag_queries_skip_expired() {
    let s = spec(2, 1, 1, &[BuffFlag::NoCombat]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, false);
    assert!(buffs.flag_active(BuffFlag::NoCombat));

    buffs.remove_buff(BuffId(2));
    assert!(!buffs.flag_active(BuffFlag::NoCombat));
    assert!(!buffs.has_flag(BuffFlag::NoCombat, false, &reg));
  }

  #[test]
  fn expire_on_read_consumes_markers_bodily() {
    let s = spec(4, 1, 5, &[BuffFlag::Hidden]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_flag_marker(BuffFlag::Blink, 1);
    buffs.add_buff(&s, false);

    // The marker is removed from the list entirely, not just expired.
    assert!(buffs.has_flag(BuffFlag::Blink, true, &reg));
    assert!(!buffs.flag_active(BuffFlag::Blink));
    assert_eq!(buffs.list.len(), 1);
    check_invariants(&buffs, &reg);

    // A spec-backed buff is only marked expired; prune removes it.
    assert!(buffs.has_flag(BuffFlag::Hidden, true, &reg));
    assert_eq!(buffs.list.len(), 1);
    buffs.prune(&reg);
    assert!(buffs.list.is_empty());
  }

  #[test]
  fn validate_drops_unknown_specs() {
    let s = spec(7, 1, 1, &[]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, false);
    buffs.list.push(Buff {
      spec_id: BuffId(999),
      source: String::new(),
      round_counter: 0,
      triggers_left: 1,
      on_start_waiting: false,
      permanent: false,
      marker_flag: None,
    });

    buffs.validate(&reg, false);
    assert_eq!(buffs.list.len(), 1);
    assert!(buffs.has_buff(BuffId(7)));
    check_invariants(&buffs, &reg);
  }

  #[test]
  fn reserved_spec_id_is_refused() {
    let s = spec(0, 1, 1, &[]);
    let mut buffs = Buffs::default();
    assert!(!buffs.add_buff(&s, false));
    assert!(buffs.list.is_empty());
  }

  #[test]
  fn duration_math() {
    let s = spec(1, 2, 3, &[]);
    let reg = registry(&[s.clone()]);
    let mut buffs = Buffs::default();
    buffs.add_buff(&s, false);
    assert_eq!(buffs.get(BuffId(1)).unwrap().rounds_left(&s), 6);
    buffs.trigger(&reg, None);
    assert_eq!(buffs.get(BuffId(1)).unwrap().rounds_left(&s), 5);
  }
}
