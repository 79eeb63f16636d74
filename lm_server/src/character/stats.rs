//! Actor stats and the derived-value math.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The six base stats every actor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
  Strength,
  Speed,
  Smarts,
  Vitality,
  Mysticism,
  Perception,
}

pub const ALL_STATS: [StatKind; 6] = [
  StatKind::Strength,
  StatKind::Speed,
  StatKind::Smarts,
  StatKind::Vitality,
  StatKind::Mysticism,
  StatKind::Perception,
];

/// One stat. `base` and `training` are persisted; the rest is derived.
///
/// `value = racial + training + mods`, and `value_adj` is `value` with
/// diminishing returns once it passes 100.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
  #[serde(default)]
  pub base:     i32,
  #[serde(default)]
  pub training: i32,
  /// The level-derived component, recomputed by [`Stat::recalculate`].
  #[serde(default)]
  pub racial:    i32,
  /// Equipment and buff contributions. Never persisted; re-applied from the
  /// live equipment after load.
  #[serde(skip)]
  pub mods:      i32,
  #[serde(skip)]
  pub value:     i32,
  #[serde(skip)]
  pub value_adj: i32,
}

impl Stat {
  pub fn new(base: i32) -> Stat { Stat { base, ..Default::default() } }

  /// The level-derived ("racial") component of this stat:
  /// `(level-1) * base / 3 + level / 2`, all integer math.
  pub fn gains_for_level(&self, level: u32) -> i32 {
    let level = level as i32;
    (level - 1).max(0) * self.base / 3 + level / 2
  }

  /// Recomputes `racial`, `value` and `value_adj` for the given level.
  pub fn recalculate(&mut self, level: u32) {
    self.racial = self.gains_for_level(level);
    self.value = self.racial + self.training + self.mods;
    self.value_adj = if self.value < 105 {
      self.value
    } else {
      100 + (((self.value - 100) as f64).sqrt() * 2.0).round() as i32
    };
  }
}

/// All six stats of an actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
  pub strength:   Stat,
  pub speed:      Stat,
  pub smarts:     Stat,
  pub vitality:   Stat,
  pub mysticism:  Stat,
  pub perception: Stat,
}

impl Stats {
  pub fn get(&self, kind: StatKind) -> &Stat {
    match kind {
      StatKind::Strength => &self.strength,
      StatKind::Speed => &self.speed,
      StatKind::Smarts => &self.smarts,
      StatKind::Vitality => &self.vitality,
      StatKind::Mysticism => &self.mysticism,
      StatKind::Perception => &self.perception,
    }
  }

  pub fn get_mut(&mut self, kind: StatKind) -> &mut Stat {
    match kind {
      StatKind::Strength => &mut self.strength,
      StatKind::Speed => &mut self.speed,
      StatKind::Smarts => &mut self.smarts,
      StatKind::Vitality => &mut self.vitality,
      StatKind::Mysticism => &mut self.mysticism,
      StatKind::Perception => &mut self.perception,
    }
  }

  /// Recomputes every stat's derived values at the given level.
  pub fn recalculate(&mut self, level: u32) {
    for kind in ALL_STATS {
      self.get_mut(kind).recalculate(level);
    }
  }

  /// Clears and re-applies external modifiers. The caller sums equipment and
  /// buff contributions and hands them over here, then calls
  /// [`Self::recalculate`].
  pub fn set_mods(&mut self, mods: impl Fn(StatKind) -> i32) {
    for kind in ALL_STATS {
      self.get_mut(kind).mods = mods(kind);
    }
  }

  /// How many items fit in the backpack.
  pub fn carry_capacity(&self) -> usize {
    if self.strength.value_adj < 3 {
      5
    } else {
      (5 + self.strength.value_adj / 3) as usize
    }
  }
}

/// The nine alignment bands, at 20-point thresholds over −100..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Alignment {
  Unholy,
  Evil,
  Corrupt,
  Misguided,
  Neutral,
  Lawful,
  Virtuous,
  Good,
  Holy,
}

impl Alignment {
  pub fn from_value(v: i8) -> Alignment {
    match v {
      i8::MIN..=-80 => Alignment::Unholy,
      -79..=-60 => Alignment::Evil,
      -59..=-40 => Alignment::Corrupt,
      -39..=-20 => Alignment::Misguided,
      -19..=19 => Alignment::Neutral,
      20..=39 => Alignment::Lawful,
      40..=59 => Alignment::Virtuous,
      60..=79 => Alignment::Good,
      80..=i8::MAX => Alignment::Holy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn gains_for_level_boundaries() {
    let s = Stat::new(15);
    assert_eq!(s.gains_for_level(0), 0);
    // level 1: 0 * base / 3 + 1 / 2 == 0
    assert_eq!(s.gains_for_level(1), 0);
    // level 10: 9 * 15 / 3 + 10 / 2 == 45 + 5
    assert_eq!(s.gains_for_level(10), 50);
  }

  #[test]
  fn diminishing_returns() {
    let mut s = Stat::new(0);
    for (training, adj) in [(104, 104), (105, 104), (125, 110), (200, 120)] {
      s.training = training;
      s.recalculate(0);
      assert_eq!(s.value, training);
      assert_eq!(s.value_adj, adj, "value {training}");
    }
  }

  #[test]
  fn spec_scenario_s3() {
    // Strength base 15, level 10: racial 50, value 50, adj 50.
    let mut s = Stat::new(15);
    s.recalculate(10);
    assert_eq!((s.racial, s.value, s.value_adj), (50, 50, 50));
    // With +80 of mods: value 130, adj 100 + round(sqrt(30) * 2) == 111.
    s.mods = 80;
    s.recalculate(10);
    assert_eq!((s.value, s.value_adj), (130, 111));
  }

  #[test]
  fn alignment_bands() {
    assert_eq!(Alignment::from_value(-100), Alignment::Unholy);
    assert_eq!(Alignment::from_value(-80), Alignment::Unholy);
    assert_eq!(Alignment::from_value(-79), Alignment::Evil);
    assert_eq!(Alignment::from_value(0), Alignment::Neutral);
    assert_eq!(Alignment::from_value(20), Alignment::Lawful);
    assert_eq!(Alignment::from_value(100), Alignment::Holy);
  }

  #[test]
  fn carry_capacity() {
    let mut stats = Stats::default();
    stats.strength.training = 30;
    stats.recalculate(1);
    assert_eq!(stats.carry_capacity(), 15);
    stats.strength.training = 0;
    stats.recalculate(1);
    assert_eq!(stats.carry_capacity(), 5);
  }
}
