//! Zones: named groupings of rooms with shared defaults.

use crate::{data::Record, mutator::Mutator};
use lm_common::id::RoomId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Zone config, `rooms/<name>/zone-config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
  pub name: String,
  /// The room maps of this zone are rendered from.
  pub root_room: RoomId,
  /// Default biome for rooms that don't name one.
  #[serde(default)]
  pub biome: Option<String>,
  /// Ambient messages shown to idle players.
  #[serde(default)]
  pub idle_messages: Vec<String>,
  #[serde(default)]
  pub music: Option<String>,
  /// When set, mobs in this zone scale into the given level range.
  #[serde(default)]
  pub level_range: Option<(u32, u32)>,
  /// Zone-wide mutators, stepped every round.
  #[serde(default)]
  pub mutators: Vec<Mutator>,
}

impl Record for Zone {
  type Id = String;

  fn id(&self) -> String { self.name.clone() }
  fn validate(&self) -> Result<(), String> {
    if self.name.is_empty() {
      return Err("zone has no name".into());
    }
    if let Some((lo, hi)) = self.level_range {
      if lo > hi {
        return Err(format!("level range {lo}..{hi} is inverted"));
      }
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf { format!("rooms/{}/zone-config.yaml", self.name).into() }
}
