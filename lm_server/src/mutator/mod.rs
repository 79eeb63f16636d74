//! Mutators: time-bounded modifiers attached to a room or a zone.
//!
//! A [`MutatorSpec`] says what the mutator does (text changes, exit changes,
//! buffs applied on entry); a [`Mutator`] is one live application of it with
//! its decay clock.

use lm_common::id::{BuffId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A passive mutator record under `mutators/<id>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutatorSpec {
  pub id: String,
  /// Rounds until a live application decays.
  pub decay_rounds: u64,
  /// Text prepended to the room description while active.
  #[serde(default)]
  pub text_prepend: Option<String>,
  /// Text appended to the room description while active.
  #[serde(default)]
  pub text_append: Option<String>,
  /// Replaces the room description outright while active.
  #[serde(default)]
  pub text_replace: Option<String>,
  /// Color tag wrapped around the injected text, e.g. `red`.
  #[serde(default)]
  pub text_color: Option<String>,
  /// Exit names blocked while active.
  #[serde(default)]
  pub exit_blocks: Vec<String>,
  /// Exits added while active.
  #[serde(default)]
  pub exit_adds: HashMap<String, RoomId>,
  /// Buffs applied to players entering the room/zone.
  #[serde(default)]
  pub entry_buffs: Vec<BuffId>,
}

impl MutatorSpec {
  /// The description text this mutator injects, with its color applied.
  pub fn decorated_text(&self, base: &str) -> String {
    let wrap = |s: &str| match &self.text_color {
      Some(c) => format!("{{{c}}}{s}{{/}}"),
      None => s.to_string(),
    };
    if let Some(replace) = &self.text_replace {
      return wrap(replace);
    }
    let mut out = String::new();
    if let Some(pre) = &self.text_prepend {
      out.push_str(&wrap(pre));
      out.push(' ');
    }
    out.push_str(base);
    if let Some(post) = &self.text_append {
      out.push(' ');
      out.push_str(&wrap(post));
    }
    out
  }
}

/// One live mutator on a room or zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutator {
  pub spec_id: String,
  /// The round this application started. 0 means "on first tick", which the
  /// zone hook resolves to the current round.
  #[serde(default)]
  pub started_round: u64,
}

impl Mutator {
  pub fn new(spec_id: impl Into<String>, round: u64) -> Mutator {
    Mutator { spec_id: spec_id.into(), started_round: round }
  }

  pub fn decayed(&self, spec: &MutatorSpec, round: u64) -> bool {
    self.started_round != 0 && round >= self.started_round + spec.decay_rounds
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn spec() -> MutatorSpec {
    MutatorSpec {
      id:           "fog".into(),
      decay_rounds: 10,
      text_prepend: Some("A heavy fog hangs here.".into()),
      text_append:  None,
      text_replace: None,
      text_color:   Some("bright-black".into()),
      exit_blocks:  vec![],
      exit_adds:    HashMap::new(),
      entry_buffs:  vec![],
    }
  }

  #[test]
  fn decay_clock() {
    let m = Mutator::new("fog", 100);
    let s = spec();
    assert!(!m.decayed(&s, 109));
    assert!(m.decayed(&s, 110));
  }

  #[test]
  fn text_decoration() {
    let s = spec();
    assert_eq!(
      s.decorated_text("A muddy road."),
      "{bright-black}A heavy fog hangs here.{/} A muddy road."
    );
  }
}
