//! Users: a connected (or recently connected) player and their character.

use crate::{character::Character, data::Record, net::SessionSender};
use lm_common::{
  id::{ConnId, UserId},
  util::{ansi, ansi::RenderMode},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
  collections::{HashMap, VecDeque},
  path::PathBuf,
  str::FromStr,
  sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Authentication roles, in increasing privilege order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[default]
  User,
  Moderator,
  Admin,
}

impl Role {
  pub fn is_admin(&self) -> bool { matches!(self, Role::Admin) }
  pub fn is_mod(&self) -> bool { *self >= Role::Moderator }
}

/// The small set of value shapes the per-user temp bag actually stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TempValue {
  Bool(bool),
  Int(i64),
  Str(String),
  IntList(Vec<i64>),
  StrMap(HashMap<String, String>),
}

/// What `users/<name>.yaml` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
  pub id:   UserId,
  pub name: String,
  #[serde(default)]
  pub role: Role,
  /// Per-user settings (ansi mode and the like).
  #[serde(default)]
  pub config: HashMap<String, String>,
  pub character: Character,
}

impl Record for UserRecord {
  type Id = UserId;

  fn id(&self) -> UserId { self.id }
  fn validate(&self) -> Result<(), String> {
    if !User::valid_name(&self.name) {
      return Err(format!("bad user name `{}`", self.name));
    }
    Ok(())
  }
  fn filepath(&self) -> PathBuf {
    format!("users/{}.yaml", self.name.to_ascii_lowercase()).into()
  }
}

/// What `User::enqueue_input` did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
  Queued,
  /// Queue full; the line was thrown away.
  Dropped,
  /// Queue full while the user is idle past the threshold: drop them.
  Kick,
}

/// A resident user. Owned by the world store while connected (and through
/// the zombie grace period after a disconnect).
pub struct User {
  pub id:   UserId,
  pub name: String,
  pub role: Mutex<Role>,

  pub character: Mutex<Character>,
  pub config:    Mutex<HashMap<String, String>>,
  /// Scratch state for scripts and commands; never persisted.
  pub temp: Mutex<HashMap<String, TempValue>>,

  conn_id: Mutex<ConnId>,
  sender:  Mutex<SessionSender>,
  input:   Mutex<VecDeque<String>>,

  pub connected_round:  AtomicU64,
  pub last_input_round: AtomicU64,
  pub afk:              AtomicBool,
  /// The round this user's connection went away; 0 while connected.
  pub zombie_since_round: AtomicU64,
}

impl User {
  pub fn new(record: UserRecord, conn_id: ConnId, sender: SessionSender, round: u64) -> User {
    User {
      id:   record.id,
      name: record.name,
      role: Mutex::new(record.role),

      character: Mutex::new(record.character),
      config:    Mutex::new(record.config),
      temp:      Mutex::new(HashMap::new()),

      conn_id: Mutex::new(conn_id),
      sender:  Mutex::new(sender),
      input:   Mutex::new(VecDeque::new()),

      connected_round:    AtomicU64::new(round),
      last_input_round:   AtomicU64::new(round),
      afk:                AtomicBool::new(false),
      zombie_since_round: AtomicU64::new(0),
    }
  }

  /// Names are 2..=24 letters, digits and dashes, starting with a letter.
  pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    first_ok
      && (2..=24).contains(&name.len())
      && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
  }

  pub fn conn_id(&self) -> ConnId { *self.conn_id.lock() }

  /// A point-in-time snapshot for saving.
  pub fn record(&self) -> UserRecord {
    UserRecord {
      id:        self.id,
      name:      self.name.clone(),
      role:      *self.role.lock(),
      config:    self.config.lock().clone(),
      character: self.character.lock().clone(),
    }
  }

  /// Appends a line to the input queue, applying admission control.
  pub fn enqueue_input(&self, line: String, limit: usize) -> EnqueueResult {
    let mut input = self.input.lock();
    if input.len() >= limit.max(1) {
      return if self.afk.load(Ordering::SeqCst) {
        EnqueueResult::Kick
      } else {
        EnqueueResult::Dropped
      };
    }
    input.push_back(line);
    EnqueueResult::Queued
  }

  /// Pops the oldest queued line. Called once per turn by the simulation.
  pub fn pop_input(&self) -> Option<String> { self.input.lock().pop_front() }

  /// Puts a line back at the head of the queue (not-ready-yet input).
  pub fn requeue_input(&self, line: String) { self.input.lock().push_front(line); }

  pub fn queued_input(&self) -> usize { self.input.lock().len() }

  /// The user's ANSI rendering mode, from their per-user config.
  pub fn render_mode(&self) -> RenderMode {
    self
      .config
      .lock()
      .get("ansi")
      .and_then(|v| RenderMode::from_str(v).ok())
      .unwrap_or(RenderMode::Default)
  }

  /// Renders and queues text, without a line ending.
  pub fn send_text(&self, text: &str) {
    let rendered = ansi::render(text, self.render_mode());
    self.sender.lock().send(rendered);
  }

  /// Renders and queues one full line.
  pub fn send_line(&self, text: &str) {
    self.send_text(&format!("{text}\r\n"));
  }

  /// Swaps in a new connection (reconnect takeover). Clears zombie state.
  pub fn attach(&self, conn_id: ConnId, sender: SessionSender, round: u64) {
    *self.conn_id.lock() = conn_id;
    *self.sender.lock() = sender;
    self.zombie_since_round.store(0, Ordering::SeqCst);
    self.afk.store(false, Ordering::SeqCst);
    self.last_input_round.store(round, Ordering::SeqCst);
  }

  /// Marks the user disconnected-but-retained.
  pub fn detach(&self, round: u64) {
    *self.sender.lock() = SessionSender::null();
    self.zombie_since_round.store(round, Ordering::SeqCst);
  }

  pub fn is_zombie(&self) -> bool { self.zombie_since_round.load(Ordering::SeqCst) != 0 }

  /// Closes the session from the simulation side.
  pub fn kick(&self) { self.sender.lock().close(); }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn name_validation() {
    assert!(User::valid_name("ana"));
    assert!(User::valid_name("Kel-Var"));
    assert!(!User::valid_name(""));
    assert!(!User::valid_name("x"));
    assert!(!User::valid_name("9lives"));
    assert!(!User::valid_name("has space"));
  }

  #[test]
  fn input_admission() {
    let user = User::new(
      UserRecord {
        id:        UserId(1),
        name:      "ana".into(),
        role:      Role::User,
        config:    HashMap::new(),
        character: Character::new("ana"),
      },
      ConnId(1),
      SessionSender::null(),
      10,
    );
    assert_eq!(user.enqueue_input("look".into(), 2), EnqueueResult::Queued);
    assert_eq!(user.enqueue_input("look".into(), 2), EnqueueResult::Queued);
    assert_eq!(user.enqueue_input("look".into(), 2), EnqueueResult::Dropped);
    user.afk.store(true, Ordering::SeqCst);
    assert_eq!(user.enqueue_input("look".into(), 2), EnqueueResult::Kick);
    assert_eq!(user.pop_input().as_deref(), Some("look"));
  }
}
