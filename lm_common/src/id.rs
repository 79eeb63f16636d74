//! Id newtypes shared between the server's subsystems.
//!
//! Everything that crosses a file or wire boundary is a plain number there,
//! and a dedicated type here. The interesting one is [`RoomId`]: ephemeral
//! copies of rooms live in a reserved numeric range, and rather than doing
//! threshold math everywhere, the id itself carries the distinction.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, num::ParseIntError, str::FromStr};

/// First numeric id reserved for ephemeral room copies. Everything at or
/// above this number is a copy; everything below is a persistent room.
pub const EPHEMERAL_ROOM_ID_MIN: i64 = 900_000;
/// Rooms per ephemeral chunk.
pub const EPHEMERAL_CHUNK_SLOTS: u16 = 250;
/// Number of ephemeral chunks. Ids above the last chunk are invalid.
pub const EPHEMERAL_CHUNK_COUNT: u16 = 100;

/// A stable user id. Assigned on account creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

/// An opaque connection id. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub u64);

/// A mob template id, as found in `mobs/<zone>/<id>.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobId(pub u32);

/// A live mob instance id. Unique per spawn, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobInstanceId(pub u64);

/// An item template id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

/// A buff spec id. Id 0 is reserved for engine-internal marker buffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuffId(pub u32);

/// A room id.
///
/// On disk and on the wire this is a single number: negative is the void,
/// `0..EPHEMERAL_ROOM_ID_MIN` is a persistent room, and everything above is
/// an ephemeral copy addressed by (chunk, slot). In memory we keep the three
/// cases apart so nobody has to remember the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
  /// Where characters live before they are spawned anywhere.
  Void,
  Persistent(i64),
  Ephemeral { chunk: u16, slot: u16 },
}

impl RoomId {
  /// The id that aliases to the configured start room in `move_to_room`.
  pub const START_ALIAS: RoomId = RoomId::Persistent(0);

  pub fn from_number(n: i64) -> RoomId {
    if n < 0 {
      RoomId::Void
    } else if n >= EPHEMERAL_ROOM_ID_MIN {
      let off = n - EPHEMERAL_ROOM_ID_MIN;
      RoomId::Ephemeral {
        chunk: (off / EPHEMERAL_CHUNK_SLOTS as i64) as u16,
        slot:  (off % EPHEMERAL_CHUNK_SLOTS as i64) as u16,
      }
    } else {
      RoomId::Persistent(n)
    }
  }

  pub fn as_number(&self) -> i64 {
    match *self {
      RoomId::Void => -1,
      RoomId::Persistent(n) => n,
      RoomId::Ephemeral { chunk, slot } => {
        EPHEMERAL_ROOM_ID_MIN + chunk as i64 * EPHEMERAL_CHUNK_SLOTS as i64 + slot as i64
      }
    }
  }

  pub fn is_void(&self) -> bool { matches!(self, RoomId::Void) }
  pub fn is_ephemeral(&self) -> bool { matches!(self, RoomId::Ephemeral { .. }) }

  /// The chunk this id belongs to, if it is ephemeral.
  pub fn chunk(&self) -> Option<u16> {
    match self {
      RoomId::Ephemeral { chunk, .. } => Some(*chunk),
      _ => None,
    }
  }
}

impl Default for RoomId {
  fn default() -> Self { RoomId::Void }
}

impl fmt::Display for RoomId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.as_number()) }
}

impl FromStr for RoomId {
  type Err = ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(RoomId::from_number(s.parse()?)) }
}

impl From<i64> for RoomId {
  fn from(n: i64) -> Self { RoomId::from_number(n) }
}

impl Serialize for RoomId {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(self.as_number())
  }
}

impl<'de> Deserialize<'de> for RoomId {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    struct NumVisitor;
    impl de::Visitor<'_> for NumVisitor {
      type Value = RoomId;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "a room id number") }
      fn visit_i64<E: de::Error>(self, v: i64) -> Result<RoomId, E> { Ok(RoomId::from_number(v)) }
      fn visit_u64<E: de::Error>(self, v: u64) -> Result<RoomId, E> {
        Ok(RoomId::from_number(v as i64))
      }
    }
    d.deserialize_i64(NumVisitor)
  }
}

macro_rules! display_as_inner {
  ($($ty:ty),*) => {
    $(
      impl fmt::Display for $ty {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0) }
      }
    )*
  };
}

display_as_inner!(UserId, ConnId, MobId, MobInstanceId, ItemId, BuffId);

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn room_id_numeric_layout() {
    assert_eq!(RoomId::from_number(-1), RoomId::Void);
    assert_eq!(RoomId::from_number(0), RoomId::Persistent(0));
    assert_eq!(RoomId::from_number(899_999), RoomId::Persistent(899_999));
    assert_eq!(RoomId::from_number(900_000), RoomId::Ephemeral { chunk: 0, slot: 0 });
    assert_eq!(RoomId::from_number(900_251), RoomId::Ephemeral { chunk: 1, slot: 1 });

    for n in [-1, 0, 42, 899_999, 900_000, 900_249, 900_250, 924_999] {
      assert_eq!(RoomId::from_number(n).as_number(), n);
    }
  }

  #[test]
  fn room_id_serde_is_numeric() {
    let id = RoomId::Ephemeral { chunk: 2, slot: 3 };
    assert_eq!(serde_yaml::to_string(&id).unwrap().trim(), "900503");
    let back: RoomId = serde_yaml::from_str("900503").unwrap();
    assert_eq!(back, id);
    let void: RoomId = serde_yaml::from_str("-1").unwrap();
    assert!(void.is_void());
  }
}
