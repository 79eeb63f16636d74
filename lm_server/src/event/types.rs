use crate::net::SessionSender;
use lm_common::id::{BuffId, ConnId, ItemId, MobInstanceId, RoomId, UserId};
use strum_macros::EnumDiscriminants;

/// Something that can own buffs, fight, and move: a user's character or a mob
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorRef {
  User(UserId),
  Mob(MobInstanceId),
}

impl ActorRef {
  pub fn user_id(&self) -> Option<UserId> {
    match self {
      ActorRef::User(id) => Some(*id),
      _ => None,
    }
  }
  pub fn mob_id(&self) -> Option<MobInstanceId> {
    match self {
      ActorRef::Mob(id) => Some(*id),
      _ => None,
    }
  }
}

/// Where a [`Event::Message`] goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
  User(UserId),
  /// Everyone in the room, optionally excluding one user (usually the one
  /// who caused the message).
  Room(RoomId, Option<UserId>),
}

/// The communication channels of [`Event::Communication`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsKind {
  Say,
  Whisper,
  Shout,
}

/// Every event that can go over the bus. The payload is the variant; the
/// type listeners register against is the [`EventType`] discriminant.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(EventType))]
#[strum_discriminants(derive(Hash))]
pub enum Event {
  /// Fired every turn, before anything else that turn.
  NewTurn { turn: u64 },
  /// Fired when a turn crosses a round boundary.
  NewRound { round: u64 },

  /// A connection finished the login prompt. Handled on the simulation
  /// thread, which does the actual user load/create.
  LoginRequest { conn_id: ConnId, name: String, sender: SessionSender },
  /// A connection went away. The user (if any) becomes a zombie.
  Disconnect { conn_id: ConnId },

  /// A user entered the world.
  PlayerSpawn { user_id: UserId, conn_id: ConnId },
  /// A user left the world (logout or zombie cleanup).
  PlayerDespawn { user_id: UserId },
  /// A user was dropped by the session layer (idle timeout, input flood).
  PlayerDrop { user_id: UserId, room_id: RoomId },

  /// An actor moved between rooms. `unseen` is set when the actor is hidden
  /// from the room it entered.
  RoomChange { actor: ActorRef, from: RoomId, to: RoomId, unseen: bool },

  /// One line of player input, ready to dispatch at `ready_turn`.
  Input { user_id: UserId, text: String, ready_turn: u64 },

  /// Text for a user or a room.
  Message { target: MessageTarget, text: String },
  /// Text for everyone connected.
  Broadcast { text: String, source_is_mod: bool },

  /// A buff was added to an actor.
  Buff { actor: ActorRef, buff_id: BuffId, source: String },
  /// Buffs crossed their round interval this round.
  BuffsTriggered { actor: ActorRef, buff_ids: Vec<BuffId> },

  /// A quest token was granted.
  Quest { user_id: UserId, token: String },
  /// An item entered or left an actor's possession.
  ItemOwnership { actor: ActorRef, item: ItemId, gained: bool },
  /// In-character communication, for logs and channel fan-out.
  Communication { source: ActorRef, kind: CommsKind, name: String, message: String },
  /// A user hit a new level.
  LevelUp { user_id: UserId, new_level: u32 },

  /// A mob has nothing to do this round.
  MobIdle { mob_instance_id: MobInstanceId },
  /// A map renderer (if any is attached) should rebuild from this root.
  RebuildMap { root_room_id: RoomId, skip_if_exists: bool },
  /// A user looked at something.
  Looking { user_id: UserId, room_id: RoomId, target: String, hidden: bool },
  /// Day flipped to night or back.
  DayNightCycle { is_day: bool },

  /// Structured log line for admin followers.
  Log { level: log::Level, message: String },

  /// The server is going down. Emitted exactly once.
  Shutdown,
}

impl Event {
  pub fn ty(&self) -> EventType { EventType::from(self) }
}
