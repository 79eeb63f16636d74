//! The world store.
//!
//! This owns every room, zone, mob instance and resident user, and is the
//! single authority for moving actors between rooms. Rooms load lazily from
//! disk and are evicted when idle; ephemeral copies live in a reserved id
//! range and are cleaned up a whole chunk at a time.
//!
//! Locking: the store uses fine-grained parking_lot locks (a map lock plus
//! one mutex per room/mob), with the simulation thread as the only mutation
//! driver. Lock order is room before actor, and never two rooms at once:
//! movement mutates the source, releases it, then takes the destination.

mod ephemeral;
pub mod room;
pub mod storage;
mod zone;

use crate::{
  data::{self, Registries},
  event::{ActorRef, Event, EventBus},
  mob::Mob,
  user::{User, UserRecord},
};
use lm_common::{
  id::{ConnId, MobId, MobInstanceId, RoomId, UserId},
  util::ThreadPool,
  Config,
};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
};

pub use ephemeral::{EphemeralChunks, EphemeralError};
pub use room::{Container, Corpse, Exit, Lock, Room, Sign, SpawnInfo};
pub use zone::Zone;

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
  #[error("room {0} does not exist")]
  RoomNotFound(RoomId),
  #[error("user {0} is not resident")]
  UserNotFound(UserId),
  #[error(transparent)]
  Ephemeral(#[from] EphemeralError),
}

pub struct WorldStore {
  config:   Arc<Config>,
  data_dir: PathBuf,
  pub registries: Registries,

  rooms:      RwLock<HashMap<RoomId, Arc<Mutex<Room>>>>,
  room_files: Mutex<HashMap<RoomId, PathBuf>>,
  zone_rooms: Mutex<HashMap<String, Vec<RoomId>>>,
  zones:      RwLock<HashMap<String, Arc<Mutex<Zone>>>>,

  mobs:          RwLock<HashMap<MobInstanceId, Arc<Mutex<Mob>>>>,
  next_instance: AtomicU64,

  users:      RwLock<HashMap<UserId, Arc<User>>>,
  conn_users: Mutex<HashMap<ConnId, UserId>>,
  next_user:  AtomicU64,

  ephemeral: Mutex<EphemeralChunks>,

  turn:   AtomicU64,
  round:  AtomicU64,
  is_day: AtomicBool,

  /// Unrecognized verbs, counted for content authors.
  bad_commands: Mutex<HashMap<String, u32>>,
}

impl WorldStore {
  pub fn new(config: Arc<Config>, data_dir: PathBuf, registries: Registries) -> WorldStore {
    let (room_files, zone_paths) = storage::scan_room_files(&data_dir).unwrap_or_else(|e| {
      error!("could not scan room files: {e}");
      (HashMap::new(), vec![])
    });
    let mut zone_rooms: HashMap<String, Vec<RoomId>> = HashMap::new();
    for (id, path) in &room_files {
      if let Some(zone) = path.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) {
        zone_rooms.entry(zone.to_string()).or_default().push(*id);
      }
    }
    for rooms in zone_rooms.values_mut() {
      rooms.sort();
    }

    let mut zones = HashMap::new();
    for path in zone_paths {
      match data::load_one::<Zone>(&data_dir, &path) {
        Ok(z) => {
          zones.insert(z.name.clone(), Arc::new(Mutex::new(z)));
        }
        Err(e) => error!("skipping zone config: {e}"),
      }
    }
    info!("indexed {} rooms across {} zones", room_files.len(), zones.len());

    let next_user = Self::scan_max_user_id(&data_dir) + 1;

    WorldStore {
      config,
      data_dir,
      registries,
      rooms: RwLock::new(HashMap::new()),
      room_files: Mutex::new(room_files),
      zone_rooms: Mutex::new(zone_rooms),
      zones: RwLock::new(zones),
      mobs: RwLock::new(HashMap::new()),
      next_instance: AtomicU64::new(1),
      users: RwLock::new(HashMap::new()),
      conn_users: Mutex::new(HashMap::new()),
      next_user: AtomicU64::new(next_user),
      ephemeral: Mutex::new(EphemeralChunks::new()),
      turn: AtomicU64::new(0),
      round: AtomicU64::new(0),
      is_day: AtomicBool::new(true),
      bad_commands: Mutex::new(HashMap::new()),
    }
  }

  fn scan_max_user_id(data_dir: &PathBuf) -> u64 {
    match data::load_all::<UserRecord>(data_dir, "users") {
      Ok(users) => users.keys().map(|id| id.0 as u64).max().unwrap_or(0),
      Err(e) => {
        warn!("could not scan user files: {e}");
        0
      }
    }
  }

  pub fn config(&self) -> &Arc<Config> { &self.config }
  pub fn data_dir(&self) -> &PathBuf { &self.data_dir }

  // --- tick counters -------------------------------------------------------

  pub fn turn(&self) -> u64 { self.turn.load(Ordering::SeqCst) }
  pub fn round(&self) -> u64 { self.round.load(Ordering::SeqCst) }
  pub fn set_round(&self, round: u64) { self.round.store(round, Ordering::SeqCst) }

  /// Advances the turn; returns `(turn, Some(round))` when a round boundary
  /// was crossed.
  pub fn advance_turn(&self, turns_per_round: u64) -> (u64, Option<u64>) {
    let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
    if turn % turns_per_round.max(1) == 0 {
      let round = self.round.fetch_add(1, Ordering::SeqCst) + 1;
      (turn, Some(round))
    } else {
      (turn, None)
    }
  }

  pub fn is_day(&self) -> bool { self.is_day.load(Ordering::SeqCst) }
  pub fn set_day(&self, day: bool) { self.is_day.store(day, Ordering::SeqCst) }

  // --- rooms ---------------------------------------------------------------

  /// The configured room new characters start in.
  pub fn start_room_id(&self) -> RoomId {
    RoomId::from_number(self.config.get::<_, i64>("rooms.start"))
  }

  /// The death-recovery room. Moving here redirects into a fresh ephemeral
  /// copy, so each death gets a private one.
  pub fn death_room_id(&self) -> RoomId {
    RoomId::from_number(self.config.get::<_, i64>("rooms.death-recovery"))
  }

  /// A room, loading it from disk on first reference. `None` when no such
  /// template exists (callers decide what that means).
  pub fn room(&self, id: RoomId) -> Option<Arc<Mutex<Room>>> {
    if let Some(room) = self.rooms.read().get(&id) {
      return Some(room.clone());
    }
    let path = self.room_files.lock().get(&id)?.clone();
    let room = match storage::load_room(&self.data_dir, &path) {
      Ok(r) => r,
      Err(e) => {
        warn!("could not load room {id}: {e}");
        return None;
      }
    };
    debug!("loaded room {id} ({})", room.title);
    let room = Arc::new(Mutex::new(room));
    let mut rooms = self.rooms.write();
    // Someone else may have loaded it while we read the file.
    let entry = rooms.entry(id).or_insert_with(|| room.clone());
    Some(entry.clone())
  }

  /// A room, only if it is already resident.
  pub fn room_if_loaded(&self, id: RoomId) -> Option<Arc<Mutex<Room>>> {
    self.rooms.read().get(&id).cloned()
  }

  /// Every resident room.
  pub fn resident_rooms(&self) -> Vec<(RoomId, Arc<Mutex<Room>>)> {
    self.rooms.read().iter().map(|(id, r)| (*id, r.clone())).collect()
  }

  pub fn zone(&self, name: &str) -> Option<Arc<Mutex<Zone>>> {
    self.zones.read().get(name).cloned()
  }

  pub fn zones(&self) -> Vec<Arc<Mutex<Zone>>> { self.zones.read().values().cloned().collect() }

  /// The persistent room ids of a zone, from the boot-time index.
  pub fn zone_room_ids(&self, zone: &str) -> Vec<RoomId> {
    self.zone_rooms.lock().get(zone).cloned().unwrap_or_default()
  }

  /// Seeds a room's spawns on first arrival after load.
  fn prepare_room(&self, room_arc: &Arc<Mutex<Room>>) {
    let mut room = room_arc.lock();
    if room.prepared {
      return;
    }
    room.prepared = true;
    let id = room.id;
    let mut to_spawn = vec![];
    for (i, spawn) in room.spawns.iter().enumerate() {
      if spawn.instance.is_none() && spawn.cleared_round == 0 {
        to_spawn.push(i);
      }
    }
    for i in to_spawn {
      let spawn = room.spawns[i].clone();
      room.spawns[i].instance = self.seed_spawn(&mut room, &spawn);
    }
    debug!("prepared room {id}");
  }

  /// Applies one SpawnInfo to a locked room. Returns the mob instance id if
  /// a mob was spawned.
  pub(crate) fn seed_spawn(&self, room: &mut Room, spawn: &SpawnInfo) -> Option<MobInstanceId> {
    for item_id in &spawn.items {
      if let Some(t) = self.registries.items.get(item_id) {
        room.items.push(crate::item::Item::of(t));
      }
    }
    room.gold += spawn.gold;
    let mob_id = spawn.mob?;
    let template = match self.registries.mobs.get(&mob_id) {
      Some(t) => t,
      None => {
        warn!("room {} spawns unknown mob {mob_id}", room.id);
        return None;
      }
    };
    let instance_id = MobInstanceId(self.next_instance.fetch_add(1, Ordering::SeqCst));
    let mut mob = Mob::spawn(template, instance_id, room.id, &self.registries);
    self.scale_mob_to_zone(&mut mob);
    room.mobs.push(instance_id);
    self.mobs.write().insert(instance_id, Arc::new(Mutex::new(mob)));
    Some(instance_id)
  }

  /// Zones with a level-scaling range clamp spawned mobs into it.
  fn scale_mob_to_zone(&self, mob: &mut Mob) {
    let range = self
      .zone(&mob.character.zone)
      .and_then(|z| z.lock().level_range);
    if let Some((lo, hi)) = range {
      let level = mob.character.level.clamp(lo, hi);
      if level != mob.character.level {
        mob.character.level = level;
        mob.character.recompute(&self.registries.items, &self.registries.buffs);
        mob.character.health = mob.character.health_max();
      }
    }
  }

  // --- movement ------------------------------------------------------------

  /// The single authoritative mover for users. Resolves aliases, prepares
  /// the destination, maintains both rooms' player sets and the character's
  /// room id, applies mutator entry buffs, and emits `RoomChange`.
  pub fn move_to_room(
    &self,
    bus: &EventBus,
    user_id: UserId,
    to_id: RoomId,
  ) -> Result<RoomId, WorldError> {
    let user = self.user(user_id).ok_or(WorldError::UserNotFound(user_id))?;
    let round = self.round();

    // Room 0 aliases to the start room; the death-recovery room redirects
    // into a freshly-created ephemeral copy.
    let mut to_id = to_id;
    if to_id == RoomId::START_ALIAS {
      to_id = self.start_room_id();
    }
    if to_id == self.death_room_id() && !to_id.is_ephemeral() {
      let mapping = self.create_ephemeral_rooms(&[to_id])?;
      to_id = mapping[&to_id];
    }

    let from_id = user.character.lock().room_id;
    let dest = self.room(to_id).ok_or(WorldError::RoomNotFound(to_id))?;
    self.prepare_room(&dest);

    if let Some(source) = self.room_if_loaded(from_id) {
      let mut source = source.lock();
      source.mark_visited(ActorRef::User(user_id), round);
      source.players.remove(&user_id);
    }

    let zone;
    {
      let mut dest = dest.lock();
      dest.players.insert(user_id);
      dest.mark_visited(ActorRef::User(user_id), round);
      zone = dest.zone.clone();
    }

    // Mutator-sourced buffs from the room and its zone, for ones the user
    // doesn't already carry.
    let mut entry_buffs = vec![];
    {
      let dest = dest.lock();
      for m in &dest.mutators {
        if let Some(spec) = self.registries.mutators.get(&m.spec_id) {
          entry_buffs.extend(spec.entry_buffs.iter().copied());
        }
      }
    }
    if let Some(z) = self.zone(&zone) {
      let z = z.lock();
      for m in &z.mutators {
        if let Some(spec) = self.registries.mutators.get(&m.spec_id) {
          entry_buffs.extend(spec.entry_buffs.iter().copied());
        }
      }
    }

    let unseen;
    {
      let mut character = user.character.lock();
      character.room_id = to_id;
      character.zone = zone;
      unseen = character.buffs.flag_active(crate::character::buffs::BuffFlag::Hidden);
      for buff_id in entry_buffs {
        if character.buffs.has_buff(buff_id) {
          continue;
        }
        if let Some(spec) = self.registries.buffs.get(&buff_id) {
          character.buffs.add_buff(spec, false);
          bus.enqueue(Event::Buff {
            actor:   ActorRef::User(user_id),
            buff_id,
            source:  "mutator".into(),
          });
        }
      }
    }

    bus.enqueue(Event::RoomChange {
      actor: ActorRef::User(user_id),
      from: from_id,
      to: to_id,
      unseen,
    });
    Ok(to_id)
  }

  /// Moves a mob instance between rooms. Simpler than the user path: no
  /// aliases, no mutator buffs.
  pub fn move_mob(
    &self,
    bus: &EventBus,
    instance_id: MobInstanceId,
    to_id: RoomId,
  ) -> Result<(), WorldError> {
    let mob = match self.mob(instance_id) {
      Some(m) => m,
      None => return Ok(()),
    };
    let round = self.round();
    let from_id = mob.lock().character.room_id;
    let dest = self.room(to_id).ok_or(WorldError::RoomNotFound(to_id))?;
    self.prepare_room(&dest);

    if let Some(source) = self.room_if_loaded(from_id) {
      let mut source = source.lock();
      source.mark_visited(ActorRef::Mob(instance_id), round);
      source.mobs.retain(|&m| m != instance_id);
    }
    {
      let mut dest = dest.lock();
      dest.mobs.push(instance_id);
      dest.mark_visited(ActorRef::Mob(instance_id), round);
    }
    {
      let mut mob = mob.lock();
      mob.character.room_id = to_id;
    }
    bus.enqueue(Event::RoomChange {
      actor: ActorRef::Mob(instance_id),
      from: from_id,
      to: to_id,
      unseen: false,
    });
    Ok(())
  }

  // --- mobs ----------------------------------------------------------------

  pub fn mob(&self, id: MobInstanceId) -> Option<Arc<Mutex<Mob>>> {
    self.mobs.read().get(&id).cloned()
  }

  pub fn mob_instances(&self) -> Vec<(MobInstanceId, Arc<Mutex<Mob>>)> {
    self.mobs.read().iter().map(|(id, m)| (*id, m.clone())).collect()
  }

  /// Spawns a mob by template into a room. Used by scripts and admin
  /// commands; room spawns go through `seed_spawn`.
  pub fn spawn_mob(&self, template_id: MobId, room_id: RoomId) -> Option<MobInstanceId> {
    let template = self.registries.mobs.get(&template_id)?;
    let room = self.room(room_id)?;
    let instance_id = MobInstanceId(self.next_instance.fetch_add(1, Ordering::SeqCst));
    let mut mob = Mob::spawn(template, instance_id, room_id, &self.registries);
    self.scale_mob_to_zone(&mut mob);
    room.lock().mobs.push(instance_id);
    self.mobs.write().insert(instance_id, Arc::new(Mutex::new(mob)));
    Some(instance_id)
  }

  /// Destroys a mob instance: removes it from its room first, then from the
  /// instance map. The caller prunes its script VM.
  pub fn destroy_mob(&self, instance_id: MobInstanceId) {
    let room_id = match self.mob(instance_id) {
      Some(m) => m.lock().character.room_id,
      None => return,
    };
    if let Some(room) = self.room_if_loaded(room_id) {
      let mut room = room.lock();
      room.mobs.retain(|&m| m != instance_id);
      for spawn in &mut room.spawns {
        if spawn.instance == Some(instance_id) {
          spawn.instance = None;
          spawn.cleared_round = self.round();
        }
      }
    }
    self.mobs.write().remove(&instance_id);
  }

  // --- users ---------------------------------------------------------------

  pub fn user(&self, id: UserId) -> Option<Arc<User>> { self.users.read().get(&id).cloned() }

  pub fn users(&self) -> Vec<Arc<User>> { self.users.read().values().cloned().collect() }

  pub fn user_by_name(&self, name: &str) -> Option<Arc<User>> {
    let needle = name.to_ascii_lowercase();
    self
      .users
      .read()
      .values()
      .find(|u| u.name.to_ascii_lowercase() == needle)
      .cloned()
  }

  pub fn user_by_conn(&self, conn_id: ConnId) -> Option<Arc<User>> {
    let id = *self.conn_users.lock().get(&conn_id)?;
    self.user(id)
  }

  /// Loads a user record from disk, or creates a fresh one with the next
  /// stable id.
  pub fn load_or_create_user(&self, name: &str) -> UserRecord {
    let path = self.data_dir.join(format!("users/{}.yaml", name.to_ascii_lowercase()));
    if path.exists() {
      match data::load_one::<UserRecord>(&self.data_dir, &path) {
        Ok(r) => return r,
        Err(e) => warn!("could not load user `{name}`: {e} (creating fresh)"),
      }
    }
    let id = UserId(self.next_user.fetch_add(1, Ordering::SeqCst) as u32);
    let mut character = crate::character::Character::new(name);
    if let Some(race) = self.registries.races.values().min_by_key(|r| r.id) {
      for (stat, base) in &race.stats {
        if let Ok(kind) = stat.parse::<crate::character::StatKind>() {
          character.stats.get_mut(kind).base = *base;
        }
      }
    }
    character.recompute(&self.registries.items, &self.registries.buffs);
    character.health = character.health_max();
    character.mana = character.mana_max();
    UserRecord {
      id,
      name: name.to_string(),
      role: Default::default(),
      config: HashMap::new(),
      character,
    }
  }

  /// Makes a user resident and binds its connection.
  pub fn register_user(&self, user: Arc<User>) {
    self.conn_users.lock().insert(user.conn_id(), user.id);
    self.users.write().insert(user.id, user);
  }

  /// Rebinds an existing resident user to a new connection.
  pub fn rebind_user_conn(&self, old: ConnId, new: ConnId, id: UserId) {
    let mut conns = self.conn_users.lock();
    conns.remove(&old);
    conns.insert(new, id);
  }

  /// Evicts a user from the resident set. The caller saves first.
  pub fn remove_user(&self, id: UserId) {
    if let Some(user) = self.user(id) {
      self.conn_users.lock().remove(&user.conn_id());
      if let Some(room) = self.room_if_loaded(user.character.lock().room_id) {
        room.lock().players.remove(&id);
      }
    }
    self.users.write().remove(&id);
  }

  pub fn save_user(&self, user: &User, careful: bool) {
    if let Err(e) = data::save_record(&self.data_dir, &user.record(), careful) {
      error!("could not save user `{}`: {e}", user.name);
    }
  }

  pub fn save_all_users(&self, pool: &ThreadPool<()>, careful: bool) {
    let records: Vec<UserRecord> = self.users().iter().map(|u| u.record()).collect();
    data::save_all(&self.data_dir, records, pool, careful);
  }

  // --- ephemeral copies ----------------------------------------------------

  /// Copies the given rooms into a fresh ephemeral chunk. Templates only (no
  /// instance overlay); exits between copied rooms are rewritten to point at
  /// their copies, everything else is left alone.
  pub fn create_ephemeral_rooms(
    &self,
    sources: &[RoomId],
  ) -> Result<HashMap<RoomId, RoomId>, WorldError> {
    let mapping = self.ephemeral.lock().allocate(sources)?;
    for (&src, &eph) in &mapping {
      let path = match self.room_files.lock().get(&src).cloned() {
        Some(p) => p,
        None => {
          warn!("ephemeral copy of unknown room {src}");
          continue;
        }
      };
      let mut room = match data::load_one::<Room>(&self.data_dir, &path) {
        Ok(r) => r,
        Err(e) => {
          warn!("could not load template for ephemeral copy of {src}: {e}");
          continue;
        }
      };
      room.id = eph;
      for exit in room.exits.values_mut() {
        if let Some(&copy) = mapping.get(&exit.target) {
          exit.target = copy;
        }
      }
      self.rooms.write().insert(eph, Arc::new(Mutex::new(room)));
    }
    Ok(mapping)
  }

  /// Copies a whole zone into one ephemeral chunk.
  pub fn create_ephemeral_zone(
    &self,
    zone: &str,
  ) -> Result<HashMap<RoomId, RoomId>, WorldError> {
    let ids = self.zone_room_ids(zone);
    self.create_ephemeral_rooms(&ids)
  }

  /// The original room an ephemeral id was copied from.
  pub fn ephemeral_original(&self, id: RoomId) -> Option<RoomId> {
    self.ephemeral.lock().original_of(id)
  }

  /// Frees every ephemeral chunk with no players left in it. Returns the
  /// room ids that went away, so callers can prune script VMs.
  pub fn cleanup_ephemeral(&self) -> Vec<RoomId> {
    let chunks = self.ephemeral.lock().allocated_chunks();
    let mut freed = vec![];
    for chunk in chunks {
      let ids = self.ephemeral.lock().chunk_ids(chunk);
      let empty = ids.iter().all(|id| {
        self
          .room_if_loaded(*id)
          .map(|r| r.lock().players.is_empty())
          .unwrap_or(true)
      });
      if !empty {
        continue;
      }
      let ids = self.ephemeral.lock().free_chunk(chunk);
      let mut rooms = self.rooms.write();
      let mut mobs_gone = vec![];
      for id in &ids {
        if let Some(room) = rooms.remove(id) {
          mobs_gone.extend(room.lock().mobs.iter().copied());
        }
      }
      drop(rooms);
      for mob in mobs_gone {
        self.mobs.write().remove(&mob);
      }
      debug!("freed ephemeral chunk {chunk} ({} rooms)", ids.len());
      freed.extend(ids);
    }
    freed
  }

  // --- maintenance and unload ----------------------------------------------

  /// Per-turn upkeep: prune expired signs and temporary exits everywhere,
  /// and occasionally try ephemeral cleanup. Returns freed ephemeral ids.
  pub fn maintenance(&self, rng: &mut impl Rng) -> Vec<RoomId> {
    let round = self.round();
    for (_, room) in self.resident_rooms() {
      let mut room = room.lock();
      room.prune_signs(round);
      room.prune_temp_exits(round);
    }
    if rng.gen_ratio(1, 20) {
      self.cleanup_ephemeral()
    } else {
      vec![]
    }
  }

  /// Saves and evicts idle rooms: no players, not visited for
  /// `threshold_rounds`, at most `batch` per call. Returns the evicted ids.
  pub fn unload_idle_rooms(&self, threshold_rounds: u64, batch: usize, careful: bool) -> Vec<RoomId> {
    let round = self.round();
    let mut evicted = vec![];
    for (id, room_arc) in self.resident_rooms() {
      if evicted.len() >= batch {
        break;
      }
      if id.is_ephemeral() {
        continue;
      }
      let room = room_arc.lock();
      if !room.players.is_empty() {
        continue;
      }
      if round.saturating_sub(room.last_visited_round) < threshold_rounds {
        continue;
      }
      if let Some(path) = self.room_files.lock().get(&id).cloned() {
        if let Err(e) = storage::save_room_instance(&self.data_dir, &path, &room, careful) {
          error!("could not save room {id} on unload: {e}");
          continue;
        }
      }
      // Unloading a room destroys its mob instances; spawns re-seed on the
      // next load.
      for mob in &room.mobs {
        self.mobs.write().remove(mob);
      }
      drop(room);
      self.rooms.write().remove(&id);
      evicted.push(id);
    }
    if !evicted.is_empty() {
      debug!("unloaded {} idle rooms", evicted.len());
    }
    evicted
  }

  /// Saves every resident, persistent room's instance diff.
  pub fn save_all_rooms(&self, careful: bool) {
    for (id, room) in self.resident_rooms() {
      if id.is_ephemeral() {
        continue;
      }
      let path = match self.room_files.lock().get(&id).cloned() {
        Some(p) => p,
        None => continue,
      };
      let room = room.lock();
      if let Err(e) = storage::save_room_instance(&self.data_dir, &path, &room, careful) {
        error!("could not save room {id}: {e}");
      }
    }
  }

  // --- bad commands --------------------------------------------------------

  /// Counts an unrecognized verb.
  pub fn track_bad_command(&self, verb: &str) {
    *self.bad_commands.lock().entry(verb.to_string()).or_insert(0) += 1;
  }

  /// Dumps the bad-command tallies, sorted by count. Called at shutdown.
  pub fn dump_bad_commands(&self) {
    let counts = self.bad_commands.lock();
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1));
    for (verb, count) in sorted.into_iter().take(50) {
      debug!("bad command: {verb} ({count})");
    }
  }
}
