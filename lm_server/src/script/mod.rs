//! The scripting runtime.
//!
//! Small behavior scripts (rhai) attach to rooms, mobs, items, spells and
//! buffs. Each entity gets its own VM: the script compiles once on first
//! use, its top-level statements run once, and every later event is a plain
//! function call into it. Function lookups are memoized, including the
//! negative case, so an entity without an `on_idle` costs one string lookup
//! per event.
//!
//! Every call carries a deadline: a generous one for compile + `on_load`,
//! a tight one for everything else. A script that blows its budget is
//! forcibly interrupted and the event continues without it.

mod api;

use crate::{event::EventBus, world::WorldStore};
use lm_common::{
  id::{BuffId, ItemId, MobId, MobInstanceId, RoomId},
  Config,
};
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Scope, AST};
use std::{
  collections::HashMap,
  path::PathBuf,
  sync::Arc,
  time::{Duration, Instant},
};

pub use api::{ApiCtx, SMob, SRoom, SUser};

/// Which cache a VM lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
  Room,
  Mob,
  Item,
  Spell,
  Buff,
}

struct Vm {
  ast:   AST,
  scope: Scope<'static>,
  /// Function name to arity-checked presence. Misses are memoized too.
  funcs: HashMap<String, bool>,
}

pub struct ScriptRuntime {
  world:    Arc<WorldStore>,
  bus:      Arc<EventBus>,
  config:   Arc<Config>,
  data_dir: PathBuf,
  engine:   Engine,
  /// `(kind, key)` to VM. `None` caches "this entity has no script file".
  vms: Mutex<HashMap<(ScriptKind, String), Option<Arc<Mutex<Vm>>>>>,
  /// Deadline for the call in flight, polled by the engine's progress hook.
  deadline: Arc<Mutex<Option<Instant>>>,
}

impl ScriptRuntime {
  pub fn new(
    world: Arc<WorldStore>,
    bus: Arc<EventBus>,
    config: Arc<Config>,
    data_dir: PathBuf,
  ) -> ScriptRuntime {
    let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let mut engine = Engine::new();
    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(32);
    engine.set_max_string_size(64 * 1024);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine.set_max_modules(0);
    {
      let deadline = deadline.clone();
      engine.on_progress(move |_| {
        let hit = matches!(*deadline.lock(), Some(d) if Instant::now() >= d);
        if hit {
          Some("script deadline exceeded".into())
        } else {
          None
        }
      });
    }
    api::register(&mut engine, ApiCtx::new(world.clone(), bus.clone()));
    ScriptRuntime { world, bus, config, data_dir, engine, vms: Mutex::new(HashMap::new()), deadline }
  }

  fn load_budget(&self) -> Duration {
    Duration::from_millis(self.config.get::<_, u64>("scripts.load-budget-ms"))
  }
  fn call_budget(&self) -> Duration {
    Duration::from_millis(self.config.get::<_, u64>("scripts.call-budget-ms"))
  }

  // --- per-kind entry points ----------------------------------------------

  /// Calls a room script function. Ephemeral rooms run their original's
  /// script in their own VM.
  pub fn room_event(&self, room_id: RoomId, func: &str, args: Vec<Dynamic>) -> Option<Dynamic> {
    let source_id = self.world.ephemeral_original(room_id).unwrap_or(room_id);
    let room = self.world.room_if_loaded(room_id)?;
    let zone = room.lock().zone.clone();
    let path = self.data_dir.join(format!("rooms/{zone}/{source_id}.rhai"));
    self.call(ScriptKind::Room, room_id.to_string(), path, func, args)
  }

  pub fn mob_event(
    &self,
    instance_id: MobInstanceId,
    template_id: MobId,
    zone: &str,
    func: &str,
    args: Vec<Dynamic>,
  ) -> Option<Dynamic> {
    let path = self.data_dir.join(format!("mobs/{zone}/{template_id}.rhai"));
    self.call(ScriptKind::Mob, instance_id.to_string(), path, func, args)
  }

  /// Item scripts are per template, not per copy.
  pub fn item_event(&self, item_id: ItemId, func: &str, args: Vec<Dynamic>) -> Option<Dynamic> {
    let path = self.data_dir.join(format!("items/{item_id}.rhai"));
    self.call(ScriptKind::Item, item_id.to_string(), path, func, args)
  }

  pub fn buff_event(&self, buff_id: BuffId, func: &str, args: Vec<Dynamic>) -> Option<Dynamic> {
    let name = self.world.registries.buffs.get(&buff_id).map(|s| s.name.clone())?;
    let path =
      self.data_dir.join(format!("buffs/{buff_id}-{}.rhai", crate::data::slug(&name)));
    self.call(ScriptKind::Buff, buff_id.to_string(), path, func, args)
  }

  pub fn spell_event(&self, spell: &str, func: &str, args: Vec<Dynamic>) -> Option<Dynamic> {
    let path = self.data_dir.join(format!("spells/{}.rhai", crate::data::slug(spell)));
    self.call(ScriptKind::Spell, spell.to_ascii_lowercase(), path, func, args)
  }

  /// Whether an entity has a script bound (compiling it if needed).
  pub fn room_has_script(&self, room_id: RoomId) -> bool {
    let source_id = self.world.ephemeral_original(room_id).unwrap_or(room_id);
    let zone = match self.world.room_if_loaded(room_id) {
      Some(r) => r.lock().zone.clone(),
      None => return false,
    };
    let path = self.data_dir.join(format!("rooms/{zone}/{source_id}.rhai"));
    self.vm(ScriptKind::Room, room_id.to_string(), path).is_some()
  }

  // --- cache management ----------------------------------------------------

  /// Drops a room's VM (on evict or ephemeral cleanup).
  pub fn prune_room_vm(&self, room_id: RoomId) {
    self.vms.lock().remove(&(ScriptKind::Room, room_id.to_string()));
  }

  /// Drops a batch of room VMs, e.g. a freed ephemeral chunk.
  pub fn prune_room_vms(&self, room_ids: &[RoomId]) {
    let mut vms = self.vms.lock();
    for id in room_ids {
      vms.remove(&(ScriptKind::Room, id.to_string()));
    }
  }

  /// Drops a destroyed mob instance's VM.
  pub fn prune_mob_vm(&self, instance_id: MobInstanceId) {
    self.vms.lock().remove(&(ScriptKind::Mob, instance_id.to_string()));
  }

  /// Drops VMs whose entities are gone: rooms no longer resident and mob
  /// instances no longer alive. Runs at the head of every round.
  pub fn prune_stale_vms(&self) {
    let mut vms = self.vms.lock();
    vms.retain(|(kind, key), _| match kind {
      ScriptKind::Room => key
        .parse::<i64>()
        .map(|n| self.world.room_if_loaded(RoomId::from_number(n)).is_some())
        .unwrap_or(false),
      ScriptKind::Mob => key
        .parse::<u64>()
        .map(|n| self.world.mob(MobInstanceId(n)).is_some())
        .unwrap_or(false),
      _ => true,
    });
  }

  pub fn vm_count(&self) -> usize {
    self.vms.lock().values().filter(|v| v.is_some()).count()
  }

  // --- the engine room -----------------------------------------------------

  fn vm(&self, kind: ScriptKind, key: String, path: PathBuf) -> Option<Arc<Mutex<Vm>>> {
    let (vm, fresh) = self.vm_fresh(kind, key.clone(), path);
    let vm = vm?;
    if fresh {
      self.fire_on_load(kind, &key);
    }
    Some(vm)
  }

  /// Cache lookup plus compile-on-miss. The bool is true when this call
  /// did the compiling.
  fn vm_fresh(
    &self,
    kind: ScriptKind,
    key: String,
    path: PathBuf,
  ) -> (Option<Arc<Mutex<Vm>>>, bool) {
    let cache_key = (kind, key);
    if let Some(cached) = self.vms.lock().get(&cache_key) {
      return (cached.clone(), false);
    }
    let vm = if path.is_file() { self.compile(&path) } else { None };
    let fresh = vm.is_some();
    (self.vms.lock().entry(cache_key).or_insert(vm).clone(), fresh)
  }

  /// Rooms and mobs get one `on_load` with their own handle, right after
  /// their script compiles.
  fn fire_on_load(&self, kind: ScriptKind, key: &str) {
    let ctx = api::ApiCtx::new(self.world.clone(), self.bus.clone());
    match kind {
      ScriptKind::Room => {
        if let Ok(n) = key.parse::<i64>() {
          let handle = Dynamic::from(api::SRoom::wrap(&ctx, RoomId::from_number(n)));
          self.call_existing(kind, key, "on_load", vec![handle]);
        }
      }
      ScriptKind::Mob => {
        if let Ok(n) = key.parse::<u64>() {
          let handle = Dynamic::from(api::SMob::wrap(&ctx, MobInstanceId(n)));
          self.call_existing(kind, key, "on_load", vec![handle]);
        }
      }
      _ => {}
    }
  }

  /// Calls into an already-cached VM; never compiles. `on_load` gets the
  /// generous load budget.
  fn call_existing(
    &self,
    kind: ScriptKind,
    key: &str,
    func: &str,
    args: Vec<Dynamic>,
  ) -> Option<Dynamic> {
    let vm = self.vms.lock().get(&(kind, key.to_string())).cloned().flatten()?;
    self.call_vm(&vm, func, args, &format!("{kind:?}:{key}"), self.load_budget())
  }

  fn compile(&self, path: &PathBuf) -> Option<Arc<Mutex<Vm>>> {
    *self.deadline.lock() = Some(Instant::now() + self.load_budget());
    let result = self.engine.compile_file(path.clone());
    let mut ast = match result {
      Ok(ast) => ast,
      Err(e) => {
        *self.deadline.lock() = None;
        error!("could not compile `{}`: {e}", path.display());
        return None;
      }
    };
    // Run the top-level statements once, then strip them so function calls
    // don't re-run them.
    let mut scope = Scope::new();
    if let Err(e) = self.engine.run_ast_with_scope(&mut scope, &ast) {
      error!("error running `{}`: {e}", path.display());
      *self.deadline.lock() = None;
      return None;
    }
    *self.deadline.lock() = None;
    ast.clear_statements();
    Some(Arc::new(Mutex::new(Vm { ast, scope, funcs: HashMap::new() })))
  }

  fn call(
    &self,
    kind: ScriptKind,
    key: String,
    path: PathBuf,
    func: &str,
    args: Vec<Dynamic>,
  ) -> Option<Dynamic> {
    let vm = self.vm(kind, key, path.clone())?;
    self.call_vm(&vm, func, args, &path.display().to_string(), self.call_budget())
  }

  fn call_vm(
    &self,
    vm: &Arc<Mutex<Vm>>,
    func: &str,
    args: Vec<Dynamic>,
    what: &str,
    budget: Duration,
  ) -> Option<Dynamic> {
    let mut vm = vm.lock();
    let present = match vm.funcs.get(func) {
      Some(&p) => p,
      None => {
        let p = ast_has_fn(&vm.ast, func);
        vm.funcs.insert(func.to_string(), p);
        p
      }
    };
    if !present {
      return None;
    }

    *self.deadline.lock() = Some(Instant::now() + budget);
    let Vm { ast, scope, .. } = &mut *vm;
    let result = self.engine.call_fn::<Dynamic>(scope, ast, func, args);
    *self.deadline.lock() = None;
    match result {
      Ok(v) => Some(v),
      Err(e) => {
        error!("script error in `{what}` {func}: {e}");
        None
      }
    }
  }
}

fn ast_has_fn(ast: &AST, name: &str) -> bool {
  ast.iter_functions().any(|f| f.name == name)
}

#[cfg(test)]
mod tests;
