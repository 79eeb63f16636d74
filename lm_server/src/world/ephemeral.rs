//! The ephemeral room id allocator.
//!
//! Ephemeral copies live in a reserved id range organized into fixed-size
//! chunks; a copy request takes a whole chunk, and cleanup frees whole
//! chunks. The allocator only hands out ids and remembers which original
//! each copy came from; actually registering the copied rooms is the world
//! store's job.

use lm_common::id::{RoomId, EPHEMERAL_CHUNK_COUNT, EPHEMERAL_CHUNK_SLOTS};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EphemeralError {
  #[error("ephemeral chunk limit reached")]
  ChunkLimitReached,
  #[error("non-unique room id")]
  NonUniqueRoomId,
  #[error("too many rooms for one chunk ({0} > {max})", max = EPHEMERAL_CHUNK_SLOTS)]
  TooManyRooms(usize),
}

/// One allocated chunk: slot to the original (persistent) room id.
#[derive(Debug, Default)]
struct Chunk {
  originals: Vec<RoomId>,
}

#[derive(Debug)]
pub struct EphemeralChunks {
  chunks: Vec<Option<Chunk>>,
}

impl EphemeralChunks {
  pub fn new() -> Self {
    EphemeralChunks { chunks: (0..EPHEMERAL_CHUNK_COUNT).map(|_| None).collect() }
  }

  /// Reserves a chunk and assigns one ephemeral id per source id, in order.
  /// Returns the source-to-copy mapping. The ids of two successful calls
  /// never overlap, as each call takes its own chunk.
  pub fn allocate(&mut self, sources: &[RoomId]) -> Result<HashMap<RoomId, RoomId>, EphemeralError> {
    if sources.len() > EPHEMERAL_CHUNK_SLOTS as usize {
      return Err(EphemeralError::TooManyRooms(sources.len()));
    }
    for (i, id) in sources.iter().enumerate() {
      if sources[..i].contains(id) {
        return Err(EphemeralError::NonUniqueRoomId);
      }
    }
    let chunk_idx = self
      .chunks
      .iter()
      .position(|c| c.is_none())
      .ok_or(EphemeralError::ChunkLimitReached)?;

    let mut mapping = HashMap::new();
    for (slot, &src) in sources.iter().enumerate() {
      mapping.insert(src, RoomId::Ephemeral { chunk: chunk_idx as u16, slot: slot as u16 });
    }
    self.chunks[chunk_idx] = Some(Chunk { originals: sources.to_vec() });
    Ok(mapping)
  }

  /// The original room a copy was made from.
  pub fn original_of(&self, id: RoomId) -> Option<RoomId> {
    let (chunk, slot) = match id {
      RoomId::Ephemeral { chunk, slot } => (chunk, slot),
      _ => return None,
    };
    self
      .chunks
      .get(chunk as usize)?
      .as_ref()?
      .originals
      .get(slot as usize)
      .copied()
  }

  /// Every id in an allocated chunk.
  pub fn chunk_ids(&self, chunk: u16) -> Vec<RoomId> {
    match self.chunks.get(chunk as usize).and_then(|c| c.as_ref()) {
      Some(c) => (0..c.originals.len())
        .map(|slot| RoomId::Ephemeral { chunk, slot: slot as u16 })
        .collect(),
      None => vec![],
    }
  }

  /// The indices of currently allocated chunks.
  pub fn allocated_chunks(&self) -> Vec<u16> {
    self
      .chunks
      .iter()
      .enumerate()
      .filter(|(_, c)| c.is_some())
      .map(|(i, _)| i as u16)
      .collect()
  }

  /// Frees a chunk, returning the ids that were in it.
  pub fn free_chunk(&mut self, chunk: u16) -> Vec<RoomId> {
    let ids = self.chunk_ids(chunk);
    if let Some(c) = self.chunks.get_mut(chunk as usize) {
      *c = None;
    }
    ids
  }
}

impl Default for EphemeralChunks {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn allocation_maps_sources_in_order() {
    let mut e = EphemeralChunks::new();
    let src = [RoomId::Persistent(100), RoomId::Persistent(101), RoomId::Persistent(102)];
    let mapping = e.allocate(&src).unwrap();
    assert_eq!(mapping[&src[0]], RoomId::Ephemeral { chunk: 0, slot: 0 });
    assert_eq!(mapping[&src[2]], RoomId::Ephemeral { chunk: 0, slot: 2 });
    assert_eq!(e.original_of(mapping[&src[1]]), Some(src[1]));
  }

  #[test]
  fn calls_never_overlap() {
    let mut e = EphemeralChunks::new();
    let a = e.allocate(&[RoomId::Persistent(1)]).unwrap();
    let b = e.allocate(&[RoomId::Persistent(1)]).unwrap();
    assert_ne!(a[&RoomId::Persistent(1)], b[&RoomId::Persistent(1)]);
  }

  #[test]
  fn non_unique_sources_fail() {
    let mut e = EphemeralChunks::new();
    let err = e.allocate(&[RoomId::Persistent(1), RoomId::Persistent(1)]).unwrap_err();
    assert_eq!(err, EphemeralError::NonUniqueRoomId);
  }

  #[test]
  fn exhaustion_is_stable() {
    let mut e = EphemeralChunks::new();
    for _ in 0..EPHEMERAL_CHUNK_COUNT {
      e.allocate(&[RoomId::Persistent(5)]).unwrap();
    }
    // The sentinel error comes back unchanged across repeated calls.
    for _ in 0..3 {
      let err = e.allocate(&[RoomId::Persistent(5)]).unwrap_err();
      assert_eq!(err, EphemeralError::ChunkLimitReached);
    }
  }

  #[test]
  fn free_chunk_forgets_the_mapping() {
    let mut e = EphemeralChunks::new();
    let mapping = e.allocate(&[RoomId::Persistent(9)]).unwrap();
    let eph = mapping[&RoomId::Persistent(9)];
    let freed = e.free_chunk(eph.chunk().unwrap());
    assert_eq!(freed, vec![eph]);
    assert_eq!(e.original_of(eph), None);
    // The chunk is reusable afterwards.
    let again = e.allocate(&[RoomId::Persistent(9)]).unwrap();
    assert_eq!(again[&RoomId::Persistent(9)], eph);
  }
}
