use super::{CounterStore, StoreError};
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};

#[derive(Clone, Copy, Default)]
struct Slot {
    tag: i64,
    count: i64,
}

/// Node-local counter backend: a fixed ring of bucket slots behind one
/// mutex.
///
/// Counter keys carry their bucket index as a trailing `_<index>` segment;
/// the ring recovers that index and maps it onto `index % slots`. A slot
/// whose stored tag differs from the requested index belongs to an older
/// rotation of the ring: it reads as absent and is reset on the next write.
/// This keeps live state bounded to the slot count with no expiry
/// bookkeeping, which is why [`set_expiry`](CounterStore::set_expiry) is a
/// no-op here.
///
/// The ring trades cross-node visibility for zero network cost: every node
/// counts only its own traffic. Version persistence
/// ([`set`](CounterStore::set)) is refused because anything coordinating a
/// fleet needs a shared backend.
pub struct RingStore {
    slots: Mutex<Vec<Slot>>,
}

impl RingStore {
    /// Create a ring with one slot per sub-bucket.
    pub fn new(slots: usize) -> Self {
        RingStore {
            slots: Mutex::new(vec![Slot::default(); slots.max(1)]),
        }
    }

    fn bucket_tag(key: &str) -> Result<i64, StoreError> {
        key.rsplit_once('_')
            .and_then(|(_, tag)| tag.parse::<i64>().ok())
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))
    }

    fn position(&self, tag: i64, len: usize) -> usize {
        tag.rem_euclid(len as i64) as usize
    }
}

impl CounterStore for RingStore {
    fn increment(&self, key: &str, _now: SystemTime) -> Result<i64, StoreError> {
        let tag = Self::bucket_tag(key)?;
        let mut slots = self.slots.lock();
        let pos = self.position(tag, slots.len());
        let slot = &mut slots[pos];
        if slot.tag != tag {
            // The slot still holds an older rotation; reclaim it.
            slot.tag = tag;
            slot.count = 0;
        }
        slot.count += 1;
        Ok(slot.count)
    }

    fn set_expiry(&self, _key: &str, _ttl: Duration, _now: SystemTime) -> Result<(), StoreError> {
        // Stale slots are detected by tag mismatch; nothing to expire.
        Ok(())
    }

    fn get(&self, key: &str, _now: SystemTime) -> Result<Option<i64>, StoreError> {
        let tag = Self::bucket_tag(key)?;
        let slots = self.slots.lock();
        let slot = slots[self.position(tag, slots.len())];
        Ok((slot.tag == tag).then_some(slot.count))
    }

    fn multi_get(
        &self,
        keys: &[String],
        _now: SystemTime,
    ) -> Result<Vec<Option<i64>>, StoreError> {
        let slots = self.slots.lock();
        keys.iter()
            .map(|key| {
                let tag = Self::bucket_tag(key)?;
                let slot = slots[self.position(tag, slots.len())];
                Ok((slot.tag == tag).then_some(slot.count))
            })
            .collect()
    }

    fn set(&self, _key: &str, _value: i64, _now: SystemTime) -> Result<(), StoreError> {
        Err(StoreError::Unsupported(
            "version persistence requires a shared backend",
        ))
    }
}
