use crate::{DecodeError, DispatchError, DispatchStats, FrameHandler};
use can_transport::{BusSelector, CanFrame, CanId, IdType};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace, warn};

struct Entry {
    id_type: IdType,
    id: u32,
    mask: u32,
    /// Address of the registered handler; identity for `remove_by_context`.
    key: usize,
    handler: Weak<dyn FrameHandler>,
}

impl Entry {
    fn matches(&self, id: CanId) -> bool {
        self.id_type == id.id_type() && self.id == id.raw() & self.mask
    }

    fn info(&self) -> EntryInfo {
        EntryInfo {
            id_type: self.id_type,
            id: self.id,
            mask: self.mask,
            live: self.handler.strong_count() > 0,
        }
    }
}

/// Read-only view of a registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub id_type: IdType,
    pub id: u32,
    pub mask: u32,
    /// False once the device behind the entry has been dropped.
    pub live: bool,
}

/// What happened to one received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// No entry matched; the frame was dropped.
    Unmatched,
    /// The matching handler rejected the payload.
    Malformed(DecodeError),
    /// The matching entry outlived its device and was pruned.
    Stale,
}

/// One dispatch list per physical bus.
///
/// Entries hold a non-owning reference to their device: the application keeps
/// the `Arc`, and must remove the entry (usually through the driver's `deinit`)
/// before dropping it. An entry whose device is gone is pruned at the next
/// frame that hits it.
///
/// Lookup is a linear scan, newest entry first, and at most one handler runs
/// per frame. The list lock is held only for the scan; the handler is invoked
/// after the lock is released on a strong reference, so removal cannot free a
/// device mid-callback.
pub struct BusRegistry {
    lists: [Mutex<Vec<Entry>>; 2],
    stats: DispatchStats,
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BusRegistry {
    pub fn new() -> Self {
        Self {
            lists: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            stats: DispatchStats::default(),
        }
    }

    /// Register `handler` for frames whose `id & mask == id`.
    ///
    /// Rejects an exact `(id_type, id)` duplicate on the same bus. Entries whose
    /// masked ranges merely overlap are accepted with a warning; the newer one
    /// receives the overlapping traffic.
    pub fn add<H>(
        &self,
        bus: BusSelector,
        id_type: IdType,
        id: u32,
        mask: u32,
        handler: &Arc<H>,
    ) -> Result<(), DispatchError>
    where
        H: FrameHandler + 'static,
    {
        if CanId::new(id_type, id).is_none() {
            return Err(DispatchError::InvalidId { id_type, id });
        }
        let mut list = self.list(bus);
        if list.iter().any(|e| e.id_type == id_type && e.id == id) {
            return Err(DispatchError::IdConflict { bus, id_type, id });
        }
        for other in list
            .iter()
            .filter(|e| e.id_type == id_type && ranges_overlap(e.id, e.mask, id, mask))
        {
            warn!(
                %bus,
                new_id = id,
                new_mask = mask,
                existing_id = other.id,
                existing_mask = other.mask,
                "masked id ranges overlap; newest entry wins"
            );
        }
        list.try_reserve(1)
            .map_err(|_| DispatchError::AllocFailure { bus })?;
        let weak: Weak<H> = Arc::downgrade(handler);
        let weak: Weak<dyn FrameHandler> = weak;
        list.push(Entry {
            id_type,
            id,
            mask,
            key: context_key(handler),
            handler: weak,
        });
        debug!(%bus, ?id_type, id, mask, entries = list.len(), "dispatch entry added");
        Ok(())
    }

    /// Remove the entry registered for `handler` (pointer identity).
    pub fn remove_by_context<H: ?Sized>(
        &self,
        bus: BusSelector,
        handler: &Arc<H>,
    ) -> Result<(), DispatchError> {
        let key = context_key(handler);
        self.remove_where(bus, |e| e.key == key)
    }

    /// Remove the entry with exactly this `(id_type, id)`.
    pub fn remove_by_id(
        &self,
        bus: BusSelector,
        id_type: IdType,
        id: u32,
    ) -> Result<(), DispatchError> {
        self.remove_where(bus, |e| e.id_type == id_type && e.id == id)
    }

    /// Exact lookup, mask not applied.
    pub fn find_by_id(&self, bus: BusSelector, id_type: IdType, id: u32) -> Option<EntryInfo> {
        self.list(bus)
            .iter()
            .find(|e| e.id_type == id_type && e.id == id)
            .map(Entry::info)
    }

    /// Re-key the entry registered for `handler`.
    pub fn change_id<H: ?Sized>(
        &self,
        bus: BusSelector,
        handler: &Arc<H>,
        new_id: u32,
        new_mask: u32,
    ) -> Result<(), DispatchError> {
        let key = context_key(handler);
        let mut list = self.list(bus);
        let pos = list
            .iter()
            .position(|e| e.key == key)
            .ok_or(DispatchError::NotFound { bus })?;
        let id_type = list[pos].id_type;
        if CanId::new(id_type, new_id).is_none() {
            return Err(DispatchError::InvalidId {
                id_type,
                id: new_id,
            });
        }
        if list
            .iter()
            .any(|e| e.key != key && e.id_type == id_type && e.id == new_id)
        {
            return Err(DispatchError::IdConflict {
                bus,
                id_type,
                id: new_id,
            });
        }
        let entry = &mut list[pos];
        entry.id = new_id;
        entry.mask = new_mask;
        Ok(())
    }

    pub fn len(&self, bus: BusSelector) -> usize {
        self.list(bus).len()
    }

    pub fn is_empty(&self, bus: BusSelector) -> bool {
        self.list(bus).is_empty()
    }

    pub fn entries(&self, bus: BusSelector) -> Vec<EntryInfo> {
        self.list(bus).iter().rev().map(Entry::info).collect()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Route one received frame to the first matching entry on `bus`.
    pub fn dispatch(&self, bus: BusSelector, frame: &CanFrame) -> DispatchOutcome {
        let handler = {
            let mut list = self.list(bus);
            let Some(pos) = list.iter().rposition(|e| e.matches(frame.id)) else {
                self.stats.unmatched();
                trace!(%bus, id = %frame.id, "no dispatch entry");
                return DispatchOutcome::Unmatched;
            };
            match list[pos].handler.upgrade() {
                Some(handler) => handler,
                None => {
                    let stale = list.remove(pos);
                    self.stats.stale();
                    warn!(
                        %bus,
                        id = stale.id,
                        "device dropped without removing its dispatch entry; pruned"
                    );
                    return DispatchOutcome::Stale;
                }
            }
        };

        match handler.on_frame(frame) {
            Ok(()) => {
                self.stats.delivered();
                DispatchOutcome::Delivered
            }
            Err(err) => {
                self.stats.malformed();
                debug!(%bus, id = %frame.id, error = %err, "frame dropped");
                DispatchOutcome::Malformed(err)
            }
        }
    }

    fn remove_where(
        &self,
        bus: BusSelector,
        pred: impl Fn(&Entry) -> bool,
    ) -> Result<(), DispatchError> {
        let mut list = self.list(bus);
        let pos = list
            .iter()
            .rposition(|e| pred(e))
            .ok_or(DispatchError::NotFound { bus })?;
        let removed = list.remove(pos);
        debug!(%bus, id = removed.id, entries = list.len(), "dispatch entry removed");
        Ok(())
    }

    fn list(&self, bus: BusSelector) -> MutexGuard<'_, Vec<Entry>> {
        self.lists[bus.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

fn context_key<H: ?Sized>(handler: &Arc<H>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

/// True when some id satisfies both `x & m1 == id1` and `x & m2 == id2`.
fn ranges_overlap(id1: u32, m1: u32, id2: u32, m2: u32) -> bool {
    id1 & !m1 == 0 && id2 & !m2 == 0 && (id1 ^ id2) & m1 & m2 == 0
}
