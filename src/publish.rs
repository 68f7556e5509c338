//! Tree publication and safepoint-deferred reclamation.
//!
//! Evaluation is lock-free: a built tree is immutable, so any number of
//! threads may walk it with no synchronization. What needs care is
//! replacement. A regenerated tree is built completely in isolation and
//! then swapped in through the call site's single [`GuardSlot`]; readers
//! see either the old tree or the new one, never a partially-built one.
//!
//! The outgoing tree cannot be freed at swap time — another thread may
//! still be mid-traversal. It is pushed onto a [`SafepointQueue`] instead
//! and freed when the VM next brings all mutator threads to a safepoint,
//! at which point no evaluator can be inside a retired tree.
//!
//! ```text
//!   planner thread                         mutator threads
//!   regenerate() ──► GuardSlot::publish()      load() ──► run()
//!                       │ swap (release)          (acquire)
//!                       ▼
//!                  SafepointQueue ── drain at safepoint ──► freed
//! ```

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::node::GuardTree;

/// The single point of reference for one call site's current guard tree.
#[derive(Debug)]
pub struct GuardSlot {
    current: AtomicPtr<GuardTree>,
}

impl GuardSlot {
    /// A slot with no tree; evaluations report no match.
    pub const fn new() -> Self {
        GuardSlot {
            current: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The current tree, if any.
    ///
    /// The reference is valid until the next safepoint drain; callers are
    /// evaluators that complete their walk well before then (a walk is
    /// bounded by tree depth and never blocks).
    #[inline]
    pub fn load(&self) -> Option<&GuardTree> {
        let ptr = self.current.load(Ordering::Acquire);
        // SAFETY: a non-null pointer was published by `publish`/`discard`
        // and stays allocated until a safepoint drain, which the VM only
        // runs once no evaluator can hold this reference.
        unsafe { ptr.as_ref() }
    }

    /// Atomically install `tree`, retiring any previous tree onto `queue`
    /// for reclamation at the next safepoint.
    pub fn publish(&self, tree: GuardTree, queue: &SafepointQueue) {
        let used = tree.used_nodes();
        let new = Box::into_raw(Box::new(tree));
        let old = self.current.swap(new, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: `old` came from Box::into_raw in a previous publish
            // and ownership transfers to the queue.
            queue.retire(unsafe { Box::from_raw(old) }, true);
        }
        debug!(used_nodes = used, "published new guard tree");
    }

    /// Drop the current tree (if any), retiring it for safepoint-deferred
    /// reclamation. Used when a frame's specializations are invalidated
    /// wholesale.
    pub fn discard(&self, queue: &SafepointQueue) {
        let old = self.current.swap(ptr::null_mut(), Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: as in `publish`.
            queue.retire(unsafe { Box::from_raw(old) }, true);
        }
    }
}

impl Default for GuardSlot {
    fn default() -> Self {
        GuardSlot::new()
    }
}

impl Drop for GuardSlot {
    fn drop(&mut self) {
        let ptr = *self.current.get_mut();
        if !ptr.is_null() {
            // SAFETY: owning the slot exclusively means no reader holds a
            // reference; free immediately.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

// SAFETY: the slot hands out shared references to an immutable tree and
// all pointer updates go through atomic swaps.
unsafe impl Send for GuardSlot {}
unsafe impl Sync for GuardSlot {}

/// Trees awaiting reclamation at the next safepoint.
#[derive(Debug, Default)]
pub struct SafepointQueue {
    retired: Mutex<Vec<Box<GuardTree>>>,
}

impl SafepointQueue {
    pub fn new() -> Self {
        SafepointQueue::default()
    }

    /// Retire a tree. With `deferred` the tree is held until the next
    /// [`SafepointQueue::drain`]; otherwise it is freed immediately (only
    /// sound when the caller knows no evaluator can be walking it, e.g.
    /// during single-threaded teardown).
    pub fn retire(&self, tree: Box<GuardTree>, deferred: bool) {
        if deferred {
            trace!(used_nodes = tree.used_nodes(), "retired guard tree");
            self.retired.lock().push(tree);
        } else {
            drop(tree);
        }
    }

    /// Number of trees awaiting reclamation.
    pub fn pending(&self) -> usize {
        self.retired.lock().len()
    }

    /// Free every retired tree.
    ///
    /// # Safety
    ///
    /// Callable only while all mutator threads are stopped at a safepoint
    /// (or otherwise provably outside any guard evaluation): references
    /// obtained from [`GuardSlot::load`] before the corresponding publish
    /// must no longer be live.
    pub unsafe fn drain(&self) {
        let retired = {
            let mut queue = self.retired.lock();
            std::mem::take(&mut *queue)
        };
        if !retired.is_empty() {
            debug!(count = retired.len(), "reclaimed retired guard trees");
        }
    }
}
