//! Lock-free versioned singly-linked list.
//!
//! Each bucket of the table is one `VersionedChain`: a list of
//! `(version, payload)` nodes kept in descending version order from the head,
//! so the first node at or below a snapshot version is the value visible to
//! that snapshot.
//!
//! # Tombstones
//!
//! A node is logically deleted by setting the low bit of its own `next`
//! pointer. A marked `next` can no longer be swung by any CAS (every CAS
//! expects an unmarked value), which freezes the node's successor while it is
//! being physically unlinked. Only the thread whose unlink CAS succeeds
//! retires the node.
//!
//! # Memory reclamation
//!
//! Nodes are `#[repr(C)]` with `RetiredNode` at offset 0 and are handed to
//! `kovan::retire` once unlinked. Every traversal holds a `kovan::Guard`.

use core::sync::atomic::Ordering;
use crossbeam_utils::Backoff;
use kovan::{Atomic, Guard, RetiredNode, Shared, pin, retire};

/// Low pointer bit marking the owning node as tombstoned.
/// Nodes are at least 8-byte aligned (`RetiredNode` is `align(8)`).
const TOMBSTONE: usize = 1;

#[inline]
fn is_marked<T>(ptr: Shared<'_, T>) -> bool {
    ptr.as_raw().addr() & TOMBSTONE != 0
}

#[inline]
fn with_mark<'g, T>(ptr: Shared<'g, T>) -> Shared<'g, T> {
    // SAFETY: only the tag bit changes; the address is never dereferenced
    // before `without_mark` strips it again.
    unsafe { Shared::from_raw(ptr.as_raw().map_addr(|a| a | TOMBSTONE)) }
}

#[inline]
fn without_mark<'g, T>(ptr: Shared<'g, T>) -> Shared<'g, T> {
    // SAFETY: clearing the tag bit restores the original node address.
    unsafe { Shared::from_raw(ptr.as_raw().map_addr(|a| a & !TOMBSTONE)) }
}

/// One version of a bucket.
#[repr(C)]
struct Node<T> {
    /// Must be the first field (kovan casts `*mut Node` to `*mut RetiredNode`).
    retired: RetiredNode,
    version: u64,
    payload: T,
    /// Successor, low bit set once this node is tombstoned.
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(version: u64, payload: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            retired: RetiredNode::new(),
            version,
            payload,
            next: Atomic::null(),
        }))
    }

    #[inline]
    fn is_deleted(&self, guard: &Guard) -> bool {
        is_marked(self.next.load(Ordering::Acquire, guard))
    }

    #[inline]
    fn successor<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        without_mark(self.next.load(Ordering::Acquire, guard))
    }
}

/// A handle to a linked node, valid while both the guard it was obtained
/// under and the chain it came from are alive.
pub struct NodeRef<'g, T> {
    node: &'g Node<T>,
    guard: &'g Guard,
}

impl<'g, T> NodeRef<'g, T> {
    /// Transaction id that created this node.
    pub fn version(&self) -> u64 {
        self.node.version
    }

    /// Whether the node has been tombstoned since it was linked.
    pub fn is_deleted(&self) -> bool {
        self.node.is_deleted(self.guard)
    }

    pub fn payload(&self) -> &'g T {
        &self.node.payload
    }
}

/// Lock-free list of versions, newest first.
///
/// Methods that hand out borrowed payloads take the caller's guard and borrow
/// the chain for as long as that guard; the rest pin internally.
///
/// References cannot outlive the chain:
///
/// ```compile_fail
/// use kovan_mvtable::{VersionedChain, pin};
///
/// let guard = pin();
/// let payload = {
///     let chain = VersionedChain::new();
///     chain.insert(1, String::from("v1"), &guard);
///     chain.head(&guard)
/// };
/// println!("{:?}", payload);
/// ```
pub struct VersionedChain<T: 'static> {
    head: Atomic<Node<T>>,
}

impl<T: Send + Sync + 'static> VersionedChain<T> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    /// Links a new node for `version` in descending version order.
    ///
    /// A node whose version is at least the head's becomes the new head;
    /// otherwise it is spliced in before the first successor whose version is
    /// not greater than its own. Among equal versions the most recently
    /// linked node comes first.
    /// Whenever the splice point touches a tombstoned node, or a CAS loses a
    /// race, the walk restarts from the head after backing off.
    pub fn insert<'g>(&'g self, version: u64, payload: T, guard: &'g Guard) -> NodeRef<'g, T> {
        let new_ptr = Node::alloc(version, payload);
        // SAFETY: freshly allocated, unpublished until one of the CASes below wins.
        let new_node = unsafe { &*new_ptr };
        let new_shared = unsafe { Shared::from_raw(new_ptr) };
        let backoff = Backoff::new();

        'retry: loop {
            let head = self.head.load(Ordering::Acquire, guard);

            let head_node = match unsafe { head.as_ref() } {
                Some(node) if version < node.version => node,
                _ => {
                    new_node.next.store(head, Ordering::Relaxed);
                    match self.head.compare_exchange(
                        head,
                        new_shared,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            return NodeRef {
                                node: new_node,
                                guard,
                            };
                        }
                        Err(_) => {
                            backoff.snooze();
                            continue 'retry;
                        }
                    }
                }
            };

            let mut cursor = head_node;
            loop {
                let next = cursor.next.load(Ordering::Acquire, guard);
                if is_marked(next) {
                    // Cursor is being unlinked; anything spliced after it would be lost.
                    backoff.snooze();
                    continue 'retry;
                }

                match unsafe { next.as_ref() } {
                    Some(succ) if version < succ.version => {
                        cursor = succ;
                    }
                    succ => {
                        if succ.is_some_and(|s| s.is_deleted(guard)) {
                            backoff.snooze();
                            continue 'retry;
                        }

                        new_node.next.store(next, Ordering::Relaxed);
                        match cursor.next.compare_exchange(
                            next,
                            new_shared,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            guard,
                        ) {
                            Ok(_) => {
                                return NodeRef {
                                    node: new_node,
                                    guard,
                                };
                            }
                            Err(_) => {
                                backoff.snooze();
                                continue 'retry;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Removes one node tagged with `version`.
    ///
    /// The first live node with that version is tombstoned by CAS on its
    /// `next` pointer, then unlinked from its predecessor (or the head).
    /// Returns once the node is no longer reachable. A version that is not
    /// present is a no-op. Nothing borrowed is returned, so the guard is
    /// pinned here.
    pub fn delete(&self, version: u64) {
        let guard = pin();
        let backoff = Backoff::new();

        loop {
            let Some(node) = self.find_live(version, &guard) else {
                return;
            };

            let next = node.next.load(Ordering::Acquire, &guard);
            if is_marked(next) {
                backoff.snooze();
                continue;
            }

            if node
                .next
                .compare_exchange(
                    next,
                    with_mark(next),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_ok()
            {
                break;
            }
            backoff.snooze();
        }

        self.unlink_tombstones(&guard);
    }

    /// First non-tombstoned node carrying exactly `version`.
    fn find_live<'g>(&self, version: u64, guard: &'g Guard) -> Option<&'g Node<T>> {
        let mut current = self.head.load(Ordering::Acquire, guard);
        while let Some(node) = unsafe { current.as_ref() } {
            let next = node.next.load(Ordering::Acquire, guard);
            if node.version == version && !is_marked(next) {
                return Some(node);
            }
            current = without_mark(next);
        }
        None
    }

    /// Physically unlinks every tombstoned node reachable from the head.
    ///
    /// Returns after one full pass in which no unlink CAS failed, so every
    /// node tombstoned before the call is unreachable afterwards.
    fn unlink_tombstones(&self, guard: &Guard) {
        let backoff = Backoff::new();

        'retry: loop {
            let mut link = &self.head;
            let mut current = link.load(Ordering::Acquire, guard);

            while let Some(node) = unsafe { current.as_ref() } {
                let next = node.next.load(Ordering::Acquire, guard);

                if is_marked(next) {
                    let succ = without_mark(next);
                    match link.compare_exchange(
                        current,
                        succ,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            // SAFETY: unlinked by this CAS and by no other thread;
                            // RetiredNode is at offset 0 of the `repr(C)` node.
                            unsafe { retire(current.as_raw()) };
                            current = succ;
                        }
                        Err(_) => {
                            // Predecessor changed or is itself tombstoned.
                            backoff.snooze();
                            continue 'retry;
                        }
                    }
                } else {
                    link = &node.next;
                    current = next;
                }
            }

            return;
        }
    }

    /// Payload of the most recently linked head node, without version filtering.
    pub fn head<'g>(&'g self, guard: &'g Guard) -> Option<&'g T> {
        let head = self.head.load(Ordering::Acquire, guard);
        unsafe { head.as_ref() }.map(|node| &node.payload)
    }

    /// Payload of the first node whose version is `<= v`.
    ///
    /// Tombstoned nodes are not skipped; callers that tombstone only
    /// uncommitted versions never see one below their snapshot.
    pub fn latest_version<'g>(&'g self, v: u64, guard: &'g Guard) -> Option<&'g T> {
        let mut current = self.head.load(Ordering::Acquire, guard);
        while let Some(node) = unsafe { current.as_ref() } {
            if node.version <= v {
                return Some(&node.payload);
            }
            current = node.successor(guard);
        }
        None
    }

    /// Versions of all live nodes, head to tail. Diagnostic only.
    pub fn snapshot(&self) -> Vec<u64> {
        let guard = pin();
        let mut versions = Vec::new();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            let next = node.next.load(Ordering::Acquire, &guard);
            if !is_marked(next) {
                versions.push(node.version);
            }
            current = without_mark(next);
        }
        versions
    }

    /// Number of live (non-tombstoned) nodes. O(n).
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no live node is linked, matching `len() == 0`.
    pub fn is_empty(&self) -> bool {
        let guard = pin();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            let next = node.next.load(Ordering::Acquire, &guard);
            if !is_marked(next) {
                return false;
            }
            current = without_mark(next);
        }
        true
    }
}

impl<T: Send + Sync + 'static> Default for VersionedChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: all shared mutation goes through atomics; payloads are only read.
unsafe impl<T: Send + Sync> Send for VersionedChain<T> {}
unsafe impl<T: Send + Sync> Sync for VersionedChain<T> {}

impl<T: 'static> Drop for VersionedChain<T> {
    fn drop(&mut self) {
        let guard = pin();
        let mut current = self.head.load(Ordering::Acquire, &guard);

        unsafe {
            while !current.is_null() {
                let node = current.deref();
                let next = without_mark(node.next.load(Ordering::Relaxed, &guard));
                // Still linked, so never retired.
                drop(Box::from_raw(current.as_raw()));
                current = next;
            }
        }
    }
}
