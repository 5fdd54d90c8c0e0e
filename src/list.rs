//! Intrusive doubly-linked list used as the monitor's source registry.
//!
//! Ground truth: `librs/include/rs_node.h` (`examples/original_source/`). The
//! C version embeds a `struct rs_node { next, prev }` inside every payload and
//! recovers the payload from a node pointer with `container_of`. Rust has no
//! stable, dependency-free `container_of` for an MSRV this low, so instead
//! each node *is* the payload's link field and the list is generic over the
//! payload type `T`, which must expose its embedded [`Link`] through the
//! [`Linked`] trait. The list never allocates and never owns its elements:
//! exactly as in the C original, removing a node does not free or move the
//! payload, and the caller is responsible for keeping the payload's address
//! stable for as long as it is linked.

use std::ptr::NonNull;

/// Embedded link field. A type that wants to live in a [`List`] holds one of
/// these and implements [`Linked`] to expose it.
#[derive(Debug)]
pub struct Link<T: ?Sized> {
    next: Option<NonNull<T>>,
    prev: Option<NonNull<T>>,
}

impl<T: ?Sized> Link<T> {
    pub const fn new() -> Link<T> {
        Link {
            next: None,
            prev: None,
        }
    }
}

impl<T: ?Sized> Default for Link<T> {
    fn default() -> Self {
        Link::new()
    }
}

/// Implemented by payload types embedded in a [`List`].
///
/// Unsized implementors are expected: the monitor's registry is a
/// `List<dyn Source>`, so this trait cannot require `Self: Sized` the way a
/// single-concrete-type list could.
///
/// # Safety
///
/// Implementors must return a reference to the *same* [`Link`] instance for
/// the lifetime of the value (no moving the link out, no swapping it for a
/// different one), since the list recovers neighbours by following raw
/// pointers stored in it.
pub unsafe trait Linked {
    fn link(&self) -> &Link<Self>;
    fn link_mut(&mut self) -> &mut Link<Self>;
}

/// Matching callback used by [`List::find_by_predicate`] and
/// [`List::remove_by_predicate`]. Returns `true` on a match, mirroring
/// `rs_node_match_cb_t`'s "1 if the node matches" contract.
pub type MatchFn<T> = dyn Fn(&T) -> bool;

/// An intrusive, non-owning doubly-linked list of `T`.
///
/// `List` only ever stores a head pointer; like `rs_node_head`, any node of
/// the list can be used as an anchor to recover the rest with [`next`]/[`prev`]
/// without going through a `List` at all. The `List` type itself is a
/// convenience for callers that do want head-relative operations.
///
/// [`next`]: List::next
/// [`prev`]: List::prev
#[derive(Debug)]
pub struct List<T: Linked + ?Sized> {
    head: Option<NonNull<T>>,
}

impl<T: Linked + ?Sized> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T: Linked + ?Sized> List<T> {
    pub const fn new() -> List<T> {
        List { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the head of the list containing `node`, walking backwards.
    /// Mirrors `rs_node_head`.
    ///
    /// # Safety
    /// `node` must point to a valid, currently-linked (or standalone) `T`.
    pub unsafe fn head_of(node: NonNull<T>) -> NonNull<T> {
        let mut cur = node;
        while let Some(prev) = (*cur.as_ptr()).link().prev {
            cur = prev;
        }
        cur
    }

    /// Pushes `node` to the front of the list.
    pub fn push(&mut self, mut node: NonNull<T>) {
        unsafe {
            debug_assert!(
                (*node.as_ptr()).link().next.is_none() && (*node.as_ptr()).link().prev.is_none(),
                "double-insertion of a node already linked"
            );
            node.as_mut().link_mut().prev = None;
            node.as_mut().link_mut().next = self.head;
            if let Some(mut head) = self.head {
                head.as_mut().link_mut().prev = Some(node);
            }
            self.head = Some(node);
        }
    }

    /// Pops the front node, if any.
    pub fn pop(&mut self) -> Option<NonNull<T>> {
        let head = self.head?;
        unsafe {
            let next = (*head.as_ptr()).link().next;
            if let Some(mut next) = next {
                next.as_mut().link_mut().prev = None;
            }
            self.head = next;
            let mut head_mut = head;
            head_mut.as_mut().link_mut().next = None;
            head_mut.as_mut().link_mut().prev = None;
        }
        Some(head)
    }

    /// Inserts `node` immediately before `next`.
    ///
    /// # Safety
    /// `next` must point to a currently valid `T` (possibly linked).
    pub unsafe fn insert_before(next: NonNull<T>, mut node: NonNull<T>) {
        let prev = (*next.as_ptr()).link().prev;
        node.as_mut().link_mut().next = Some(next);
        node.as_mut().link_mut().prev = prev;
        if let Some(mut prev) = prev {
            prev.as_mut().link_mut().next = Some(node);
        }
        (*next.as_ptr()).link_mut().prev = Some(node);
    }

    /// Forward-only count, starting at `node`. As in `rs_node_count`, this is
    /// **not** necessarily the full list length unless `node` is the head;
    /// passing a mid-list anchor is legal but the caller must document that
    /// intent, since truncated counts are easy to mistake for a bug.
    pub fn count_from(node: NonNull<T>) -> usize {
        let mut n = 0;
        let mut cur = Some(node);
        while let Some(c) = cur {
            n += 1;
            cur = unsafe { (*c.as_ptr()).link().next };
        }
        n
    }

    pub fn next(node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { (*node.as_ptr()).link().next }
    }

    pub fn prev(node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { (*node.as_ptr()).link().prev }
    }

    /// Finds `target` by address, searching forward from `start`.
    pub fn find_by_address(start: NonNull<T>, target: NonNull<T>) -> Option<NonNull<T>> {
        let mut cur = Some(start);
        while let Some(c) = cur {
            if c == target {
                return Some(c);
            }
            cur = unsafe { (*c.as_ptr()).link().next };
        }
        None
    }

    /// Finds the first node matching `pred`, searching forward from `start`.
    pub fn find_by_predicate(start: NonNull<T>, pred: &MatchFn<T>) -> Option<NonNull<T>> {
        let mut cur = Some(start);
        while let Some(c) = cur {
            if pred(unsafe { c.as_ref() }) {
                return Some(c);
            }
            cur = unsafe { (*c.as_ptr()).link().next };
        }
        None
    }

    /// Unlinks `target` from whatever list it's in, searching forward from
    /// `anchor` to find it. Does not touch `self.head`: if `target` was this
    /// list's head, the caller must update `self.head` (see
    /// [`List::remove`]).
    pub fn remove_by_address(anchor: NonNull<T>, target: NonNull<T>) -> Option<NonNull<T>> {
        let found = Self::find_by_address(anchor, target)?;
        Self::unlink(found);
        Some(found)
    }

    pub fn remove_by_predicate(anchor: NonNull<T>, pred: &MatchFn<T>) -> Option<NonNull<T>> {
        let found = Self::find_by_predicate(anchor, pred)?;
        Self::unlink(found);
        Some(found)
    }

    fn unlink(mut node: NonNull<T>) {
        unsafe {
            let link = node.as_mut().link_mut();
            let (prev, next) = (link.prev.take(), link.next.take());
            if let Some(mut prev) = prev {
                prev.as_mut().link_mut().next = next;
            }
            if let Some(mut next) = next {
                next.as_mut().link_mut().prev = prev;
            }
        }
    }

    /// Removes `node` from this list, fixing up `head` if needed.
    pub fn remove(&mut self, node: NonNull<T>) {
        if self.head == Some(node) {
            self.head = unsafe { (*node.as_ptr()).link().next };
        }
        Self::unlink(node);
    }

    /// Applies `cb` to every node starting at the head, stopping (and
    /// returning) at the first non-zero return, as `rs_node_foreach` does.
    pub fn foreach<E>(&self, mut cb: impl FnMut(NonNull<T>) -> Result<(), E>) -> Result<(), E> {
        let mut cur = self.head;
        while let Some(c) = cur {
            let next = unsafe { (*c.as_ptr()).link().next };
            cb(c)?;
            cur = next;
        }
        Ok(())
    }

    pub fn head(&self) -> Option<NonNull<T>> {
        self.head
    }

    pub fn len(&self) -> usize {
        match self.head {
            Some(h) => Self::count_from(h),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item {
        id: u32,
        link: Link<Item>,
    }

    impl Item {
        fn new(id: u32) -> Box<Item> {
            Box::new(Item {
                id,
                link: Link::new(),
            })
        }
    }

    unsafe impl Linked for Item {
        fn link(&self) -> &Link<Self> {
            &self.link
        }
        fn link_mut(&mut self) -> &mut Link<Self> {
            &mut self.link
        }
    }

    fn ptr(b: &mut Box<Item>) -> NonNull<Item> {
        NonNull::from(b.as_mut())
    }

    #[test]
    fn push_pop_count_roundtrip() {
        let mut a = Item::new(1);
        let mut b = Item::new(2);
        let mut c = Item::new(3);
        let (pa, pb, pc) = (ptr(&mut a), ptr(&mut b), ptr(&mut c));

        let mut list = List::new();
        assert!(list.is_empty());
        list.push(pa);
        list.push(pb);
        list.push(pc);
        assert_eq!(list.len(), 3);

        // push puts at front, so order is c, b, a
        let head = list.head().unwrap();
        assert_eq!(unsafe { head.as_ref() }.id, 3);
        assert_eq!(List::count_from(head), 3);

        let popped = list.pop().unwrap();
        assert_eq!(unsafe { popped.as_ref() }.id, 3);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn remove_by_address_and_prev_chain() {
        let mut a = Item::new(1);
        let mut b = Item::new(2);
        let mut c = Item::new(3);
        let (pa, pb, pc) = (ptr(&mut a), ptr(&mut b), ptr(&mut c));

        let mut list = List::new();
        list.push(pa);
        list.push(pb);
        list.push(pc);

        list.remove(pb);
        assert_eq!(list.len(), 2);

        let head = list.head().unwrap();
        assert_eq!(unsafe { head.as_ref() }.id, 3);
        let tail = List::next(head).unwrap();
        assert_eq!(unsafe { tail.as_ref() }.id, 1);
        // walking backward from the tail reaches the head
        assert_eq!(List::prev(tail), Some(head));
    }

    #[test]
    fn find_and_remove_by_predicate() {
        let mut a = Item::new(10);
        let mut b = Item::new(20);
        let (pa, pb) = (ptr(&mut a), ptr(&mut b));

        let mut list = List::new();
        list.push(pa);
        list.push(pb);

        let head = list.head().unwrap();
        let found = List::find_by_predicate(head, &|item: &Item| item.id == 10).unwrap();
        assert_eq!(unsafe { found.as_ref() }.id, 10);

        let removed = List::remove_by_predicate(head, &|item: &Item| item.id == 20);
        assert!(removed.is_some());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn foreach_stops_on_first_error() {
        let mut a = Item::new(1);
        let mut b = Item::new(2);
        let mut c = Item::new(3);
        let (pa, pb, pc) = (ptr(&mut a), ptr(&mut b), ptr(&mut c));

        let mut list = List::new();
        list.push(pa);
        list.push(pb);
        list.push(pc);

        let mut visited = Vec::new();
        let result: Result<(), &'static str> = list.foreach(|node| {
            let id = unsafe { node.as_ref() }.id;
            visited.push(id);
            if id == 2 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(visited, vec![3, 2]);
    }
}
