// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Singly linked lists of slab headers.
//!
//! The allocation hot path only ever touches the head of a list, so singly
//! linked heads are enough; `detach` pays a linear scan instead of doubling
//! the per-slab link overhead. List lengths stay small in practice - they
//! are bounded by live slab count, not block count.

use std::ptr;

use crate::slab::SlabHeader;

pub(crate) struct SlabList {
    head: *mut SlabHeader,
    len: usize,
}

impl SlabList {
    pub const fn new() -> SlabList {
        SlabList {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Head of the list; null when empty.
    pub fn front(&self) -> *mut SlabHeader {
        self.head
    }

    /// Pushes `slab` onto the head of the list.
    ///
    /// # Safety
    ///
    /// `slab` must be a live header that is on no list.
    pub unsafe fn push(&mut self, slab: *mut SlabHeader) {
        debug_assert!(!slab.is_null());
        debug_assert!((*slab).next.is_null());
        (*slab).next = self.head;
        self.head = slab;
        self.len += 1;
    }

    /// Pops the head of the list, if any.
    ///
    /// # Safety
    ///
    /// Every header on the list must be live.
    pub unsafe fn pop(&mut self) -> Option<*mut SlabHeader> {
        if self.head.is_null() {
            return None;
        }
        let slab = self.head;
        self.head = (*slab).next;
        (*slab).next = ptr::null_mut();
        self.len -= 1;
        Some(slab)
    }

    /// Unlinks `slab` wherever it sits in the list. Linear in list length.
    ///
    /// # Safety
    ///
    /// Every header on the list must be live, and `slab` must be on this
    /// list - a miss means the occupancy bookkeeping is corrupt and is fatal.
    pub unsafe fn detach(&mut self, slab: *mut SlabHeader) {
        let mut link = &mut self.head as *mut *mut SlabHeader;
        loop {
            let cur = *link;
            assert!(!cur.is_null(), "slab {slab:p} not on its expected list");
            if cur == slab {
                *link = (*cur).next;
                (*cur).next = ptr::null_mut();
                self.len -= 1;
                return;
            }
            link = ptr::addr_of_mut!((*cur).next);
        }
    }

    /// Iterates the headers front to back.
    ///
    /// # Safety
    ///
    /// Every header on the list must stay live (and unmodified) while the
    /// iterator is in use.
    pub unsafe fn iter(&self) -> Iter {
        Iter { cur: self.head }
    }
}

pub(crate) struct Iter {
    cur: *mut SlabHeader,
}

impl Iterator for Iter {
    type Item = *mut SlabHeader;

    fn next(&mut self) -> Option<*mut SlabHeader> {
        if self.cur.is_null() {
            return None;
        }
        let slab = self.cur;
        self.cur = unsafe { (*slab).next };
        Some(slab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> *mut SlabHeader {
        Box::into_raw(Box::new(SlabHeader {
            next: ptr::null_mut(),
            head: ptr::null_mut(),
            free_count: 0,
        }))
    }

    fn free_header(slab: *mut SlabHeader) {
        unsafe {
            drop(Box::from_raw(slab));
        }
    }

    unsafe fn collect(list: &SlabList) -> Vec<*mut SlabHeader> {
        list.iter().collect()
    }

    #[test]
    fn push_pop_is_lifo() {
        let (a, b, c) = (header(), header(), header());
        let mut list = SlabList::new();
        unsafe {
            list.push(a);
            list.push(b);
            list.push(c);
            assert_eq!(list.len(), 3);
            assert_eq!(list.front(), c);
            assert_eq!(list.pop(), Some(c));
            assert_eq!(list.pop(), Some(b));
            assert_eq!(list.pop(), Some(a));
            assert_eq!(list.pop(), None);
            assert!(list.is_empty());
        }
        free_header(a);
        free_header(b);
        free_header(c);
    }

    #[test]
    fn detach_at_any_position() {
        let (a, b, c) = (header(), header(), header());
        let mut list = SlabList::new();
        unsafe {
            list.push(c);
            list.push(b);
            list.push(a);

            list.detach(b);
            assert_eq!(collect(&list), vec![a, c]);

            list.detach(a);
            assert_eq!(collect(&list), vec![c]);

            list.detach(c);
            assert!(list.is_empty());
            assert_eq!(list.len(), 0);
        }
        free_header(a);
        free_header(b);
        free_header(c);
    }

    #[test]
    #[should_panic(expected = "not on its expected list")]
    fn detach_missing_is_fatal() {
        let (a, b) = (header(), header());
        let mut list = SlabList::new();
        unsafe {
            list.push(a);
            list.detach(b);
        }
    }
}
