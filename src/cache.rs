// Copyright 2017-2018 the authors. See the 'Copyright and license' section of the
// README.md file at the top-level directory of this repository.
//
// Licensed under the Apache License, Version 2.0 (the LICENSE-APACHE file) or
// the MIT license (the LICENSE-MIT file) at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cache state and the three-list occupancy discipline.
//!
//! Every live slab is on exactly one of three lists keyed by how many of its
//! blocks are free: `free` (all of them), `partial` (some), `busy` (none).
//! Allocation drains the partial list first so free slabs stay in reserve;
//! deallocation recovers the owning slab by alignment and migrates it
//! between lists as its free count crosses the boundaries. Transitions
//! always detach the slab from its source list and attach it to the
//! destination, whichever position it occupied.
//!
//! The caller-facing mutex lives one level up in `SlabCache`; everything
//! here runs with exclusive access.

use std::ptr::{self, NonNull};

use log::{debug, trace, warn};

use crate::backing::RegionSource;
use crate::list::SlabList;
use crate::slab::{self, FreeBlock, Geometry, SlabHeader, LINK_SIZE};
use crate::CacheStats;

pub(crate) struct Cache<S: RegionSource> {
    geom: Geometry,
    free: SlabList,
    partial: SlabList,
    busy: SlabList,
    source: S,
}

impl<S: RegionSource> Cache<S> {
    /// Computes the cache geometry and eagerly installs one slab on the free
    /// list.
    ///
    /// # Panics
    ///
    /// Panics on invalid parameters, and on source exhaustion - a cache must
    /// own at least one slab from the moment it exists.
    pub fn new(object_size: usize, slab_order: usize, source: S) -> Cache<S> {
        let geom = Geometry::for_object_size(object_size, slab_order);
        let mut cache = Cache {
            geom,
            free: SlabList::new(),
            partial: SlabList::new(),
            busy: SlabList::new(),
            source,
        };
        cache
            .grow()
            .expect("region source exhausted during cache setup");
        cache
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// Acquires a fresh region, carves it, and pushes the new slab onto the
    /// free list. `None` means the source is exhausted.
    fn grow(&mut self) -> Option<*mut SlabHeader> {
        let base = self.source.acquire(self.geom.slab_order)?;
        let slab = unsafe { slab::carve(base, &self.geom) };
        unsafe { self.free.push(slab) };
        trace!(
            "cache {:p}: built slab {:p} with {} blocks",
            self,
            slab,
            self.geom.objects_per_slab
        );
        Some(slab)
    }

    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        loop {
            unsafe {
                // partial slabs first: free slabs stay reserved for bursts
                if !self.partial.is_empty() {
                    let slab = self.partial.front();
                    let block = Self::pop_block(slab);
                    if (*slab).head.is_null() {
                        self.partial.detach(slab);
                        self.busy.push(slab);
                    }
                    return Some(self.caller_ptr(block));
                }

                if let Some(slab) = self.free.pop() {
                    let block = Self::pop_block(slab);
                    if (*slab).head.is_null() {
                        // only possible with a single block per slab
                        self.busy.push(slab);
                    } else {
                        self.partial.push(slab);
                    }
                    return Some(self.caller_ptr(block));
                }
            }

            self.grow()?;
        }
    }

    unsafe fn pop_block(slab: *mut SlabHeader) -> *mut FreeBlock {
        let block = (*slab).head;
        debug_assert!(!block.is_null());
        (*slab).head = (*block).next;
        (*slab).free_count -= 1;
        block
    }

    unsafe fn caller_ptr(&self, block: *mut FreeBlock) -> NonNull<u8> {
        (*block).next = ptr::null_mut();
        NonNull::new_unchecked(block.cast::<u8>().add(LINK_SIZE))
    }

    /// Re-threads `ptr`'s block onto its owning slab and re-classifies the
    /// slab.
    ///
    /// # Safety
    ///
    /// `ptr` must be an outstanding pointer returned by `alloc` on this
    /// cache.
    pub unsafe fn dealloc(&mut self, ptr: NonNull<u8>) {
        let slab = self.geom.header_of(ptr.as_ptr());
        let block = ptr.as_ptr().sub(LINK_SIZE).cast::<FreeBlock>();

        (*block).next = (*slab).head;
        (*slab).head = block;
        (*slab).free_count += 1;

        match (*slab).free_count {
            // first block back: the slab was fully busy
            1 => {
                self.busy.detach(slab);
                if self.geom.objects_per_slab == 1 {
                    self.free.push(slab);
                } else {
                    self.partial.push(slab);
                }
            }
            n if n == self.geom.objects_per_slab => {
                self.partial.detach(slab);
                self.free.push(slab);
            }
            _ => {}
        }
    }

    /// Releases every fully free slab back to the source.
    pub fn shrink(&mut self) {
        let mut released = 0;
        unsafe {
            while let Some(slab) = self.free.pop() {
                self.release_slab(slab);
                released += 1;
            }
        }
        debug!("cache {:p}: shrink released {} slab(s)", self, released);
    }

    /// Releases every slab on all three lists, regardless of occupancy.
    pub fn release_all(&mut self) {
        let outstanding = self.outstanding_blocks();
        if outstanding > 0 {
            warn!(
                "cache {:p}: released with {} block(s) still outstanding",
                self, outstanding
            );
        }
        unsafe {
            while let Some(slab) = self.free.pop() {
                self.release_slab(slab);
            }
            while let Some(slab) = self.partial.pop() {
                self.release_slab(slab);
            }
            while let Some(slab) = self.busy.pop() {
                self.release_slab(slab);
            }
        }
    }

    unsafe fn release_slab(&mut self, slab: *mut SlabHeader) {
        let base = self.geom.base_of(slab);
        trace!("cache {:p}: releasing slab {:p}", self, slab);
        self.source.release(NonNull::new_unchecked(base));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            free_slabs: self.free.len(),
            partial_slabs: self.partial.len(),
            busy_slabs: self.busy.len(),
            free_blocks: self.free_blocks(),
        }
    }

    fn free_blocks(&self) -> usize {
        unsafe {
            self.free
                .iter()
                .chain(self.partial.iter())
                .chain(self.busy.iter())
                .map(|slab| (*slab).free_count)
                .sum()
        }
    }

    fn outstanding_blocks(&self) -> usize {
        let total =
            (self.free.len() + self.partial.len() + self.busy.len()) * self.geom.objects_per_slab;
        total - self.free_blocks()
    }

    pub fn dump(&self) {
        println!("cache {:p}", self);
        println!(
            "  block_size={} slab_order={} slab_size={} objects_per_slab={} header_offset={}",
            self.geom.block_size,
            self.geom.slab_order,
            self.geom.slab_size,
            self.geom.objects_per_slab,
            self.geom.header_offset
        );
        println!(
            "  free={} partial={} busy={} ({} free blocks, {} outstanding)",
            self.free.len(),
            self.partial.len(),
            self.busy.len(),
            self.free_blocks(),
            self.outstanding_blocks()
        );
    }

    pub fn dump_slabs(&self) {
        for (name, list) in [
            ("free", &self.free),
            ("partial", &self.partial),
            ("busy", &self.busy),
        ] {
            println!("{} slabs ({}):", name, list.len());
            unsafe {
                for slab in list.iter() {
                    println!(
                        "  slab {:p} base {:p} free {}/{}",
                        slab,
                        self.geom.base_of(slab),
                        (*slab).free_count,
                        self.geom.objects_per_slab
                    );
                    let mut idx = 0;
                    let mut block = (*slab).head;
                    while !block.is_null() {
                        println!("    [{idx}] {block:p}");
                        idx += 1;
                        block = (*block).next;
                    }
                }
            }
        }
    }
}
