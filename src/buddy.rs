//! The physical page buddy allocator.
//!
//! Serves power-of-two blocks from `PAGE_SIZE` (order 0) up to `HUGE_SIZE`
//! (order `MAX_ORDER`) out of a single contiguous physical region
//! `[BASE, BOUNDS)`. Each order keeps an intrusive free list plus two
//! bitmaps: `allocated_bits` (this exact block is a free-standing unit
//! someone owns) and `split_bits` (this block has been divided into two
//! half-size children and no longer appears in any free list itself).
//!
//! A single spinlock guards the whole structure; splitting and coalescing
//! always run start-to-finish with the lock held.

use crate::bitmap;
use crate::constants::*;
use crate::freelist::FreeList;
use crate::pmap::PhysAddr;
use crate::spinlock::Mutex;

/// Size in bytes of an order-`k` block.
pub(crate) const fn block_size(order: usize) -> usize {
    (PGSIZE as usize) << order
}

struct FreeArea {
    free_list: FreeList,
    allocated_bits: &'static mut [u8],
    // None only for order 0: the base page has no parent bit to inspect,
    // since order 0 blocks are never split further.
    split_bits: Option<&'static mut [u8]>,
}

pub(crate) struct BuddyAllocator {
    base: PhysAddr,
    bounds: PhysAddr,
    areas: [FreeArea; MAX_ORDER + 1],
}

unsafe impl Send for BuddyAllocator {}

static ALLOCATOR: Mutex<Option<BuddyAllocator>> = Mutex::new(None);

/// Number of bytes of bitmap storage `init` will need for region
/// `[base, bounds)`. Callers reserve this much memory (via a bump
/// allocator) before calling `init`.
pub(crate) fn bitmap_arena_size(base: PhysAddr, bounds: PhysAddr) -> usize {
    let region = (bounds.0 - base.0) as usize;
    let mut total = 0;
    for order in 0..=MAX_ORDER {
        let n_blocks = region / block_size(order);
        total += bitmap::bytes_for(n_blocks); // allocated_bits
        if order > 0 {
            total += bitmap::bytes_for(n_blocks); // split_bits
        }
    }
    total
}

impl BuddyAllocator {
    fn n_blocks(&self, order: usize) -> usize {
        ((self.bounds.0 - self.base.0) as usize) / block_size(order)
    }

    fn index_of(&self, p: PhysAddr, order: usize) -> usize {
        ((p.0 - self.base.0) as usize) / block_size(order)
    }

    fn address_of(&self, index: usize, order: usize) -> PhysAddr {
        PhysAddr(self.base.0 + (index * block_size(order)) as u32)
    }

    /// Smallest order whose size is >= `n_bytes`.
    fn min_order(n_bytes: usize) -> usize {
        let mut order = 0;
        let mut size = PGSIZE as usize;
        while size < n_bytes {
            order += 1;
            size *= 2;
        }
        order
    }

    /// Order at which `p` is currently allocated: the smallest `k >= 1`
    /// whose parent block (at order `k`) has been split, in which case `p`
    /// lives at order `k - 1`. If no ancestor was ever split, `p` is the
    /// untouched order-MAX_ORDER block it started as.
    fn order_of(&self, p: PhysAddr) -> usize {
        for k in 1..=MAX_ORDER {
            let split_bits = self.areas[k].split_bits.as_ref().unwrap();
            if bitmap::is_set(split_bits, self.index_of(p, k)) {
                return k - 1;
            }
        }
        MAX_ORDER
    }

    fn alloc(&mut self, n_bytes: usize) -> Option<PhysAddr> {
        let min = Self::min_order(n_bytes);
        let mut i = min;
        while i <= MAX_ORDER && self.areas[i].free_list.is_empty() {
            i += 1;
        }
        if i > MAX_ORDER {
            return None;
        }

        let p = unsafe { self.areas[i].free_list.pop() }.to_pa();
        bitmap::set(self.areas[i].allocated_bits, self.index_of(p, i));

        while i > min {
            let split_bits = self.areas[i].split_bits.as_mut().unwrap();
            bitmap::set(split_bits, self.index_of(p, i));
            let q = PhysAddr(p.0 + block_size(i - 1) as u32);
            i -= 1;
            // p is re-homed to the smaller order; the bookkeeping bit moves
            // with it, while the other half (q) is handed to its free list
            // untouched (allocated_bits stays 0 there: it is genuinely free).
            bitmap::set(self.areas[i].allocated_bits, self.index_of(p, i));
            unsafe { self.areas[i].free_list.push(q.to_va()) };
        }

        Some(p)
    }

    fn free(&mut self, p: PhysAddr) {
        let sz = self.order_of(p);
        if !bitmap::is_set(self.areas[sz].allocated_bits, self.index_of(p, sz)) {
            return; // double free: caller bug, but we don't corrupt state
        }

        let mut i = sz;
        let mut cur = p;
        loop {
            let idx = self.index_of(cur, i);
            bitmap::clear(self.areas[i].allocated_bits, idx);
            if i == MAX_ORDER {
                break;
            }
            let buddy_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            if bitmap::is_set(self.areas[i].allocated_bits, buddy_idx) {
                break; // buddy still in use (or itself split): nothing more to merge
            }
            let buddy_addr = self.address_of(buddy_idx, i);
            unsafe { self.areas[i].free_list.remove(buddy_addr.to_va()) };
            if buddy_idx % 2 == 0 {
                cur = buddy_addr; // buddy has the lower address
            }
            let parent_split = self.areas[i + 1].split_bits.as_mut().unwrap();
            bitmap::clear(parent_split, self.index_of(cur, i + 1));
            i += 1;
        }
        unsafe { self.areas[i].free_list.push(cur.to_va()) };
    }

    /// Build a fresh allocator over `[base, bounds)`, using `bitmap_arena`
    /// (exactly `bitmap_arena_size(base, bounds)` zeroed bytes) for every
    /// order's bitmaps, and thread every order-MAX_ORDER block into
    /// `free_list[MAX_ORDER]`.
    ///
    /// # Safety
    /// Every byte of `[base, bounds)` must already be mapped and
    /// addressable through `PhysAddr::to_va` (this kernel maps all
    /// candidate physical memory at `KERN_BASE` before calling this), and
    /// `bitmap_arena` must not alias any other live memory.
    unsafe fn init(base: PhysAddr, bounds: PhysAddr, bitmap_arena: &'static mut [u8]) -> BuddyAllocator {
        assert_eq!(base.0 % HUGE_SIZE as u32, 0, "BASE must be huge-page aligned");
        assert_eq!(bounds.0 % HUGE_SIZE as u32, 0, "BOUNDS must be huge-page aligned");
        assert!(bounds.0 > base.0, "empty physical region");

        let region = (bounds.0 - base.0) as usize;
        let mut rest: &mut [u8] = bitmap_arena;
        // Build highest order first, matching the spec's init walk order;
        // functionally the slicing direction doesn't matter as long as it
        // agrees with bitmap_arena_size.
        let mut areas: [FreeArea; MAX_ORDER + 1] = unsafe {
            let mut areas: core::mem::MaybeUninit<[FreeArea; MAX_ORDER + 1]> =
                core::mem::MaybeUninit::uninit();
            let ptr = areas.as_mut_ptr() as *mut FreeArea;
            for order in (0..=MAX_ORDER).rev() {
                let n_blocks = region / block_size(order);
                let (alloc_bytes, remainder) = rest.split_at_mut(bitmap::bytes_for(n_blocks));
                rest = remainder;
                let split_bits = if order > 0 {
                    let (split_bytes, remainder) = rest.split_at_mut(bitmap::bytes_for(n_blocks));
                    rest = remainder;
                    Some(split_bytes)
                } else {
                    None
                };
                ptr.add(order).write(FreeArea {
                    free_list: FreeList::new(),
                    allocated_bits: alloc_bytes,
                    split_bits,
                });
            }
            areas.assume_init()
        };

        let mut allocator = BuddyAllocator { base, bounds, areas };

        let n_max_blocks = allocator.n_blocks(MAX_ORDER);
        for index in 0..n_max_blocks {
            let addr = allocator.address_of(index, MAX_ORDER);
            unsafe { allocator.areas[MAX_ORDER].free_list.push(addr.to_va()) };
        }

        allocator
    }
}

/// Install the global allocator. Must be called exactly once, before any
/// call to `alloc`/`free`.
///
/// # Safety
/// See `BuddyAllocator::init`.
pub(crate) unsafe fn init(base: PhysAddr, bounds: PhysAddr, bitmap_arena: &'static mut [u8]) {
    let allocator = BuddyAllocator::init(base, bounds, bitmap_arena);
    *ALLOCATOR.lock() = Some(allocator);
}

/// Allocate the smallest block that fits `n_bytes`, or `None` if the
/// allocator is out of memory at every order from there up.
pub(crate) fn alloc(n_bytes: usize) -> Option<PhysAddr> {
    ALLOCATOR
        .lock()
        .as_mut()
        .expect("buddy allocator used before init")
        .alloc(n_bytes)
}

/// Free a block previously returned by `alloc`. Freeing an address that is
/// not currently allocated (double free) is silently ignored.
pub(crate) fn free(p: PhysAddr) {
    ALLOCATOR
        .lock()
        .as_mut()
        .expect("buddy allocator used before init")
        .free(p);
}

#[cfg(feature = "kernel_tests")]
pub(crate) mod tests {
    use super::*;
    use crate::pmap::VirtAddr;

    // One huge page's worth of test region is enough to exercise every
    // order from 0 to MAX_ORDER; keeping TEST_BLOCKS at 1 keeps the
    // bitmap arena (below) small.
    const TEST_BLOCKS: usize = 1;
    const TEST_REGION_SIZE: usize = TEST_BLOCKS * HUGE_SIZE;

    #[repr(align(4194304))]
    struct Region([u8; TEST_REGION_SIZE]);
    static mut TEST_REGION: Region = Region([0; TEST_REGION_SIZE]);

    // bitmap_arena_size(base, base + HUGE_SIZE) sums to 388 bytes across
    // all 11 orders; rounded up with headroom.
    #[repr(align(4096))]
    struct Arena([u8; 512]);
    static mut TEST_ARENA: Arena = Arena([0; 512]);

    fn test_base() -> PhysAddr {
        VirtAddr(unsafe { TEST_REGION.0.as_ptr() as u32 }).to_pa()
    }

    fn fresh() -> BuddyAllocator {
        let base = test_base();
        let bounds = PhysAddr(base.0 + TEST_REGION_SIZE as u32);
        let needed = bitmap_arena_size(base, bounds);
        assert!(needed <= unsafe { TEST_ARENA.0.len() }, "test arena too small");
        let arena: &'static mut [u8] = unsafe { &mut TEST_ARENA.0[..needed] };
        for b in arena.iter_mut() {
            *b = 0;
        }
        unsafe { BuddyAllocator::init(base, bounds, arena) }
    }

    pub(crate) fn run() {
        round_trip();
        full_coalescing();
        monotone_exhaustion();
        coalesce_chain();
        crate::println!("buddy::tests::run: ok");
    }

    fn round_trip() {
        let mut a = fresh();
        let p = a.alloc(PGSIZE as usize).expect("alloc should succeed");
        assert_eq!(a.order_of(p), 0);
        a.free(p);
        // Fully coalesced back: the whole region is one free max-order block.
        assert!(!a.areas[MAX_ORDER].free_list.is_empty());
        for order in 0..MAX_ORDER {
            assert!(a.areas[order].free_list.is_empty());
        }
    }

    fn full_coalescing() {
        let mut a = fresh();
        let mut live = alloc::vec::Vec::new();
        for _ in 0..(TEST_BLOCKS * 1024) {
            live.push(a.alloc(PGSIZE as usize).expect("alloc should succeed"));
        }
        assert!(a.alloc(PGSIZE as usize).is_none());
        for p in live {
            a.free(p);
        }
        assert_eq!(a.n_blocks(MAX_ORDER), TEST_BLOCKS);
        let mut free_max = 0;
        while !a.areas[MAX_ORDER].free_list.is_empty() {
            unsafe {
                a.areas[MAX_ORDER].free_list.pop();
            }
            free_max += 1;
        }
        assert_eq!(free_max, TEST_BLOCKS);
        for order in 0..MAX_ORDER {
            assert!(a.areas[order].free_list.is_empty());
        }
    }

    fn monotone_exhaustion() {
        let mut a = fresh();
        let mut seen = alloc::vec::Vec::new();
        loop {
            match a.alloc(PGSIZE as usize) {
                Some(p) => {
                    assert!(!seen.contains(&p.0), "returned a still-live address twice");
                    seen.push(p.0);
                }
                None => break,
            }
        }
        for &raw in &seen {
            a.free(PhysAddr(raw));
        }
        assert!(a.alloc(PGSIZE as usize).is_some());
    }

    fn coalesce_chain() {
        let mut a = fresh();
        let mut ptrs = [PhysAddr(0); 8];
        for slot in ptrs.iter_mut() {
            *slot = a.alloc(PGSIZE as usize).unwrap();
        }
        for &p in ptrs.iter().rev() {
            a.free(p);
        }
        // All eight pages came from the same order-3 (8-page) block; after
        // freeing them back in reverse order that block is whole again.
        assert!(!a.areas[3].free_list.is_empty());
        for order in 0..3 {
            assert!(a.areas[order].free_list.is_empty());
        }
    }
}
