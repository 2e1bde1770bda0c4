//! Intrusive singly linked free list, the one used by every per-order free
//! area in the buddy allocator. Each free block's first machine word
//! doubles as the `next` link; the allocator owns the memory, so a node is
//! only ever viewed through a transient raw-pointer cast rather than held
//! as a long-lived reference.

use crate::pmap::VirtAddr;

#[repr(C)]
struct Node {
    next: *mut Node,
}

/// Head of a singly linked free list. A null head means the list is empty.
pub(crate) struct FreeList {
    head: *mut Node,
}

unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> FreeList {
        FreeList {
            head: core::ptr::null_mut(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Prepend the block at `va` to the list. `va` must not already be
    /// linked into this or any other list.
    pub(crate) unsafe fn push(&mut self, va: VirtAddr) {
        let node = va.as_mut_ptr::<Node>();
        (*node).next = self.head;
        self.head = node;
    }

    /// Remove and return the head of the list. Undefined if the list is
    /// empty; callers must check `is_empty` first.
    pub(crate) unsafe fn pop(&mut self) -> VirtAddr {
        let node = self.head;
        self.head = (*node).next;
        VirtAddr(node as u32)
    }

    /// Remove `va` from the list wherever it is. No-op if `va` is not
    /// present. O(list length).
    pub(crate) unsafe fn remove(&mut self, va: VirtAddr) {
        let target = va.as_mut_ptr::<Node>();
        if self.head == target {
            self.head = (*target).next;
            return;
        }
        let mut cur = self.head;
        while !cur.is_null() {
            if (*cur).next == target {
                (*cur).next = (*target).next;
                return;
            }
            cur = (*cur).next;
        }
    }
}

#[cfg(feature = "kernel_tests")]
pub(crate) mod tests {
    use super::*;

    #[repr(align(4096))]
    struct Blocks([[u8; 4096]; 4]);

    static mut BLOCKS: Blocks = Blocks([[0; 4096]; 4]);

    fn block_addr(i: usize) -> VirtAddr {
        unsafe { VirtAddr(BLOCKS.0[i].as_ptr() as u32) }
    }

    pub(crate) fn run() {
        let mut list = FreeList::new();
        assert!(list.is_empty());

        unsafe {
            list.push(block_addr(0));
            list.push(block_addr(1));
            list.push(block_addr(2));
        }
        assert!(!list.is_empty());

        // LIFO order: most recently pushed comes back first.
        unsafe {
            assert_eq!(list.pop(), block_addr(2));
            assert_eq!(list.pop(), block_addr(1));
        }
        assert!(!list.is_empty());
        unsafe {
            assert_eq!(list.pop(), block_addr(0));
        }
        assert!(list.is_empty());

        // Removing from the middle splices correctly.
        unsafe {
            list.push(block_addr(0));
            list.push(block_addr(1));
            list.push(block_addr(2));
            list.remove(block_addr(1));
            assert_eq!(list.pop(), block_addr(2));
            assert_eq!(list.pop(), block_addr(0));
        }
        assert!(list.is_empty());

        // Removing an absent address is a no-op.
        unsafe {
            list.push(block_addr(0));
            list.remove(block_addr(3));
            assert_eq!(list.pop(), block_addr(0));
        }
        assert!(list.is_empty());

        crate::println!("freelist::tests::run: ok");
    }
}
