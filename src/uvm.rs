//! User-space address-space lifecycle: building a process's initial
//! image, growing and shrinking its heap, tearing the whole thing down,
//! and copying a process (fork) or copying bytes across address spaces
//! (a syscall argument buffer living in user memory).

use crate::buddy;
use crate::constants::*;
use crate::pmap::{self, PageDirectory, PhysAddr, VirtAddr};
use crate::util;

/// A source of bytes to seed a fresh process image with: the in-kernel
/// equivalent of reading a program's text/data out of a file. Kept as a
/// trait rather than a concrete file type since this crate has no
/// filesystem of its own.
pub(crate) trait ProgramImage {
    /// Read up to `buf.len()` bytes starting at `offset` into `buf`,
    /// returning the number of bytes actually read (less than
    /// `buf.len()` at end of image).
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize;
}

fn table_page() -> PhysAddr {
    buddy::alloc(PGSIZE as usize).expect("out of memory allocating a page table page")
}

/// Map one zeroed user page at virtual address 0 and copy `init` into
/// it. `init.len()` must fit in a single page: this is only used for a
/// process's very first instructions, before it can grow its own image.
pub(crate) fn init_user(pgdir: &mut PageDirectory, init: &[u8]) {
    assert!(
        init.len() <= PGSIZE as usize,
        "init image of {} bytes does not fit in one page",
        init.len()
    );
    let pa = buddy::alloc(PGSIZE as usize).expect("out of memory allocating the init page");
    util::memset(pa.to_va().as_mut_ptr::<u8>(), 0, PGSIZE as usize);
    pmap::map(pgdir, VirtAddr(0), PGSIZE as usize, pa, PTE_U | PTE_W, table_page);
    util::memcpy(pa.to_va().as_mut_ptr::<u8>(), init.as_ptr(), init.len());
}

/// Load `sz` bytes of `image` at file `offset` into the already-mapped
/// range `[va, va+sz)`, one tile (huge or small) at a time. Every byte
/// in the range must already be backed: callers load after `grow_user`.
pub(crate) fn load_user(
    pgdir: &PageDirectory,
    va: VirtAddr,
    image: &dyn ProgramImage,
    offset: usize,
    sz: usize,
) {
    let mut done = 0usize;
    while done < sz {
        let cur_va = VirtAddr(va.0 + done as u32);
        let (tile_va, tile_size, tile_pa) =
            pmap::tile_of(pgdir, cur_va).expect("load_user: destination not mapped");
        let tile_off = (cur_va.0 - tile_va.0) as usize;
        let n = core::cmp::min(sz - done, tile_size - tile_off);
        let dst = PhysAddr(tile_pa.0 + tile_off as u32).to_va();
        let buf = unsafe { core::slice::from_raw_parts_mut(dst.as_mut_ptr::<u8>(), n) };
        let got = image.read_at(offset + done, buf);
        assert_eq!(got, n, "load_user: short read from program image");
        done += n;
    }
}

/// Extend the user range from `old_sz` to `new_sz`, mapping whatever
/// new pages that requires (huge pages where a full `HUGE_SIZE`-aligned
/// span allows it, small pages otherwise) and zeroing them. Returns the
/// resulting size, which is `new_sz` on success.
///
/// Rolls back anything it mapped this call if `new_sz` would cross
/// `USER_TOP` or the buddy allocator runs out of memory, so a failed
/// `grow_user` never leaves the address space larger than `old_sz`.
pub(crate) fn grow_user(pgdir: &mut PageDirectory, old_sz: u32, new_sz: u32) -> u32 {
    if new_sz <= old_sz {
        return old_sz;
    }
    if new_sz > USER_TOP {
        return old_sz;
    }

    let mut va = VirtAddr(old_sz).round_up(PGSIZE as usize).0;
    while va < new_sz {
        let remaining = (new_sz - va) as usize;
        let use_huge = va % HUGE_SIZE as u32 == 0 && remaining >= HUGE_SIZE;
        let size = if use_huge { HUGE_SIZE } else { PGSIZE as usize };

        let pa = match buddy::alloc(size) {
            Some(pa) => pa,
            None => {
                shrink_user(pgdir, va, old_sz);
                return old_sz;
            }
        };
        util::memset(pa.to_va().as_mut_ptr::<u8>(), 0, size);
        pmap::map(pgdir, VirtAddr(va), size, pa, PTE_U | PTE_W, table_page);
        va += size as u32;
    }
    new_sz
}

/// Shrink the user range from `old_sz` down to `new_sz`, freeing every
/// tile it fully or partially covers back to the buddy allocator. A
/// tile that straddles `new_sz` is freed whole: partial-tile shrinks
/// below a tile boundary are not supported, matching `grow_user`'s
/// tile-aligned growth.
pub(crate) fn shrink_user(pgdir: &mut PageDirectory, old_sz: u32, new_sz: u32) -> u32 {
    if new_sz >= old_sz {
        return old_sz;
    }

    let mut va = VirtAddr(new_sz).round_up(PGSIZE as usize).0;
    while va < old_sz {
        match pmap::tile_of(pgdir, VirtAddr(va)) {
            Some((tile_va, tile_size, _)) => {
                let pa = pmap::clear_tile(pgdir, tile_va, tile_size);
                buddy::free(pa);
                va = tile_va.0 + tile_size as u32;
            }
            None => {
                va += PGSIZE;
            }
        }
    }
    new_sz
}

/// Tear down the entire user range and free the directory itself. The
/// directory pointer is consumed: nothing may use `pgdir` after this.
pub(crate) fn free_space(pgdir: &mut PageDirectory) {
    shrink_user(pgdir, USER_TOP, 0);
    pmap::free_pgdir(pgdir);
}

/// Build a new address space with the same user image as `src` (sized
/// `sz`) plus a separately duplicated `stack` range, for process fork.
/// Returns `None` on allocation failure, having freed anything it
/// allocated first.
pub(crate) fn copy_user(
    src: &PageDirectory,
    sz: u32,
    stack: (VirtAddr, usize),
) -> Option<&'static mut PageDirectory> {
    let dst = pmap::new_user_pgdir()?;

    if !copy_range(src, dst, VirtAddr(PGSIZE), (sz - PGSIZE) as usize) {
        free_space(dst);
        return None;
    }

    let (stack_va, stack_len) = stack;
    if !copy_range(src, dst, stack_va, stack_len) {
        free_space(dst);
        return None;
    }

    Some(dst)
}

/// Duplicate every tile covering `[va, va+len)` in `src` into freshly
/// allocated, independently owned pages in `dst`. Returns `false` (after
/// unwinding nothing itself — the caller frees `dst` wholesale) on the
/// first allocation failure.
fn copy_range(src: &PageDirectory, dst: &mut PageDirectory, va: VirtAddr, len: usize) -> bool {
    let mut done = 0usize;
    while done < len {
        let cur_va = VirtAddr(va.0 + done as u32);
        let (tile_va, tile_size, src_pa) = match pmap::tile_of(src, cur_va) {
            Some(t) => t,
            None => {
                done += PGSIZE as usize;
                continue;
            }
        };
        let pa = match buddy::alloc(tile_size) {
            Some(pa) => pa,
            None => return false,
        };
        util::memcpy(
            pa.to_va().as_mut_ptr::<u8>(),
            src_pa.to_va().as_ptr::<u8>(),
            tile_size,
        );
        pmap::map(dst, tile_va, tile_size, pa, PTE_U | PTE_W, table_page);
        done = (tile_va.0 - va.0) as usize + tile_size;
    }
    true
}

/// Copy `buf` into `pgdir`'s user memory starting at `user_va`, stepping
/// tile by tile so the copy can cross huge/small boundaries. Returns
/// `Err(())` if any byte of the destination range is unmapped or not
/// user-accessible, without partially applying the copy past that point.
pub(crate) fn copy_out(pgdir: &PageDirectory, user_va: VirtAddr, buf: &[u8]) -> Result<(), ()> {
    let mut done = 0usize;
    while done < buf.len() {
        let cur_va = VirtAddr(user_va.0 + done as u32);
        let pa = pmap::translate_user(pgdir, cur_va).ok_or(())?;
        let (tile_va, tile_size, _) = pmap::tile_of(pgdir, cur_va).ok_or(())?;
        let tile_off = (cur_va.0 - tile_va.0) as usize;
        let n = core::cmp::min(buf.len() - done, tile_size - tile_off);
        util::memcpy(pa.to_va().as_mut_ptr::<u8>(), buf[done..done + n].as_ptr(), n);
        done += n;
    }
    Ok(())
}
