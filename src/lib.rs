#![no_std]
#![feature(asm)]
#![feature(const_fn)]

extern crate alloc;

pub mod console;

pub mod allocator;
pub(crate) mod bitmap;
pub(crate) mod buddy;
pub(crate) mod constants;
pub(crate) mod freelist;
pub(crate) mod gdt;
pub(crate) mod kclock;
pub(crate) mod once;
pub(crate) mod pmap;
pub(crate) mod proc;
pub(crate) mod serial;
pub(crate) mod spinlock;
pub(crate) mod util;
pub(crate) mod uvm;
pub mod vga_buffer;
pub(crate) mod volatile;
pub(crate) mod x86;

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("{}", info);
    loop {}
}

/// Bring up the kernel's memory subsystem: paging with huge-page support,
/// the buddy allocator over the rest of physical memory, and the heap
/// the global Rust allocator serves `alloc` requests from.
pub fn kernel_init() {
    gdt::init_percpu();
    gdt::install_tss();
    pmap::mem_init();

    unsafe {
        allocator::HeapAllocator::init(constants::KHEAP_BASE as usize, constants::KHEAP_SIZE);
    }

    #[cfg(feature = "kernel_tests")]
    run_kernel_tests();
}

#[cfg(feature = "kernel_tests")]
fn run_kernel_tests() {
    freelist::tests::run();
    buddy::tests::run();
}
