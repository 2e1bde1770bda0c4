#![no_std]
#![no_main]

use kernel::vga_buffer::{self, Buffer};

/// Entered by the boot trampoline with protected mode and an identity
/// mapping of low memory already live. Brings up the real kernel
/// address space, then sits idle: process scheduling lives outside
/// this crate.
#[no_mangle]
pub extern "C" fn _start() -> ! {
    let vga = unsafe { &mut *(0xb8000 as *mut Buffer) };
    vga_buffer::init_writer(vga);

    kernel::kernel_init();

    loop {}
}
