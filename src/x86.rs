use crate::gdt::DescriptorTablePointer;
use crate::pmap::{PhysAddr, VirtAddr};

#[inline]
pub(crate) fn inb(port: u16) -> u8 {
    unsafe {
        let value: u8;
        asm!("inb $1, $0" : "={al}"(value) :"N{dx}"(port) :: "volatile");
        value
    }
}

#[inline]
pub(crate) fn outb(port: u16, value: u8) {
    unsafe {
        asm!("outb $1, $0" :: "N{dx}"(port), "{al}"(value) :: "volatile");
    }
}

/// Load the page directory base register (CR3) with the physical address
/// of a page directory.
#[inline]
pub(crate) fn lcr3(pa: PhysAddr) {
    unsafe {
        asm!("mov $0, %cr3" :: "r"(pa.0) : "memory" : "volatile");
    }
}

#[inline]
pub(crate) fn rcr0() -> u32 {
    let value: u32;
    unsafe {
        asm!("mov %cr0, $0" : "=r"(value) ::: "volatile");
    }
    value
}

#[inline]
pub(crate) fn lcr0(value: u32) {
    unsafe {
        asm!("mov $0, %cr0" :: "r"(value) : "memory" : "volatile");
    }
}

#[inline]
pub(crate) fn rcr4() -> u32 {
    let value: u32;
    unsafe {
        asm!("mov %cr4, $0" : "=r"(value) ::: "volatile");
    }
    value
}

#[inline]
pub(crate) fn lcr4(value: u32) {
    unsafe {
        asm!("mov $0, %cr4" :: "r"(value) : "memory" : "volatile");
    }
}

/// Invalidate a single TLB entry for `va`.
#[inline]
pub(crate) fn invlpg(va: VirtAddr) {
    unsafe {
        asm!("invlpg ($0)" :: "r"(va.0) : "memory" : "volatile");
    }
}

#[inline]
pub(crate) fn lgdt(dtp: &DescriptorTablePointer) {
    unsafe {
        asm!("lgdt ($0)" :: "r"(dtp) : "memory" : "volatile");
    }
}

#[inline]
pub(crate) fn lldt(dtp: &DescriptorTablePointer) {
    unsafe {
        asm!("lldt ($0)" :: "r"(dtp) : "memory" : "volatile");
    }
}

/// Load the task register with the TSS selector.
#[inline]
pub(crate) fn ltr(selector: u16) {
    unsafe {
        asm!("ltr $0" :: "r"(selector) :: "volatile");
    }
}

/// Read the interrupt flag out of EFLAGS.
#[inline]
pub(crate) fn read_eflags() -> u32 {
    let value: u32;
    unsafe {
        asm!("pushfl; popl $0" : "=r"(value) ::: "volatile");
    }
    value
}

#[inline]
pub(crate) fn cli() {
    unsafe {
        asm!("cli" ::: "memory" : "volatile");
    }
}

#[inline]
pub(crate) fn sti() {
    unsafe {
        asm!("sti" ::: "memory" : "volatile");
    }
}
