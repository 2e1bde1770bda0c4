// This file is base on spin crate (MIT license). See COPYRIGHT for copyright information.
// spin-rs (https://github.com/mvdnes/spin-rs)
//
// Unlike spin-rs, acquiring this lock also disables interrupts on the
// current CPU and restores the prior interrupt-enable state on release,
// following the xv6 spinlock convention: a lock held across an interrupt
// is a deadlock waiting to happen.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{spin_loop_hint as cpu_relax, AtomicBool, Ordering};

use crate::x86;

const FL_IF: u32 = 0x0000_0200;

/// A mutual-exclusion primitive guarding `T` with a busy-wait spinlock.
///
/// Interrupts on the current CPU are disabled for the lifetime of the
/// returned guard and restored to whatever they were beforehand when the
/// guard is dropped.
pub(crate) struct Mutex<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

pub(crate) struct MutexGuard<'a, T: ?Sized + 'a> {
    locked: &'a AtomicBool,
    data: *mut T,
    interrupts_were_enabled: bool,
}

impl<T> Mutex<T> {
    pub(crate) const fn new(data: T) -> Mutex<T> {
        Mutex {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub(crate) fn lock(&self) -> MutexGuard<T> {
        let interrupts_were_enabled = x86::read_eflags() & FL_IF != 0;
        x86::cli();
        while self
            .locked
            .compare_and_swap(false, true, Ordering::Acquire)
        {
            cpu_relax();
        }
        MutexGuard {
            locked: &self.locked,
            data: unsafe { &mut *self.data.get() },
            interrupts_were_enabled,
        }
    }
}

impl<'a, T: ?Sized> Deref for MutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.data }
    }
}

impl<'a, T: ?Sized> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data }
    }
}

impl<'a, T: ?Sized> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
        if self.interrupts_were_enabled {
            x86::sti();
        }
    }
}
