//! Global allocator backed by Boot Services pool memory
//!
//! `AllocatePool` returns 8-byte aligned memory. Larger alignments are served
//! by over-allocating and storing the pool pointer in the word just below the
//! aligned block, where `dealloc` finds it again.
//!
//! Allocations fail (return null) before [`super::init`] has run.

use core::alloc::{GlobalAlloc, Layout};
use core::ffi::c_void;
use core::ptr::null_mut;
use r_efi::efi::{self, Status};

/// Alignment `AllocatePool` guarantees
const POOL_ALIGN: usize = 8;

/// Pool allocator for the `alloc` crate
pub struct PoolAllocator;

impl PoolAllocator {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate `size` bytes of loader data pool memory
fn allocate_pool(size: usize) -> *mut u8 {
    let Some(bs) = super::boot_services() else {
        return null_mut();
    };

    let mut buffer: *mut c_void = null_mut();
    let status = unsafe { ((*bs).allocate_pool)(efi::LOADER_DATA, size, &mut buffer) };

    if status == Status::SUCCESS {
        buffer as *mut u8
    } else {
        null_mut()
    }
}

/// Free pool memory
fn free_pool(buffer: *mut u8) {
    let Some(bs) = super::boot_services() else {
        return;
    };
    if buffer.is_null() {
        return;
    }

    unsafe {
        ((*bs).free_pool)(buffer as *mut c_void);
    }
}

unsafe impl GlobalAlloc for PoolAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        let align = layout.align();

        if align <= POOL_ALIGN {
            return allocate_pool(size);
        }

        let Some(padded) = size.checked_add(align) else {
            return null_mut();
        };
        let ptr = allocate_pool(padded);
        if ptr.is_null() {
            return ptr;
        }

        // ptr is 8-aligned and align > 8, so the offset is at least one word
        let offset = align - (ptr as usize % align);
        unsafe {
            let aligned = ptr.add(offset);
            (aligned as *mut *mut u8).sub(1).write(ptr);
            aligned
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() <= POOL_ALIGN {
            free_pool(ptr);
        } else {
            let original = unsafe { (ptr as *mut *mut u8).sub(1).read() };
            free_pool(original);
        }
    }
}
