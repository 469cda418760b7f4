//! Firmware glue
//!
//! Holds the system table handed to `efi_main`, and the concrete
//! implementations of the collaborator traits on top of Boot and Runtime
//! Services.

pub mod allocator;
pub mod console;
pub mod fs;
pub mod image;
pub mod runtime;
pub mod utils;

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use r_efi::efi::{self, Guid, Handle, Status, SystemTable};

/// System table passed to `efi_main`
static SYSTEM_TABLE: AtomicPtr<SystemTable> = AtomicPtr::new(ptr::null_mut());

/// Record the system table and bring up the console
///
/// # Safety
///
/// `system_table` must be the system table the firmware passed to this image,
/// and boot services must not have been exited.
pub unsafe fn init(system_table: *mut SystemTable) {
    SYSTEM_TABLE.store(system_table, Ordering::Release);
    unsafe { console::init(system_table) };
}

/// System table pointer, null before [`init`]
pub fn system_table() -> *mut SystemTable {
    SYSTEM_TABLE.load(Ordering::Acquire)
}

/// Boot services table, `None` before [`init`]
pub fn boot_services() -> Option<*mut efi::BootServices> {
    let st = system_table();
    if st.is_null() {
        return None;
    }
    let bs = unsafe { (*st).boot_services };
    (!bs.is_null()).then_some(bs)
}

/// Runtime services table, `None` before [`init`]
pub fn runtime_services() -> Option<*mut efi::RuntimeServices> {
    let st = system_table();
    if st.is_null() {
        return None;
    }
    let rt = unsafe { (*st).runtime_services };
    (!rt.is_null()).then_some(rt)
}

/// Look up a protocol interface on a handle
pub fn handle_protocol<T>(handle: Handle, protocol: &Guid) -> Result<*mut T, Status> {
    let bs = boot_services().ok_or(Status::NOT_READY)?;
    let mut interface: *mut c_void = ptr::null_mut();

    let status = unsafe {
        ((*bs).handle_protocol)(
            handle,
            protocol as *const Guid as *mut Guid,
            &mut interface,
        )
    };

    if status.is_error() {
        return Err(status);
    }
    if interface.is_null() {
        return Err(Status::UNSUPPORTED);
    }
    Ok(interface as *mut T)
}
