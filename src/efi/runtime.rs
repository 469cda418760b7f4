//! Firmware variable store
//!
//! [`VariableStore`] on top of Runtime Services `GetVariable`/`SetVariable`.

use alloc::vec::Vec;
use core::ffi::c_void;
use core::ptr;
use r_efi::efi::{Guid, RuntimeServices, Status};

use crate::store::{Variable, VariableStore};

/// Variable store backed by the firmware's Runtime Services
pub struct FirmwareVariableStore {
    rt: *mut RuntimeServices,
}

impl FirmwareVariableStore {
    /// Use the runtime services table from the system table
    ///
    /// Returns `None` before [`super::init`].
    pub fn new() -> Option<Self> {
        super::runtime_services().map(|rt| Self { rt })
    }
}

impl VariableStore for FirmwareVariableStore {
    fn get_variable(&mut self, name: &[u16], vendor: &Guid) -> Result<Option<Variable>, Status> {
        let name_ptr = name.as_ptr() as *mut u16;
        let vendor_ptr = vendor as *const Guid as *mut Guid;
        let mut attributes = 0u32;
        let mut size = 0usize;

        // Probe for the size
        let status = unsafe {
            ((*self.rt).get_variable)(
                name_ptr,
                vendor_ptr,
                &mut attributes,
                &mut size,
                ptr::null_mut(),
            )
        };
        match status {
            Status::BUFFER_TOO_SMALL => {}
            Status::NOT_FOUND => return Ok(None),
            Status::SUCCESS => {
                return Ok(Some(Variable {
                    attributes,
                    data: Vec::new(),
                }));
            }
            status => return Err(status),
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Status::OUT_OF_RESOURCES)?;
        data.resize(size, 0u8);

        let status = unsafe {
            ((*self.rt).get_variable)(
                name_ptr,
                vendor_ptr,
                &mut attributes,
                &mut size,
                data.as_mut_ptr() as *mut c_void,
            )
        };
        if status.is_error() {
            return Err(status);
        }

        data.truncate(size);
        Ok(Some(Variable { attributes, data }))
    }

    fn set_variable(
        &mut self,
        name: &[u16],
        vendor: &Guid,
        attributes: u32,
        data: &[u8],
    ) -> Result<(), Status> {
        let status = unsafe {
            ((*self.rt).set_variable)(
                name.as_ptr() as *mut u16,
                vendor as *const Guid as *mut Guid,
                attributes,
                data.len(),
                data.as_ptr() as *mut c_void,
            )
        };

        if status.is_error() {
            log::debug!("SetVariable returned {:#x}", status.as_usize());
            return Err(status);
        }
        Ok(())
    }
}
