//! Payload loading from the boot volume
//!
//! Files are opened through the Simple File System protocol on the device the
//! application image was loaded from, so relative paths given on the shell
//! command line resolve against the root of that volume.

use alloc::vec::Vec;
use core::ffi::c_void;
use core::ptr::null_mut;
use r_efi::efi::{Char16, Guid, Handle, Status};
use r_efi::protocols::{file, loaded_image, simple_file_system};

use super::handle_protocol;
use super::utils::{to_nul_terminated, Ucs2Display};
use crate::files::FileLoader;

const EFI_FILE_DIRECTORY: u64 = 0x0000000000000010;

/// Fixed part of EFI_FILE_INFO (the file name follows it)
#[repr(C)]
#[allow(dead_code)]
struct FileInfo {
    size: u64,
    file_size: u64,
    physical_size: u64,
    create_time: [u8; 16],
    last_access_time: [u8; 16],
    modification_time: [u8; 16],
    attribute: u64,
}

/// An open file, closed on drop
pub struct EfiFile {
    handle: *mut file::Protocol,
}

impl Drop for EfiFile {
    fn drop(&mut self) {
        unsafe {
            ((*self.handle).close)(self.handle);
        }
    }
}

/// File loader rooted at the boot volume
pub struct VolumeFileLoader {
    root: *mut file::Protocol,
}

impl VolumeFileLoader {
    /// Open the root directory of the volume `image` was loaded from
    pub fn open_boot_volume(image: Handle) -> Result<Self, Status> {
        let loaded =
            handle_protocol::<loaded_image::Protocol>(image, &loaded_image::PROTOCOL_GUID)?;
        let device = unsafe { (*loaded).device_handle };

        let sfs = handle_protocol::<simple_file_system::Protocol>(
            device,
            &simple_file_system::PROTOCOL_GUID,
        )?;

        let mut root: *mut file::Protocol = null_mut();
        let status = unsafe { ((*sfs).open_volume)(sfs, &mut root) };
        if status.is_error() {
            return Err(status);
        }
        if root.is_null() {
            return Err(Status::DEVICE_ERROR);
        }

        Ok(Self { root })
    }

    /// Fetch the fixed part of EFI_FILE_INFO for an open file
    fn file_info(file: &EfiFile) -> Result<FileInfo, Status> {
        let mut size = 0usize;
        let status = unsafe {
            ((*file.handle).get_info)(
                file.handle,
                &file::INFO_ID as *const Guid as *mut Guid,
                &mut size,
                null_mut(),
            )
        };
        if status != Status::BUFFER_TOO_SMALL {
            return Err(if status.is_error() {
                status
            } else {
                Status::DEVICE_ERROR
            });
        }
        if size < core::mem::size_of::<FileInfo>() {
            return Err(Status::DEVICE_ERROR);
        }

        // u64 backing keeps the header aligned
        let mut buffer: Vec<u64> = Vec::new();
        buffer
            .try_reserve_exact(size.div_ceil(8))
            .map_err(|_| Status::OUT_OF_RESOURCES)?;
        buffer.resize(size.div_ceil(8), 0);

        let status = unsafe {
            ((*file.handle).get_info)(
                file.handle,
                &file::INFO_ID as *const Guid as *mut Guid,
                &mut size,
                buffer.as_mut_ptr() as *mut c_void,
            )
        };
        if status.is_error() {
            return Err(status);
        }

        Ok(unsafe { (buffer.as_ptr() as *const FileInfo).read() })
    }
}

impl Drop for VolumeFileLoader {
    fn drop(&mut self) {
        unsafe {
            ((*self.root).close)(self.root);
        }
    }
}

impl FileLoader for VolumeFileLoader {
    type File = EfiFile;

    fn open(&mut self, path: &[u16]) -> Result<EfiFile, Status> {
        let name = to_nul_terminated(path).ok_or(Status::INVALID_PARAMETER)?;
        let mut handle: *mut file::Protocol = null_mut();

        let status = unsafe {
            ((*self.root).open)(
                self.root,
                &mut handle,
                name.as_ptr() as *mut Char16,
                file::MODE_READ,
                0,
            )
        };
        if status.is_error() {
            log::debug!("Open({}) failed: {:#x}", Ucs2Display(path), status.as_usize());
            return Err(status);
        }
        if handle.is_null() {
            return Err(Status::DEVICE_ERROR);
        }

        Ok(EfiFile { handle })
    }

    fn read_all(&mut self, file: &mut EfiFile) -> Result<Vec<u8>, Status> {
        let info = Self::file_info(file)?;
        if info.attribute & EFI_FILE_DIRECTORY != 0 {
            return Err(Status::INVALID_PARAMETER);
        }

        let size = usize::try_from(info.file_size).map_err(|_| Status::OUT_OF_RESOURCES)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Status::OUT_OF_RESOURCES)?;
        data.resize(size, 0u8);

        let mut filled = 0;
        while filled < size {
            let mut chunk = size - filled;
            let status = unsafe {
                ((*file.handle).read)(
                    file.handle,
                    &mut chunk,
                    data[filled..].as_mut_ptr() as *mut c_void,
                )
            };
            if status.is_error() {
                return Err(status);
            }
            // End of file before the reported size
            if chunk == 0 {
                break;
            }
            filled += chunk;
        }

        data.truncate(filled);
        log::debug!("Read {} of {} bytes", filled, info.file_size);
        Ok(data)
    }
}
