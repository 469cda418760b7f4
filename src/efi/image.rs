//! Loaded image queries

use alloc::vec::Vec;
use r_efi::efi::Handle;
use r_efi::protocols::loaded_image;

use super::handle_protocol;
use crate::error::UpdateError;

/// Copy the load options of `image` into an owned UCS-2 buffer
///
/// The firmware's copy is left untouched. An image started without options
/// yields an empty buffer.
pub fn load_options(image: Handle) -> Result<Vec<u16>, UpdateError> {
    let info = handle_protocol::<loaded_image::Protocol>(image, &loaded_image::PROTOCOL_GUID)
        .map_err(UpdateError::LoadOptions)?;

    let (options, size) = unsafe { ((*info).load_options, (*info).load_options_size as usize) };
    if options.is_null() || size == 0 {
        return Ok(Vec::new());
    }

    let len = size / 2;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| UpdateError::ResourceExhaustion {
            what: "load options",
        })?;

    // Load options carry no alignment guarantee
    let units = options as *const u16;
    for i in 0..len {
        buffer.push(unsafe { units.add(i).read_unaligned() });
    }

    log::debug!("Load options: {} bytes", size);
    Ok(buffer)
}
