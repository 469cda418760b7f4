//! update-vars - Main entry point
//!
//! UEFI application that writes a signed payload into one of the Secure Boot
//! key variables. Run from the UEFI shell:
//!
//! ```text
//! update-vars.efi [-g guid] [-a] PK|KEK|db|dbx file
//! ```

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(target_os = "uefi")]
mod app {
    use core::panic::PanicInfo;
    use log::LevelFilter;
    use r_efi::efi::{Handle, Status, SystemTable};

    use update_vars::efi::allocator::PoolAllocator;
    use update_vars::efi::console::GlobalConsole;
    use update_vars::efi::fs::VolumeFileLoader;
    use update_vars::efi::runtime::FirmwareVariableStore;
    use update_vars::efi::utils::Ucs2Display;
    use update_vars::error::StatusName;
    use update_vars::{console_println, efi, logger, update};

    #[global_allocator]
    static ALLOCATOR: PoolAllocator = PoolAllocator::new();

    /// EFI entry point
    #[unsafe(no_mangle)]
    pub extern "efiapi" fn efi_main(image: Handle, system_table: *mut SystemTable) -> Status {
        if system_table.is_null() {
            return Status::INVALID_PARAMETER;
        }

        unsafe { efi::init(system_table) };
        logger::init();
        if cfg!(debug_assertions) {
            logger::set_level(LevelFilter::Debug);
        }

        log::debug!("update-vars v{}", env!("CARGO_PKG_VERSION"));

        let options = match efi::image::load_options(image) {
            Ok(options) => options,
            Err(err) => {
                console_println!("{}", err);
                return err.into();
            }
        };
        log::trace!("Command line: {}", Ucs2Display(&options));

        let Some(mut store) = FirmwareVariableStore::new() else {
            console_println!("Runtime services unavailable");
            return Status::NOT_READY;
        };

        let mut files = match VolumeFileLoader::open_boot_volume(image) {
            Ok(files) => files,
            Err(status) => {
                console_println!("Failed to open boot volume: {}", StatusName(status));
                return status;
            }
        };

        update::execute(options, &mut store, &mut files, &mut GlobalConsole)
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        log::error!("PANIC: {}", info);

        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(not(target_os = "uefi"))]
fn main() {
    eprintln!("update-vars is a UEFI application; build it with --target x86_64-unknown-uefi");
    std::process::exit(1);
}
