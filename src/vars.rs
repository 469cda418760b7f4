//! Secure Boot variable table
//!
//! The four authenticated key databases this tool can update, with the
//! vendor GUID each one lives under and the attributes a time-based
//! authenticated write must carry.
//!
//! - **PK** (Platform Key) and **KEK** (Key Exchange Key) live under the
//!   EFI global variable GUID.
//! - **db** and **dbx** (allowed and forbidden signature databases) live under
//!   the image security database GUID.

use r_efi::efi::Guid;

use crate::efi::utils::ucs2_eq;

/// Variable attribute flags (UEFI Specification Table 8-1)
pub mod attributes {
    /// Variable is non-volatile (persists across resets)
    pub const NON_VOLATILE: u32 = 0x00000001;

    /// Variable is accessible during Boot Services
    pub const BOOTSERVICE_ACCESS: u32 = 0x00000002;

    /// Variable is accessible at Runtime (after ExitBootServices)
    pub const RUNTIME_ACCESS: u32 = 0x00000004;

    /// Variable uses time-based authenticated write access
    /// When set, data must be prefixed with EFI_VARIABLE_AUTHENTICATION_2
    pub const TIME_BASED_AUTHENTICATED_WRITE_ACCESS: u32 = 0x00000020;

    /// Append data to existing variable (for signature databases)
    pub const APPEND_WRITE: u32 = 0x00000040;

    /// Attributes every Secure Boot key database write carries
    pub const SECURE_BOOT_ATTRS: u32 =
        NON_VOLATILE | BOOTSERVICE_ACCESS | RUNTIME_ACCESS | TIME_BASED_AUTHENTICATED_WRITE_ACCESS;
}

/// EFI Global Variable GUID
/// Used for: PK, KEK
pub const EFI_GLOBAL_VARIABLE_GUID: Guid = Guid::from_fields(
    0x8BE4DF61,
    0x93CA,
    0x11D2,
    0xAA,
    0x0D,
    &[0x00, 0xE0, 0x98, 0x03, 0x2B, 0x8C],
);

/// EFI Image Security Database GUID
/// Used for: db, dbx
pub const EFI_IMAGE_SECURITY_DATABASE_GUID: Guid = Guid::from_fields(
    0xD719B2CB,
    0x3D3A,
    0x4596,
    0xA3,
    0xBC,
    &[0xDA, 0xD0, 0x0E, 0x67, 0x65, 0x6F],
);

/// Platform Key variable name (UCS-2)
const PK_NAME: &[u16] = &[0x50, 0x4B, 0x00]; // "PK\0"

/// Key Exchange Key variable name (UCS-2)
const KEK_NAME: &[u16] = &[0x4B, 0x45, 0x4B, 0x00]; // "KEK\0"

/// Signature database variable name (UCS-2)
const DB_NAME: &[u16] = &[0x64, 0x62, 0x00]; // "db\0"

/// Forbidden signature database variable name (UCS-2)
const DBX_NAME: &[u16] = &[0x64, 0x62, 0x78, 0x00]; // "dbx\0"

/// An updatable Secure Boot variable
#[derive(Debug)]
pub struct VariableDescriptor {
    /// Canonical name
    pub name: &'static str,
    /// Canonical name as NUL-terminated UCS-2, ready for firmware calls
    pub wide_name: &'static [u16],
    /// Vendor GUID the variable is stored under
    pub vendor: Guid,
    /// Attributes required for an authenticated write
    pub attributes: u32,
}

/// The variables this tool knows how to update, in display order
pub static SECURE_BOOT_VARIABLES: [VariableDescriptor; 4] = [
    VariableDescriptor {
        name: "PK",
        wide_name: PK_NAME,
        vendor: EFI_GLOBAL_VARIABLE_GUID,
        attributes: attributes::SECURE_BOOT_ATTRS,
    },
    VariableDescriptor {
        name: "KEK",
        wide_name: KEK_NAME,
        vendor: EFI_GLOBAL_VARIABLE_GUID,
        attributes: attributes::SECURE_BOOT_ATTRS,
    },
    VariableDescriptor {
        name: "db",
        wide_name: DB_NAME,
        vendor: EFI_IMAGE_SECURITY_DATABASE_GUID,
        attributes: attributes::SECURE_BOOT_ATTRS,
    },
    VariableDescriptor {
        name: "dbx",
        wide_name: DBX_NAME,
        vendor: EFI_IMAGE_SECURITY_DATABASE_GUID,
        attributes: attributes::SECURE_BOOT_ATTRS,
    },
];

/// Look up a variable by exact, case-sensitive name
pub fn lookup(name: &[u16]) -> Option<&'static VariableDescriptor> {
    SECURE_BOOT_VARIABLES
        .iter()
        .find(|var| ucs2_eq(name, var.wide_name))
}

/// Names of all known variables, in display order
pub fn names() -> impl Iterator<Item = &'static str> {
    SECURE_BOOT_VARIABLES.iter().map(|var| var.name)
}

/// Effective write attributes for a variable
pub fn write_attributes(var: &VariableDescriptor, append: bool) -> u32 {
    if append {
        var.attributes | attributes::APPEND_WRITE
    } else {
        var.attributes
    }
}
