//! Authentication descriptor inspection
//!
//! Every payload written with `TIME_BASED_AUTHENTICATED_WRITE_ACCESS` starts
//! with an `EFI_VARIABLE_AUTHENTICATION_2` header: a timestamp followed by a
//! `WIN_CERTIFICATE_UEFI_GUID` wrapping a PKCS#7 signature. The firmware checks
//! the signature. We only read the header so the log shows what is about to be
//! submitted and so an obviously malformed file stands out before the firmware
//! rejects it.
//!
//! Note: GUIDs inside packed structures are kept as raw bytes because
//! `r_efi::efi::Guid` is 4-byte aligned.

use core::fmt;
use r_efi::efi::Guid;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// WIN_CERTIFICATE revision
pub const WIN_CERT_REVISION: u16 = 0x0200;

/// WIN_CERTIFICATE type for EFI GUID
pub const WIN_CERT_TYPE_EFI_GUID: u16 = 0x0EF1;

/// Certificate Type GUID for PKCS#7 signatures
pub const EFI_CERT_TYPE_PKCS7_GUID: Guid = Guid::from_fields(
    0x4AAFD29D,
    0x68DF,
    0x49EE,
    0x8A,
    0xA9,
    &[0x34, 0x7D, 0x37, 0x56, 0x65, 0xA7],
);

/// EFI_TIME structure
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct EfiTime {
    /// Year (1900 - 9999)
    pub year: u16,
    /// Month (1 - 12)
    pub month: u8,
    /// Day (1 - 31)
    pub day: u8,
    /// Hour (0 - 23)
    pub hour: u8,
    /// Minute (0 - 59)
    pub minute: u8,
    /// Second (0 - 59)
    pub second: u8,
    /// Padding
    pub pad1: u8,
    /// Nanoseconds (must be zero in an authentication descriptor)
    pub nanosecond: u32,
    /// Timezone (must be zero in an authentication descriptor)
    pub timezone: i16,
    /// Daylight savings flags (must be zero in an authentication descriptor)
    pub daylight: u8,
    /// Padding
    pub pad2: u8,
}

impl fmt::Display for EfiTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Copy out of the packed struct before formatting
        let (year, month, day) = (self.year, self.month, self.day);
        let (hour, minute, second) = (self.hour, self.minute, self.second);
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )
    }
}

/// WIN_CERTIFICATE header
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct WinCertificate {
    /// Total length of the certificate including header
    pub length: u32,
    /// Certificate revision
    pub revision: u16,
    /// Certificate type
    pub certificate_type: u16,
}

/// WIN_CERTIFICATE_UEFI_GUID header
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct WinCertificateUefiGuid {
    pub hdr: WinCertificate,
    /// Certificate type GUID, raw bytes
    pub cert_type: [u8; 16],
}

impl WinCertificateUefiGuid {
    /// Size of the header, signature data excluded
    pub const HEADER_SIZE: usize = core::mem::size_of::<Self>();
}

/// EFI_VARIABLE_AUTHENTICATION_2 header
///
/// The signature data follows `auth_info`, then the new variable contents.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VariableAuthentication2 {
    pub time_stamp: EfiTime,
    pub auth_info: WinCertificateUefiGuid,
}

/// Reasons a payload does not look like an authentication descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    /// Shorter than the fixed header
    Truncated,
    /// `WIN_CERTIFICATE` revision is not 0x0200
    BadRevision(u16),
    /// `WIN_CERTIFICATE` type is not `WIN_CERT_TYPE_EFI_GUID`
    UnsupportedCertificateType(u16),
    /// Certificate type GUID is not PKCS#7
    NotPkcs7,
    /// Certificate length does not fit in the payload
    LengthOutOfRange(u32),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Truncated => f.write_str("shorter than an authentication header"),
            DescriptorError::BadRevision(rev) => write!(f, "certificate revision {:#06x}", rev),
            DescriptorError::UnsupportedCertificateType(ty) => {
                write!(f, "certificate type {:#06x}", ty)
            }
            DescriptorError::NotPkcs7 => f.write_str("certificate is not PKCS#7"),
            DescriptorError::LengthOutOfRange(len) => {
                write!(f, "certificate length {} out of range", len)
            }
        }
    }
}

/// What an authentication descriptor says about its payload
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSummary {
    /// Timestamp the firmware will compare against the stored one
    pub timestamp: EfiTime,
    /// Size of the PKCS#7 signature
    pub signature_len: usize,
    /// Size of the variable contents after the descriptor
    pub content_len: usize,
}

/// Read the authentication descriptor at the start of a payload
pub fn inspect(payload: &[u8]) -> Result<DescriptorSummary, DescriptorError> {
    let (auth, _) =
        VariableAuthentication2::ref_from_prefix(payload).map_err(|_| DescriptorError::Truncated)?;

    let revision = auth.auth_info.hdr.revision;
    if revision != WIN_CERT_REVISION {
        return Err(DescriptorError::BadRevision(revision));
    }

    let cert_type = auth.auth_info.hdr.certificate_type;
    if cert_type != WIN_CERT_TYPE_EFI_GUID {
        return Err(DescriptorError::UnsupportedCertificateType(cert_type));
    }

    if auth.auth_info.cert_type[..] != EFI_CERT_TYPE_PKCS7_GUID.as_bytes()[..] {
        return Err(DescriptorError::NotPkcs7);
    }

    let length = auth.auth_info.hdr.length;
    let descriptor_len = core::mem::size_of::<EfiTime>() + length as usize;
    if (length as usize) < WinCertificateUefiGuid::HEADER_SIZE || descriptor_len > payload.len() {
        return Err(DescriptorError::LengthOutOfRange(length));
    }

    Ok(DescriptorSummary {
        timestamp: auth.time_stamp,
        signature_len: length as usize - WinCertificateUefiGuid::HEADER_SIZE,
        content_len: payload.len() - descriptor_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a descriptor with `sig_len` signature bytes and `content` after it
    fn descriptor(sig_len: usize, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        // EFI_TIME: 2026-10-19 08:30:00
        out.extend_from_slice(&2026u16.to_le_bytes());
        out.extend_from_slice(&[10, 19, 8, 30, 0, 0]);
        out.extend_from_slice(&[0; 8]);
        // WIN_CERTIFICATE_UEFI_GUID
        let length = (WinCertificateUefiGuid::HEADER_SIZE + sig_len) as u32;
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&WIN_CERT_REVISION.to_le_bytes());
        out.extend_from_slice(&WIN_CERT_TYPE_EFI_GUID.to_le_bytes());
        out.extend_from_slice(EFI_CERT_TYPE_PKCS7_GUID.as_bytes());
        out.extend(core::iter::repeat_n(0x30, sig_len));
        out.extend_from_slice(content);
        out
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(core::mem::size_of::<EfiTime>(), 16);
        assert_eq!(WinCertificateUefiGuid::HEADER_SIZE, 24);
        assert_eq!(core::mem::size_of::<VariableAuthentication2>(), 40);
    }

    #[test]
    fn test_inspect_valid_descriptor() {
        let payload = descriptor(3, &[1, 2, 3, 4, 5]);
        let summary = inspect(&payload).unwrap();
        assert_eq!(summary.signature_len, 3);
        assert_eq!(summary.content_len, 5);
        assert_eq!(summary.timestamp.to_string(), "2026-10-19 08:30:00");
    }

    #[test]
    fn test_inspect_truncated() {
        assert_eq!(inspect(&[0u8; 39]).unwrap_err(), DescriptorError::Truncated);
        assert_eq!(inspect(&[]).unwrap_err(), DescriptorError::Truncated);
    }

    #[test]
    fn test_inspect_bad_revision() {
        let mut payload = descriptor(0, &[]);
        payload[20] = 0x00;
        payload[21] = 0x01;
        assert_eq!(inspect(&payload).unwrap_err(), DescriptorError::BadRevision(0x0100));
    }

    #[test]
    fn test_inspect_not_pkcs7() {
        let mut payload = descriptor(0, &[]);
        payload[24] ^= 0xFF;
        assert_eq!(inspect(&payload).unwrap_err(), DescriptorError::NotPkcs7);
    }

    #[test]
    fn test_inspect_length_overrun() {
        let mut payload = descriptor(4, &[]);
        // Claim one more signature byte than present
        payload[16] += 1;
        assert_eq!(
            inspect(&payload).unwrap_err(),
            DescriptorError::LengthOutOfRange(29)
        );
    }
}
