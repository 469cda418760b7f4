//! UCS-2 string utilities
//!
//! Firmware strings are NUL-terminated UCS-2. Arguments coming out of the
//! tokenizer are plain `&[u16]` slices without a terminator.

use alloc::string::String;
use core::fmt;

/// Longest path (in UCS-2 code units, terminator included) handed to firmware
pub const MAX_PATH_LEN: usize = 512;

/// NUL-terminated UCS-2 buffer suitable for passing to firmware
pub type Ucs2Path = heapless::Vec<u16, MAX_PATH_LEN>;

/// Get the effective length of a UCS-2 string slice (not including null terminator)
///
/// Returns the position of the first null terminator, or the slice length if no null found.
#[inline]
pub fn ucs2_len(s: &[u16]) -> usize {
    s.iter().position(|&c| c == 0).unwrap_or(s.len())
}

/// Compare two UCS-2 string slices for equality
///
/// Compares up to the first null terminator in each string.
#[inline]
pub fn ucs2_eq(a: &[u16], b: &[u16]) -> bool {
    a[..ucs2_len(a)] == b[..ucs2_len(b)]
}

/// Copy a UCS-2 slice into a NUL-terminated buffer
///
/// Returns `None` if the string (plus terminator) does not fit.
pub fn to_nul_terminated(s: &[u16]) -> Option<Ucs2Path> {
    let s = &s[..ucs2_len(s)];
    let mut out = Ucs2Path::new();
    out.extend_from_slice(s).ok()?;
    out.push(0).ok()?;
    Some(out)
}

/// Decode a UCS-2 slice into a `String`, replacing unpaired surrogates
pub fn to_string(s: &[u16]) -> String {
    Ucs2Display(s).to_string_lossy()
}

/// `Display` adapter for UCS-2 slices
///
/// Stops at the first NUL. Unpaired surrogates are shown as U+FFFD.
#[derive(Clone, Copy)]
pub struct Ucs2Display<'a>(pub &'a [u16]);

impl Ucs2Display<'_> {
    fn to_string_lossy(self) -> String {
        char::decode_utf16(self.0[..ucs2_len(self.0)].iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl fmt::Display for Ucs2Display<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use core::fmt::Write;

        for c in char::decode_utf16(self.0[..ucs2_len(self.0)].iter().copied()) {
            f.write_char(c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}
