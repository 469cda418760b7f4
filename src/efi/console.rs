//! Console output
//!
//! Text output through the firmware's Simple Text Output protocol. Rust
//! strings are converted to UCS-2 in small stack chunks, so printing does not
//! need the allocator.

use core::fmt;
use r_efi::efi::{Char16, SystemTable};
use r_efi::protocols::simple_text_output::Protocol as SimpleTextOutput;
use spin::Mutex;

/// Global console instance
static CONSOLE: Mutex<Option<Console>> = Mutex::new(None);

/// Characters per output call, terminator included
const CHUNK_LEN: usize = 128;

/// Console wrapper for EFI text output
pub struct Console {
    con_out: *mut SimpleTextOutput,
}

// SAFETY: UEFI applications run on a single processor with no preemption;
// the protocol pointer is only ever used from that one thread.
unsafe impl Send for Console {}

impl Console {
    /// Create a console from the system table's `ConOut`
    ///
    /// # Safety
    ///
    /// `system_table` must be null or point at a valid system table.
    pub unsafe fn new(system_table: *mut SystemTable) -> Self {
        let con_out = if system_table.is_null() {
            core::ptr::null_mut()
        } else {
            unsafe { (*system_table).con_out }
        };
        Self { con_out }
    }

    /// Print a string, translating `\n` to CRLF
    pub fn print(&mut self, s: &str) {
        if self.con_out.is_null() {
            return;
        }

        let mut buffer: [Char16; CHUNK_LEN] = [0; CHUNK_LEN];
        let mut len = 0;

        for unit in Ucs2Units::new(s) {
            // Leave room for a possible CR plus the terminator
            if len >= CHUNK_LEN - 2 {
                buffer[len] = 0;
                self.output_buffer(&buffer);
                len = 0;
            }
            if unit == '\n' as Char16 {
                buffer[len] = '\r' as Char16;
                len += 1;
            }
            buffer[len] = unit;
            len += 1;
        }

        if len > 0 {
            buffer[len] = 0;
            self.output_buffer(&buffer);
        }
    }

    /// Output a null-terminated UCS-2 buffer
    fn output_buffer(&self, buffer: &[Char16]) {
        unsafe {
            let output_string = (*self.con_out).output_string;
            output_string(self.con_out, buffer.as_ptr() as *mut Char16);
        }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.print(s);
        Ok(())
    }
}

/// UCS-2 code units for a string; characters outside the BMP become `?`
struct Ucs2Units<'a> {
    chars: core::str::Chars<'a>,
}

impl<'a> Ucs2Units<'a> {
    fn new(s: &'a str) -> Self {
        Self { chars: s.chars() }
    }
}

impl Iterator for Ucs2Units<'_> {
    type Item = Char16;

    fn next(&mut self) -> Option<Char16> {
        self.chars.next().map(|c| {
            if (c as u32) <= 0xFFFF {
                c as Char16
            } else {
                '?' as Char16
            }
        })
    }
}

/// Install the global console from the system table
///
/// # Safety
///
/// Same requirements as [`Console::new`].
pub unsafe fn init(system_table: *mut SystemTable) {
    *CONSOLE.lock() = Some(unsafe { Console::new(system_table) });
}

/// Run a closure with the global console, if there is one
pub fn with_console<R>(f: impl FnOnce(&mut Console) -> R) -> Option<R> {
    CONSOLE.lock().as_mut().map(f)
}

/// Write formatted output to the global console
pub fn write_fmt(args: fmt::Arguments) {
    with_console(|console| {
        let _ = fmt::Write::write_fmt(console, args);
    });
}

/// `fmt::Write` handle on the global console
///
/// Takes the lock per write, so it can be held across code that logs.
pub struct GlobalConsole;

impl fmt::Write for GlobalConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        with_console(|console| console.print(s));
        Ok(())
    }
}

/// Macro for printing to the firmware console
#[macro_export]
macro_rules! console_print {
    ($($arg:tt)*) => {
        $crate::efi::console::write_fmt(format_args!($($arg)*))
    };
}

/// Macro for printing to the firmware console with newline
#[macro_export]
macro_rules! console_println {
    () => ($crate::console_print!("\n"));
    ($($arg:tt)*) => ($crate::console_print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ucs2_units() {
        let units: Vec<Char16> = Ucs2Units::new("db\u{1F980}").collect();
        assert_eq!(units, ['d' as Char16, 'b' as Char16, '?' as Char16]);
    }

    #[test]
    fn test_null_console_is_silent() {
        let mut console = unsafe { Console::new(core::ptr::null_mut()) };
        console.print("nothing to see\n");
        assert!(fmt::Write::write_str(&mut console, "still nothing").is_ok());
    }
}
