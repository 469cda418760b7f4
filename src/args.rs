//! Load option tokenizer
//!
//! A UEFI application receives its command line from the loader as one flat
//! buffer of UCS-2 characters, e.g. `update-vars.efi -a db db.auth`. This
//! module splits that buffer at spaces into an argument vector without copying
//! any of the text: the vector owns the buffer and every argument is a range
//! into it, so a borrowed argument can never outlive the characters it points
//! at.

use alloc::vec::Vec;
use core::ops::Range;

use crate::error::UpdateError;

/// Argument separator
const SPACE: u16 = b' ' as u16;

/// A command line split into arguments
///
/// Element 0 is the name the image was invoked as; the rest are flags and
/// positional arguments in order.
pub struct ArgumentVector {
    buffer: Vec<u16>,
    tokens: Vec<Range<usize>>,
}

impl ArgumentVector {
    /// Split a load options buffer into arguments
    ///
    /// The whole buffer is scanned; a terminator the shell included in the
    /// options size stays at the end of the last argument, where UCS-2
    /// comparisons and path conversion stop anyway. A buffer with `k` spaces
    /// yields exactly `k + 1` arguments. Consecutive spaces yield empty
    /// arguments; contents are not validated.
    pub fn parse(buffer: Vec<u16>) -> Result<Self, UpdateError> {
        let separators = buffer.iter().filter(|&&c| c == SPACE).count();

        let mut tokens = Vec::new();
        tokens
            .try_reserve_exact(separators + 1)
            .map_err(|_| UpdateError::ResourceExhaustion {
                what: "argument vector",
            })?;

        let mut start = 0;
        for (i, &c) in buffer.iter().enumerate() {
            if c == SPACE {
                tokens.push(start..i);
                start = i + 1;
            }
        }
        tokens.push(start..buffer.len());

        Ok(Self { buffer, tokens })
    }

    /// Number of arguments, program name included
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false: the program name is always present, even if empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Get an argument by index, `None` if out of range
    pub fn get(&self, index: usize) -> Option<&[u16]> {
        self.tokens
            .get(index)
            .map(|range| &self.buffer[range.clone()])
    }

    /// The name the image was invoked as
    pub fn program_name(&self) -> &[u16] {
        self.get(0).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efi::utils::{to_nul_terminated, to_string};
    use crate::vars;

    fn parse(s: &str) -> ArgumentVector {
        ArgumentVector::parse(s.encode_utf16().collect()).unwrap()
    }

    fn collect(argv: &ArgumentVector) -> Vec<String> {
        (0..argv.len())
            .map(|i| String::from_utf16(argv.get(i).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn test_split_command_line() {
        let argv = parse("update.efi -a db db.auth");
        assert_eq!(collect(&argv), ["update.efi", "-a", "db", "db.auth"]);
        assert_eq!(String::from_utf16(argv.program_name()).unwrap(), "update.efi");
    }

    #[test]
    fn test_token_count_is_spaces_plus_one() {
        let lines = [
            "",
            "update.efi",
            "update.efi KEK",
            "update.efi KEK KEK.auth",
            " leading",
            "trailing ",
            "a  b   c",
            "   ",
            "update.efi\0 KEK KEK.auth",
            "update.efi KEK KEK.auth\0",
        ];

        for line in lines {
            let argv = parse(line);
            let spaces = line.chars().filter(|&c| c == ' ').count();
            assert_eq!(argv.len(), spaces + 1, "line {:?}", line);
            // Rejoining with single spaces restores the original text
            assert_eq!(collect(&argv).join(" "), line);
        }
    }

    #[test]
    fn test_no_spaces_is_program_name_only() {
        let argv = parse("update.efi");
        assert_eq!(argv.len(), 1);
        assert!(argv.get(1).is_none());
        assert!(argv.get(usize::MAX).is_none());
    }

    #[test]
    fn test_repeated_separators_give_empty_tokens() {
        let argv = parse("update.efi  KEK");
        assert_eq!(collect(&argv), ["update.efi", "", "KEK"]);
    }

    #[test]
    fn test_terminator_stays_in_last_token() {
        let mut buffer: Vec<u16> = "update.efi dbx PK.auth".encode_utf16().collect();
        buffer.push(0);

        let argv = ArgumentVector::parse(buffer).unwrap();
        assert_eq!(argv.len(), 3);
        assert_eq!(collect(&argv), ["update.efi", "dbx", "PK.auth\0"]);

        // Consumers stop at the terminator
        let file = argv.get(2).unwrap();
        assert_eq!(to_string(file), "PK.auth");
        assert_eq!(to_nul_terminated(file).unwrap().len(), 8);

        // ...including a terminator on the variable name itself
        let argv = ArgumentVector::parse("update.efi x dbx\0".encode_utf16().collect()).unwrap();
        assert_eq!(vars::lookup(argv.get(2).unwrap()).unwrap().name, "dbx");
    }

    #[test]
    fn test_empty_load_options() {
        let argv = ArgumentVector::parse(Vec::new()).unwrap();
        assert_eq!(argv.len(), 1);
        assert!(argv.program_name().is_empty());
        assert!(!argv.is_empty());
    }
}
