//! Error types for a variable update run
//!
//! Every step of a run fails fast with one of these. Each variant carries what
//! the operator needs to see (program name, file name, variable name or the
//! raw firmware status) and maps onto the `Status` the application exits with.

use alloc::string::String;
use core::fmt;
use r_efi::efi::Status;

use crate::vars;

/// Errors that abort a variable update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The loaded image protocol could not be queried for load options
    LoadOptions(Status),
    /// Wrong number of positional arguments after flag parsing
    ArgumentParse {
        /// Name the application was invoked as
        program: String,
    },
    /// Variable name is not one of the Secure Boot databases
    UnknownVariable {
        /// The name given on the command line
        name: String,
    },
    /// The payload file could not be opened
    FileOpen { path: String, status: Status },
    /// The payload file could not be read
    FileRead { path: String, status: Status },
    /// An allocation failed
    ResourceExhaustion {
        /// What was being allocated
        what: &'static str,
    },
    /// The firmware rejected the write
    VariableWrite { name: &'static str, status: Status },
}

impl From<UpdateError> for Status {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::LoadOptions(status) => status,
            UpdateError::ArgumentParse { .. } => Status::INVALID_PARAMETER,
            UpdateError::UnknownVariable { .. } => Status::INVALID_PARAMETER,
            UpdateError::FileOpen { status, .. } => status,
            UpdateError::FileRead { status, .. } => status,
            UpdateError::ResourceExhaustion { .. } => Status::OUT_OF_RESOURCES,
            UpdateError::VariableWrite { status, .. } => status,
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::LoadOptions(status) => {
                write!(f, "Failed to get arguments: {}", StatusName(*status))
            }
            UpdateError::ArgumentParse { program } => {
                write!(f, "Usage: {}: [-g guid] [-a] var file", program)
            }
            UpdateError::UnknownVariable { name } => {
                writeln!(f, "Invalid Variable {}", name)?;
                f.write_str("Variable must be one of:")?;
                for name in vars::names() {
                    write!(f, " {}", name)?;
                }
                Ok(())
            }
            UpdateError::FileOpen { path, status } => {
                write!(f, "Failed to open file {}: {}", path, StatusName(*status))
            }
            UpdateError::FileRead { path, status } => {
                write!(f, "Failed to read file {}: {}", path, StatusName(*status))
            }
            UpdateError::ResourceExhaustion { what } => {
                write!(f, "Out of resources allocating {}", what)
            }
            UpdateError::VariableWrite { name, status } => {
                write!(f, "Failed to update variable {}: {}", name, StatusName(*status))
            }
        }
    }
}

/// Displays an EFI status by name and raw value, e.g.
/// `NOT_FOUND (0x800000000000000e)`; statuses without a name show the raw
/// value alone
#[derive(Debug, Clone, Copy)]
pub struct StatusName(pub Status);

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            Status::SUCCESS => "SUCCESS",
            Status::LOAD_ERROR => "LOAD_ERROR",
            Status::INVALID_PARAMETER => "INVALID_PARAMETER",
            Status::UNSUPPORTED => "UNSUPPORTED",
            Status::BAD_BUFFER_SIZE => "BAD_BUFFER_SIZE",
            Status::BUFFER_TOO_SMALL => "BUFFER_TOO_SMALL",
            Status::NOT_READY => "NOT_READY",
            Status::DEVICE_ERROR => "DEVICE_ERROR",
            Status::WRITE_PROTECTED => "WRITE_PROTECTED",
            Status::OUT_OF_RESOURCES => "OUT_OF_RESOURCES",
            Status::VOLUME_CORRUPTED => "VOLUME_CORRUPTED",
            Status::VOLUME_FULL => "VOLUME_FULL",
            Status::NO_MEDIA => "NO_MEDIA",
            Status::NOT_FOUND => "NOT_FOUND",
            Status::ACCESS_DENIED => "ACCESS_DENIED",
            Status::SECURITY_VIOLATION => "SECURITY_VIOLATION",
            other => return write!(f, "{:#x}", other.as_usize()),
        };
        write!(f, "{} ({:#x})", name, self.0.as_usize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = UpdateError::ArgumentParse {
            program: String::from("update.efi"),
        };
        assert_eq!(Status::from(err), Status::INVALID_PARAMETER);

        let err = UpdateError::VariableWrite {
            name: "KEK",
            status: Status::SECURITY_VIOLATION,
        };
        assert_eq!(Status::from(err), Status::SECURITY_VIOLATION);

        let err = UpdateError::ResourceExhaustion { what: "payload" };
        assert_eq!(Status::from(err), Status::OUT_OF_RESOURCES);
    }

    #[test]
    fn test_write_error_carries_raw_status() {
        let err = UpdateError::VariableWrite {
            name: "db",
            status: Status::WRITE_PROTECTED,
        };
        assert_eq!(
            err.to_string(),
            "Failed to update variable db: WRITE_PROTECTED (0x8000000000000008)"
        );
    }

    #[test]
    fn test_unknown_variable_lists_names() {
        let err = UpdateError::UnknownVariable {
            name: String::from("Trash"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid Variable Trash\n"));
        assert!(msg.ends_with("Variable must be one of: PK KEK db dbx"));
    }

    #[test]
    fn test_status_name() {
        assert_eq!(
            StatusName(Status::NOT_FOUND).to_string(),
            "NOT_FOUND (0x800000000000000e)"
        );
        assert_eq!(
            StatusName(Status::SECURITY_VIOLATION).to_string(),
            "SECURITY_VIOLATION (0x800000000000001a)"
        );
        assert_eq!(StatusName(Status::SUCCESS).to_string(), "SUCCESS (0x0)");
        // Warning codes have no name in the table
        assert_eq!(StatusName(Status::WARN_UNKNOWN_GLYPH).to_string(), "0x1");
    }
}
