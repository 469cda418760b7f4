//! Variable update orchestration
//!
//! One run of the application:
//!
//! 1. Scan flags (`-a`, `-g <guid>`) off the front of the argument vector
//! 2. Require exactly two positionals: variable name and payload file
//! 3. Resolve the variable in [`crate::vars`]
//! 4. Load the payload file
//! 5. Write it with the variable's attributes, plus `APPEND_WRITE` for `-a`
//!
//! Every step fails fast with an [`UpdateError`]; nothing is retried and
//! nothing is rolled back. Whether the payload is accepted is decided by the
//! firmware's own authentication path.

use alloc::vec::Vec;
use core::fmt;
use r_efi::efi::Status;

use crate::args::ArgumentVector;
use crate::auth;
use crate::efi::utils::{to_string, Ucs2Display};
use crate::error::{StatusName, UpdateError};
use crate::files::FileLoader;
use crate::store::VariableStore;
use crate::vars::{self, VariableDescriptor};

const DASH: u16 = b'-' as u16;

/// `-a`: append instead of replace
const APPEND_FLAG: &[u16] = &[DASH, b'a' as u16];

/// `-g <guid>`: owner GUID
const OWNER_FLAG: &[u16] = &[DASH, b'g' as u16];

/// Command line after flag parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// Name the image was invoked as
    pub program: &'a [u16],
    /// `-a` was given
    pub append: bool,
    /// Value given with `-g`, if any
    pub owner: Option<&'a [u16]>,
    /// Variable name positional
    pub variable: &'a [u16],
    /// Payload file positional
    pub file: &'a [u16],
}

/// Parse flags and positionals
///
/// Flags are consumed while the next argument starts with `-`. An
/// unrecognised flag ends the scan and is treated as the first positional.
/// Exactly two positionals must remain.
pub fn parse_invocation(args: &ArgumentVector) -> Result<Invocation<'_>, UpdateError> {
    let program = args.program_name();
    let mut append = false;
    let mut owner = None;
    let mut next = 1;

    while let Some(arg) = args.get(next)
        && arg.first() == Some(&DASH)
    {
        if arg == APPEND_FLAG {
            append = true;
            next += 1;
        } else if arg == OWNER_FLAG {
            owner = args.get(next + 1);
            next += 2;
        } else {
            break;
        }
    }

    let usage = || UpdateError::ArgumentParse {
        program: to_string(program),
    };

    if args.len().saturating_sub(next) != 2 {
        return Err(usage());
    }
    let (Some(variable), Some(file)) = (args.get(next), args.get(next + 1)) else {
        return Err(usage());
    };

    Ok(Invocation {
        program,
        append,
        owner,
        variable,
        file,
    })
}

/// A resolved update, ready to be written
#[derive(Debug)]
pub struct UpdateRequest<'a> {
    /// Target variable
    pub variable: &'static VariableDescriptor,
    /// Attributes for the write, append bit included
    pub attributes: u32,
    /// Payload file
    pub file: &'a [u16],
    /// Value of `-g`
    ///
    /// Accepted on the command line but not used: the vendor GUID always
    /// comes from the variable table.
    pub owner_override: Option<&'a [u16]>,
}

impl<'a> UpdateRequest<'a> {
    /// Resolve the variable named on the command line
    pub fn resolve(invocation: &Invocation<'a>) -> Result<Self, UpdateError> {
        let variable =
            vars::lookup(invocation.variable).ok_or_else(|| UpdateError::UnknownVariable {
                name: to_string(invocation.variable),
            })?;

        Ok(Self {
            variable,
            attributes: vars::write_attributes(variable, invocation.append),
            file: invocation.file,
            owner_override: invocation.owner,
        })
    }
}

/// Read the whole payload file
pub fn load_payload<F: FileLoader>(files: &mut F, path: &[u16]) -> Result<Vec<u8>, UpdateError> {
    let mut file = files.open(path).map_err(|status| UpdateError::FileOpen {
        path: to_string(path),
        status,
    })?;

    files.read_all(&mut file).map_err(|status| match status {
        Status::OUT_OF_RESOURCES => UpdateError::ResourceExhaustion {
            what: "payload buffer",
        },
        status => UpdateError::FileRead {
            path: to_string(path),
            status,
        },
    })
}

/// Run one update from an already tokenized command line
pub fn run<S, F>(args: &ArgumentVector, store: &mut S, files: &mut F) -> Result<(), UpdateError>
where
    S: VariableStore,
    F: FileLoader,
{
    let invocation = parse_invocation(args)?;
    let request = UpdateRequest::resolve(&invocation)?;
    let var = request.variable;

    if let Some(owner) = request.owner_override {
        log::warn!(
            "Ignoring -g {}: {} is always written under its standard vendor GUID",
            Ucs2Display(owner),
            var.name
        );
    }

    let payload = load_payload(files, request.file)?;
    log::info!(
        "Loaded {} bytes from {} for {}",
        payload.len(),
        Ucs2Display(request.file),
        var.name
    );

    match auth::inspect(&payload) {
        Ok(summary) => log::debug!(
            "Authentication descriptor: timestamp {}, {} byte signature, {} bytes of data",
            summary.timestamp,
            summary.signature_len,
            summary.content_len
        ),
        Err(e) => log::warn!(
            "{} does not start with a valid authentication descriptor ({}); the firmware will likely reject it",
            Ucs2Display(request.file),
            e
        ),
    }

    log::debug!(
        "SetVariable({}, attributes={:#x}, size={})",
        var.name,
        request.attributes,
        payload.len()
    );
    store
        .set_variable(var.wide_name, &var.vendor, request.attributes, &payload)
        .map_err(|status| UpdateError::VariableWrite {
            name: var.name,
            status,
        })?;
    drop(payload);

    match read_back(store, var) {
        Ok(state) => log::info!("{} {}", var.name, state),
        Err(status) => log::warn!(
            "{} updated but could not be read back: {}",
            var.name,
            StatusName(status)
        ),
    }

    Ok(())
}

/// What the store holds for a variable after a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBack {
    /// The variable exists with this size and these attributes
    Stored { len: usize, attributes: u32 },
    /// The store reports the variable as not found
    Deleted,
}

impl fmt::Display for ReadBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadBack::Stored { len, attributes } => {
                write!(f, "updated, now {} bytes (attributes {:#x})", len, attributes)
            }
            ReadBack::Deleted => f.write_str("deleted"),
        }
    }
}

/// Read a variable back after writing it
pub fn read_back<S: VariableStore>(
    store: &mut S,
    var: &VariableDescriptor,
) -> Result<ReadBack, Status> {
    Ok(match store.get_variable(var.wide_name, &var.vendor)? {
        Some(stored) => ReadBack::Stored {
            len: stored.data.len(),
            attributes: stored.attributes,
        },
        None => ReadBack::Deleted,
    })
}

/// Run one update from the raw load options buffer
///
/// Returns the status the application should exit with. Failures are
/// reported to `console` before returning.
pub fn execute<S, F, W>(options: Vec<u16>, store: &mut S, files: &mut F, console: &mut W) -> Status
where
    S: VariableStore,
    F: FileLoader,
    W: fmt::Write,
{
    use core::fmt::Write as _;

    let result = ArgumentVector::parse(options).and_then(|args| run(&args, store, files));

    match result {
        Ok(()) => Status::SUCCESS,
        Err(err) => {
            log::debug!("Update failed: {:?}", err);
            let _ = writeln!(console, "{}", err);
            err.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryFiles;
    use crate::store::MemoryStore;
    use crate::vars::{attributes, EFI_GLOBAL_VARIABLE_GUID, EFI_IMAGE_SECURITY_DATABASE_GUID};

    fn argv(s: &str) -> ArgumentVector {
        ArgumentVector::parse(s.encode_utf16().collect()).unwrap()
    }

    fn text(s: &[u16]) -> String {
        String::from_utf16(s).unwrap()
    }

    fn files() -> MemoryFiles {
        MemoryFiles::new()
            .with_file("KEK.auth", &[0xAA; 100])
            .with_file("db.auth", &[0x55; 1234])
    }

    #[test]
    fn test_parse_plain() {
        let args = argv("update.efi KEK KEK.auth");
        let inv = parse_invocation(&args).unwrap();
        assert_eq!(text(inv.program), "update.efi");
        assert!(!inv.append);
        assert!(inv.owner.is_none());
        assert_eq!(text(inv.variable), "KEK");
        assert_eq!(text(inv.file), "KEK.auth");
    }

    #[test]
    fn test_parse_flags() {
        let args = argv("update.efi -g 12345678-0000-0000-0000-000000000000 -a db db.auth");
        let inv = parse_invocation(&args).unwrap();
        assert!(inv.append);
        assert_eq!(
            text(inv.owner.unwrap()),
            "12345678-0000-0000-0000-000000000000"
        );
        assert_eq!(text(inv.variable), "db");
        assert_eq!(text(inv.file), "db.auth");
    }

    #[test]
    fn test_unknown_flag_stops_scan() {
        // "-x" becomes the variable name, not an error
        let args = argv("update.efi -x db.auth");
        let inv = parse_invocation(&args).unwrap();
        assert_eq!(text(inv.variable), "-x");
        assert_eq!(text(inv.file), "db.auth");

        // ...and is then rejected as an unknown variable
        let mut store = MemoryStore::new();
        let mut files = files();
        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert_eq!(
            err,
            UpdateError::UnknownVariable {
                name: String::from("-x")
            }
        );
    }

    #[test]
    fn test_wrong_argument_counts() {
        for line in [
            "update.efi",
            "update.efi KEK",
            "update.efi -a KEK",
            "update.efi KEK extra1 extra2",
            "update.efi -g",
            "update.efi -a -g",
            "update.efi KEK KEK.auth ",
        ] {
            let args = argv(line);
            let err = parse_invocation(&args).unwrap_err();
            assert_eq!(
                err,
                UpdateError::ArgumentParse {
                    program: String::from("update.efi")
                },
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_usage_message_names_program() {
        let args = argv("\\EFI\\tools\\UpdateVars.efi KEK");
        let err = parse_invocation(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Usage: \\EFI\\tools\\UpdateVars.efi: [-g guid] [-a] var file"
        );
    }

    #[test]
    fn test_extra_arguments_fail_before_file_io() {
        let args = argv("update.efi KEK extra1 extra2");
        let mut store = MemoryStore::new();
        let mut files = files();

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert!(matches!(err, UpdateError::ArgumentParse { .. }));
        assert_eq!(files.opens, 0);
        assert_eq!(files.reads, 0);
        assert!(store.writes.is_empty());
    }

    #[test]
    fn test_unknown_variable() {
        let args = argv("update.efi Trash KEK.auth");
        let mut store = MemoryStore::new();
        let mut files = files();

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert!(err.to_string().contains("Variable must be one of: PK KEK db dbx"));
        assert_eq!(Status::from(err), Status::INVALID_PARAMETER);
        assert_eq!(files.opens, 0);
        assert!(store.writes.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let args = argv("update.efi db missing.auth");
        let mut store = MemoryStore::new();
        let mut files = files();

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert_eq!(
            err,
            UpdateError::FileOpen {
                path: String::from("missing.auth"),
                status: Status::NOT_FOUND
            }
        );
        assert!(store.writes.is_empty());
    }

    #[test]
    fn test_read_failure() {
        let args = argv("update.efi db db.auth");
        let mut store = MemoryStore::new();
        let mut files = files();
        files.fail_reads_with = Some(Status::DEVICE_ERROR);

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert_eq!(
            err,
            UpdateError::FileRead {
                path: String::from("db.auth"),
                status: Status::DEVICE_ERROR
            }
        );
        assert!(store.writes.is_empty());
    }

    #[test]
    fn test_payload_allocation_failure() {
        let args = argv("update.efi db db.auth");
        let mut store = MemoryStore::new();
        let mut files = files();
        files.fail_reads_with = Some(Status::OUT_OF_RESOURCES);

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert!(matches!(err, UpdateError::ResourceExhaustion { .. }));
        assert!(store.writes.is_empty());
    }

    #[test]
    fn test_successful_write() {
        let args = argv("update.efi KEK KEK.auth");
        let mut store = MemoryStore::new();
        let mut files = files();

        run(&args, &mut store, &mut files).unwrap();

        assert_eq!(store.writes.len(), 1);
        let write = &store.writes[0];
        assert_eq!(write.name, "KEK");
        assert_eq!(write.vendor, EFI_GLOBAL_VARIABLE_GUID);
        assert_eq!(write.attributes, attributes::SECURE_BOOT_ATTRS);
        assert_eq!(write.data.len(), 100);
    }

    #[test]
    fn test_append_sets_attribute() {
        let mut store = MemoryStore::new();
        let mut files = files();

        run(&argv("update.efi -a db db.auth"), &mut store, &mut files).unwrap();
        run(&argv("update.efi db db.auth"), &mut store, &mut files).unwrap();

        assert_eq!(store.writes.len(), 2);
        assert_eq!(store.writes[0].vendor, EFI_IMAGE_SECURITY_DATABASE_GUID);
        assert_ne!(store.writes[0].attributes & attributes::APPEND_WRITE, 0);
        assert_eq!(store.writes[1].attributes & attributes::APPEND_WRITE, 0);
        // Same payload either way
        assert_eq!(store.writes[0].data, store.writes[1].data);
        assert_eq!(store.writes[0].data.len(), 1234);
    }

    #[test]
    fn test_owner_override_is_inert() {
        let mut store = MemoryStore::new();
        let mut files = files();

        let args = argv("update.efi -g d719b2cb-3d3a-4596-a3bc-dad00e67656f KEK KEK.auth");
        run(&args, &mut store, &mut files).unwrap();

        assert_eq!(store.writes[0].vendor, EFI_GLOBAL_VARIABLE_GUID);
    }

    #[test]
    fn test_write_rejected() {
        let args = argv("update.efi PK KEK.auth");
        let mut store = MemoryStore::new();
        store.reject_with = Some(Status::SECURITY_VIOLATION);
        let mut files = files();

        let err = run(&args, &mut store, &mut files).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to update variable PK: SECURITY_VIOLATION (0x800000000000001a)"
        );
        assert_eq!(Status::from(err), Status::SECURITY_VIOLATION);
        assert_eq!(store.writes.len(), 1);
    }

    #[test]
    fn test_read_back_after_write() {
        let mut store = MemoryStore::new();
        let mut files = files();

        run(&argv("update.efi KEK KEK.auth"), &mut store, &mut files).unwrap();

        let kek = vars::lookup(&"KEK".encode_utf16().collect::<Vec<_>>()).unwrap();
        let state = read_back(&mut store, kek).unwrap();
        assert_eq!(
            state,
            ReadBack::Stored {
                len: 100,
                attributes: attributes::SECURE_BOOT_ATTRS
            }
        );
        assert_eq!(state.to_string(), "updated, now 100 bytes (attributes 0x27)");
    }

    #[test]
    fn test_empty_payload_reads_back_as_deleted() {
        let mut store = MemoryStore::new();
        let mut files = files().with_file("empty.auth", &[]);

        run(&argv("update.efi db db.auth"), &mut store, &mut files).unwrap();
        run(&argv("update.efi db empty.auth"), &mut store, &mut files).unwrap();

        let db = vars::lookup(&"db".encode_utf16().collect::<Vec<_>>()).unwrap();
        let state = read_back(&mut store, db).unwrap();
        assert_eq!(state, ReadBack::Deleted);
        assert_eq!(state.to_string(), "deleted");
    }

    #[test]
    fn test_execute_reports_to_console() {
        let mut store = MemoryStore::new();
        let mut files = files();
        let mut console = String::new();

        let status = execute(
            "update.efi Trash KEK.auth".encode_utf16().collect(),
            &mut store,
            &mut files,
            &mut console,
        );

        assert_eq!(status, Status::INVALID_PARAMETER);
        assert_eq!(
            console,
            "Invalid Variable Trash\nVariable must be one of: PK KEK db dbx\n"
        );
    }

    #[test]
    fn test_execute_success_is_silent() {
        let mut store = MemoryStore::new();
        let mut files = files();
        let mut console = String::new();

        let mut options: Vec<u16> = "update.efi KEK KEK.auth".encode_utf16().collect();
        options.push(0);

        let status = execute(options, &mut store, &mut files, &mut console);
        assert_eq!(status, Status::SUCCESS);
        assert!(console.is_empty());
        assert_eq!(store.writes.len(), 1);
    }
}
