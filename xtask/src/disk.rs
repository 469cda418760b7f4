//! Disk Image Creation
//!
//! This module creates FAT disk images holding update-vars.efi, payload files
//! and an optional `startup.nsh` for the UEFI shell. The image has no
//! partition table; OVMF mounts an unpartitioned FAT volume as `fs0:`.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Image size in KiB
const DISK_SIZE_KIB: u64 = 32 * 1024;

/// FAT volume label
const VOLUME_LABEL: &str = "UPDATEVARS";

/// Name of the application on the volume
const APP_NAME: &str = "update-vars.efi";

/// Create a FAT image with the application, payloads and startup script
///
/// # Arguments
/// * `output` - Path for the output disk image (replaced if it exists)
/// * `efi_app` - Built update-vars.efi
/// * `payloads` - Files copied to the volume root under their own names
/// * `startup` - Contents of `startup.nsh`, if any
pub fn create_disk(
    output: &Path,
    efi_app: &Path,
    payloads: &[PathBuf],
    startup: Option<&str>,
) -> Result<()> {
    println!("Creating disk: {}", output.display());

    for tool in ["mkfs.fat", "mcopy"] {
        if which(tool).is_none() {
            bail!("{} not found in PATH (install dosfstools and mtools)", tool);
        }
    }
    if !efi_app.exists() {
        bail!("EFI application not found: {}", efi_app.display());
    }

    // mkfs.fat -C refuses to overwrite
    if output.exists() {
        std::fs::remove_file(output)
            .with_context(|| format!("failed to remove {}", output.display()))?;
    }

    let status = Command::new("mkfs.fat")
        .arg("-C")
        .args(["-n", VOLUME_LABEL])
        .arg(output)
        .arg(DISK_SIZE_KIB.to_string())
        .status()
        .context("Failed to run mkfs.fat")?;
    if !status.success() {
        bail!("mkfs.fat failed");
    }

    copy_to_root(output, efi_app, APP_NAME)?;

    for payload in payloads {
        let name = payload
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("invalid payload path: {}", payload.display()))?;
        if !payload.is_file() {
            bail!("Payload not found: {}", payload.display());
        }
        copy_to_root(output, payload, name)?;
    }

    if let Some(script) = startup {
        let temp = tempfile::NamedTempFile::new()?;
        std::fs::write(temp.path(), to_shell_script(script))?;
        copy_to_root(output, temp.path(), "startup.nsh")?;
    }

    println!("Created: {}", output.display());
    Ok(())
}

/// Copy a host file to the root of the FAT image
fn copy_to_root(disk: &Path, source: &Path, name: &str) -> Result<()> {
    let status = Command::new("mcopy")
        .arg("-o")
        .arg("-i")
        .arg(disk)
        .arg(source)
        .arg(format!("::/{}", name))
        .status()
        .context("Failed to run mcopy")?;

    if !status.success() {
        bail!("Failed to copy {} to disk", source.display());
    }
    println!("Installed {} as {}", source.display(), name);
    Ok(())
}

/// The shell expects CRLF line endings
fn to_shell_script(script: &str) -> String {
    script
        .lines()
        .map(|line| format!("{}\r\n", line))
        .collect()
}

/// Find a command in PATH
fn which(cmd: &str) -> Option<String> {
    Command::new("which")
        .arg(cmd)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which() {
        // `ls` should exist on any Unix system
        assert!(which("ls").is_some());
        // This should not exist
        assert!(which("nonexistent_command_12345").is_none());
    }

    #[test]
    fn test_shell_script_line_endings() {
        assert_eq!(to_shell_script("fs0:\nreset -s\n"), "fs0:\r\nreset -s\r\n");
        assert_eq!(to_shell_script("fs0:\r\nls"), "fs0:\r\nls\r\n");
    }
}
