//! QEMU Runner
//!
//! This module runs update-vars under OVMF in QEMU and parses the serial
//! output of scripted shell sessions for test results.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Shell script for `xtask test`
///
/// Each line exercises one failure path; the final `reset -s` powers the
/// machine off so QEMU exits.
pub const TEST_SCRIPT: &str = "\
@echo -off
fs0:
echo === update-vars tests ===
update-vars.efi
update-vars.efi Trash none.auth
update-vars.efi db missing.auth
update-vars.efi -x db missing.auth
update-vars.efi -g 1234 db missing.auth
echo === update-vars done ===
reset -s
";

/// Expected output for each scripted invocation
const EXPECTATIONS: &[(&str, &str)] = &[
    ("script_started", r"=== update-vars tests ==="),
    ("usage_error", r"Usage: \S*: \[-g guid\] \[-a\] var file"),
    (
        "unknown_variable",
        r"Invalid Variable Trash\s+Variable must be one of: PK KEK db dbx",
    ),
    ("missing_file", r"Failed to open file missing\.auth"),
    (
        "plain_log_line",
        r"\[WARN \] update_vars::update: Ignoring -g 1234",
    ),
    ("script_finished", r"=== update-vars done ==="),
];

/// QEMU configuration
pub struct QemuConfig {
    /// OVMF code image
    pub ovmf_code: PathBuf,
    /// OVMF variable store template
    pub ovmf_vars: PathBuf,
    /// Run without graphical display
    pub headless: bool,
    /// Disable KVM acceleration
    pub disable_kvm: bool,
    /// Timeout in seconds (None = no timeout)
    pub timeout_secs: Option<u64>,
}

/// Check firmware images and copy the variable store template
///
/// Writes go to the copy, so every run starts from the template.
fn prepare_vars(config: &QemuConfig, dir: &Path) -> Result<PathBuf> {
    if !config.ovmf_code.exists() {
        bail!(
            "OVMF code image not found: {}\n\n\
            Install OVMF (e.g. the `ovmf` package) or pass --ovmf-code",
            config.ovmf_code.display()
        );
    }
    if !config.ovmf_vars.exists() {
        bail!(
            "OVMF variable store not found: {}\n\nPass --ovmf-vars",
            config.ovmf_vars.display()
        );
    }

    let vars = dir.join("OVMF_VARS.fd");
    std::fs::copy(&config.ovmf_vars, &vars).context("failed to copy OVMF variable store")?;
    Ok(vars)
}

/// Add machine, firmware, disk and acceleration arguments
fn add_machine_args(cmd: &mut Command, config: &QemuConfig, vars: &Path, disk: &Path) {
    cmd.args(["-machine", "q35"]);
    cmd.args(["-m", "256M"]);
    cmd.arg("-no-reboot");
    cmd.arg("-net").arg("none");

    cmd.args([
        "-drive",
        &format!(
            "if=pflash,format=raw,unit=0,readonly=on,file={}",
            config.ovmf_code.display()
        ),
    ]);
    cmd.args([
        "-drive",
        &format!("if=pflash,format=raw,unit=1,file={}", vars.display()),
    ]);
    cmd.args([
        "-drive",
        &format!("file={},format=raw,if=ide,index=0", disk.display()),
    ]);

    if !config.disable_kvm && is_kvm_available() {
        cmd.args(["-enable-kvm", "-cpu", "host"]);
    }
}

/// Check if KVM is available
fn is_kvm_available() -> bool {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/kvm")
        .is_ok()
}

/// Run QEMU interactively (for `xtask run`)
pub fn run_qemu(config: &QemuConfig, disk: &Path) -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let vars = prepare_vars(config, temp_dir.path())?;

    let mut cmd = Command::new("qemu-system-x86_64");
    add_machine_args(&mut cmd, config, &vars, disk);
    if config.headless {
        cmd.args(["-display", "none"]);
        cmd.args(["-chardev", "stdio,id=char0,mux=on,signal=off"]);
        cmd.args(["-serial", "chardev:char0"]);
        cmd.args(["-mon", "chardev=char0,mode=readline"]);
    } else {
        cmd.args(["-serial", "stdio"]);
    }

    println!("=== update-vars QEMU ===");
    println!("OVMF: {}", config.ovmf_code.display());
    println!("Disk: {}", disk.display());
    println!("Run `fs0:` then `update-vars.efi [-a] var file` in the shell");
    println!("Press Ctrl+A X to exit QEMU");
    println!("==========================================\n");

    let status = cmd.status().context("failed to run QEMU")?;
    if !status.success() {
        bail!("QEMU exited with status: {:?}", status.code());
    }

    Ok(())
}

/// Run the scripted integration tests in QEMU
pub fn run_tests(config: &QemuConfig, disk: &Path) -> Result<()> {
    println!("=== update-vars Integration Tests ===\n");

    println!("Running tests in QEMU...\n");
    let output = run_qemu_with_capture(config, disk)?;

    println!("\n=== Test Results ===");
    println!("Output captured: {} bytes", output.len());

    let mut passed = 0;
    let mut failed = 0;

    for (name, pattern) in EXPECTATIONS {
        let re = Regex::new(pattern).with_context(|| format!("bad pattern for {}", name))?;
        if re.is_match(&output) {
            println!("[PASS] {}", name);
            passed += 1;
        } else {
            println!("[FAIL] {}: expected /{}/ in output", name, pattern);
            failed += 1;
        }
    }

    // A bare ESC on the console comes out as '?'
    if output.contains("?[") {
        println!("[FAIL] no_escape_codes: console shows raw escape sequences");
        failed += 1;
    } else {
        println!("[PASS] no_escape_codes");
        passed += 1;
    }

    // Nothing in the script may crash the application
    if output.contains("PANIC") {
        println!("[FAIL] no_panic: application panicked");
        failed += 1;
    } else {
        println!("[PASS] no_panic");
        passed += 1;
    }

    println!("\n=== Summary ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);

    if failed > 0 {
        println!("\n--- Captured Output ---");
        println!("{}", output);
        bail!("{} test(s) failed", failed);
    }

    Ok(())
}

/// Run QEMU headless and capture serial output
fn run_qemu_with_capture(config: &QemuConfig, disk: &Path) -> Result<String> {
    let timeout = config.timeout_secs.unwrap_or(120);
    let temp_dir = tempfile::tempdir()?;
    let vars = prepare_vars(config, temp_dir.path())?;

    // Use the `timeout` command to enforce the timeout at the process level
    let mut cmd = Command::new("timeout");
    cmd.arg("--signal=KILL");
    cmd.arg(format!("{}s", timeout));
    cmd.arg("qemu-system-x86_64");
    add_machine_args(&mut cmd, config, &vars, disk);
    cmd.args(["-display", "none"]);
    cmd.args(["-serial", "stdio"]);

    let output = cmd.output().context("failed to execute QEMU via timeout")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    Ok(clean_output(&format!("{}\n{}", stdout, stderr)))
}

/// Strip ANSI escape codes and carriage returns from captured output
fn clean_output(raw: &str) -> String {
    let ansi_re = Regex::new(r"\x1b\[[0-9;]*[A-Za-z]|\x1b\[\?[0-9]*[hl]|\x1b[()][0-9A-Z]")
        .expect("valid ANSI pattern");
    ansi_re.replace_all(raw, "").replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kvm_check() {
        // Just ensure it doesn't panic
        let _ = is_kvm_available();
    }

    #[test]
    fn test_clean_output() {
        let raw = "\x1b[2J\x1b[01;01H\x1b[0m\x1b[32mINFO\x1b[0m db updated\r\n";
        assert_eq!(clean_output(raw), "INFO db updated\n");
    }

    #[test]
    fn test_expectations_match_diagnostics() {
        let transcript = "\
=== update-vars tests ===
Usage: update-vars.efi: [-g guid] [-a] var file
Invalid Variable Trash
Variable must be one of: PK KEK db dbx
Failed to open file missing.auth: NOT_FOUND (0x800000000000000e)
[WARN ] update_vars::update: Ignoring -g 1234: db is always written under its standard vendor GUID
Failed to open file missing.auth: NOT_FOUND (0x800000000000000e)
=== update-vars done ===
";
        for (name, pattern) in EXPECTATIONS {
            assert!(
                Regex::new(pattern).unwrap().is_match(transcript),
                "{} did not match",
                name
            );
        }
    }

    #[test]
    fn test_script_powers_off() {
        assert!(TEST_SCRIPT.trim_end().ends_with("reset -s"));
    }
}
