//! update-vars Build and Test Automation
//!
//! This xtask provides commands for building update-vars and running it
//! under OVMF in QEMU.
//!
//! # Usage
//!
//! ```bash
//! cargo xtask build                          # Build update-vars.efi
//! cargo xtask create-disk --payload db.auth  # FAT image with the app and payloads
//! cargo xtask run --payload db.auth          # Boot OVMF into the UEFI shell
//! cargo xtask test                           # Scripted run with output checks
//! ```

mod disk;
mod qemu;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// UEFI target the application is built for
const TARGET: &str = "x86_64-unknown-uefi";

/// Global project directory, set via --project-dir or derived from CARGO_MANIFEST_DIR
static PROJECT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the project root directory
fn project_root() -> &'static Path {
    PROJECT_DIR
        .get()
        .map(PathBuf::as_path)
        .unwrap_or_else(|| Path::new("."))
}

#[derive(Parser)]
#[command(name = "xtask", bin_name = "cargo xtask")]
#[command(about = "update-vars build and test automation")]
struct Cli {
    /// Path to the project directory
    #[arg(long, global = true, hide = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build update-vars.efi
    Build {
        /// Build in debug mode
        #[arg(long)]
        debug: bool,
    },

    /// Create a FAT disk image with update-vars.efi
    CreateDisk {
        /// Output path for the disk image
        #[arg(long, default_value = "update-vars.img")]
        output: PathBuf,

        /// Payload files to copy to the root of the image
        #[arg(long)]
        payload: Vec<PathBuf>,

        /// Shell script to install as startup.nsh
        #[arg(long)]
        startup: Option<PathBuf>,
    },

    /// Boot OVMF in QEMU with the app on a FAT disk
    Run {
        #[command(flatten)]
        firmware: FirmwareArgs,

        /// Payload files to copy to the root of the image
        #[arg(long)]
        payload: Vec<PathBuf>,

        /// Path to an existing disk image to use
        #[arg(long)]
        disk: Option<PathBuf>,

        /// Run without graphical display (serial only)
        #[arg(long)]
        headless: bool,
    },

    /// Run the scripted integration tests in QEMU
    Test {
        #[command(flatten)]
        firmware: FirmwareArgs,

        /// Timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}

/// OVMF and QEMU options shared by `run` and `test`
#[derive(clap::Args)]
struct FirmwareArgs {
    /// OVMF code image
    #[arg(long, default_value = "/usr/share/OVMF/OVMF_CODE.fd")]
    ovmf_code: PathBuf,

    /// OVMF variable store template (copied, never modified)
    #[arg(long, default_value = "/usr/share/OVMF/OVMF_VARS.fd")]
    ovmf_vars: PathBuf,

    /// Disable KVM acceleration
    #[arg(long)]
    disable_kvm: bool,
}

impl FirmwareArgs {
    fn config(&self, headless: bool, timeout_secs: Option<u64>) -> qemu::QemuConfig {
        qemu::QemuConfig {
            ovmf_code: self.ovmf_code.clone(),
            ovmf_vars: self.ovmf_vars.clone(),
            headless,
            disable_kvm: self.disable_kvm,
            timeout_secs,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .context("xtask manifest has no parent directory")?
            .to_path_buf(),
    };
    let _ = PROJECT_DIR.set(project_dir);

    match cli.command {
        Commands::Build { debug } => cmd_build(!debug).map(|_| ()),
        Commands::CreateDisk {
            output,
            payload,
            startup,
        } => cmd_create_disk(&output, &payload, startup.as_deref()),
        Commands::Run {
            firmware,
            payload,
            disk,
            headless,
        } => cmd_run(&firmware, &payload, disk.as_deref(), headless),
        Commands::Test { firmware, timeout } => cmd_test(&firmware, timeout),
    }
}

/// Build the application and return the path of the .efi image
fn cmd_build(release: bool) -> Result<PathBuf> {
    println!("Building update-vars...");

    let mut cmd = std::process::Command::new("cargo");
    cmd.args(["build", "--package", "update-vars", "--target", TARGET]);
    if release {
        cmd.arg("--release");
    }
    cmd.current_dir(project_root());

    let status = cmd.status().context("failed to run cargo")?;
    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let efi = efi_path(release);
    println!("Built: {}", efi.display());
    Ok(efi)
}

/// Location of the built application
fn efi_path(release: bool) -> PathBuf {
    let mode = if release { "release" } else { "debug" };
    project_root()
        .join("target")
        .join(TARGET)
        .join(mode)
        .join("update-vars.efi")
}

fn cmd_create_disk(output: &Path, payloads: &[PathBuf], startup: Option<&Path>) -> Result<()> {
    let efi = cmd_build(true)?;
    let script = startup
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))
        })
        .transpose()?;

    disk::create_disk(output, &efi, payloads, script.as_deref())
}

fn cmd_run(
    firmware: &FirmwareArgs,
    payloads: &[PathBuf],
    disk: Option<&Path>,
    headless: bool,
) -> Result<()> {
    let config = firmware.config(headless, None);

    if let Some(disk) = disk {
        return qemu::run_qemu(&config, disk);
    }

    let efi = cmd_build(true)?;

    // Disk needs to live for the duration of the QEMU run
    let temp_dir = tempfile::tempdir()?;
    let disk_path = temp_dir.path().join("update-vars.img");
    disk::create_disk(&disk_path, &efi, payloads, None)?;

    qemu::run_qemu(&config, &disk_path)
}

fn cmd_test(firmware: &FirmwareArgs, timeout: u64) -> Result<()> {
    let efi = cmd_build(true)?;

    let temp_dir = tempfile::tempdir()?;
    let disk_path = temp_dir.path().join("update-vars.img");
    disk::create_disk(&disk_path, &efi, &[], Some(qemu::TEST_SCRIPT))?;

    let config = firmware.config(true, Some(timeout));
    qemu::run_tests(&config, &disk_path)
}
