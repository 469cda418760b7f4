//! update-vars - Secure Boot variable updater
//!
//! A UEFI application that writes a signed `EFI_VARIABLE_AUTHENTICATION_2`
//! payload into one of the Secure Boot key databases (PK, KEK, db or dbx).
//! Signature verification is the firmware's job: this crate turns the
//! command line into a single attributed `SetVariable` call and reports what
//! the firmware said about it.
//!
//! The firmware-facing pieces live in [`efi`]. Everything else talks to the
//! firmware through the [`store::VariableStore`] and [`files::FileLoader`]
//! traits so it can be exercised on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod args;
pub mod auth;
pub mod efi;
pub mod error;
pub mod files;
pub mod logger;
pub mod store;
pub mod update;
pub mod vars;

pub use error::UpdateError;
