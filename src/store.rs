//! Variable store interface
//!
//! The firmware owns non-volatile variable storage and does all of the
//! authentication work; this trait is the narrow view of it the updater
//! needs. [`crate::efi::runtime::FirmwareVariableStore`] implements it on top
//! of Runtime Services.

use alloc::vec::Vec;
use r_efi::efi::{Guid, Status};

/// A variable read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Attributes the variable is stored with
    pub attributes: u32,
    /// Variable contents
    pub data: Vec<u8>,
}

/// Read and write access to firmware variables
///
/// Names are NUL-terminated UCS-2.
pub trait VariableStore {
    /// Read a variable
    ///
    /// Probes for the size first, then allocates and fetches. Returns
    /// `Ok(None)` if the variable does not exist.
    fn get_variable(&mut self, name: &[u16], vendor: &Guid) -> Result<Option<Variable>, Status>;

    /// Write a variable with the given attributes
    ///
    /// For authenticated writes `data` starts with the authentication
    /// descriptor; whether the write is accepted is up to the store.
    fn set_variable(
        &mut self,
        name: &[u16],
        vendor: &Guid,
        attributes: u32,
        data: &[u8],
    ) -> Result<(), Status>;
}

/// One recorded `set_variable` call
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub name: alloc::string::String,
    pub vendor: Guid,
    pub attributes: u32,
    pub data: Vec<u8>,
}

/// Memory-backed variable store for testing
///
/// Records every write. Accepts writes unless a rejection status is set,
/// honours `APPEND_WRITE` by extending the stored data, and deletes a
/// variable written with no data.
#[cfg(test)]
pub struct MemoryStore {
    variables: Vec<(Vec<u16>, Guid, Variable)>,
    /// Every write attempt, accepted or not
    pub writes: Vec<WriteRecord>,
    /// Status to fail writes with
    pub reject_with: Option<Status>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            writes: Vec::new(),
            reject_with: None,
        }
    }

    fn find(&self, name: &[u16], vendor: &Guid) -> Option<usize> {
        self.variables
            .iter()
            .position(|(n, g, _)| crate::efi::utils::ucs2_eq(n, name) && g == vendor)
    }
}

#[cfg(test)]
impl VariableStore for MemoryStore {
    fn get_variable(&mut self, name: &[u16], vendor: &Guid) -> Result<Option<Variable>, Status> {
        Ok(self.find(name, vendor).map(|idx| self.variables[idx].2.clone()))
    }

    fn set_variable(
        &mut self,
        name: &[u16],
        vendor: &Guid,
        attributes: u32,
        data: &[u8],
    ) -> Result<(), Status> {
        self.writes.push(WriteRecord {
            name: crate::efi::utils::to_string(name),
            vendor: *vendor,
            attributes,
            data: data.to_vec(),
        });

        if let Some(status) = self.reject_with {
            return Err(status);
        }

        let append = attributes & crate::vars::attributes::APPEND_WRITE != 0;
        let stored = attributes & !crate::vars::attributes::APPEND_WRITE;

        match self.find(name, vendor) {
            Some(idx) if append => self.variables[idx].2.data.extend_from_slice(data),
            // An empty non-append write deletes
            Some(idx) if data.is_empty() => {
                self.variables.remove(idx);
            }
            None if data.is_empty() && !append => {}
            Some(idx) => {
                self.variables[idx].2 = Variable {
                    attributes: stored,
                    data: data.to_vec(),
                }
            }
            None => self.variables.push((
                name.to_vec(),
                *vendor,
                Variable {
                    attributes: stored,
                    data: data.to_vec(),
                },
            )),
        }
        Ok(())
    }
}
