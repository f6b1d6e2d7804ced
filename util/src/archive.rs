//! Struct archiving functionality
//!
//! Records are written as CSV rows with a header, so they must be flat (no nested structs).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session,
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session_path = session.arch_root.join(path);

        if let Some(parent) = session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create the file if it does not exist
        File::create(&session_path)?;

        // Open the file in append mode
        let file = OpenOptions::new().append(true).open(session_path)?;

        let w = WriterBuilder::new().has_headers(true).from_writer(file);

        Ok(Self { writer: Some(w) })
    }

    /// Serialise a record into the archive.
    ///
    /// Archivers built with `Default` have no backing file and silently drop records.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.serialize(record)?;
            w.flush()?
        }

        Ok(())
    }
}
