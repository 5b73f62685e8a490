//! Domain layer: payloads exchanged with the platform API
//!
//! Plain data, no I/O.

pub mod entities;

pub use entities::{
    Backup, BackupState, Branch, CreateBackupRequest, CreateBranchRequest, DataImport, Database,
    ErrorBody, Page, Region,
};
