//! Media Backup/Restore Tool
//!
//! Archives every file of one or more labelled storage locations into a
//! single tar stream (optionally gzipped and encrypted), and restores such
//! an archive back into the locations its entries are labelled with.

pub mod backup;
pub mod config;
pub mod errors;
pub mod restore;
pub mod storage;
pub mod transform;
pub mod utils;
