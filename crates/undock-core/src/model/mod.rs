//! Data model for managed volumes and scan results.

pub mod size;
pub mod volume;

pub use volume::{FileInfo, Volume, VolumeId, VolumeStatus};
