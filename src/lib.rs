//! # exifpipe
//!
//! Typed metadata reads and writes over a persistent ExifTool worker
//! process.
//!
//! Instead of spawning one process per file, this crate keeps a single
//! `exiftool -stay_open` worker alive and multiplexes commands onto its
//! stdin/stdout streams over ExifTool's line-oriented argfile protocol.
//! On top of the raw protocol it layers a decode pipeline that turns
//! the worker's JSON replies into typed, timezone-aware tag values, and
//! an encode pipeline that turns typed tag updates into the worker's
//! argument dialect.
//!
//! ## Reading
//!
//! ```no_run
//! use exifpipe::{ExifPipe, ExifPipeError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ExifPipeError> {
//!     let exifpipe = ExifPipe::new()?; // starts the background worker
//!     let record = exifpipe.read_file(Path::new("path/to/photo.jpg"))?;
//!
//!     if let Some(dt) = record.get("DateTimeOriginal").and_then(|v| v.as_datetime()) {
//!         println!("taken at {} ({:?})", dt.format_exiftool(), dt.tz_source);
//!     }
//!     for warning in &record.warnings {
//!         eprintln!("recovered: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use exifpipe::{ExifPipe, ExifPipeError, WriteRequest};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ExifPipeError> {
//!     let exifpipe = ExifPipe::new()?;
//!     let request = WriteRequest::new(Path::new("path/to/photo.jpg"))
//!         .tag("Artist", "A. Adams")
//!         .arg("-overwrite_original");
//!     exifpipe.write_file(&request)?; // Err means nothing was changed
//!     Ok(())
//! }
//! ```
//!
//! The worker is closed gracefully when the [`ExifPipe`] value drops.
//! Pooling several workers, health checks and restart policy are the
//! embedding application's concern; once [`ExifPipe::is_ended`] turns
//! true the instance only fails and should be replaced.

// Public API
mod error;
mod exifpipe;
mod options;
mod proc;
mod read;
mod resolve;
mod tz;
mod value;
mod write;

pub mod parse_fn;

pub use error::ExifPipeError;
pub use exifpipe::ExifPipe;
pub use options::{ExifPipeOptions, ImageHashType};
pub use proc::{PendingReply, RawReply, ReplyFramer, Supervisor, READY_SENTINEL};
pub use read::ReadTask;
pub use resolve::{locate_executable, locate_in};
pub use tz::{ResolvedZone, TzResolver, TzSrc};
pub use value::{BinaryMarker, ExifDateTime, TagRecord, TagValue};
pub use write::{WriteRequest, WriteTask, WriteValue};
