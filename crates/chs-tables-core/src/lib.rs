//! Core engine for converting CHS coastal-hazard containers to tables.
//!
//! The Coastal Hazards System distributes storm-surge model output as
//! HDF5 containers in several layout generations. This crate normalizes
//! any of them into Arrow record batches plus the metadata an
//! interactive frontend needs:
//!
//! - An owned in-memory snapshot of one source container, so every
//!   build routine is pure and testable without HDF5 (`source` module;
//!   the disk loader sits behind the `hdf5` cargo feature).
//! - Filename-identity parsing and the eight schema cases keyed by
//!   format version and type tag (`identity`, `schema` modules).
//! - The immutable [`ConvertedDataset`](dataset::ConvertedDataset)
//!   result value: normal/full tables, range indexes, split children
//!   (`dataset`, `table`, `ranges` modules).
//! - Interactive narrowing and plot-series extraction over one dataset
//!   (`filter` module).
//! - CSV export and the conversion entry point with structured progress
//!   reporting (`export`, `convert`, `progress` modules).
//!
//! A GUI or batch orchestrator is expected to depend on this crate and
//! drive [`convert::Converter`] per file, one conversion at a time.
#![deny(missing_docs)]
pub mod convert;
pub mod dataset;
pub mod export;
pub mod filter;
pub mod identity;
pub mod progress;
pub mod ranges;
pub mod schema;
pub mod source;
pub mod table;

pub use convert::{ConvertError, ConvertOptions, Converter};
pub use dataset::ConvertedDataset;
pub use filter::FilterEngine;
pub use identity::FileIdentity;
pub use progress::ProgressSink;
pub use source::SourceFile;
