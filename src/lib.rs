//! Потоковый загрузчик снимков RDB.
//!
//! ```no_run
//! use rdbkit::{load_file, CountHandler, LoadOptions};
//!
//! let mut counter = CountHandler::new();
//! let report = load_file("dump.rdb", &LoadOptions::default(), &mut counter)?;
//! println!("{} keys, checksum {:?}", counter.total_keys(), report.checksum);
//! # Ok::<(), rdbkit::StackError>(())
//! ```

/// Configuration loading: defaults, optional file, RDBKIT_* environment.
pub mod config;
/// Logging setup (format, filters).
pub mod logging;
/// Snapshot decoding: byte source, encodings, streaming parser, loader.
pub mod rdb;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Settings.
pub use crate::config::{LoaderSettings, Settings};
/// Logging configuration and initialization.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Loader entry points, records and handlers.
pub use rdb::{
    load_file, load_reader, CallbackHandler, ChecksumStatus, CollectHandler, CountHandler, Entry,
    Expiry, ExpiryUnit, FilterHandler, LoadEvent, LoadOptions, LoadReport, ParseStats, RdbParser,
    RdbVersion, Record, RecordHandler, Value, ValueType,
};
/// Error types.
pub use rdbkit_error::{RdbError, RdbErrorKind, RdbResult, StackError, StatusCode};
