//! Test support shipped with the crate.
//!
//! - **Assertions** for comparing row streams where order is not guaranteed (parallel reads,
//!   multiple files, multiple destinations).
//! - **Fixtures**: a schema covering every primitive field type and rows exercising it,
//!   including nulls and boundary values.
//! - **Mock I/O**: temporary directories and helpers that write rows through a registered
//!   format, so read tests can set up their input files in one line.
//!
//! ```no_run
//! use filebeam::FormatRegistry;
//! use filebeam::testing::*;
//!
//! # fn main() -> filebeam::Result<()> {
//! let dir = TempDirPath::new().map_err(|e| filebeam::Error::io("tempdir", e))?;
//! let registry = FormatRegistry::with_builtin_formats();
//! let rows = all_primitive_data_types_rows();
//! let schema = all_primitive_data_types_schema();
//! write_fixture_file(&registry, "avro", &dir.file_path("input.avro"), &schema, &rows)?;
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
