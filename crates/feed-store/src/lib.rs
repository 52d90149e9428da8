//! VidFeed Feed Store
//!
//! Local persistence for feed records. Records are JSON values keyed by id
//! inside one of the [`Partition`]s; there are no transactions across
//! partitions.
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions
//! - [`JsonFileStore`]: one `<root>/<partition>/<id>.json` file per record

pub mod json_file;
pub mod memory;
pub mod store;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{delete_record, get_record, get_records, put_record, RecordStore};
pub use vidfeed_feed_model::feed::{Partition, Record};
