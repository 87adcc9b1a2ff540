//! On-disk batch storage: directory primitive, event framing, writer,
//! reader, and startup migration.

pub mod batch;
pub mod directory;
pub mod migrator;
pub mod reader;
pub mod writer;

pub use directory::Directory;
pub use migrator::{DataMigrator, DeleteAllMigrator, MoveMigrator};
pub use reader::{BatchOutcome, BatchReader, PendingBatch};
pub use writer::{BatchWriter, CurrentFile};
