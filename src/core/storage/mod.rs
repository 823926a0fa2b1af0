// Partitioned staging area for raw records

pub mod writer;

pub use writer::{
    PartitionedWriter, RecordReader, StorageStats, BATCH_ID_FIELD, INGESTED_AT_FIELD,
    SOURCE_FIELD,
};
