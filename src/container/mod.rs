//! The outer container: file magic, version, and stream directory (spec §4.1, §6).

mod header;

pub use header::{
    CONTAINER_MAGIC, CURRENT_MAJOR_VERSION, ContainerHeader, MIN_SUPPORTED_MAJOR_VERSION,
    StreamEntry, StreamId,
};
