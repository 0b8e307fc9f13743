//! Container log source: trait, live Docker implementation, test double,
//! container inventory model, and the multiplexed-frame demuxer.

pub mod client;
pub mod demux;
pub mod fake;
pub mod inventory;
pub mod source;

pub use client::DockerSource;
pub use inventory::ContainerInfo;
pub use source::{ChunkStream, LogSource, SourceError};
