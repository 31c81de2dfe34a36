pub mod array;
pub mod codecs;
pub mod error;
pub mod grid;
pub mod metadata;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-export key types at crate root for convenience.
pub use array::ZarrArray;
pub use codecs::{default_registry, AnyCodec, CodecRegistry};
pub use error::{ZarrError, ZarrResult};
pub use grid::{ArrayRegion, ChunkCoordinate, ChunkKeySeparator, RegularChunkGrid};
pub use metadata::ArrayMetadata;
pub use pipeline::CodecPipeline;
pub use store::{LocalBackend, MemoryBackend, ObjectStoreBackend, StorageBackend};
pub use types::{
    ChunkRepresentation, DataType, Endian, FillValue, ZarrValue, ZarrVectorValue,
};
