//! The `sharding_indexed` codec: packs a grid of independently encoded inner
//! chunks into one outer chunk, with a byte-range index for random access.

use serde::{Deserialize, Serialize};

use crate::codecs::default_registry;
use crate::error::{ZarrError, ZarrResult};
use crate::grid::{ArrayRegion, ChunkCoordinate, RegularChunkGrid};
use crate::pipeline::CodecPipeline;
use crate::types::{fill_chunk, ChunkRepresentation, DataType, ZarrValue, ZarrVectorValue};

/// Sentinel offset/length marking an inner chunk that was never written.
pub const ABSENT_CHUNK: u64 = u64::MAX;

/// Bytes per index entry: a `u64` offset and a `u64` length.
const INDEX_ENTRY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardIndexLocation {
    Start,
    #[default]
    End,
}

#[derive(Debug, Deserialize)]
struct ShardingConfig {
    chunk_shape: Vec<usize>,
    codecs: Vec<serde_json::Value>,
    index_codecs: Vec<serde_json::Value>,
    #[serde(default)]
    index_location: ShardIndexLocation,
}

// ---------------------------------------------------------------------------
// ShardIndex
// ---------------------------------------------------------------------------

/// Decoded byte-range index of a shard: one `(offset, length)` pair per inner
/// chunk slot, row-major over inner chunk coordinates, offsets relative to
/// the shard's data region. Decode it once per shard and reuse it for
/// repeated inner reads.
#[derive(Debug, Clone)]
pub struct ShardIndex {
    grid_shape: Vec<usize>,
    entries: Vec<u64>,
}

impl ShardIndex {
    pub fn grid_shape(&self) -> &[usize] {
        &self.grid_shape
    }

    pub fn num_chunks(&self) -> usize {
        self.grid_shape.iter().product()
    }

    /// The byte range of the inner chunk at linear position `i`, or `None`
    /// for the absent-chunk sentinel.
    pub fn get(&self, i: usize) -> Option<(u64, u64)> {
        let offset = self.entries[2 * i];
        let length = self.entries[2 * i + 1];
        if offset == ABSENT_CHUNK && length == ABSENT_CHUNK {
            None
        } else {
            Some((offset, length))
        }
    }

    /// Number of inner chunks that were actually written.
    pub fn num_present(&self) -> usize {
        (0..self.num_chunks()).filter(|i| self.get(*i).is_some()).count()
    }

    /// Row-major linear position of an inner chunk coordinate.
    pub fn linear_index(&self, coordinate: &[usize]) -> ZarrResult<usize> {
        if coordinate.len() != self.grid_shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Inner coordinate rank {} does not match grid rank {}",
                coordinate.len(),
                self.grid_shape.len()
            )));
        }
        let mut linear = 0usize;
        for (d, (&i, &n)) in coordinate.iter().zip(self.grid_shape.iter()).enumerate() {
            if i >= n {
                return Err(ZarrError::DimensionMismatch(format!(
                    "Inner coordinate {coordinate:?} outside grid {:?} along axis {d}",
                    self.grid_shape
                )));
            }
            linear = linear * n + i;
        }
        Ok(linear)
    }
}

// ---------------------------------------------------------------------------
// ShardingCodec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ShardingCodec {
    chunk_shape: Vec<usize>,
    inner: CodecPipeline,
    index: CodecPipeline,
    index_location: ShardIndexLocation,
}

impl ShardingCodec {
    pub fn new(
        chunk_shape: Vec<usize>,
        inner: CodecPipeline,
        index: CodecPipeline,
        index_location: ShardIndexLocation,
    ) -> ZarrResult<Self> {
        if chunk_shape.iter().any(|&c| c == 0) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Inner chunk shape must be positive along every axis, got {chunk_shape:?}"
            )));
        }
        let codec = Self {
            chunk_shape,
            inner,
            index,
            index_location,
        };
        // The index must be locatable without reading the data region, so its
        // encoded size has to be computable up front.
        if codec.index.fixed_encoded_size(&codec.index_rep(&[1])).is_none() {
            return Err(ZarrError::InvalidConfiguration(
                "Index codecs must produce a fixed-size encoding".into(),
            ));
        }
        Ok(codec)
    }

    pub fn from_config(config: &serde_json::Value) -> ZarrResult<Self> {
        let config: ShardingConfig = serde_json::from_value(config.clone())
            .map_err(|e| ZarrError::InvalidConfiguration(format!("sharding_indexed: {e}")))?;
        let registry = default_registry();
        let inner = CodecPipeline::from_metadata(&config.codecs, registry)?;
        let index = CodecPipeline::from_metadata(&config.index_codecs, registry)?;
        Self::new(config.chunk_shape, inner, index, config.index_location)
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    pub fn index_location(&self) -> ShardIndexLocation {
        self.index_location
    }

    /// Serialize the nested configuration back to its wire form.
    pub fn configuration_json(&self) -> ZarrResult<serde_json::Value> {
        Ok(serde_json::json!({
            "chunk_shape": self.chunk_shape,
            "codecs": self.inner.to_metadata()?,
            "index_codecs": self.index.to_metadata()?,
            "index_location": self.index_location,
        }))
    }

    /// Inner grid shape for a shard of `shard_shape`, which the inner chunk
    /// shape must divide evenly along every axis.
    pub fn chunks_per_shard(&self, shard_shape: &[usize]) -> ZarrResult<Vec<usize>> {
        if shard_shape.len() != self.chunk_shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Inner chunk shape rank {} does not match shard rank {}",
                self.chunk_shape.len(),
                shard_shape.len()
            )));
        }
        shard_shape
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(s, c)| {
                if s.is_multiple_of(*c) {
                    Ok(s / c)
                } else {
                    Err(ZarrError::InvalidConfiguration(format!(
                        "Inner chunk shape {:?} does not evenly divide shard shape {shard_shape:?}",
                        self.chunk_shape
                    )))
                }
            })
            .collect()
    }

    pub fn validate(&self, rep: &ChunkRepresentation) -> ZarrResult<()> {
        let cps = self.chunks_per_shard(&rep.shape)?;
        let inner_rep = self.inner_rep(rep)?;
        self.inner.validate(&inner_rep)?;
        self.index.validate(&self.index_rep(&cps))?;
        Ok(())
    }

    fn inner_rep(&self, rep: &ChunkRepresentation) -> ZarrResult<ChunkRepresentation> {
        ChunkRepresentation::new(self.chunk_shape.clone(), rep.data_type, rep.fill_value)
    }

    /// Representation of the index itself: a `uint64` array of shape
    /// `grid_shape + [2]` whose fill value is the absent-chunk sentinel.
    fn index_rep(&self, grid_shape: &[usize]) -> ChunkRepresentation {
        let mut shape = grid_shape.to_vec();
        shape.push(2);
        ChunkRepresentation::new(shape, DataType::UInt64, ZarrValue::UInt64(ABSENT_CHUNK))
            .expect("uint64 fill value always matches uint64")
    }

    fn encoded_index_size(&self, grid_shape: &[usize]) -> usize {
        let rep = self.index_rep(grid_shape);
        self.index
            .fixed_encoded_size(&rep)
            .unwrap_or(rep.num_elements() / 2 * INDEX_ENTRY_SIZE)
    }

    fn inner_grid(&self, shard_shape: &[usize]) -> ZarrResult<RegularChunkGrid> {
        RegularChunkGrid::new(shard_shape.to_vec(), self.chunk_shape.clone())
    }

    fn chunk_origin(&self, coordinate: &[usize]) -> Vec<usize> {
        coordinate
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(i, c)| i * c)
            .collect()
    }

    fn data_region<'a>(&self, shard: &'a [u8], index_size: usize) -> &'a [u8] {
        match self.index_location {
            ShardIndexLocation::Start => &shard[index_size..],
            ShardIndexLocation::End => &shard[..shard.len() - index_size],
        }
    }

    // -----------------------------------------------------------------------
    // Encode
    // -----------------------------------------------------------------------

    /// Partition the shard's array into the inner grid, encode each non-fill
    /// inner chunk through the inner pipeline, and assemble index plus data
    /// region according to `index_location`.
    pub async fn encode(
        &self,
        chunk: ZarrVectorValue,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<Vec<u8>> {
        if chunk.len() != rep.num_elements() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Shard has {} elements, shape {:?} requires {}",
                chunk.len(),
                rep.shape,
                rep.num_elements()
            )));
        }
        let cps = self.chunks_per_shard(&rep.shape)?;
        let num_chunks: usize = cps.iter().product();
        let inner_rep = self.inner_rep(rep)?;
        let coords = self
            .inner_grid(&rep.shape)?
            .chunks_in_region(&ArrayRegion::whole(&rep.shape))?;

        let mut entries = vec![ABSENT_CHUNK; 2 * num_chunks];
        let mut data: Vec<u8> = Vec::new();
        for (i, coordinate) in coords.iter().enumerate() {
            let origin = self.chunk_origin(coordinate);
            let sub = chunk.extract(&rep.shape, &origin, &self.chunk_shape)?;
            if sub.all_equal(&rep.fill_value) {
                continue;
            }
            let encoded = self.inner.encode_chunk(sub, &inner_rep).await?;
            entries[2 * i] = data.len() as u64;
            entries[2 * i + 1] = encoded.len() as u64;
            data.extend_from_slice(&encoded);
        }

        let index_rep = self.index_rep(&cps);
        let index_bytes = self
            .index
            .encode_chunk(ZarrVectorValue::VUInt64(entries), &index_rep)
            .await?;

        let mut shard = Vec::with_capacity(index_bytes.len() + data.len());
        match self.index_location {
            ShardIndexLocation::Start => {
                shard.extend_from_slice(&index_bytes);
                shard.extend_from_slice(&data);
            }
            ShardIndexLocation::End => {
                shard.extend_from_slice(&data);
                shard.extend_from_slice(&index_bytes);
            }
        }
        Ok(shard)
    }

    // -----------------------------------------------------------------------
    // Decode
    // -----------------------------------------------------------------------

    /// Locate, decode and sanity-check the shard index. Every entry must be
    /// either the sentinel pair or a range inside the data region.
    pub async fn read_index(&self, shard: &[u8], shard_shape: &[usize]) -> ZarrResult<ShardIndex> {
        let cps = self.chunks_per_shard(shard_shape)?;
        let num_chunks: usize = cps.iter().product();
        let index_size = self.encoded_index_size(&cps);
        if shard.len() < index_size {
            return Err(ZarrError::CorruptData(format!(
                "Shard is {} bytes, smaller than its {index_size}-byte index",
                shard.len()
            )));
        }
        let index_bytes = match self.index_location {
            ShardIndexLocation::Start => &shard[..index_size],
            ShardIndexLocation::End => &shard[shard.len() - index_size..],
        };
        let index_rep = self.index_rep(&cps);
        let decoded = self
            .index
            .decode_chunk(index_bytes.to_vec(), &index_rep)
            .await?;
        let entries = match decoded {
            ZarrVectorValue::VUInt64(v) => v,
            other => {
                return Err(ZarrError::CorruptData(format!(
                    "Shard index decoded to {} data instead of uint64",
                    other.data_type()
                )));
            }
        };
        if entries.len() != 2 * num_chunks {
            return Err(ZarrError::CorruptData(format!(
                "Shard index holds {} entries, inner grid {cps:?} requires {num_chunks}",
                entries.len() / 2
            )));
        }

        let data_len = (shard.len() - index_size) as u64;
        for i in 0..num_chunks {
            let (offset, length) = (entries[2 * i], entries[2 * i + 1]);
            if offset == ABSENT_CHUNK && length == ABSENT_CHUNK {
                continue;
            }
            if offset == ABSENT_CHUNK || length == ABSENT_CHUNK {
                return Err(ZarrError::CorruptData(format!(
                    "Shard index entry {i} mixes a sentinel with a real value"
                )));
            }
            match offset.checked_add(length) {
                Some(end) if end <= data_len => {}
                _ => {
                    return Err(ZarrError::CorruptData(format!(
                        "Shard index entry {i} ({offset}+{length}) falls outside the \
                         {data_len}-byte data region"
                    )));
                }
            }
        }
        Ok(ShardIndex {
            grid_shape: cps,
            entries,
        })
    }

    /// Decode the full shard back to a typed array of `rep.shape`. Inner
    /// chunks marked absent materialize as fill value.
    pub async fn decode(
        &self,
        shard: Vec<u8>,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<ZarrVectorValue> {
        let index = self.read_index(&shard, &rep.shape).await?;
        let index_size = self.encoded_index_size(index.grid_shape());
        let data = self.data_region(&shard, index_size);
        let inner_rep = self.inner_rep(rep)?;
        let coords = self
            .inner_grid(&rep.shape)?
            .chunks_in_region(&ArrayRegion::whole(&rep.shape))?;

        let mut out = fill_chunk(&rep.fill_value, &rep.shape);
        for (i, coordinate) in coords.iter().enumerate() {
            let Some((offset, length)) = index.get(i) else {
                continue;
            };
            let bytes = data[offset as usize..(offset + length) as usize].to_vec();
            let sub = self.inner.decode_chunk(bytes, &inner_rep).await?;
            let origin = self.chunk_origin(coordinate);
            out.overlay(&rep.shape, &origin, &sub, &self.chunk_shape)?;
        }
        Ok(out)
    }

    /// Decode a single inner chunk using a previously decoded index, touching
    /// only that chunk's recorded byte range.
    pub async fn decode_inner_with_index(
        &self,
        shard: &[u8],
        index: &ShardIndex,
        coordinate: &ChunkCoordinate,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<ZarrVectorValue> {
        let inner_rep = self.inner_rep(rep)?;
        let linear = index.linear_index(coordinate)?;
        match index.get(linear) {
            None => Ok(fill_chunk(&rep.fill_value, &self.chunk_shape)),
            Some((offset, length)) => {
                let index_size = self.encoded_index_size(index.grid_shape());
                let data = self.data_region(shard, index_size);
                let bytes = data[offset as usize..(offset + length) as usize].to_vec();
                self.inner.decode_chunk(bytes, &inner_rep).await
            }
        }
    }

    /// Random access to one inner chunk of a shard.
    pub async fn decode_inner(
        &self,
        shard: &[u8],
        coordinate: &ChunkCoordinate,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<ZarrVectorValue> {
        let index = self.read_index(shard, &rep.shape).await?;
        self.decode_inner_with_index(shard, &index, coordinate, rep).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::default_registry;
    use crate::codecs::AnyCodec;
    use serde_json::json;

    fn sharding(config: serde_json::Value) -> ZarrResult<ShardingCodec> {
        ShardingCodec::from_config(&config)
    }

    fn basic_config(chunk_shape: &[usize], index_location: &str) -> serde_json::Value {
        json!({
            "chunk_shape": chunk_shape,
            "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
            "index_codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
            "index_location": index_location,
        })
    }

    fn shard_rep(shape: Vec<usize>, fill: f32) -> ChunkRepresentation {
        ChunkRepresentation::new(shape, DataType::Float32, ZarrValue::Float32(fill)).unwrap()
    }

    #[test]
    fn configuration_parses() {
        let codec = default_registry()
            .parse(&json!({
                "name": "sharding_indexed",
                "configuration": basic_config(&[2, 2], "end"),
            }))
            .unwrap();
        assert!(matches!(codec, AnyCodec::Sharding(_)));
    }

    #[test]
    fn uneven_inner_grid_is_rejected() {
        let codec = sharding(basic_config(&[2, 3, 2], "end")).unwrap();
        let err = codec.chunks_per_shard(&[2, 3, 5]).unwrap_err();
        assert!(matches!(err, ZarrError::InvalidConfiguration(_)));
    }

    #[test]
    fn compressed_index_is_rejected() {
        let err = sharding(json!({
            "chunk_shape": [2, 2],
            "codecs": [{"name": "bytes"}],
            "index_codecs": [{"name": "bytes"}, {"name": "gzip"}],
        }))
        .unwrap_err();
        assert!(matches!(err, ZarrError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn index_counts_written_inner_chunks() {
        // 2x3x5 shard, 2x3x1 slabs: 5 inner chunks, slabs 1 and 3 hold data.
        let codec = sharding(basic_config(&[2, 3, 1], "end")).unwrap();
        let rep = shard_rep(vec![2, 3, 5], 42.0);
        let mut values = vec![42.0f32; 30];
        for row in 0..6 {
            values[row * 5 + 1] = row as f32;
            values[row * 5 + 3] = 100.0 + row as f32;
        }
        let chunk = ZarrVectorValue::VFloat32(values.clone());
        let shard = codec.encode(chunk.clone(), &rep).await.unwrap();

        let index = codec.read_index(&shard, &rep.shape).await.unwrap();
        assert_eq!(index.num_chunks(), 5);
        assert_eq!(index.num_present(), 2);
        assert!(index.get(0).is_none());
        assert!(index.get(1).is_some());

        let decoded = codec.decode(shard, &rep).await.unwrap();
        assert_eq!(decoded, chunk);
    }

    #[tokio::test]
    async fn round_trip_both_index_locations() {
        for location in ["start", "end"] {
            let codec = sharding(basic_config(&[2, 3, 1], location)).unwrap();
            let rep = shard_rep(vec![2, 3, 5], 42.0);
            let chunk = ZarrVectorValue::VFloat32((0..30).map(|x| x as f32).collect());
            let shard = codec.encode(chunk.clone(), &rep).await.unwrap();
            let decoded = codec.decode(shard, &rep).await.unwrap();
            assert_eq!(decoded, chunk, "index_location {location}");
        }
    }

    #[tokio::test]
    async fn inner_chunks_decode_individually() {
        let codec = sharding(basic_config(&[2, 3, 1], "start")).unwrap();
        let rep = shard_rep(vec![2, 3, 5], 0.0);
        let chunk = ZarrVectorValue::VFloat32((0..30).map(|x| x as f32).collect());
        let shard = codec.encode(chunk.clone(), &rep).await.unwrap();

        let index = codec.read_index(&shard, &rep.shape).await.unwrap();
        for z in 0..5 {
            let inner = codec
                .decode_inner_with_index(&shard, &index, &vec![0, 0, z], &rep)
                .await
                .unwrap();
            let expected = chunk.extract(&rep.shape, &[0, 0, z], &[2, 3, 1]).unwrap();
            assert_eq!(inner, expected, "slab {z}");
        }
    }

    #[tokio::test]
    async fn absent_inner_chunk_reads_as_fill() {
        let codec = sharding(basic_config(&[1, 1], "end")).unwrap();
        let rep = shard_rep(vec![2, 2], 7.0);
        let chunk = ZarrVectorValue::VFloat32(vec![7.0, 1.0, 7.0, 7.0]);
        let shard = codec.encode(chunk, &rep).await.unwrap();

        let inner = codec.decode_inner(&shard, &vec![1, 1], &rep).await.unwrap();
        assert_eq!(inner, ZarrVectorValue::VFloat32(vec![7.0]));
        let written = codec.decode_inner(&shard, &vec![0, 1], &rep).await.unwrap();
        assert_eq!(written, ZarrVectorValue::VFloat32(vec![1.0]));
    }

    #[tokio::test]
    async fn shard_layout_matches_the_wire_format() {
        // 4-element float32 shard split into two inner chunks of 2: the data
        // region is the two 8-byte chunks back to back, followed by a 32-byte
        // index of little-endian (offset, length) u64 pairs.
        let codec = sharding(basic_config(&[2], "end")).unwrap();
        let rep = shard_rep(vec![4], 0.0);
        let chunk = ZarrVectorValue::VFloat32(vec![1.0, 2.0, 3.0, 4.0]);
        let shard = codec.encode(chunk, &rep).await.unwrap();
        assert_eq!(shard.len(), 16 + 32);

        let mut expected = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0u64, 8, 8, 8] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(shard, expected);

        // With the index at the start the same bytes swap halves.
        let codec = sharding(basic_config(&[2], "start")).unwrap();
        let chunk = ZarrVectorValue::VFloat32(vec![1.0, 2.0, 3.0, 4.0]);
        let shard = codec.encode(chunk, &rep).await.unwrap();
        assert_eq!(&shard[..32], &expected[16..]);
        assert_eq!(&shard[32..], &expected[..16]);
    }

    #[tokio::test]
    async fn truncated_shard_is_corrupt() {
        let codec = sharding(basic_config(&[1, 1], "end")).unwrap();
        let rep = shard_rep(vec![2, 2], 0.0);
        let chunk = ZarrVectorValue::VFloat32(vec![1.0, 2.0, 3.0, 4.0]);
        let shard = codec.encode(chunk, &rep).await.unwrap();

        // Dropping the leading data bytes leaves index entries pointing
        // outside the data region.
        let truncated = shard[8..].to_vec();
        let err = codec.decode(truncated, &rep).await.unwrap_err();
        assert!(matches!(err, ZarrError::CorruptData(_)));

        let err = codec.decode(vec![0u8; 3], &rep).await.unwrap_err();
        assert!(matches!(err, ZarrError::CorruptData(_)));
    }

    #[tokio::test]
    async fn nested_compression_round_trips() {
        let codec = sharding(json!({
            "chunk_shape": [2, 3, 1],
            "codecs": [
                {"name": "bytes", "configuration": {"endian": "little"}},
                {"name": "blosc", "configuration": {
                    "cname": "lz4", "clevel": 4, "shuffle": "shuffle",
                    "typesize": 4, "blocksize": 0,
                }},
            ],
            "index_codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
            "index_location": "end",
        }))
        .unwrap();
        let rep = shard_rep(vec![2, 3, 5], 42.0);
        let chunk = ZarrVectorValue::VFloat32((0..30).map(|x| x as f32).collect());
        let shard = codec.encode(chunk.clone(), &rep).await.unwrap();
        assert_eq!(codec.decode(shard, &rep).await.unwrap(), chunk);
    }
}
