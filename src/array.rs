//! Array opening, creation, and region reads/writes.

use std::sync::Arc;

use bytes::Bytes;

use crate::codecs::default_registry;
use crate::error::{ZarrError, ZarrResult};
use crate::grid::{chunk_key, ArrayRegion, ChunkCoordinate, RegularChunkGrid};
use crate::metadata::ArrayMetadata;
use crate::pipeline::CodecPipeline;
use crate::store::{join_key, StorageBackend};
use crate::types::{fill_chunk, ChunkRepresentation, ZarrVectorValue};

pub const METADATA_KEY: &str = "zarr.json";

/// An open array: metadata plus the resolved codec pipeline, bound to a
/// location in a storage backend.
pub struct ZarrArray<S: StorageBackend + 'static> {
    store: Arc<S>,
    path: String,
    metadata: ArrayMetadata,
    grid: RegularChunkGrid,
    pipeline: CodecPipeline,
    chunk_rep: ChunkRepresentation,
}

impl<S: StorageBackend + 'static> Clone for ZarrArray<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            path: self.path.clone(),
            metadata: self.metadata.clone(),
            grid: self.grid.clone(),
            pipeline: self.pipeline.clone(),
            chunk_rep: self.chunk_rep.clone(),
        }
    }
}

impl<S: StorageBackend + 'static> std::fmt::Debug for ZarrArray<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrArray")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<S: StorageBackend + 'static> ZarrArray<S> {
    fn from_parts(store: Arc<S>, path: &str, metadata: ArrayMetadata) -> ZarrResult<Self> {
        metadata.validate()?;
        let grid = metadata.grid()?;
        let chunk_rep = metadata.chunk_representation()?;
        let pipeline = CodecPipeline::from_metadata(&metadata.codecs, default_registry())?;
        pipeline.validate(&chunk_rep)?;
        Ok(Self {
            store,
            path: path.to_string(),
            metadata,
            grid,
            pipeline,
            chunk_rep,
        })
    }

    /// Create a new array: validate the metadata, resolve its codec pipeline,
    /// and write `zarr.json`.
    pub async fn create(store: Arc<S>, path: &str, metadata: ArrayMetadata) -> ZarrResult<Self> {
        let array = Self::from_parts(store, path, metadata)?;
        array.write_metadata().await?;
        Ok(array)
    }

    /// Open an existing array from its `zarr.json`.
    pub async fn open(store: Arc<S>, path: &str) -> ZarrResult<Self> {
        let key = join_key(path, METADATA_KEY);
        let bytes = store
            .get(&key)
            .await?
            .ok_or_else(|| ZarrError::NotFound(format!("No {METADATA_KEY} at {path:?}")))?;
        let metadata = ArrayMetadata::parse(&bytes)?;
        Self::from_parts(store, path, metadata)
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[usize] {
        &self.metadata.shape
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.metadata.chunk_shape
    }

    async fn write_metadata(&self) -> ZarrResult<()> {
        let key = join_key(&self.path, METADATA_KEY);
        let bytes = self.metadata.to_json_bytes()?;
        self.store.put(&key, Bytes::from(bytes)).await
    }

    /// Storage key of the chunk at `coordinate`.
    pub fn chunk_store_key(&self, coordinate: &[usize]) -> String {
        join_key(&self.path, &chunk_key(coordinate, self.metadata.separator))
    }

    // -----------------------------------------------------------------------
    // Whole chunks
    // -----------------------------------------------------------------------

    /// Read the chunk at `coordinate` at its full nominal shape. An absent
    /// chunk materializes as fill value; an edge chunk keeps its fill-value
    /// padding beyond the array boundary.
    pub async fn read_chunk(&self, coordinate: &[usize]) -> ZarrResult<ZarrVectorValue> {
        self.grid.chunk_subset(coordinate)?;
        let bytes = self.store.get(&self.chunk_store_key(coordinate)).await?;
        self.pipeline
            .decode_maybe_chunk(bytes.map(|b| b.to_vec()), &self.chunk_rep)
            .await
    }

    /// Encode and store a full nominal chunk.
    pub async fn write_chunk(
        &self,
        coordinate: &[usize],
        chunk: ZarrVectorValue,
    ) -> ZarrResult<()> {
        self.grid.chunk_subset(coordinate)?;
        let encoded = self.pipeline.encode_chunk(chunk, &self.chunk_rep).await?;
        self.store
            .put(&self.chunk_store_key(coordinate), Bytes::from(encoded))
            .await
    }

    // -----------------------------------------------------------------------
    // Regions
    // -----------------------------------------------------------------------

    /// Read a rectangular region, materializing fill value wherever no chunk
    /// was ever written. Chunks are fetched and decoded concurrently.
    pub async fn read_region(&self, region: &ArrayRegion) -> ZarrResult<ZarrVectorValue> {
        region.validate_within(&self.metadata.shape)?;
        let mut out = fill_chunk(&self.chunk_rep.fill_value, &region.shape);
        if region.is_empty() {
            return Ok(out);
        }

        let handles: Vec<_> = self
            .grid
            .chunks_in_region(region)?
            .into_iter()
            .map(|coordinate| {
                let array = self.clone();
                tokio::spawn(async move {
                    let chunk = array.read_chunk(&coordinate).await?;
                    Ok::<_, ZarrError>((coordinate, chunk))
                })
            })
            .collect();

        let mut chunks = Vec::with_capacity(handles.len());
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => chunks.push(result),
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(ZarrError::Other(format!("Task join error: {e}"))),
            }
        }
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }

        for (coordinate, chunk) in chunks {
            let isect = self.region_within_chunk(&coordinate, region)?;
            let extent = self.grid.chunk_extent(&coordinate);
            let part = chunk.extract(
                &self.chunk_rep.shape,
                &offset_within(&extent.start, &isect.start),
                &isect.shape,
            )?;
            out.overlay(
                &region.shape,
                &offset_within(&region.start, &isect.start),
                &part,
                &isect.shape,
            )?;
        }
        Ok(out)
    }

    /// Write a rectangular region. Chunks only partially covered by the
    /// region are read, modified, and re-encoded; chunks fully covered are
    /// built from scratch. Distinct chunks are written concurrently.
    pub async fn write_region(&self, region: &ArrayRegion, data: ZarrVectorValue) -> ZarrResult<()> {
        region.validate_within(&self.metadata.shape)?;
        if data.data_type() != self.chunk_rep.data_type {
            return Err(ZarrError::TypeConversion(format!(
                "Cannot write {} data to a {} array",
                data.data_type(),
                self.chunk_rep.data_type
            )));
        }
        if data.len() != region.num_elements() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Region {:?} holds {} elements, got {}",
                region.shape,
                region.num_elements(),
                data.len()
            )));
        }
        if region.is_empty() {
            return Ok(());
        }

        let data = Arc::new(data);
        let handles: Vec<_> = self
            .grid
            .chunks_in_region(region)?
            .into_iter()
            .map(|coordinate| {
                let array = self.clone();
                let region = region.clone();
                let data = data.clone();
                tokio::spawn(async move { array.write_chunk_part(&coordinate, &region, &data).await })
            })
            .collect();

        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(ZarrError::Other(format!("Task join error: {e}"))),
            }
        }
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Write the part of `region` that lands in the chunk at `coordinate`.
    async fn write_chunk_part(
        &self,
        coordinate: &ChunkCoordinate,
        region: &ArrayRegion,
        data: &ZarrVectorValue,
    ) -> ZarrResult<()> {
        let valid = self.grid.chunk_subset(coordinate)?;
        let isect = self.region_within_chunk(coordinate, region)?;
        let extent = self.grid.chunk_extent(coordinate);

        let part = data.extract(
            &region.shape,
            &offset_within(&region.start, &isect.start),
            &isect.shape,
        )?;

        // When every element inside the array boundary is overwritten there
        // is nothing to preserve; otherwise read-modify-write, with an absent
        // chunk defaulting to fill value.
        let mut chunk = if isect == valid {
            fill_chunk(&self.chunk_rep.fill_value, &self.chunk_rep.shape)
        } else {
            self.read_chunk(coordinate).await?
        };
        chunk.overlay(
            &self.chunk_rep.shape,
            &offset_within(&extent.start, &isect.start),
            &part,
            &isect.shape,
        )?;

        let encoded = self.pipeline.encode_chunk(chunk, &self.chunk_rep).await?;
        self.store
            .put(&self.chunk_store_key(coordinate), Bytes::from(encoded))
            .await
    }

    fn region_within_chunk(
        &self,
        coordinate: &[usize],
        region: &ArrayRegion,
    ) -> ZarrResult<ArrayRegion> {
        self.grid
            .chunk_subset(coordinate)?
            .intersect(region)
            .ok_or_else(|| {
                ZarrError::Other(format!(
                    "Chunk {coordinate:?} does not intersect region {region:?}"
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Whole-array convenience
    // -----------------------------------------------------------------------

    pub async fn read_all(&self) -> ZarrResult<ZarrVectorValue> {
        self.read_region(&ArrayRegion::whole(&self.metadata.shape)).await
    }

    pub async fn write_all(&self, data: ZarrVectorValue) -> ZarrResult<()> {
        self.write_region(&ArrayRegion::whole(&self.metadata.shape), data).await
    }

    /// Read the whole array as a flat `Vec<f64>`, lossily.
    pub async fn load(&self) -> ZarrResult<Vec<f64>> {
        Ok(self.read_all().await?.to_f64_vec())
    }

    // -----------------------------------------------------------------------
    // Resize
    // -----------------------------------------------------------------------

    /// Change the array's logical shape and rewrite `zarr.json`. Reading a
    /// grown region returns fill value until it is written. Chunks that fall
    /// outside a shrunken shape are left in the store untouched.
    pub async fn resize(&mut self, new_shape: Vec<usize>) -> ZarrResult<()> {
        if new_shape.len() != self.metadata.shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Resize from rank {} to rank {}",
                self.metadata.shape.len(),
                new_shape.len()
            )));
        }
        self.metadata.shape = new_shape;
        self.grid = self.metadata.grid()?;
        self.write_metadata().await
    }
}

fn offset_within(outer_start: &[usize], inner_start: &[usize]) -> Vec<usize> {
    inner_start
        .iter()
        .zip(outer_start.iter())
        .map(|(i, o)| i - o)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ChunkKeySeparator;
    use crate::store::MemoryBackend;
    use crate::types::{DataType, FillValue, ZarrValue};
    use serde_json::json;

    fn metadata(shape: Vec<usize>, chunk_shape: Vec<usize>) -> ArrayMetadata {
        ArrayMetadata::new(
            shape,
            DataType::Float32,
            chunk_shape,
            FillValue::Value(ZarrValue::Float32(42.0)),
            vec![json!({"name": "bytes", "configuration": {"endian": "little"}})],
        )
    }

    fn ramp(n: usize) -> ZarrVectorValue {
        ZarrVectorValue::VFloat32((0..n).map(|x| x as f32).collect())
    }

    #[tokio::test]
    async fn create_then_open() {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(store.clone(), "a", metadata(vec![4, 4], vec![2, 2]))
            .await
            .unwrap();
        array.write_all(ramp(16)).await.unwrap();

        let reopened = ZarrArray::open(store, "a").await.unwrap();
        assert_eq!(reopened.metadata(), array.metadata());
        assert_eq!(reopened.read_all().await.unwrap(), ramp(16));
    }

    #[tokio::test]
    async fn unwritten_regions_read_fill() {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(store, "a", metadata(vec![4, 4], vec![2, 2]))
            .await
            .unwrap();
        let out = array.read_all().await.unwrap();
        assert_eq!(out, ZarrVectorValue::VFloat32(vec![42.0; 16]));
    }

    #[tokio::test]
    async fn partial_write_preserves_existing_data() {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(store, "a", metadata(vec![4, 4], vec![4, 4]))
            .await
            .unwrap();
        array.write_all(ramp(16)).await.unwrap();

        // Overwrite the middle 2x2; the same chunk holds the rest.
        let patch = ZarrVectorValue::VFloat32(vec![-1.0; 4]);
        array
            .write_region(&ArrayRegion::new(vec![1, 1], vec![2, 2]).unwrap(), patch)
            .await
            .unwrap();

        let out = array.read_all().await.unwrap().to_f64_vec();
        assert_eq!(out[0], 0.0);
        assert_eq!(out[5], -1.0);
        assert_eq!(out[6], -1.0);
        assert_eq!(out[7], 7.0);
        assert_eq!(out[15], 15.0);
    }

    #[tokio::test]
    async fn edge_chunks_are_padded_and_trimmed() {
        let store = Arc::new(MemoryBackend::new());
        // 3x3 array over 2x2 chunks: every boundary chunk is clipped.
        let array = ZarrArray::create(store, "a", metadata(vec![3, 3], vec![2, 2]))
            .await
            .unwrap();
        array.write_all(ramp(9)).await.unwrap();

        // The stored payload spans the full chunk shape.
        let chunk = array.read_chunk(&[1, 1]).await.unwrap();
        assert_eq!(chunk.len(), 4);
        assert_eq!(chunk.to_f64_vec(), vec![8.0, 42.0, 42.0, 42.0]);

        assert_eq!(array.read_all().await.unwrap(), ramp(9));
    }

    #[tokio::test]
    async fn separator_changes_keys_not_payloads() {
        let slash_store = Arc::new(MemoryBackend::new());
        let dot_store = Arc::new(MemoryBackend::new());
        let slash = ZarrArray::create(
            slash_store.clone(),
            "a",
            metadata(vec![4, 4], vec![2, 2]),
        )
        .await
        .unwrap();
        let dot = ZarrArray::create(
            dot_store.clone(),
            "a",
            metadata(vec![4, 4], vec![2, 2]).with_separator(ChunkKeySeparator::Dot),
        )
        .await
        .unwrap();

        slash.write_all(ramp(16)).await.unwrap();
        dot.write_all(ramp(16)).await.unwrap();

        let payload_slash = slash_store.get("a/c/1/0").await.unwrap().unwrap();
        let payload_dot = dot_store.get("a/c.1.0").await.unwrap().unwrap();
        assert_eq!(payload_slash, payload_dot);
        assert_eq!(slash_store.get("a/c.1.0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn resize_exposes_fill_values() {
        let store = Arc::new(MemoryBackend::new());
        let mut array = ZarrArray::create(store.clone(), "a", metadata(vec![2, 2], vec![2, 2]))
            .await
            .unwrap();
        array.write_all(ramp(4)).await.unwrap();

        array.resize(vec![3, 3]).await.unwrap();
        let out = array.read_all().await.unwrap().to_f64_vec();
        assert_eq!(out, vec![0.0, 1.0, 42.0, 2.0, 3.0, 42.0, 42.0, 42.0, 42.0]);

        // The resized metadata is persisted.
        let reopened = ZarrArray::open(store, "a").await.unwrap();
        assert_eq!(reopened.shape(), &[3, 3]);
    }

    #[tokio::test]
    async fn out_of_bounds_region_is_rejected() {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(store, "a", metadata(vec![4, 4], vec![2, 2]))
            .await
            .unwrap();
        let err = array
            .read_region(&ArrayRegion::new(vec![3, 3], vec![2, 2]).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ZarrError::DimensionMismatch(_)));
    }

    #[tokio::test]
    async fn wrong_dtype_write_is_rejected() {
        let store = Arc::new(MemoryBackend::new());
        let array = ZarrArray::create(store, "a", metadata(vec![2, 2], vec![2, 2]))
            .await
            .unwrap();
        let err = array
            .write_all(ZarrVectorValue::VInt32(vec![0; 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, ZarrError::TypeConversion(_)));
    }
}
