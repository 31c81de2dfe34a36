//! Ordered encode/decode of a single chunk through its codec pipeline.

use futures::future::BoxFuture;

use crate::codecs::{AnyCodec, CodecClass, CodecRegistry};
use crate::error::{ZarrError, ZarrResult};
use crate::types::{fill_chunk, ChunkRepresentation, ZarrVectorValue};

/// A validated codec pipeline: array codecs, then exactly one array-to-bytes
/// codec, then bytes codecs, in declared order.
#[derive(Debug, Clone)]
pub struct CodecPipeline {
    array_codecs: Vec<AnyCodec>,
    array_to_bytes: AnyCodec,
    bytes_codecs: Vec<AnyCodec>,
}

impl CodecPipeline {
    /// Partition `codecs` around the rank boundary, rejecting pipelines that
    /// are missing the array-to-bytes stage, have more than one, or list a
    /// codec on the wrong side of it.
    pub fn new(codecs: Vec<AnyCodec>) -> ZarrResult<Self> {
        let mut array_codecs = Vec::new();
        let mut array_to_bytes: Option<AnyCodec> = None;
        let mut bytes_codecs = Vec::new();
        for codec in codecs {
            match codec.class() {
                CodecClass::ArrayToArray => {
                    if array_to_bytes.is_some() {
                        return Err(ZarrError::InvalidConfiguration(format!(
                            "Array codec {} appears after the array-to-bytes codec",
                            codec.codec_id()
                        )));
                    }
                    array_codecs.push(codec);
                }
                CodecClass::ArrayToBytes => {
                    if array_to_bytes.is_some() {
                        return Err(ZarrError::InvalidConfiguration(
                            "Pipeline contains more than one array-to-bytes codec".into(),
                        ));
                    }
                    array_to_bytes = Some(codec);
                }
                CodecClass::BytesToBytes => {
                    if array_to_bytes.is_none() {
                        return Err(ZarrError::InvalidConfiguration(format!(
                            "Bytes codec {} appears before the array-to-bytes codec",
                            codec.codec_id()
                        )));
                    }
                    bytes_codecs.push(codec);
                }
            }
        }
        let array_to_bytes = array_to_bytes.ok_or_else(|| {
            ZarrError::InvalidConfiguration(
                "Pipeline must contain exactly one array-to-bytes codec".into(),
            )
        })?;
        Ok(Self {
            array_codecs,
            array_to_bytes,
            bytes_codecs,
        })
    }

    /// Resolve a list of `{name, configuration}` descriptors and build the
    /// pipeline.
    pub fn from_metadata(
        descriptors: &[serde_json::Value],
        registry: &CodecRegistry,
    ) -> ZarrResult<Self> {
        Self::new(registry.parse_list(descriptors)?)
    }

    /// Serialize back to `{name, configuration}` descriptors in declared
    /// order.
    pub fn to_metadata(&self) -> ZarrResult<Vec<serde_json::Value>> {
        self.iter().map(AnyCodec::to_json).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyCodec> {
        self.array_codecs
            .iter()
            .chain(std::iter::once(&self.array_to_bytes))
            .chain(self.bytes_codecs.iter())
    }

    /// Static checks that need the chunk representation: permutation ranks
    /// and, for a sharding stage, inner grid divisibility (recursively).
    pub fn validate(&self, rep: &ChunkRepresentation) -> ZarrResult<()> {
        let mut shape = rep.shape.clone();
        for codec in &self.array_codecs {
            if let AnyCodec::Transpose(t) = codec {
                t.validate_rank(shape.len())?;
            }
            shape = codec.transform_shape(&shape);
        }
        if let AnyCodec::Sharding(s) = &self.array_to_bytes {
            let transformed = ChunkRepresentation::new(shape, rep.data_type, rep.fill_value)?;
            s.validate(&transformed)?;
        }
        Ok(())
    }

    /// Encoded size when it is computable without encoding: a bare `bytes`
    /// stage with no trailing bytes codecs. `None` otherwise.
    pub fn fixed_encoded_size(&self, rep: &ChunkRepresentation) -> Option<usize> {
        if self.bytes_codecs.is_empty() && matches!(self.array_to_bytes, AnyCodec::Bytes(_)) {
            Some(rep.byte_len())
        } else {
            None
        }
    }

    /// Run the pipeline forward: array codecs, array-to-bytes, bytes codecs.
    ///
    /// Boxed so the sharding codec can run a nested pipeline per inner chunk.
    pub fn encode_chunk<'a>(
        &'a self,
        chunk: ZarrVectorValue,
        rep: &'a ChunkRepresentation,
    ) -> BoxFuture<'a, ZarrResult<Vec<u8>>> {
        Box::pin(async move {
            if chunk.data_type() != rep.data_type {
                return Err(ZarrError::TypeConversion(format!(
                    "Chunk has type {}, pipeline expects {}",
                    chunk.data_type(),
                    rep.data_type
                )));
            }
            if chunk.len() != rep.num_elements() {
                return Err(ZarrError::DimensionMismatch(format!(
                    "Chunk has {} elements, shape {:?} requires {}",
                    chunk.len(),
                    rep.shape,
                    rep.num_elements()
                )));
            }

            let mut data = chunk;
            let mut shape = rep.shape.clone();
            for codec in &self.array_codecs {
                match codec {
                    AnyCodec::Transpose(t) => {
                        let (transformed, transformed_shape) = t.encode(data, &shape)?;
                        data = transformed;
                        shape = transformed_shape;
                    }
                    other => {
                        return Err(ZarrError::Other(format!(
                            "{} is not an array codec",
                            other.codec_id()
                        )));
                    }
                }
            }

            let transformed_rep =
                ChunkRepresentation::new(shape, rep.data_type, rep.fill_value)?;
            let mut bytes = match &self.array_to_bytes {
                AnyCodec::Bytes(c) => c.encode(&data, &transformed_rep)?,
                AnyCodec::Sharding(c) => c.encode(data, &transformed_rep).await?,
                other => {
                    return Err(ZarrError::Other(format!(
                        "{} is not an array-to-bytes codec",
                        other.codec_id()
                    )));
                }
            };

            for codec in &self.bytes_codecs {
                bytes = codec.encode_bytes(bytes).await?;
            }
            Ok(bytes)
        })
    }

    /// Run the pipeline in reverse, recovering a typed chunk of exactly
    /// `rep.shape`.
    pub fn decode_chunk<'a>(
        &'a self,
        data: Vec<u8>,
        rep: &'a ChunkRepresentation,
    ) -> BoxFuture<'a, ZarrResult<ZarrVectorValue>> {
        Box::pin(async move {
            let mut bytes = data;
            for codec in self.bytes_codecs.iter().rev() {
                bytes = codec.decode_bytes(bytes).await?;
            }

            // Shape ahead of each array codec, in encode order.
            let mut shapes = vec![rep.shape.clone()];
            for codec in &self.array_codecs {
                let next = codec.transform_shape(shapes.last().unwrap());
                shapes.push(next);
            }

            let transformed_rep = ChunkRepresentation::new(
                shapes.last().unwrap().clone(),
                rep.data_type,
                rep.fill_value,
            )?;
            let mut chunk = match &self.array_to_bytes {
                AnyCodec::Bytes(c) => c.decode(&bytes, &transformed_rep)?,
                AnyCodec::Sharding(c) => c.decode(bytes, &transformed_rep).await?,
                other => {
                    return Err(ZarrError::Other(format!(
                        "{} is not an array-to-bytes codec",
                        other.codec_id()
                    )));
                }
            };

            for (i, codec) in self.array_codecs.iter().enumerate().rev() {
                match codec {
                    AnyCodec::Transpose(t) => {
                        let (restored, _) = t.decode(chunk, &shapes[i])?;
                        chunk = restored;
                    }
                    other => {
                        return Err(ZarrError::Other(format!(
                            "{} is not an array codec",
                            other.codec_id()
                        )));
                    }
                }
            }

            if chunk.len() != rep.num_elements() {
                return Err(ZarrError::DimensionMismatch(format!(
                    "Decoded chunk has {} elements, shape {:?} requires {}",
                    chunk.len(),
                    rep.shape,
                    rep.num_elements()
                )));
            }
            Ok(chunk)
        })
    }

    /// Decode a chunk that may be absent from storage: a missing payload
    /// materializes as a full chunk of fill value, anything present must
    /// decode cleanly.
    pub async fn decode_maybe_chunk(
        &self,
        data: Option<Vec<u8>>,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<ZarrVectorValue> {
        match data {
            Some(bytes) => self.decode_chunk(bytes, rep).await,
            None => Ok(fill_chunk(&rep.fill_value, &rep.shape)),
        }
    }
}
