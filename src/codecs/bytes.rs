use crate::error::{ZarrError, ZarrResult};
use crate::types::{
    bytes_to_zarr_vector, zarr_vector_to_bytes, ChunkRepresentation, Endian, ZarrVectorValue,
};
use serde::{Deserialize, Serialize};

/// The mandatory array-to-bytes codec: serializes a typed chunk to a flat
/// byte sequence in row-major element order with the configured endianness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BytesCodec {
    #[serde(default)]
    pub endian: Endian,
}

impl Default for BytesCodec {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
        }
    }
}

impl BytesCodec {
    pub fn new(endian: Endian) -> Self {
        Self { endian }
    }

    pub fn encode(
        &self,
        data: &ZarrVectorValue,
        rep: &ChunkRepresentation,
    ) -> ZarrResult<Vec<u8>> {
        if data.data_type() != rep.data_type {
            return Err(ZarrError::TypeConversion(format!(
                "Cannot serialize {} data as {}",
                data.data_type(),
                rep.data_type
            )));
        }
        if data.len() != rep.num_elements() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Chunk has {} elements, shape {:?} requires {}",
                data.len(),
                rep.shape,
                rep.num_elements()
            )));
        }
        Ok(zarr_vector_to_bytes(self.endian, data))
    }

    pub fn decode(&self, data: &[u8], rep: &ChunkRepresentation) -> ZarrResult<ZarrVectorValue> {
        let expected = rep.byte_len();
        if data.len() != expected {
            return Err(ZarrError::CorruptData(format!(
                "Chunk payload is {} bytes, {} {} elements require {expected}",
                data.len(),
                rep.num_elements(),
                rep.data_type
            )));
        }
        bytes_to_zarr_vector(self.endian, rep.data_type, data)
    }
}

// Custom serde for Endian so it reads naturally in JSON configs.
impl Serialize for Endian {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Endian::Little => serializer.serialize_str("little"),
            Endian::Big => serializer.serialize_str("big"),
        }
    }
}

impl<'de> Deserialize<'de> for Endian {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "little" => Ok(Endian::Little),
            "big" => Ok(Endian::Big),
            other => Err(serde::de::Error::custom(format!("Unknown endian: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, ZarrValue};

    fn rep(shape: Vec<usize>) -> ChunkRepresentation {
        ChunkRepresentation::new(shape, DataType::Float32, ZarrValue::Float32(0.0)).unwrap()
    }

    #[test]
    fn round_trip_little_and_big() {
        let data = ZarrVectorValue::VFloat32(vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5]);
        let rep = rep(vec![2, 3]);
        for endian in [Endian::Little, Endian::Big] {
            let codec = BytesCodec::new(endian);
            let raw = codec.encode(&data, &rep).unwrap();
            assert_eq!(raw.len(), 24);
            assert_eq!(codec.decode(&raw, &rep).unwrap(), data);
        }
    }

    #[test]
    fn length_mismatch_is_corrupt() {
        let codec = BytesCodec::default();
        let err = codec.decode(&[0u8; 23], &rep(vec![2, 3])).unwrap_err();
        assert!(matches!(err, ZarrError::CorruptData(_)));
    }

    #[test]
    fn endian_config_parses() {
        let codec: BytesCodec = serde_json::from_str(r#"{"endian": "big"}"#).unwrap();
        assert_eq!(codec.endian, Endian::Big);
        let codec: BytesCodec = serde_json::from_str("{}").unwrap();
        assert_eq!(codec.endian, Endian::Little);
        assert!(serde_json::from_str::<BytesCodec>(r#"{"endian": "middle"}"#).is_err());
    }
}
