use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};

const LZ4_SIZE_PREFIX_BYTES: usize = 4;

/// LZ4 block codec with the numcodecs framing: a 4-byte little-endian
/// uncompressed-size prefix ahead of the raw block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lz4Codec {
    #[serde(default = "default_acceleration")]
    pub acceleration: i32,
}

fn default_acceleration() -> i32 {
    1
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self { acceleration: 1 }
    }
}

impl Lz4Codec {
    pub fn validate(&self) -> ZarrResult<()> {
        if self.acceleration < 0 {
            return Err(ZarrError::InvalidConfiguration(format!(
                "LZ4 acceleration must be non-negative, got {}",
                self.acceleration
            )));
        }
        Ok(())
    }

    pub fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        if data.len() < LZ4_SIZE_PREFIX_BYTES {
            return Err(ZarrError::CorruptData(
                "LZ4 block is missing its 4-byte size prefix".into(),
            ));
        }
        let (prefix, payload) = data.split_at(LZ4_SIZE_PREFIX_BYTES);
        let dest_size = u32::from_le_bytes(prefix.try_into().unwrap()) as usize;

        let decompressed = lz4_flex::block::decompress(payload, dest_size)
            .map_err(|e| ZarrError::CorruptData(format!("LZ4 decompress failed: {e}")))?;

        if decompressed.len() != dest_size {
            return Err(ZarrError::CorruptData(format!(
                "LZ4 block declared {dest_size} bytes but decompressed to {}",
                decompressed.len()
            )));
        }
        Ok(decompressed)
    }

    pub fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let orig_size = data.len() as u32;
        let compressed = lz4_flex::block::compress(data);
        let mut out = Vec::with_capacity(LZ4_SIZE_PREFIX_BYTES + compressed.len());
        out.extend_from_slice(&orig_size.to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = b"the quick brown fox ".repeat(64);
        let codec = Lz4Codec::default();
        assert_eq!(codec.decode(&codec.encode(&payload).unwrap()).unwrap(), payload);
    }

    #[test]
    fn truncated_prefix_is_corrupt() {
        assert!(matches!(
            Lz4Codec::default().decode(&[1, 2]).unwrap_err(),
            ZarrError::CorruptData(_)
        ));
    }

    #[test]
    fn size_prefix_mismatch_is_corrupt() {
        let codec = Lz4Codec::default();
        let mut encoded = codec.encode(b"hello world hello world").unwrap();
        // Lie about the uncompressed size.
        encoded[0..4].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            codec.decode(&encoded).unwrap_err(),
            ZarrError::CorruptData(_)
        ));
    }
}
