use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZstdCodec {
    #[serde(default = "default_level")]
    pub level: i32,
}

fn default_level() -> i32 {
    5
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 5 }
    }
}

impl ZstdCodec {
    pub fn validate(&self) -> ZarrResult<()> {
        if !(0..=22).contains(&self.level) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Zstd level must be 0-22, got {}",
                self.level
            )));
        }
        Ok(())
    }

    pub fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        // The frame header carries the uncompressed size.
        zstd::stream::decode_all(data)
            .map_err(|e| ZarrError::CorruptData(format!("Zstd decompress failed: {e}")))
    }

    pub fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        zstd::stream::encode_all(data, self.level)
            .map_err(|e| ZarrError::Other(format!("Zstd compress failed: {e}")))
    }
}
