use crate::error::{ZarrError, ZarrResult};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZlibCodec {
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self { level: 1 }
    }
}

impl ZlibCodec {
    pub fn validate(&self) -> ZarrResult<()> {
        if self.level > 9 {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Zlib level must be 0-9, got {}",
                self.level
            )));
        }
        Ok(())
    }

    pub fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::CorruptData(format!("Zlib decompress failed: {e}")))?;
        Ok(out)
    }

    pub fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(data, Compression::new(self.level));
        let mut out = Vec::new();
        encoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::Other(format!("Zlib compress failed: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let codec = ZlibCodec::default();
        assert_eq!(codec.decode(&codec.encode(&payload).unwrap()).unwrap(), payload);
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            ZlibCodec::default().decode(&[0xff; 8]).unwrap_err(),
            ZarrError::CorruptData(_)
        ));
    }
}
