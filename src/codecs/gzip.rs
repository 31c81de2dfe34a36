use crate::error::{ZarrError, ZarrResult};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GzipCodec {
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    5
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 5 }
    }
}

impl GzipCodec {
    pub fn validate(&self) -> ZarrResult<()> {
        if self.level > 9 {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Gzip level must be 0-9, got {}",
                self.level
            )));
        }
        Ok(())
    }

    pub fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::CorruptData(format!("Gzip decompress failed: {e}")))?;
        Ok(out)
    }

    pub fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(data, Compression::new(self.level));
        let mut out = Vec::new();
        encoder
            .read_to_end(&mut out)
            .map_err(|e| ZarrError::Other(format!("Gzip compress failed: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_is_level_independent() {
        let payload = b"abcabcabcabc".repeat(32);
        let reference = GzipCodec { level: 1 }.encode(&payload).unwrap();
        for level in [2, 4] {
            let other = GzipCodec { level }.encode(&payload).unwrap();
            assert_eq!(GzipCodec::default().decode(&other).unwrap(), payload);
            assert_eq!(GzipCodec::default().decode(&reference).unwrap(), payload);
        }
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = GzipCodec::default().decode(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, ZarrError::CorruptData(_)));
    }

    #[test]
    fn level_out_of_range() {
        assert!(GzipCodec { level: 10 }.validate().is_err());
    }
}
