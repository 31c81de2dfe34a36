use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;

// ---------------------------------------------------------------------------
// Blosc back-end and shuffle types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscCname {
    Lz4,
    Lz4hc,
    Blosclz,
    Zstd,
    Snappy,
    Zlib,
}

impl std::fmt::Display for BloscCname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BloscCname::Lz4 => write!(f, "lz4"),
            BloscCname::Lz4hc => write!(f, "lz4hc"),
            BloscCname::Blosclz => write!(f, "blosclz"),
            BloscCname::Zstd => write!(f, "zstd"),
            BloscCname::Snappy => write!(f, "snappy"),
            BloscCname::Zlib => write!(f, "zlib"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BloscShuffle {
    #[default]
    NoShuffle,
    Shuffle,
    BitShuffle,
}

impl Serialize for BloscShuffle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BloscShuffle::NoShuffle => serializer.serialize_str("noshuffle"),
            BloscShuffle::Shuffle => serializer.serialize_str("shuffle"),
            BloscShuffle::BitShuffle => serializer.serialize_str("bitshuffle"),
        }
    }
}

impl<'de> Deserialize<'de> for BloscShuffle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        match &v {
            serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                "noshuffle" | "none" | "0" => Ok(BloscShuffle::NoShuffle),
                "shuffle" | "1" => Ok(BloscShuffle::Shuffle),
                "bitshuffle" | "2" => Ok(BloscShuffle::BitShuffle),
                other => Err(serde::de::Error::custom(format!(
                    "Unknown blosc shuffle: {other}"
                ))),
            },
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(BloscShuffle::NoShuffle),
                Some(1) => Ok(BloscShuffle::Shuffle),
                Some(2) => Ok(BloscShuffle::BitShuffle),
                _ => Err(serde::de::Error::custom(format!(
                    "Unknown blosc shuffle int: {n}"
                ))),
            },
            _ => Err(serde::de::Error::custom(
                "Expected string or int for blosc shuffle",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// BloscCodec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloscCodec {
    #[serde(default = "default_cname")]
    pub cname: BloscCname,
    #[serde(default = "default_clevel")]
    pub clevel: i32,
    #[serde(default)]
    pub shuffle: BloscShuffle,
    #[serde(default = "default_typesize")]
    pub typesize: usize,
    #[serde(default)]
    pub blocksize: usize,
}

fn default_cname() -> BloscCname {
    BloscCname::Zstd
}

fn default_clevel() -> i32 {
    5
}

fn default_typesize() -> usize {
    1
}

impl Default for BloscCodec {
    fn default() -> Self {
        Self {
            cname: BloscCname::Zstd,
            clevel: 5,
            shuffle: BloscShuffle::NoShuffle,
            typesize: 1,
            blocksize: 0,
        }
    }
}

impl BloscCodec {
    pub fn validate(&self) -> ZarrResult<()> {
        if !(0..=9).contains(&self.clevel) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Blosc clevel must be 0-9, got {}",
                self.clevel
            )));
        }
        if self.typesize == 0 {
            return Err(ZarrError::InvalidConfiguration(
                "Blosc typesize must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Decompress blosc-compressed data. The frame header identifies the
    /// back-end, so decode needs none of the encode-time settings.
    /// Runs on a blocking thread since decompression can be CPU-intensive.
    pub async fn decode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || blosc_decompress(&data))
            .await
            .map_err(|e| ZarrError::Other(format!("Blosc task join error: {e}")))?
    }

    /// Compress data using blosc.
    pub async fn encode(&self, data: &[u8]) -> ZarrResult<Vec<u8>> {
        if self.shuffle != BloscShuffle::NoShuffle && !data.len().is_multiple_of(self.typesize) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Blosc typesize {} does not divide the input length {}",
                self.typesize,
                data.len()
            )));
        }
        let data = data.to_vec();
        let codec = self.clone();
        tokio::task::spawn_blocking(move || blosc_compress(&data, &codec))
            .await
            .map_err(|e| ZarrError::Other(format!("Blosc task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Blosc FFI wrappers
// ---------------------------------------------------------------------------

/// Map a `BloscCname` to the corresponding C string expected by blosc.
fn compressor_as_cstr(cname: BloscCname) -> &'static CStr {
    match cname {
        BloscCname::Lz4 => c"lz4",
        BloscCname::Lz4hc => c"lz4hc",
        BloscCname::Blosclz => c"blosclz",
        BloscCname::Zstd => c"zstd",
        BloscCname::Snappy => c"snappy",
        BloscCname::Zlib => c"zlib",
    }
}

/// Validate a blosc compressed buffer and return the uncompressed size.
/// Returns `None` if the buffer is invalid.
fn blosc_validate(data: &[u8]) -> Option<usize> {
    let mut nbytes: usize = 0;
    let result =
        unsafe { blosc_src::blosc_cbuffer_validate(data.as_ptr().cast(), data.len(), &mut nbytes) };
    if result == 0 { Some(nbytes) } else { None }
}

/// Decompress a blosc-compressed buffer.
///
/// Uses `blosc_decompress_ctx` which is thread-safe and does not require
/// `blosc_init()`.
fn blosc_decompress(data: &[u8]) -> ZarrResult<Vec<u8>> {
    let nbytes = blosc_validate(data)
        .ok_or_else(|| ZarrError::CorruptData("Blosc frame header is invalid".into()))?;

    if nbytes == 0 {
        return Ok(Vec::new());
    }

    let mut output = vec![0u8; nbytes];
    let result = unsafe {
        blosc_src::blosc_decompress_ctx(
            data.as_ptr().cast(),
            output.as_mut_ptr().cast(),
            output.len(),
            1, // numinternalthreads
        )
    };
    if result < 0 {
        return Err(ZarrError::CorruptData(format!(
            "Blosc decompress returned error code: {result}"
        )));
    }
    Ok(output)
}

/// Compress data using blosc.
///
/// Uses `blosc_compress_ctx` which is thread-safe, does not require
/// `blosc_init()`, and accepts the compressor name directly (no global state).
fn blosc_compress(data: &[u8], codec: &BloscCodec) -> ZarrResult<Vec<u8>> {
    let shuffle_int = match codec.shuffle {
        BloscShuffle::NoShuffle => blosc_src::BLOSC_NOSHUFFLE as i32,
        BloscShuffle::Shuffle => blosc_src::BLOSC_SHUFFLE as i32,
        BloscShuffle::BitShuffle => blosc_src::BLOSC_BITSHUFFLE as i32,
    };

    let destsize = data.len() + blosc_src::BLOSC_MAX_OVERHEAD as usize;
    let mut compressed = vec![0u8; destsize];

    let cbytes = unsafe {
        blosc_src::blosc_compress_ctx(
            codec.clevel,
            shuffle_int,
            codec.typesize,
            data.len(),
            data.as_ptr().cast(),
            compressed.as_mut_ptr().cast(),
            destsize,
            compressor_as_cstr(codec.cname).as_ptr(),
            codec.blocksize,
            1, // numinternalthreads
        )
    };

    if cbytes < 0 {
        return Err(ZarrError::Other(format!(
            "Blosc compress returned error code: {cbytes}"
        )));
    }
    compressed.truncate(cbytes as usize);
    Ok(compressed)
}
