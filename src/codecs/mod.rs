pub mod blosc;
pub mod bytes;
pub mod gzip;
pub mod lz4;
pub mod sharding;
pub mod transpose;
pub mod zlib;
pub mod zstd;

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{ZarrError, ZarrResult};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CodecId / CodecClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Transpose,
    Bytes,
    Blosc,
    Gzip,
    Zlib,
    Zstd,
    Lz4,
    Sharding,
}

impl CodecId {
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::Transpose => "transpose",
            CodecId::Bytes => "bytes",
            CodecId::Blosc => "blosc",
            CodecId::Gzip => "gzip",
            CodecId::Zlib => "zlib",
            CodecId::Zstd => "zstd",
            CodecId::Lz4 => "lz4",
            CodecId::Sharding => "sharding_indexed",
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where a codec sits in the pipeline: above, at, or below the rank boundary
/// between shaped arrays and flat bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecClass {
    ArrayToArray,
    ArrayToBytes,
    BytesToBytes,
}

// ---------------------------------------------------------------------------
// AnyCodec  (enum dispatch, no Box<dyn>)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum AnyCodec {
    Transpose(transpose::TransposeCodec),
    Bytes(bytes::BytesCodec),
    Blosc(blosc::BloscCodec),
    Gzip(gzip::GzipCodec),
    Zlib(zlib::ZlibCodec),
    Zstd(zstd::ZstdCodec),
    Lz4(lz4::Lz4Codec),
    Sharding(sharding::ShardingCodec),
}

impl AnyCodec {
    pub fn codec_id(&self) -> CodecId {
        match self {
            AnyCodec::Transpose(_) => CodecId::Transpose,
            AnyCodec::Bytes(_) => CodecId::Bytes,
            AnyCodec::Blosc(_) => CodecId::Blosc,
            AnyCodec::Gzip(_) => CodecId::Gzip,
            AnyCodec::Zlib(_) => CodecId::Zlib,
            AnyCodec::Zstd(_) => CodecId::Zstd,
            AnyCodec::Lz4(_) => CodecId::Lz4,
            AnyCodec::Sharding(_) => CodecId::Sharding,
        }
    }

    pub fn class(&self) -> CodecClass {
        match self {
            AnyCodec::Transpose(_) => CodecClass::ArrayToArray,
            AnyCodec::Bytes(_) | AnyCodec::Sharding(_) => CodecClass::ArrayToBytes,
            AnyCodec::Blosc(_)
            | AnyCodec::Gzip(_)
            | AnyCodec::Zlib(_)
            | AnyCodec::Zstd(_)
            | AnyCodec::Lz4(_) => CodecClass::BytesToBytes,
        }
    }

    /// Encode one byte sequence into another (bytes-to-bytes codecs only).
    pub async fn encode_bytes(&self, data: Vec<u8>) -> ZarrResult<Vec<u8>> {
        match self {
            AnyCodec::Blosc(c) => c.encode(&data).await,
            AnyCodec::Gzip(c) => c.encode(&data),
            AnyCodec::Zlib(c) => c.encode(&data),
            AnyCodec::Zstd(c) => c.encode(&data),
            AnyCodec::Lz4(c) => c.encode(&data),
            other => Err(ZarrError::Other(format!(
                "{} is not a bytes-to-bytes codec",
                other.codec_id()
            ))),
        }
    }

    /// Decode one byte sequence into another (bytes-to-bytes codecs only).
    pub async fn decode_bytes(&self, data: Vec<u8>) -> ZarrResult<Vec<u8>> {
        match self {
            AnyCodec::Blosc(c) => c.decode(&data).await,
            AnyCodec::Gzip(c) => c.decode(&data),
            AnyCodec::Zlib(c) => c.decode(&data),
            AnyCodec::Zstd(c) => c.decode(&data),
            AnyCodec::Lz4(c) => c.decode(&data),
            other => Err(ZarrError::Other(format!(
                "{} is not a bytes-to-bytes codec",
                other.codec_id()
            ))),
        }
    }

    /// Shape of the encoded array given the decoded shape (array codecs may
    /// reorder it, all other codecs leave it alone).
    pub fn transform_shape(&self, shape: &[usize]) -> Vec<usize> {
        match self {
            AnyCodec::Transpose(c) => c.transform_shape(shape),
            _ => shape.to_vec(),
        }
    }

    /// Serialize back to the `{name, configuration}` wire form.
    pub fn to_json(&self) -> ZarrResult<serde_json::Value> {
        let configuration = match self {
            AnyCodec::Transpose(c) => serde_json::to_value(c)?,
            AnyCodec::Bytes(c) => serde_json::to_value(c)?,
            AnyCodec::Blosc(c) => serde_json::to_value(c)?,
            AnyCodec::Gzip(c) => serde_json::to_value(c)?,
            AnyCodec::Zlib(c) => serde_json::to_value(c)?,
            AnyCodec::Zstd(c) => serde_json::to_value(c)?,
            AnyCodec::Lz4(c) => serde_json::to_value(c)?,
            AnyCodec::Sharding(c) => c.configuration_json()?,
        };
        Ok(serde_json::json!({
            "name": self.codec_id().name(),
            "configuration": configuration,
        }))
    }
}

// ---------------------------------------------------------------------------
// Codec registry
// ---------------------------------------------------------------------------

/// JSON envelope for a codec pipeline entry.
#[derive(Debug, Deserialize, Serialize)]
struct CodecEnvelope {
    name: String,
    #[serde(default)]
    configuration: Option<serde_json::Value>,
}

pub type CodecConstructor = fn(&serde_json::Value) -> ZarrResult<AnyCodec>;

/// Maps codec names to constructors that validate a configuration object and
/// yield a codec instance.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    constructors: HashMap<String, CodecConstructor>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding every built-in codec.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(CodecId::Transpose.name(), make_transpose);
        registry.register(CodecId::Bytes.name(), make_bytes);
        registry.register(CodecId::Blosc.name(), make_blosc);
        registry.register(CodecId::Gzip.name(), make_gzip);
        registry.register(CodecId::Zlib.name(), make_zlib);
        registry.register(CodecId::Zstd.name(), make_zstd);
        registry.register(CodecId::Lz4.name(), make_lz4);
        registry.register(CodecId::Sharding.name(), make_sharding);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: CodecConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Look up `name` and run its constructor against `configuration`.
    pub fn resolve(
        &self,
        name: &str,
        configuration: &serde_json::Value,
    ) -> ZarrResult<AnyCodec> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ZarrError::UnknownCodec(name.to_string()))?;
        constructor(configuration)
    }

    /// Parse a single `{name, configuration}` pipeline entry.
    pub fn parse(&self, value: &serde_json::Value) -> ZarrResult<AnyCodec> {
        let envelope: CodecEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| ZarrError::InvalidConfiguration(format!("Invalid codec envelope: {e}")))?;
        let configuration = envelope
            .configuration
            .unwrap_or(serde_json::Value::Object(Default::default()));
        self.resolve(&envelope.name, &configuration)
    }

    pub fn parse_list(&self, values: &[serde_json::Value]) -> ZarrResult<Vec<AnyCodec>> {
        values.iter().map(|v| self.parse(v)).collect()
    }
}

/// The process-wide registry, populated once with the built-in codecs before
/// any array is opened.
pub fn default_registry() -> &'static CodecRegistry {
    static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CodecRegistry::with_defaults)
}

fn invalid(id: CodecId, e: serde_json::Error) -> ZarrError {
    ZarrError::InvalidConfiguration(format!("{id}: {e}"))
}

fn make_transpose(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: transpose::TransposeCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Transpose, e))?;
    codec.validate()?;
    Ok(AnyCodec::Transpose(codec))
}

fn make_bytes(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: bytes::BytesCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Bytes, e))?;
    Ok(AnyCodec::Bytes(codec))
}

fn make_blosc(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: blosc::BloscCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Blosc, e))?;
    codec.validate()?;
    Ok(AnyCodec::Blosc(codec))
}

fn make_gzip(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: gzip::GzipCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Gzip, e))?;
    codec.validate()?;
    Ok(AnyCodec::Gzip(codec))
}

fn make_zlib(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: zlib::ZlibCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Zlib, e))?;
    codec.validate()?;
    Ok(AnyCodec::Zlib(codec))
}

fn make_zstd(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: zstd::ZstdCodec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Zstd, e))?;
    codec.validate()?;
    Ok(AnyCodec::Zstd(codec))
}

fn make_lz4(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec: lz4::Lz4Codec =
        serde_json::from_value(config.clone()).map_err(|e| invalid(CodecId::Lz4, e))?;
    codec.validate()?;
    Ok(AnyCodec::Lz4(codec))
}

fn make_sharding(config: &serde_json::Value) -> ZarrResult<AnyCodec> {
    let codec = sharding::ShardingCodec::from_config(config)?;
    Ok(AnyCodec::Sharding(codec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codec_name() {
        let err = default_registry()
            .resolve("vlen-utf8", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ZarrError::UnknownCodec(_)));
    }

    #[test]
    fn invalid_configuration_surfaces() {
        let err = default_registry()
            .parse(&serde_json::json!({
                "name": "transpose",
                "configuration": {"order": [0, 0, 1]},
            }))
            .unwrap_err();
        assert!(matches!(err, ZarrError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_configuration_uses_defaults() {
        let codec = default_registry()
            .parse(&serde_json::json!({"name": "bytes"}))
            .unwrap();
        assert!(matches!(codec, AnyCodec::Bytes(_)));
    }

    #[test]
    fn envelope_round_trips() {
        let value = serde_json::json!({
            "name": "blosc",
            "configuration": {
                "cname": "lz4", "clevel": 4, "shuffle": "shuffle",
                "typesize": 4, "blocksize": 0,
            },
        });
        let codec = default_registry().parse(&value).unwrap();
        let back = codec.to_json().unwrap();
        assert_eq!(back["name"], "blosc");
        assert_eq!(back["configuration"]["cname"], "lz4");
        assert_eq!(back["configuration"]["shuffle"], "shuffle");
    }

    #[test]
    fn custom_registration() {
        let mut registry = CodecRegistry::empty();
        registry.register("bytes", super::make_bytes);
        assert!(registry.resolve("bytes", &serde_json::json!({})).is_ok());
        assert!(matches!(
            registry.resolve("gzip", &serde_json::json!({})),
            Err(ZarrError::UnknownCodec(_))
        ));
    }
}
