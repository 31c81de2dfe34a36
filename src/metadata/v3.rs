//! The `zarr.json` array metadata document.

use crate::error::{ZarrError, ZarrResult};
use crate::grid::{ChunkKeySeparator, RegularChunkGrid};
use crate::types::{ChunkRepresentation, DataType, FillValue};

use super::{fill_value_to_json, parse_fill_value};

pub const ZARR_FORMAT: u64 = 3;

/// Everything needed to decode every chunk of an array. Owned by the array's
/// root location in the store; immutable apart from [`ArrayMetadata::shape`]
/// (which grows on resize).
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    pub shape: Vec<usize>,
    pub data_type: DataType,
    pub chunk_shape: Vec<usize>,
    pub separator: ChunkKeySeparator,
    pub fill_value: FillValue,
    /// Codec descriptors in pipeline order, kept in wire form so the document
    /// round-trips field for field.
    pub codecs: Vec<serde_json::Value>,
    pub attributes: Option<serde_json::Map<String, serde_json::Value>>,
    pub dimension_names: Option<Vec<Option<String>>>,
}

impl ArrayMetadata {
    pub fn new(
        shape: Vec<usize>,
        data_type: DataType,
        chunk_shape: Vec<usize>,
        fill_value: FillValue,
        codecs: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            shape,
            data_type,
            chunk_shape,
            separator: ChunkKeySeparator::default(),
            fill_value,
            codecs,
            attributes: None,
            dimension_names: None,
        }
    }

    pub fn with_separator(mut self, separator: ChunkKeySeparator) -> Self {
        self.separator = separator;
        self
    }

    /// Structural checks that do not need the codec registry.
    pub fn validate(&self) -> ZarrResult<()> {
        if self.chunk_shape.len() != self.shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Chunk shape rank {} does not match array rank {}",
                self.chunk_shape.len(),
                self.shape.len()
            )));
        }
        if self.chunk_shape.iter().any(|&c| c == 0) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Chunk shape must be positive along every axis, got {:?}",
                self.chunk_shape
            )));
        }
        if let Some(names) = &self.dimension_names {
            if names.len() != self.shape.len() {
                return Err(ZarrError::DimensionMismatch(format!(
                    "{} dimension names for an array of rank {}",
                    names.len(),
                    self.shape.len()
                )));
            }
        }
        // The fill value must resolve against the data type.
        self.fill_value.to_scalar(self.data_type)?;
        Ok(())
    }

    pub fn grid(&self) -> ZarrResult<RegularChunkGrid> {
        RegularChunkGrid::new(self.shape.clone(), self.chunk_shape.clone())
    }

    /// Representation of one nominal (unclipped) chunk.
    pub fn chunk_representation(&self) -> ZarrResult<ChunkRepresentation> {
        ChunkRepresentation::new(
            self.chunk_shape.clone(),
            self.data_type,
            self.fill_value.to_scalar(self.data_type)?,
        )
    }

    // -----------------------------------------------------------------------
    // Parse
    // -----------------------------------------------------------------------

    pub fn parse(json_bytes: &[u8]) -> ZarrResult<Self> {
        let raw: serde_json::Value = serde_json::from_slice(json_bytes)
            .map_err(|e| ZarrError::Metadata(format!("Invalid JSON: {e}")))?;
        let obj = raw
            .as_object()
            .ok_or_else(|| ZarrError::Metadata("Expected JSON object".into()))?;

        let format = require(obj, "zarr_format")?
            .as_u64()
            .ok_or_else(|| ZarrError::Metadata("'zarr_format' must be a number".into()))?;
        if format != ZARR_FORMAT {
            return Err(ZarrError::Metadata(format!(
                "Unsupported zarr_format: {format}"
            )));
        }
        let node_type = require(obj, "node_type")?
            .as_str()
            .ok_or_else(|| ZarrError::Metadata("'node_type' must be a string".into()))?;
        if node_type != "array" {
            return Err(ZarrError::Metadata(format!(
                "Expected an array document, got node_type {node_type:?}"
            )));
        }

        let shape = parse_shape(require(obj, "shape")?, "shape")?;

        let dtype_str = require(obj, "data_type")?
            .as_str()
            .ok_or_else(|| ZarrError::Metadata("'data_type' must be a string".into()))?;
        let data_type = DataType::parse(dtype_str)?;

        let chunk_shape = parse_chunk_grid(require(obj, "chunk_grid")?)?;
        let separator = parse_chunk_key_encoding(obj.get("chunk_key_encoding"))?;

        let fill_value = parse_fill_value(data_type, require(obj, "fill_value")?)
            .map_err(|e| ZarrError::Metadata(format!("fill_value: {e}")))?;

        let codecs = require(obj, "codecs")?
            .as_array()
            .ok_or_else(|| ZarrError::Metadata("'codecs' must be an array".into()))?
            .clone();

        let attributes = match obj.get("attributes") {
            Some(serde_json::Value::Object(map)) => Some(map.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(_) => return Err(ZarrError::Metadata("'attributes' must be an object".into())),
        };

        let dimension_names = match obj.get("dimension_names") {
            Some(serde_json::Value::Array(values)) => {
                let mut names = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        serde_json::Value::String(s) => names.push(Some(s.clone())),
                        serde_json::Value::Null => names.push(None),
                        _ => {
                            return Err(ZarrError::Metadata(
                                "'dimension_names' entries must be strings or null".into(),
                            ));
                        }
                    }
                }
                Some(names)
            }
            Some(serde_json::Value::Null) | None => None,
            Some(_) => {
                return Err(ZarrError::Metadata(
                    "'dimension_names' must be an array".into(),
                ));
            }
        };

        let metadata = Self {
            shape,
            data_type,
            chunk_shape,
            separator,
            fill_value,
            codecs,
            attributes,
            dimension_names,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    // -----------------------------------------------------------------------
    // Serialize
    // -----------------------------------------------------------------------

    pub fn to_json_value(&self) -> serde_json::Value {
        let mut doc = serde_json::json!({
            "zarr_format": ZARR_FORMAT,
            "node_type": "array",
            "shape": self.shape,
            "data_type": self.data_type.name(),
            "chunk_grid": {
                "name": "regular",
                "configuration": {"chunk_shape": self.chunk_shape},
            },
            "chunk_key_encoding": {
                "name": "default",
                "configuration": {"separator": self.separator},
            },
            "fill_value": fill_value_to_json(&self.fill_value),
            "codecs": self.codecs,
        });
        let obj = doc.as_object_mut().unwrap();
        if let Some(attributes) = &self.attributes {
            obj.insert("attributes".into(), serde_json::Value::Object(attributes.clone()));
        }
        if let Some(names) = &self.dimension_names {
            obj.insert("dimension_names".into(), serde_json::json!(names));
        }
        doc
    }

    pub fn to_json_bytes(&self) -> ZarrResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_json_value())?)
    }
}

fn require<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> ZarrResult<&'a serde_json::Value> {
    obj.get(field)
        .ok_or_else(|| ZarrError::Metadata(format!("Missing '{field}' field")))
}

fn parse_shape(value: &serde_json::Value, field: &str) -> ZarrResult<Vec<usize>> {
    value
        .as_array()
        .ok_or_else(|| ZarrError::Metadata(format!("'{field}' must be an array")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| ZarrError::Metadata(format!("'{field}' entries must be non-negative integers")))
        })
        .collect()
}

fn parse_chunk_grid(value: &serde_json::Value) -> ZarrResult<Vec<usize>> {
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ZarrError::Metadata("'chunk_grid' must have a name".into()))?;
    if name != "regular" {
        return Err(ZarrError::Metadata(format!(
            "Unsupported chunk grid: {name}"
        )));
    }
    let chunk_shape = value
        .get("configuration")
        .and_then(|c| c.get("chunk_shape"))
        .ok_or_else(|| ZarrError::Metadata("'chunk_grid' is missing chunk_shape".into()))?;
    parse_shape(chunk_shape, "chunk_shape")
}

fn parse_chunk_key_encoding(value: Option<&serde_json::Value>) -> ZarrResult<ChunkKeySeparator> {
    let Some(value) = value else {
        return Ok(ChunkKeySeparator::default());
    };
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ZarrError::Metadata("'chunk_key_encoding' must have a name".into()))?;
    if name != "default" {
        return Err(ZarrError::Metadata(format!(
            "Unsupported chunk key encoding: {name}"
        )));
    }
    match value.get("configuration").and_then(|c| c.get("separator")) {
        None => Ok(ChunkKeySeparator::default()),
        Some(sep) => serde_json::from_value(sep.clone())
            .map_err(|e| ZarrError::Metadata(format!("separator: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZarrValue;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "zarr_format": 3,
            "node_type": "array",
            "shape": [2, 3, 5],
            "data_type": "float32",
            "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [1, 1, 1]}},
            "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
            "fill_value": 42.0,
            "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
        })
    }

    #[test]
    fn parses_a_full_document() {
        let md = ArrayMetadata::parse(&serde_json::to_vec(&document()).unwrap()).unwrap();
        assert_eq!(md.shape, vec![2, 3, 5]);
        assert_eq!(md.data_type, DataType::Float32);
        assert_eq!(md.chunk_shape, vec![1, 1, 1]);
        assert_eq!(md.separator, ChunkKeySeparator::Slash);
        assert_eq!(md.fill_value, FillValue::Value(ZarrValue::Float32(42.0)));
        assert_eq!(md.codecs.len(), 1);
    }

    #[test]
    fn round_trips_through_json() {
        let md = ArrayMetadata::parse(&serde_json::to_vec(&document()).unwrap()).unwrap();
        let bytes = md.to_json_bytes().unwrap();
        let md2 = ArrayMetadata::parse(&bytes).unwrap();
        assert_eq!(md, md2);
        // Serializing the reparsed document is byte-identical.
        assert_eq!(md2.to_json_bytes().unwrap(), bytes);
    }

    #[test]
    fn rejects_foreign_documents() {
        let mut doc = document();
        doc["zarr_format"] = json!(2);
        assert!(ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).is_err());

        let mut doc = document();
        doc["node_type"] = json!("group");
        assert!(ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).is_err());

        let mut doc = document();
        doc["data_type"] = json!("complex64");
        assert!(ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).is_err());
    }

    #[test]
    fn rejects_rank_mismatch() {
        let mut doc = document();
        doc["chunk_grid"]["configuration"]["chunk_shape"] = json!([1, 1]);
        assert!(matches!(
            ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()),
            Err(ZarrError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn missing_chunk_key_encoding_defaults_to_slash() {
        let mut doc = document();
        doc.as_object_mut().unwrap().remove("chunk_key_encoding");
        let md = ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(md.separator, ChunkKeySeparator::Slash);
    }

    #[test]
    fn fill_value_type_is_enforced() {
        let mut doc = document();
        doc["fill_value"] = json!("NaN");
        assert!(ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).is_ok());
        doc["data_type"] = json!("int32");
        assert!(ArrayMetadata::parse(&serde_json::to_vec(&doc).unwrap()).is_err());
    }
}
