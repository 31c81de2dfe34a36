pub mod v3;

use half::f16;

use crate::types::{DataType, FillValue, ZarrValue};

pub use v3::ArrayMetadata;

/// Parse a fill value from a JSON value, given the target data type.
/// Handles the special string forms "NaN", "Infinity" and "-Infinity" for
/// float types, and plain numbers for everything else.
pub fn parse_fill_value(dtype: DataType, value: &serde_json::Value) -> Result<FillValue, String> {
    match value {
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" if dtype.is_float() => Ok(FillValue::NaN),
            "Infinity" if dtype.is_float() => Ok(FillValue::Infinity),
            "-Infinity" if dtype.is_float() => Ok(FillValue::NegativeInfinity),
            "NaN" | "Infinity" | "-Infinity" => Err(format!("{s} not valid for {dtype}")),
            _ => Err(format!("Expected {dtype} value, got string: {s}")),
        },

        serde_json::Value::Number(n) => parse_numeric_fill(dtype, n),

        _ => Err(format!("Unexpected fill_value JSON: {value}")),
    }
}

fn parse_numeric_fill(dtype: DataType, n: &serde_json::Number) -> Result<FillValue, String> {
    match dtype {
        DataType::Int8 => {
            let i = n
                .as_i64()
                .ok_or_else(|| format!("Expected int for int8, got {n}"))?;
            let v = i8::try_from(i).map_err(|_| format!("Value {i} out of range for int8"))?;
            Ok(FillValue::Value(ZarrValue::Int8(v)))
        }
        DataType::Int16 => {
            let i = n
                .as_i64()
                .ok_or_else(|| format!("Expected int for int16, got {n}"))?;
            let v = i16::try_from(i).map_err(|_| format!("Value {i} out of range for int16"))?;
            Ok(FillValue::Value(ZarrValue::Int16(v)))
        }
        DataType::Int32 => {
            let i = n
                .as_i64()
                .ok_or_else(|| format!("Expected int for int32, got {n}"))?;
            let v = i32::try_from(i).map_err(|_| format!("Value {i} out of range for int32"))?;
            Ok(FillValue::Value(ZarrValue::Int32(v)))
        }
        DataType::Int64 => {
            let i = n
                .as_i64()
                .ok_or_else(|| format!("Expected int for int64, got {n}"))?;
            Ok(FillValue::Value(ZarrValue::Int64(i)))
        }
        DataType::UInt8 => {
            let i = n
                .as_u64()
                .ok_or_else(|| format!("Expected uint for uint8, got {n}"))?;
            let v = u8::try_from(i).map_err(|_| format!("Value {i} out of range for uint8"))?;
            Ok(FillValue::Value(ZarrValue::UInt8(v)))
        }
        DataType::UInt16 => {
            let i = n
                .as_u64()
                .ok_or_else(|| format!("Expected uint for uint16, got {n}"))?;
            let v = u16::try_from(i).map_err(|_| format!("Value {i} out of range for uint16"))?;
            Ok(FillValue::Value(ZarrValue::UInt16(v)))
        }
        DataType::UInt32 => {
            let i = n
                .as_u64()
                .ok_or_else(|| format!("Expected uint for uint32, got {n}"))?;
            let v = u32::try_from(i).map_err(|_| format!("Value {i} out of range for uint32"))?;
            Ok(FillValue::Value(ZarrValue::UInt32(v)))
        }
        DataType::UInt64 => {
            let i = n
                .as_u64()
                .ok_or_else(|| format!("Expected uint for uint64, got {n}"))?;
            Ok(FillValue::Value(ZarrValue::UInt64(i)))
        }
        DataType::Float16 => {
            let f = n
                .as_f64()
                .ok_or_else(|| format!("Expected float for float16, got {n}"))?;
            Ok(FillValue::Value(ZarrValue::Float16(f16::from_f64(f))))
        }
        DataType::Float32 => {
            let f = n
                .as_f64()
                .ok_or_else(|| format!("Expected float for float32, got {n}"))?;
            Ok(FillValue::Value(ZarrValue::Float32(f as f32)))
        }
        DataType::Float64 => {
            let f = n
                .as_f64()
                .ok_or_else(|| format!("Expected float for float64, got {n}"))?;
            Ok(FillValue::Value(ZarrValue::Float64(f)))
        }
    }
}

/// Serialize a fill value back to its JSON form.
pub fn fill_value_to_json(fill: &FillValue) -> serde_json::Value {
    match fill {
        FillValue::NaN => serde_json::Value::String("NaN".into()),
        FillValue::Infinity => serde_json::Value::String("Infinity".into()),
        FillValue::NegativeInfinity => serde_json::Value::String("-Infinity".into()),
        FillValue::Value(v) => match v {
            ZarrValue::Int8(x) => serde_json::json!(x),
            ZarrValue::Int16(x) => serde_json::json!(x),
            ZarrValue::Int32(x) => serde_json::json!(x),
            ZarrValue::Int64(x) => serde_json::json!(x),
            ZarrValue::UInt8(x) => serde_json::json!(x),
            ZarrValue::UInt16(x) => serde_json::json!(x),
            ZarrValue::UInt32(x) => serde_json::json!(x),
            ZarrValue::UInt64(x) => serde_json::json!(x),
            ZarrValue::Float16(x) => serde_json::json!(x.to_f64()),
            ZarrValue::Float32(x) => serde_json::json!(x),
            ZarrValue::Float64(x) => serde_json::json!(x),
        },
    }
}
