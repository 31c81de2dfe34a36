use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;
use std::io::Cursor;

use crate::error::{ZarrError, ZarrResult};

// ---------------------------------------------------------------------------
// Endian
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Fixed-width numeric element types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl DataType {
    /// Number of bytes per element.
    pub fn byte_size(&self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 | DataType::Float16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
        }
    }

    /// The identifier used in metadata documents.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    pub fn parse(s: &str) -> ZarrResult<DataType> {
        match s {
            "int8" => Ok(DataType::Int8),
            "int16" => Ok(DataType::Int16),
            "int32" => Ok(DataType::Int32),
            "int64" => Ok(DataType::Int64),
            "uint8" => Ok(DataType::UInt8),
            "uint16" => Ok(DataType::UInt16),
            "uint32" => Ok(DataType::UInt32),
            "uint64" => Ok(DataType::UInt64),
            "float16" => Ok(DataType::Float16),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(ZarrError::Metadata(format!("Unknown data type: {other}"))),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float32 | DataType::Float64)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// ZarrValue  (scalar)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZarrValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float16(f16),
    Float32(f32),
    Float64(f64),
}

impl ZarrValue {
    /// Return the [`DataType`] that this value belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            ZarrValue::Int8(_) => DataType::Int8,
            ZarrValue::Int16(_) => DataType::Int16,
            ZarrValue::Int32(_) => DataType::Int32,
            ZarrValue::Int64(_) => DataType::Int64,
            ZarrValue::UInt8(_) => DataType::UInt8,
            ZarrValue::UInt16(_) => DataType::UInt16,
            ZarrValue::UInt32(_) => DataType::UInt32,
            ZarrValue::UInt64(_) => DataType::UInt64,
            ZarrValue::Float16(_) => DataType::Float16,
            ZarrValue::Float32(_) => DataType::Float32,
            ZarrValue::Float64(_) => DataType::Float64,
        }
    }

    /// Lossily convert this scalar to `f64`.
    pub fn to_f64(&self) -> f64 {
        match self {
            ZarrValue::Int8(v) => *v as f64,
            ZarrValue::Int16(v) => *v as f64,
            ZarrValue::Int32(v) => *v as f64,
            ZarrValue::Int64(v) => *v as f64,
            ZarrValue::UInt8(v) => *v as f64,
            ZarrValue::UInt16(v) => *v as f64,
            ZarrValue::UInt32(v) => *v as f64,
            ZarrValue::UInt64(v) => *v as f64,
            ZarrValue::Float16(v) => v.to_f64(),
            ZarrValue::Float32(v) => *v as f64,
            ZarrValue::Float64(v) => *v,
        }
    }
}

/// Default zero scalar for a data type.
pub fn default_scalar(dtype: DataType) -> ZarrValue {
    match dtype {
        DataType::Int8 => ZarrValue::Int8(0),
        DataType::Int16 => ZarrValue::Int16(0),
        DataType::Int32 => ZarrValue::Int32(0),
        DataType::Int64 => ZarrValue::Int64(0),
        DataType::UInt8 => ZarrValue::UInt8(0),
        DataType::UInt16 => ZarrValue::UInt16(0),
        DataType::UInt32 => ZarrValue::UInt32(0),
        DataType::UInt64 => ZarrValue::UInt64(0),
        DataType::Float16 => ZarrValue::Float16(f16::ZERO),
        DataType::Float32 => ZarrValue::Float32(0.0),
        DataType::Float64 => ZarrValue::Float64(0.0),
    }
}

// ---------------------------------------------------------------------------
// FillValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    Value(ZarrValue),
    NaN,
    Infinity,
    NegativeInfinity,
}

impl FillValue {
    /// Resolve to a concrete scalar of the given data type.
    pub fn to_scalar(&self, dtype: DataType) -> ZarrResult<ZarrValue> {
        match self {
            FillValue::Value(v) if v.data_type() == dtype => Ok(*v),
            FillValue::Value(v) => Err(ZarrError::TypeConversion(format!(
                "Fill value has type {}, array has type {dtype}",
                v.data_type()
            ))),
            FillValue::NaN => float_scalar(dtype, f64::NAN),
            FillValue::Infinity => float_scalar(dtype, f64::INFINITY),
            FillValue::NegativeInfinity => float_scalar(dtype, f64::NEG_INFINITY),
        }
    }
}

fn float_scalar(dtype: DataType, v: f64) -> ZarrResult<ZarrValue> {
    match dtype {
        DataType::Float16 => Ok(ZarrValue::Float16(f16::from_f64(v))),
        DataType::Float32 => Ok(ZarrValue::Float32(v as f32)),
        DataType::Float64 => Ok(ZarrValue::Float64(v)),
        _ => Err(ZarrError::TypeConversion(format!(
            "Non-finite fill value not valid for {dtype}"
        ))),
    }
}

/// Default fill value for a data type.
pub fn default_fill_value(dtype: DataType) -> FillValue {
    FillValue::Value(default_scalar(dtype))
}

// ---------------------------------------------------------------------------
// ChunkRepresentation
// ---------------------------------------------------------------------------

/// Shape, element type and resolved fill value of a chunk as seen by the
/// codec pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRepresentation {
    pub shape: Vec<usize>,
    pub data_type: DataType,
    pub fill_value: ZarrValue,
}

impl ChunkRepresentation {
    pub fn new(shape: Vec<usize>, data_type: DataType, fill_value: ZarrValue) -> ZarrResult<Self> {
        if fill_value.data_type() != data_type {
            return Err(ZarrError::TypeConversion(format!(
                "Fill value has type {}, chunk has type {data_type}",
                fill_value.data_type()
            )));
        }
        Ok(Self {
            shape,
            data_type,
            fill_value,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn element_size(&self) -> usize {
        self.data_type.byte_size()
    }

    pub fn byte_len(&self) -> usize {
        self.num_elements() * self.element_size()
    }
}

// ---------------------------------------------------------------------------
// ZarrVectorValue  (typed chunk data)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ZarrVectorValue {
    VInt8(Vec<i8>),
    VInt16(Vec<i16>),
    VInt32(Vec<i32>),
    VInt64(Vec<i64>),
    VUInt8(Vec<u8>),
    VUInt16(Vec<u16>),
    VUInt32(Vec<u32>),
    VUInt64(Vec<u64>),
    VFloat16(Vec<f16>),
    VFloat32(Vec<f32>),
    VFloat64(Vec<f64>),
}

impl ZarrVectorValue {
    /// Number of elements in the vector.
    pub fn len(&self) -> usize {
        match self {
            ZarrVectorValue::VInt8(v) => v.len(),
            ZarrVectorValue::VInt16(v) => v.len(),
            ZarrVectorValue::VInt32(v) => v.len(),
            ZarrVectorValue::VInt64(v) => v.len(),
            ZarrVectorValue::VUInt8(v) => v.len(),
            ZarrVectorValue::VUInt16(v) => v.len(),
            ZarrVectorValue::VUInt32(v) => v.len(),
            ZarrVectorValue::VUInt64(v) => v.len(),
            ZarrVectorValue::VFloat16(v) => v.len(),
            ZarrVectorValue::VFloat32(v) => v.len(),
            ZarrVectorValue::VFloat64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ZarrVectorValue::VInt8(_) => DataType::Int8,
            ZarrVectorValue::VInt16(_) => DataType::Int16,
            ZarrVectorValue::VInt32(_) => DataType::Int32,
            ZarrVectorValue::VInt64(_) => DataType::Int64,
            ZarrVectorValue::VUInt8(_) => DataType::UInt8,
            ZarrVectorValue::VUInt16(_) => DataType::UInt16,
            ZarrVectorValue::VUInt32(_) => DataType::UInt32,
            ZarrVectorValue::VUInt64(_) => DataType::UInt64,
            ZarrVectorValue::VFloat16(_) => DataType::Float16,
            ZarrVectorValue::VFloat32(_) => DataType::Float32,
            ZarrVectorValue::VFloat64(_) => DataType::Float64,
        }
    }

    /// Lossily convert the entire vector to `Vec<f64>`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ZarrVectorValue::VInt8(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VInt16(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VInt32(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VInt64(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VUInt8(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VUInt16(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VUInt32(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VUInt64(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VFloat16(v) => v.iter().map(|x| x.to_f64()).collect(),
            ZarrVectorValue::VFloat32(v) => v.iter().map(|x| *x as f64).collect(),
            ZarrVectorValue::VFloat64(v) => v.clone(),
        }
    }

    /// Copy the rectangular block starting at `start` with shape `block_shape`
    /// out of this vector, interpreted as a row-major array of shape `shape`.
    pub fn extract(
        &self,
        shape: &[usize],
        start: &[usize],
        block_shape: &[usize],
    ) -> ZarrResult<ZarrVectorValue> {
        check_block(shape, start, block_shape, self.len())?;
        Ok(match self {
            ZarrVectorValue::VInt8(v) => {
                ZarrVectorValue::VInt8(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VInt16(v) => {
                ZarrVectorValue::VInt16(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VInt32(v) => {
                ZarrVectorValue::VInt32(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VInt64(v) => {
                ZarrVectorValue::VInt64(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VUInt8(v) => {
                ZarrVectorValue::VUInt8(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VUInt16(v) => {
                ZarrVectorValue::VUInt16(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VUInt32(v) => {
                ZarrVectorValue::VUInt32(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VUInt64(v) => {
                ZarrVectorValue::VUInt64(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VFloat16(v) => {
                ZarrVectorValue::VFloat16(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VFloat32(v) => {
                ZarrVectorValue::VFloat32(extract_block(v, shape, start, block_shape))
            }
            ZarrVectorValue::VFloat64(v) => {
                ZarrVectorValue::VFloat64(extract_block(v, shape, start, block_shape))
            }
        })
    }

    /// Overlay `src` (row-major, shape `src_shape`) onto this vector at
    /// `start`, interpreting this vector as a row-major array of shape `shape`.
    pub fn overlay(
        &mut self,
        shape: &[usize],
        start: &[usize],
        src: &ZarrVectorValue,
        src_shape: &[usize],
    ) -> ZarrResult<()> {
        check_block(shape, start, src_shape, self.len())?;
        if src.len() != src_shape.iter().product::<usize>() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Source has {} elements, shape {src_shape:?} requires {}",
                src.len(),
                src_shape.iter().product::<usize>()
            )));
        }
        match (self, src) {
            (ZarrVectorValue::VInt8(d), ZarrVectorValue::VInt8(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VInt16(d), ZarrVectorValue::VInt16(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VInt32(d), ZarrVectorValue::VInt32(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VInt64(d), ZarrVectorValue::VInt64(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VUInt8(d), ZarrVectorValue::VUInt8(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VUInt16(d), ZarrVectorValue::VUInt16(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VUInt32(d), ZarrVectorValue::VUInt32(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VUInt64(d), ZarrVectorValue::VUInt64(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VFloat16(d), ZarrVectorValue::VFloat16(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VFloat32(d), ZarrVectorValue::VFloat32(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (ZarrVectorValue::VFloat64(d), ZarrVectorValue::VFloat64(s)) => {
                overlay_block(d, shape, start, s, src_shape);
            }
            (d, s) => {
                return Err(ZarrError::TypeConversion(format!(
                    "Cannot overlay {} data onto {} data",
                    s.data_type(),
                    d.data_type()
                )));
            }
        }
        Ok(())
    }

    /// Reorder axes of this vector, interpreted as a row-major array of shape
    /// `shape`, according to the permutation `order`. The caller guarantees
    /// `order` is a bijection over `0..shape.len()`.
    pub fn permuted(&self, shape: &[usize], order: &[usize]) -> ZarrVectorValue {
        match self {
            ZarrVectorValue::VInt8(v) => ZarrVectorValue::VInt8(permute_block(v, shape, order)),
            ZarrVectorValue::VInt16(v) => ZarrVectorValue::VInt16(permute_block(v, shape, order)),
            ZarrVectorValue::VInt32(v) => ZarrVectorValue::VInt32(permute_block(v, shape, order)),
            ZarrVectorValue::VInt64(v) => ZarrVectorValue::VInt64(permute_block(v, shape, order)),
            ZarrVectorValue::VUInt8(v) => ZarrVectorValue::VUInt8(permute_block(v, shape, order)),
            ZarrVectorValue::VUInt16(v) => {
                ZarrVectorValue::VUInt16(permute_block(v, shape, order))
            }
            ZarrVectorValue::VUInt32(v) => {
                ZarrVectorValue::VUInt32(permute_block(v, shape, order))
            }
            ZarrVectorValue::VUInt64(v) => {
                ZarrVectorValue::VUInt64(permute_block(v, shape, order))
            }
            ZarrVectorValue::VFloat16(v) => {
                ZarrVectorValue::VFloat16(permute_block(v, shape, order))
            }
            ZarrVectorValue::VFloat32(v) => {
                ZarrVectorValue::VFloat32(permute_block(v, shape, order))
            }
            ZarrVectorValue::VFloat64(v) => {
                ZarrVectorValue::VFloat64(permute_block(v, shape, order))
            }
        }
    }

    /// Whether every element equals `scalar`. Float comparison is bitwise so
    /// that NaN fill values compare equal to themselves.
    pub fn all_equal(&self, scalar: &ZarrValue) -> bool {
        match (self, scalar) {
            (ZarrVectorValue::VInt8(v), ZarrValue::Int8(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VInt16(v), ZarrValue::Int16(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VInt32(v), ZarrValue::Int32(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VInt64(v), ZarrValue::Int64(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VUInt8(v), ZarrValue::UInt8(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VUInt16(v), ZarrValue::UInt16(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VUInt32(v), ZarrValue::UInt32(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VUInt64(v), ZarrValue::UInt64(s)) => v.iter().all(|x| x == s),
            (ZarrVectorValue::VFloat16(v), ZarrValue::Float16(s)) => {
                v.iter().all(|x| x.to_bits() == s.to_bits())
            }
            (ZarrVectorValue::VFloat32(v), ZarrValue::Float32(s)) => {
                v.iter().all(|x| x.to_bits() == s.to_bits())
            }
            (ZarrVectorValue::VFloat64(v), ZarrValue::Float64(s)) => {
                v.iter().all(|x| x.to_bits() == s.to_bits())
            }
            _ => false,
        }
    }
}

/// Create a filled chunk vector by replicating a scalar value.
pub fn fill_chunk(value: &ZarrValue, chunk_shape: &[usize]) -> ZarrVectorValue {
    let total: usize = chunk_shape.iter().product();
    match value {
        ZarrValue::Int8(v) => ZarrVectorValue::VInt8(vec![*v; total]),
        ZarrValue::Int16(v) => ZarrVectorValue::VInt16(vec![*v; total]),
        ZarrValue::Int32(v) => ZarrVectorValue::VInt32(vec![*v; total]),
        ZarrValue::Int64(v) => ZarrVectorValue::VInt64(vec![*v; total]),
        ZarrValue::UInt8(v) => ZarrVectorValue::VUInt8(vec![*v; total]),
        ZarrValue::UInt16(v) => ZarrVectorValue::VUInt16(vec![*v; total]),
        ZarrValue::UInt32(v) => ZarrVectorValue::VUInt32(vec![*v; total]),
        ZarrValue::UInt64(v) => ZarrVectorValue::VUInt64(vec![*v; total]),
        ZarrValue::Float16(v) => ZarrVectorValue::VFloat16(vec![*v; total]),
        ZarrValue::Float32(v) => ZarrVectorValue::VFloat32(vec![*v; total]),
        ZarrValue::Float64(v) => ZarrVectorValue::VFloat64(vec![*v; total]),
    }
}

// ---------------------------------------------------------------------------
// Row-major block operations
// ---------------------------------------------------------------------------

/// Row-major strides: the last dimension varies fastest.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut s: Vec<usize> = shape
        .iter()
        .rev()
        .scan(1usize, |state, &dim| {
            let stride = *state;
            *state *= dim;
            Some(stride)
        })
        .collect();
    s.reverse();
    s
}

fn check_block(
    shape: &[usize],
    start: &[usize],
    block_shape: &[usize],
    len: usize,
) -> ZarrResult<()> {
    if start.len() != shape.len() || block_shape.len() != shape.len() {
        return Err(ZarrError::DimensionMismatch(format!(
            "Block rank {} / start rank {} does not match array rank {}",
            block_shape.len(),
            start.len(),
            shape.len()
        )));
    }
    if len != shape.iter().product::<usize>() {
        return Err(ZarrError::DimensionMismatch(format!(
            "Array has {len} elements, shape {shape:?} requires {}",
            shape.iter().product::<usize>()
        )));
    }
    for d in 0..shape.len() {
        if start[d] + block_shape[d] > shape[d] {
            return Err(ZarrError::DimensionMismatch(format!(
                "Block {start:?}+{block_shape:?} exceeds shape {shape:?} along axis {d}"
            )));
        }
    }
    Ok(())
}

fn extract_block<T: Copy>(
    src: &[T],
    src_shape: &[usize],
    start: &[usize],
    block_shape: &[usize],
) -> Vec<T> {
    let rank = src_shape.len();
    let total: usize = block_shape.iter().product();
    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return out;
    }
    if rank == 0 {
        out.extend_from_slice(src);
        return out;
    }
    let strides = row_major_strides(src_shape);
    let run = block_shape[rank - 1];
    let mut idx = vec![0usize; rank - 1];
    'rows: loop {
        let mut offset = start[rank - 1];
        for d in 0..rank - 1 {
            offset += (start[d] + idx[d]) * strides[d];
        }
        out.extend_from_slice(&src[offset..offset + run]);
        for d in (0..rank - 1).rev() {
            idx[d] += 1;
            if idx[d] < block_shape[d] {
                continue 'rows;
            }
            idx[d] = 0;
        }
        break;
    }
    out
}

fn overlay_block<T: Copy>(
    dst: &mut [T],
    dst_shape: &[usize],
    start: &[usize],
    src: &[T],
    src_shape: &[usize],
) {
    let rank = dst_shape.len();
    if src_shape.iter().product::<usize>() == 0 {
        return;
    }
    if rank == 0 {
        dst.copy_from_slice(src);
        return;
    }
    let strides = row_major_strides(dst_shape);
    let run = src_shape[rank - 1];
    let mut idx = vec![0usize; rank - 1];
    let mut src_pos = 0usize;
    'rows: loop {
        let mut offset = start[rank - 1];
        for d in 0..rank - 1 {
            offset += (start[d] + idx[d]) * strides[d];
        }
        dst[offset..offset + run].copy_from_slice(&src[src_pos..src_pos + run]);
        src_pos += run;
        for d in (0..rank - 1).rev() {
            idx[d] += 1;
            if idx[d] < src_shape[d] {
                continue 'rows;
            }
            idx[d] = 0;
        }
        break;
    }
}

fn permute_block<T: Copy>(src: &[T], shape: &[usize], order: &[usize]) -> Vec<T> {
    let rank = shape.len();
    let total: usize = shape.iter().product();
    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return out;
    }
    let out_shape: Vec<usize> = order.iter().map(|&d| shape[d]).collect();
    let src_strides = row_major_strides(shape);
    // Stride in the source of each output axis.
    let strides: Vec<usize> = order.iter().map(|&d| src_strides[d]).collect();
    let mut idx = vec![0usize; rank];
    loop {
        let offset: usize = idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum();
        out.push(src[offset]);
        let mut done = true;
        for d in (0..rank).rev() {
            idx[d] += 1;
            if idx[d] < out_shape[d] {
                done = false;
                break;
            }
            idx[d] = 0;
        }
        if done {
            break;
        }
    }
    out
}

/// The inverse of a permutation: `inverse[order[i]] == i`.
pub fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; order.len()];
    for (i, &d) in order.iter().enumerate() {
        inv[d] = i;
    }
    inv
}

// ---------------------------------------------------------------------------
// Raw bytes <-> typed vector
// ---------------------------------------------------------------------------

/// Interpret raw bytes as a typed vector according to `endian` and `dtype`.
pub fn bytes_to_zarr_vector(
    endian: Endian,
    dtype: DataType,
    data: &[u8],
) -> ZarrResult<ZarrVectorValue> {
    match dtype {
        DataType::Int8 => Ok(ZarrVectorValue::VInt8(
            data.iter().map(|b| *b as i8).collect(),
        )),
        DataType::UInt8 => Ok(ZarrVectorValue::VUInt8(data.to_vec())),

        DataType::Int16 => read_vec_typed(
            endian,
            data,
            |c| c.read_i16::<LittleEndian>(),
            |c| c.read_i16::<BigEndian>(),
            ZarrVectorValue::VInt16,
        ),
        DataType::Int32 => read_vec_typed(
            endian,
            data,
            |c| c.read_i32::<LittleEndian>(),
            |c| c.read_i32::<BigEndian>(),
            ZarrVectorValue::VInt32,
        ),
        DataType::Int64 => read_vec_typed(
            endian,
            data,
            |c| c.read_i64::<LittleEndian>(),
            |c| c.read_i64::<BigEndian>(),
            ZarrVectorValue::VInt64,
        ),
        DataType::UInt16 => read_vec_typed(
            endian,
            data,
            |c| c.read_u16::<LittleEndian>(),
            |c| c.read_u16::<BigEndian>(),
            ZarrVectorValue::VUInt16,
        ),
        DataType::UInt32 => read_vec_typed(
            endian,
            data,
            |c| c.read_u32::<LittleEndian>(),
            |c| c.read_u32::<BigEndian>(),
            ZarrVectorValue::VUInt32,
        ),
        DataType::UInt64 => read_vec_typed(
            endian,
            data,
            |c| c.read_u64::<LittleEndian>(),
            |c| c.read_u64::<BigEndian>(),
            ZarrVectorValue::VUInt64,
        ),

        DataType::Float16 => {
            let count = data.len() / 2;
            let mut out = Vec::with_capacity(count);
            let mut cursor = Cursor::new(data);
            for _ in 0..count {
                let bits = match endian {
                    Endian::Little => cursor.read_u16::<LittleEndian>(),
                    Endian::Big => cursor.read_u16::<BigEndian>(),
                }
                .map_err(|e| ZarrError::CorruptData(format!("Failed to read f16: {e}")))?;
                out.push(f16::from_bits(bits));
            }
            Ok(ZarrVectorValue::VFloat16(out))
        }
        DataType::Float32 => read_vec_typed(
            endian,
            data,
            |c| c.read_f32::<LittleEndian>(),
            |c| c.read_f32::<BigEndian>(),
            ZarrVectorValue::VFloat32,
        ),
        DataType::Float64 => read_vec_typed(
            endian,
            data,
            |c| c.read_f64::<LittleEndian>(),
            |c| c.read_f64::<BigEndian>(),
            ZarrVectorValue::VFloat64,
        ),
    }
}

/// Helper: read a vector of a fixed-size numeric type.
fn read_vec_typed<T: Clone, F1, F2>(
    endian: Endian,
    data: &[u8],
    read_le: F1,
    read_be: F2,
    wrap: fn(Vec<T>) -> ZarrVectorValue,
) -> ZarrResult<ZarrVectorValue>
where
    F1: Fn(&mut Cursor<&[u8]>) -> std::io::Result<T>,
    F2: Fn(&mut Cursor<&[u8]>) -> std::io::Result<T>,
{
    let elem_size = std::mem::size_of::<T>();
    let count = data.len() / elem_size;
    let mut out = Vec::with_capacity(count);
    let mut cursor = Cursor::new(data);
    for _ in 0..count {
        let val = match endian {
            Endian::Little => (read_le)(&mut cursor),
            Endian::Big => (read_be)(&mut cursor),
        }
        .map_err(|e| ZarrError::CorruptData(format!("Failed to read value: {e}")))?;
        out.push(val);
    }
    Ok(wrap(out))
}

/// Serialize a typed vector to raw bytes in the given byte order, each
/// element exactly `byte_size` bytes, no padding.
pub fn zarr_vector_to_bytes(endian: Endian, data: &ZarrVectorValue) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * data.data_type().byte_size());
    match data {
        ZarrVectorValue::VInt8(v) => {
            out.extend(v.iter().map(|x| *x as u8));
        }
        ZarrVectorValue::VUInt8(v) => {
            out.extend_from_slice(v);
        }
        ZarrVectorValue::VInt16(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_i16::<LittleEndian>(*x),
                |o, x| o.write_i16::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VInt32(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_i32::<LittleEndian>(*x),
                |o, x| o.write_i32::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VInt64(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_i64::<LittleEndian>(*x),
                |o, x| o.write_i64::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VUInt16(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_u16::<LittleEndian>(*x),
                |o, x| o.write_u16::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VUInt32(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_u32::<LittleEndian>(*x),
                |o, x| o.write_u32::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VUInt64(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_u64::<LittleEndian>(*x),
                |o, x| o.write_u64::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VFloat16(v) => {
            for x in v {
                let bits = x.to_bits();
                match endian {
                    Endian::Little => out.write_u16::<LittleEndian>(bits),
                    Endian::Big => out.write_u16::<BigEndian>(bits),
                }
                .expect("writing to a Vec cannot fail");
            }
        }
        ZarrVectorValue::VFloat32(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_f32::<LittleEndian>(*x),
                |o, x| o.write_f32::<BigEndian>(*x),
            );
        }
        ZarrVectorValue::VFloat64(v) => {
            write_vec_typed(
                endian,
                &mut out,
                v,
                |o, x| o.write_f64::<LittleEndian>(*x),
                |o, x| o.write_f64::<BigEndian>(*x),
            );
        }
    }
    out
}

fn write_vec_typed<T, F1, F2>(endian: Endian, out: &mut Vec<u8>, data: &[T], write_le: F1, write_be: F2)
where
    F1: Fn(&mut Vec<u8>, &T) -> std::io::Result<()>,
    F2: Fn(&mut Vec<u8>, &T) -> std::io::Result<()>,
{
    for x in data {
        match endian {
            Endian::Little => (write_le)(out, x),
            Endian::Big => (write_be)(out, x),
        }
        .expect("writing to a Vec cannot fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_row_major() {
        assert_eq!(row_major_strides(&[2, 3, 5]), vec![15, 5, 1]);
        assert_eq!(row_major_strides(&[4]), vec![1]);
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn extract_and_overlay_round_trip() {
        // 2x3 array: [[0,1,2],[3,4,5]]
        let v = ZarrVectorValue::VInt32((0..6).collect());
        let block = v.extract(&[2, 3], &[0, 1], &[2, 2]).unwrap();
        assert_eq!(block, ZarrVectorValue::VInt32(vec![1, 2, 4, 5]));

        let mut dst = fill_chunk(&ZarrValue::Int32(-1), &[2, 3]);
        dst.overlay(&[2, 3], &[0, 1], &block, &[2, 2]).unwrap();
        assert_eq!(
            dst,
            ZarrVectorValue::VInt32(vec![-1, 1, 2, -1, 4, 5])
        );
    }

    #[test]
    fn extract_out_of_bounds() {
        let v = ZarrVectorValue::VInt32((0..6).collect());
        assert!(matches!(
            v.extract(&[2, 3], &[1, 2], &[2, 2]),
            Err(ZarrError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn permute_inverse_round_trip() {
        let v = ZarrVectorValue::VUInt16((0..24).collect());
        let shape = [2, 3, 4];
        for order in [[0, 1, 2], [1, 0, 2], [0, 2, 1], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            let fwd = v.permuted(&shape, &order);
            let out_shape: Vec<usize> = order.iter().map(|&d| shape[d]).collect();
            let back = fwd.permuted(&out_shape, &inverse_permutation(&order));
            assert_eq!(back, v, "order {order:?}");
        }
    }

    #[test]
    fn permute_known_values() {
        // [[0,1],[2,3]] transposed is [[0,2],[1,3]]
        let v = ZarrVectorValue::VInt8(vec![0, 1, 2, 3]);
        assert_eq!(
            v.permuted(&[2, 2], &[1, 0]),
            ZarrVectorValue::VInt8(vec![0, 2, 1, 3])
        );
    }

    #[test]
    fn typed_bytes_round_trip_both_endians() {
        let v = ZarrVectorValue::VFloat32(vec![1.5, -2.0, 42.0]);
        for endian in [Endian::Little, Endian::Big] {
            let raw = zarr_vector_to_bytes(endian, &v);
            assert_eq!(raw.len(), 12);
            let back = bytes_to_zarr_vector(endian, DataType::Float32, &raw).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn little_endian_layout_is_exact() {
        let v = ZarrVectorValue::VUInt16(vec![0x0102, 0x0304]);
        assert_eq!(zarr_vector_to_bytes(Endian::Little, &v), vec![2, 1, 4, 3]);
        assert_eq!(zarr_vector_to_bytes(Endian::Big, &v), vec![1, 2, 3, 4]);
    }

    #[test]
    fn all_equal_matches_nan_bitwise() {
        let v = ZarrVectorValue::VFloat32(vec![f32::NAN; 4]);
        assert!(v.all_equal(&ZarrValue::Float32(f32::NAN)));
        assert!(!v.all_equal(&ZarrValue::Float32(0.0)));
    }

    #[test]
    fn fill_value_resolution() {
        assert!(FillValue::NaN.to_scalar(DataType::Float64).unwrap().to_f64().is_nan());
        assert!(FillValue::NaN.to_scalar(DataType::Int32).is_err());
        assert_eq!(
            FillValue::Value(ZarrValue::UInt8(7)).to_scalar(DataType::UInt8).unwrap(),
            ZarrValue::UInt8(7)
        );
    }
}
