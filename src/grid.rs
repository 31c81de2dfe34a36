//! Regular chunk grid and chunk key encoding.

use serde::{Deserialize, Serialize};

use crate::error::{ZarrError, ZarrResult};

/// Position of a chunk in the chunk grid, one index per dimension.
pub type ChunkCoordinate = Vec<usize>;

// ---------------------------------------------------------------------------
// ChunkKeySeparator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChunkKeySeparator {
    #[default]
    Slash,
    Dot,
    Dash,
}

impl ChunkKeySeparator {
    pub fn as_char(&self) -> char {
        match self {
            ChunkKeySeparator::Slash => '/',
            ChunkKeySeparator::Dot => '.',
            ChunkKeySeparator::Dash => '-',
        }
    }
}

impl std::fmt::Display for ChunkKeySeparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl Serialize for ChunkKeySeparator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_char().to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkKeySeparator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "/" => Ok(ChunkKeySeparator::Slash),
            "." => Ok(ChunkKeySeparator::Dot),
            "-" => Ok(ChunkKeySeparator::Dash),
            other => Err(serde::de::Error::custom(format!(
                "Unknown chunk key separator: {other}"
            ))),
        }
    }
}

/// Encode a chunk coordinate as a storage key: the literal prefix `c`, then
/// each index rendered in decimal and joined by the separator. A
/// zero-dimensional array gets the bare prefix.
pub fn chunk_key(coordinate: &[usize], separator: ChunkKeySeparator) -> String {
    let mut key = "c".to_string();
    for index in coordinate {
        key.push(separator.as_char());
        key.push_str(&index.to_string());
    }
    key
}

// ---------------------------------------------------------------------------
// ArrayRegion
// ---------------------------------------------------------------------------

/// A rectangular region of an array: half-open index ranges
/// `start[d] .. start[d] + shape[d]` along every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayRegion {
    pub start: Vec<usize>,
    pub shape: Vec<usize>,
}

impl ArrayRegion {
    pub fn new(start: Vec<usize>, shape: Vec<usize>) -> ZarrResult<Self> {
        if start.len() != shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Region start rank {} does not match shape rank {}",
                start.len(),
                shape.len()
            )));
        }
        Ok(Self { start, shape })
    }

    /// The whole of an array of the given shape.
    pub fn whole(array_shape: &[usize]) -> Self {
        Self {
            start: vec![0; array_shape.len()],
            shape: array_shape.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.start.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&s| s == 0)
    }

    /// Exclusive end index along every axis.
    pub fn end(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(self.shape.iter())
            .map(|(s, n)| s + n)
            .collect()
    }

    /// Check containment within an array of the given shape.
    pub fn validate_within(&self, array_shape: &[usize]) -> ZarrResult<()> {
        if self.rank() != array_shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Region rank {} does not match array rank {}",
                self.rank(),
                array_shape.len()
            )));
        }
        for d in 0..self.rank() {
            if self.start[d] + self.shape[d] > array_shape[d] {
                return Err(ZarrError::DimensionMismatch(format!(
                    "Region {:?}+{:?} exceeds array shape {array_shape:?} along axis {d}",
                    self.start, self.shape
                )));
            }
        }
        Ok(())
    }

    /// Intersect with another region; `None` when disjoint.
    pub fn intersect(&self, other: &ArrayRegion) -> Option<ArrayRegion> {
        let mut start = Vec::with_capacity(self.rank());
        let mut shape = Vec::with_capacity(self.rank());
        for d in 0..self.rank() {
            let lo = self.start[d].max(other.start[d]);
            let hi = (self.start[d] + self.shape[d]).min(other.start[d] + other.shape[d]);
            if lo >= hi {
                return None;
            }
            start.push(lo);
            shape.push(hi - lo);
        }
        Some(ArrayRegion { start, shape })
    }
}

// ---------------------------------------------------------------------------
// RegularChunkGrid
// ---------------------------------------------------------------------------

/// A grid of uniformly-shaped chunks over an array. Edge chunks keep their
/// nominal extent; clipping to the array shape happens in [`Self::chunk_subset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularChunkGrid {
    array_shape: Vec<usize>,
    chunk_shape: Vec<usize>,
}

impl RegularChunkGrid {
    pub fn new(array_shape: Vec<usize>, chunk_shape: Vec<usize>) -> ZarrResult<Self> {
        if array_shape.len() != chunk_shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Chunk shape rank {} does not match array rank {}",
                chunk_shape.len(),
                array_shape.len()
            )));
        }
        if chunk_shape.iter().any(|&c| c == 0) {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Chunk shape must be positive along every axis, got {chunk_shape:?}"
            )));
        }
        Ok(Self {
            array_shape,
            chunk_shape,
        })
    }

    pub fn array_shape(&self) -> &[usize] {
        &self.array_shape
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    /// Number of chunks along every axis.
    pub fn grid_shape(&self) -> Vec<usize> {
        self.array_shape
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(s, c)| s.div_ceil(*c))
            .collect()
    }

    /// The region nominally covered by the chunk at `coordinate`, always of
    /// the full chunk shape even when it overhangs the array boundary.
    pub fn chunk_extent(&self, coordinate: &[usize]) -> ArrayRegion {
        ArrayRegion {
            start: coordinate
                .iter()
                .zip(self.chunk_shape.iter())
                .map(|(i, c)| i * c)
                .collect(),
            shape: self.chunk_shape.clone(),
        }
    }

    /// The part of the chunk at `coordinate` that lies within the array
    /// bounds.
    pub fn chunk_subset(&self, coordinate: &[usize]) -> ZarrResult<ArrayRegion> {
        if coordinate.len() != self.array_shape.len() {
            return Err(ZarrError::DimensionMismatch(format!(
                "Chunk coordinate rank {} does not match array rank {}",
                coordinate.len(),
                self.array_shape.len()
            )));
        }
        let extent = self.chunk_extent(coordinate);
        extent
            .intersect(&ArrayRegion::whole(&self.array_shape))
            .ok_or_else(|| {
                ZarrError::DimensionMismatch(format!(
                    "Chunk coordinate {coordinate:?} lies outside the array"
                ))
            })
    }

    /// All chunk coordinates whose extent intersects `region`, enumerated in
    /// row-major order (last axis fastest). Deterministic across calls.
    pub fn chunks_in_region(&self, region: &ArrayRegion) -> ZarrResult<Vec<ChunkCoordinate>> {
        region.validate_within(&self.array_shape)?;
        if region.is_empty() {
            return Ok(Vec::new());
        }
        let first: Vec<usize> = region
            .start
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(s, c)| s / c)
            .collect();
        let last: Vec<usize> = region
            .end()
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(e, c)| (e - 1) / c)
            .collect();

        let mut coords = Vec::new();
        let mut current = first.clone();
        loop {
            coords.push(current.clone());
            let mut done = true;
            for d in (0..current.len()).rev() {
                current[d] += 1;
                if current[d] <= last[d] {
                    done = false;
                    break;
                }
                current[d] = first[d];
            }
            if done {
                break;
            }
        }
        Ok(coords)
    }
}
