//! CLIP feature matrices stored as `.npy` files.

use crate::error::{ClipframeError, Result};
use std::path::Path;

/// A dense row-major matrix with one embedding per keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Build a matrix from row-major data.
    ///
    /// Returns `None` if `data` is not a whole number of rows.
    pub fn from_rows(dim: usize, data: Vec<f32>) -> Option<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return None;
        }
        Some(Self { dim, data })
    }

    /// Number of rows (keyframes).
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Width of each row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embedding of keyframe `index` (0-based).
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }
}

/// Parse a 2-D `.npy` matrix whose width must equal `vector_size`.
///
/// Accepts `f4` and `f8` element types; `f8` values are narrowed to `f32`.
pub fn parse_embeddings(bytes: &[u8], path: &Path, vector_size: usize) -> Result<EmbeddingMatrix> {
    let npy = npyz::NpyFile::new(bytes)
        .map_err(|e| ClipframeError::parse(path, format!("invalid npy header: {}", e)))?;

    let shape = npy.shape().to_vec();
    if shape.len() != 2 {
        return Err(ClipframeError::shape(
            path,
            format!("expected a 2-D matrix, got shape {:?}", shape),
        ));
    }
    if npy.order() != npyz::Order::C {
        return Err(ClipframeError::shape(path, "fortran-ordered matrices are not supported"));
    }

    let (rows, cols) = (shape[0] as usize, shape[1] as usize);
    if rows == 0 {
        return Err(ClipframeError::shape(path, "embedding matrix is empty"));
    }
    if cols != vector_size {
        return Err(ClipframeError::shape(
            path,
            format!("expected (N, {}), got ({}, {})", vector_size, rows, cols),
        ));
    }

    let data: Vec<f32> = match npy.try_data::<f32>() {
        Ok(reader) => reader.collect::<std::io::Result<Vec<f32>>>(),
        Err(npy) => npy
            .into_vec::<f64>()
            .map(|values| values.into_iter().map(|v| v as f32).collect()),
    }
    .map_err(|e| ClipframeError::parse(path, format!("cannot read matrix data: {}", e)))?;

    if data.len() != rows * cols {
        return Err(ClipframeError::shape(
            path,
            format!("header declares {} values, file holds {}", rows * cols, data.len()),
        ));
    }

    Ok(EmbeddingMatrix { dim: cols, data })
}
