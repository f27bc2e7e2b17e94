//! Error types for surface-constrained operations.

use thiserror::Error;

/// Result type for geodesic operations.
pub type GeodesicResult<T> = Result<T, GeodesicError>;

/// Errors that can occur while building a backend or answering a query.
///
/// Geometric trouble during a query (a point that lies in no face, a walk
/// that folds back onto itself) is not an error: the backends clamp to the
/// nearest plausible face or stop at the last good point instead.
#[derive(Debug, Error)]
pub enum GeodesicError {
    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty")]
    EmptyMesh,

    /// Invalid vertex index.
    #[error("invalid vertex index: {index} (mesh has {vertex_count} vertices)")]
    InvalidVertex {
        /// The invalid index.
        index: usize,
        /// Total number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {vertex} (mesh has {vertex_count} vertices)")]
    InvalidFace {
        /// Index of the offending face.
        face: usize,
        /// Vertex index stored in the face.
        vertex: u32,
        /// Total number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A query point or vector contained NaN or infinite components.
    #[error("query point or vector is not finite")]
    NonFinitePoint,

    /// Parameters failed validation.
    #[error("invalid parameters: {reason}")]
    InvalidParams {
        /// What was wrong.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = GeodesicError::InvalidFace {
            face: 3,
            vertex: 17,
            vertex_count: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("face 3"));
        assert!(msg.contains("vertex 17"));
        assert!(msg.contains("12 vertices"));

        let err = GeodesicError::InvalidParams {
            reason: "max_walk_steps must be positive".to_string(),
        };
        assert!(err.to_string().starts_with("invalid parameters"));
    }
}
