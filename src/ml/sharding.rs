// ============================================================
// Layer 5 — Partition Hints
// ============================================================
// A partition hint tells an SPMD-capable execution engine how
// to tile a tensor across devices. Computing the placement is
// the engine's job; this code only describes it.
//
// Burn has no sharding annotation, so the hint is recorded at
// trace level and the tensor passes through unchanged. An
// engine that does support tiling can implement
// PartitionHint::annotate for real.
//
// The default Spmd hint tiles axis 1 of [batch, seq, hidden],
// the leading non-batch axis, giving mesh [1, 4, 1]. A mesh of
// [ways, 1, .., 1] would tile axis 0 (the batch) instead; pass
// `Spmd::new(ways, 0)` for that layout.

use burn::prelude::*;

/// Hook applied to the embeddings tensor before encoding.
pub trait PartitionHint {
    /// Mesh shape for a tensor of the given rank, or None for no tiling.
    /// Entry `i` is the number of shards along axis `i`.
    fn mesh_shape(&self, rank: usize) -> Option<Vec<usize>>;

    /// Annotate `tensor`. The default records the mesh and returns
    /// the tensor untouched.
    fn annotate<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if let Some(mesh) = self.mesh_shape(D) {
            tracing::trace!(dims = ?tensor.dims(), ?mesh, "tile annotation");
        }
        tensor
    }
}

/// No-op hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPartition;

impl PartitionHint for NoPartition {
    fn mesh_shape(&self, _rank: usize) -> Option<Vec<usize>> {
        None
    }
}

/// Tile `ways` shards along one axis, one shard per device id
/// `0..ways`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spmd {
    pub ways: usize,
    pub axis: usize,
}

impl Spmd {
    /// Four shards along axis 1, the leading non-batch dimension.
    pub const DEFAULT_WAYS: usize = 4;
    pub const DEFAULT_AXIS: usize = 1;

    pub fn new(ways: usize, axis: usize) -> Self {
        Self { ways, axis }
    }

    /// Device assignment for each tile, in mesh order.
    pub fn tile_assignment(&self) -> Vec<usize> {
        (0..self.ways).collect()
    }
}

impl Default for Spmd {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WAYS, Self::DEFAULT_AXIS)
    }
}

impl PartitionHint for Spmd {
    fn mesh_shape(&self, rank: usize) -> Option<Vec<usize>> {
        if self.ways <= 1 || self.axis >= rank {
            return None;
        }
        let mut mesh = vec![1; rank];
        mesh[self.axis] = self.ways;
        Some(mesh)
    }
}
