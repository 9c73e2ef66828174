// ============================================================
// Layer 5 — Named Parameter Traversal
// ============================================================
// LARS decides per variable NAME whether weight decay and layer
// adaptation apply, so the optimizer needs a walk over the model
// that yields (name, param) pairs. Burn's ModuleVisitor only
// sees ParamIds; NamedParams threads a scope string down the
// module tree instead, producing TF-checkpoint style names:
//
//   bert/encoder/layer_0/attention/self/query/kernel
//   bert/embeddings/LayerNorm/gamma
//   cls/seq_relationship/bias
//
// The walk is by value: a visitor may return a replacement param
// (that is how optimizer steps write updated weights back).

use burn::{
    module::Param,
    nn::{Embedding, LayerNorm, Linear},
    prelude::*,
};

use crate::domain::error::Result;

/// Receives every float parameter of a module tree with its full name.
pub trait ParamVisitor<B: Backend> {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>>;
}

/// Modules whose parameters can be walked by name.
pub trait NamedParams<B: Backend>: Sized {
    fn visit_params<V: ParamVisitor<B>>(self, scope: &str, visitor: &mut V) -> Result<Self>;
}

/// `scope/name`, or just `name` at the root.
pub fn scoped(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}/{name}")
    }
}

impl<B: Backend> NamedParams<B> for Linear<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        self.weight = visitor.visit(&scoped(scope, "kernel"), self.weight)?;
        self.bias = match self.bias {
            Some(bias) => Some(visitor.visit(&scoped(scope, "bias"), bias)?),
            None => None,
        };
        Ok(self)
    }
}

impl<B: Backend> NamedParams<B> for Embedding<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        // TF stores embedding tables directly under the scope name
        self.weight = visitor.visit(scope, self.weight)?;
        Ok(self)
    }
}

impl<B: Backend> NamedParams<B> for LayerNorm<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        self.gamma = visitor.visit(&scoped(scope, "gamma"), self.gamma)?;
        self.beta = match self.beta {
            Some(beta) => Some(visitor.visit(&scoped(scope, "beta"), beta)?),
            None => None,
        };
        Ok(self)
    }
}

// ─── Read-only visitors ───────────────────────────────────────────────────────

/// One row of a parameter listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub name: String,
    pub dims: Vec<usize>,
}

impl ParamEntry {
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Collects every parameter name and shape, in traversal order.
#[derive(Debug, Default)]
pub struct ParamListing {
    pub entries: Vec<ParamEntry>,
}

impl ParamListing {
    pub fn total_params(&self) -> usize {
        self.entries.iter().map(ParamEntry::numel).sum()
    }
}

impl<B: Backend> ParamVisitor<B> for ParamListing {
    fn visit<const D: usize>(
        &mut self,
        name:  &str,
        param: Param<Tensor<B, D>>,
    ) -> Result<Param<Tensor<B, D>>> {
        self.entries.push(ParamEntry {
            name: name.to_string(),
            dims: param.val().dims().to_vec(),
        });
        Ok(param)
    }
}

/// List the parameters of `module` without changing it.
pub fn list_params<B: Backend, M: NamedParams<B>>(module: M) -> Result<(M, ParamListing)> {
    let mut listing = ParamListing::default();
    let module = module.visit_params("", &mut listing)?;
    Ok((module, listing))
}
