// ============================================================
// Layer 5 — BERT Encoder Building Blocks
// ============================================================
// Post-LN BERT blocks (Devlin et al., 2019):
//
//   embeddings = LayerNorm(word + position + token_type)
//   each layer:
//     x = LayerNorm(x + SelfAttention(x))
//     x = LayerNorm(x + W2·gelu(W1·x))
//
// Attention is written out by hand rather than using
// burn::nn::attention so that a per-head mask can scale the
// attention probabilities and those probabilities can be
// returned to the caller.
//
// Every block implements NamedParams with TF-checkpoint style
// names ("attention/self/query/kernel", "LayerNorm/gamma", ...)
// so LARS exclusion patterns written for BERT apply unchanged.

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, softmax},
};

use crate::domain::error::Result;
use crate::ml::params::{NamedParams, ParamVisitor};

/// Additive mask value for padded key positions.
const MASKED_SCORE: f64 = -10_000.0;

/// Post-LN normalisation with BERT's epsilon.
fn layer_norm<B: Backend>(width: usize, epsilon: f64, device: &B::Device) -> LayerNorm<B> {
    LayerNormConfig::new(width).with_epsilon(epsilon).init(device)
}

fn dropout_if<B: Backend, const D: usize>(
    dropout:  &Dropout,
    x:        Tensor<B, D>,
    training: bool,
) -> Tensor<B, D> {
    if training { dropout.forward(x) } else { x }
}

// ─── Embeddings ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> BertEmbeddings<B> {
    pub fn new(
        vocab_size:    usize,
        max_positions: usize,
        type_vocab:    usize,
        hidden:        usize,
        epsilon:       f64,
        dropout:       f64,
        device:        &B::Device,
    ) -> Self {
        Self {
            word_embeddings:       EmbeddingConfig::new(vocab_size, hidden).init(device),
            position_embeddings:   EmbeddingConfig::new(max_positions, hidden).init(device),
            token_type_embeddings: EmbeddingConfig::new(type_vocab, hidden).init(device),
            layer_norm:            layer_norm(hidden, epsilon, device),
            dropout:               DropoutConfig::new(dropout).init(),
        }
    }

    /// Word-piece lookup: [batch, seq] → [batch, seq, hidden]
    pub fn lookup(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.word_embeddings.forward(input_ids)
    }

    /// Add position and segment embeddings to already-looked-up word vectors.
    pub fn forward(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        token_type_ids: Tensor<B, 2, Int>,
        position_ids:   Tensor<B, 2, Int>,
        training:       bool,
    ) -> Tensor<B, 3> {
        let x = inputs_embeds
            + self.position_embeddings.forward(position_ids)
            + self.token_type_embeddings.forward(token_type_ids);
        dropout_if(&self.dropout, self.layer_norm.forward(x), training)
    }

    pub fn max_positions(&self) -> usize {
        self.position_embeddings.weight.val().dims()[0]
    }
}

impl<B: Backend> NamedParams<B> for BertEmbeddings<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        self.word_embeddings = self
            .word_embeddings
            .visit_params(&format!("{scope}/word_embeddings"), visitor)?;
        self.position_embeddings = self
            .position_embeddings
            .visit_params(&format!("{scope}/position_embeddings"), visitor)?;
        self.token_type_embeddings = self
            .token_type_embeddings
            .visit_params(&format!("{scope}/token_type_embeddings"), visitor)?;
        self.layer_norm = self.layer_norm.visit_params(&format!("{scope}/LayerNorm"), visitor)?;
        Ok(self)
    }
}

// ─── Self-attention ───────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BertSelfAttention<B: Backend> {
    pub query:      Linear<B>,
    pub key:        Linear<B>,
    pub value:      Linear<B>,
    pub output:     Linear<B>,
    pub layer_norm: LayerNorm<B>,
    pub dropout:    Dropout,
    pub attn_dropout: Dropout,
    pub num_heads:  usize,
}

impl<B: Backend> BertSelfAttention<B> {
    pub fn new(
        hidden:       usize,
        num_heads:    usize,
        epsilon:      f64,
        dropout:      f64,
        attn_dropout: f64,
        device:       &B::Device,
    ) -> Self {
        Self {
            query:        LinearConfig::new(hidden, hidden).init(device),
            key:          LinearConfig::new(hidden, hidden).init(device),
            value:        LinearConfig::new(hidden, hidden).init(device),
            output:       LinearConfig::new(hidden, hidden).init(device),
            layer_norm:   layer_norm(hidden, epsilon, device),
            dropout:      DropoutConfig::new(dropout).init(),
            attn_dropout: DropoutConfig::new(attn_dropout).init(),
            num_heads,
        }
    }

    /// x: [batch, seq, hidden]; mask: additive [batch, 1, 1, seq];
    /// head_mask: [num_heads] multiplier on the attention probabilities.
    /// Returns the block output and the probabilities [batch, heads, seq, seq].
    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        mask:      Tensor<B, 4>,
        head_mask: Option<Tensor<B, 1>>,
        training:  bool,
    ) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let [batch, seq, hidden] = x.dims();
        let heads    = self.num_heads;
        let head_dim = hidden / heads;

        let split = |t: Tensor<B, 3>| -> Tensor<B, 4> {
            t.reshape([batch, seq, heads, head_dim]).swap_dims(1, 2)
        };
        let q = split(self.query.forward(x.clone()));
        let k = split(self.key.forward(x.clone()));
        let v = split(self.value.forward(x.clone()));

        let scores = q.matmul(k.transpose()).div_scalar((head_dim as f64).sqrt()) + mask;
        let probs  = softmax(scores, 3);
        let probs  = match head_mask {
            Some(m) => probs * m.reshape([1, heads, 1, 1]),
            None    => probs,
        };

        let context = dropout_if(&self.attn_dropout, probs.clone(), training)
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq, hidden]);
        let projected = dropout_if(&self.dropout, self.output.forward(context), training);

        (self.layer_norm.forward(x + projected), probs)
    }
}

impl<B: Backend> NamedParams<B> for BertSelfAttention<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        self.query  = self.query.visit_params(&format!("{scope}/self/query"), visitor)?;
        self.key    = self.key.visit_params(&format!("{scope}/self/key"), visitor)?;
        self.value  = self.value.visit_params(&format!("{scope}/self/value"), visitor)?;
        self.output = self.output.visit_params(&format!("{scope}/output/dense"), visitor)?;
        self.layer_norm = self
            .layer_norm
            .visit_params(&format!("{scope}/output/LayerNorm"), visitor)?;
        Ok(self)
    }
}

// ─── Encoder layer ────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BertLayer<B: Backend> {
    pub attention:    BertSelfAttention<B>,
    pub intermediate: Linear<B>,
    pub output:       Linear<B>,
    pub layer_norm:   LayerNorm<B>,
    pub dropout:      Dropout,
}

impl<B: Backend> BertLayer<B> {
    pub fn new(
        hidden:       usize,
        intermediate: usize,
        num_heads:    usize,
        epsilon:      f64,
        dropout:      f64,
        attn_dropout: f64,
        device:       &B::Device,
    ) -> Self {
        Self {
            attention: BertSelfAttention::new(
                hidden, num_heads, epsilon, dropout, attn_dropout, device,
            ),
            intermediate: LinearConfig::new(hidden, intermediate).init(device),
            output:       LinearConfig::new(intermediate, hidden).init(device),
            layer_norm:   layer_norm(hidden, epsilon, device),
            dropout:      DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        mask:      Tensor<B, 4>,
        head_mask: Option<Tensor<B, 1>>,
        training:  bool,
    ) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let (x, probs) = self.attention.forward(x, mask, head_mask, training);
        let ffn = self.output.forward(gelu(self.intermediate.forward(x.clone())));
        let ffn = dropout_if(&self.dropout, ffn, training);
        (self.layer_norm.forward(x + ffn), probs)
    }
}

impl<B: Backend> NamedParams<B> for BertLayer<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> Result<Self> {
        self.attention = self.attention.visit_params(&format!("{scope}/attention"), visitor)?;
        self.intermediate = self
            .intermediate
            .visit_params(&format!("{scope}/intermediate/dense"), visitor)?;
        self.output = self.output.visit_params(&format!("{scope}/output/dense"), visitor)?;
        self.layer_norm = self
            .layer_norm
            .visit_params(&format!("{scope}/output/LayerNorm"), visitor)?;
        Ok(self)
    }
}

/// Turn a 0/1 padding mask [batch, seq] into an additive score mask
/// [batch, 1, 1, seq]: 0 where attended, MASKED_SCORE where padded.
pub fn additive_attention_mask<B: Backend>(attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 4> {
    let [batch, seq] = attention_mask.dims();
    attention_mask
        .float()
        .neg()
        .add_scalar(1.0)
        .mul_scalar(MASKED_SCORE)
        .reshape([batch, 1, 1, seq])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_embeddings_are_normalised() {
        let device = Default::default();
        let emb = BertEmbeddings::<B>::new(16, 4, 2, 8, 1e-12, 0.0, &device);
        let ids = Tensor::<B, 2, Int>::from_ints([[3, 5, 7]], &device);
        let types = Tensor::<B, 2, Int>::zeros([1, 3], &device);
        let positions = Tensor::<B, 1, Int>::arange(0..3, &device).reshape([1, 3]);

        let y: Vec<f32> = emb
            .forward(emb.lookup(ids), types, positions, false)
            .into_data()
            .to_vec()
            .unwrap();
        // fresh LayerNorm: gamma = 1, beta = 0, so each token row has mean 0, variance 1
        for row in y.chunks(8) {
            let mean: f32 = row.iter().sum::<f32>() / 8.0;
            let var:  f32 = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 8.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_additive_mask_values() {
        let device = Default::default();
        let mask = Tensor::<B, 2, Int>::from_ints([[1, 1, 0]], &device);
        let add = additive_attention_mask(mask);
        assert_eq!(add.dims(), [1, 1, 1, 3]);
        assert_eq!(add.into_data().to_vec::<f32>().unwrap(), vec![0.0, 0.0, -10_000.0]);
    }

    #[test]
    fn test_padded_keys_get_no_attention() {
        let device = Default::default();
        let attn = BertSelfAttention::<B>::new(8, 2, 1e-12, 0.0, 0.0, &device);
        let x = Tensor::<B, 3>::random([1, 3, 8], burn::tensor::Distribution::Default, &device);
        let mask = additive_attention_mask(Tensor::<B, 2, Int>::from_ints([[1, 1, 0]], &device));

        let (out, probs) = attn.forward(x, mask, None, false);
        assert_eq!(out.dims(), [1, 3, 8]);
        assert_eq!(probs.dims(), [1, 2, 3, 3]);

        let probs: Vec<f32> = probs.into_data().to_vec().unwrap();
        // last key column is padding in every (head, query) row
        for row in probs.chunks(3) {
            assert!(row[2] < 1e-6);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_head_mask_zeroes_a_head() {
        let device = Default::default();
        let attn = BertSelfAttention::<B>::new(8, 2, 1e-12, 0.0, 0.0, &device);
        let x = Tensor::<B, 3>::random([1, 2, 8], burn::tensor::Distribution::Default, &device);
        let mask = additive_attention_mask(Tensor::<B, 2, Int>::ones([1, 2], &device));
        let head_mask = Tensor::<B, 1>::from_floats([1.0, 0.0], &device);

        let (_, probs) = attn.forward(x, mask, Some(head_mask), false);
        let probs: Vec<f32> = probs.into_data().to_vec().unwrap();
        // layout [batch=1, head, q=2, k=2]: second head is all zero
        assert!(probs[4..].iter().all(|&p| p == 0.0));
        assert!(probs[..4].iter().any(|&p| p > 0.0));
    }
}
