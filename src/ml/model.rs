use burn::{
    nn::{loss::CrossEntropyLossConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{gelu, log_softmax},
};

use crate::domain::error::{self, Error};
use crate::domain::instance::PAD_ID;
use crate::ml::encoder::{additive_attention_mask, BertEmbeddings, BertLayer};
use crate::ml::gather::gather_positions;
use crate::ml::output::{PretrainingOutput, PretrainingOutputs};
use crate::ml::params::{scoped, NamedParams, ParamVisitor};
use crate::ml::sharding::{PartitionHint, Spmd};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct BertConfig {
    pub vocab_size:          usize,
    pub hidden_size:         usize,
    pub num_hidden_layers:   usize,
    pub num_attention_heads: usize,
    pub intermediate_size:   usize,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
    #[config(default = 0.1)]
    pub attention_probs_dropout_prob: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
    /// Shards in the embeddings partition hint (1 disables it)
    #[config(default = 4)]
    pub partition_ways: usize,
    /// Axis the embeddings are tiled along
    #[config(default = 1)]
    pub partition_axis: usize,
}

impl BertConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(Error::invalid_argument(format!(
                "hidden_size {} must be a positive multiple of num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.vocab_size == 0 || self.max_position_embeddings == 0 || self.type_vocab_size == 0 {
            return Err(Error::invalid_argument(
                "vocab_size, max_position_embeddings and type_vocab_size must be positive",
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BertForPreTraining<B> {
        let h = self.hidden_size;
        let embeddings = BertEmbeddings::new(
            self.vocab_size,
            self.max_position_embeddings,
            self.type_vocab_size,
            h,
            self.layer_norm_eps,
            self.hidden_dropout_prob,
            device,
        );
        let layers = (0..self.num_hidden_layers)
            .map(|_| {
                BertLayer::new(
                    h,
                    self.intermediate_size,
                    self.num_attention_heads,
                    self.layer_norm_eps,
                    self.hidden_dropout_prob,
                    self.attention_probs_dropout_prob,
                    device,
                )
            })
            .collect();
        let bert = BertModel {
            embeddings,
            layers,
            pooler: LinearConfig::new(h, h).init(device),
        };
        let cls = BertMlmHead {
            transform:  LinearConfig::new(h, h).init(device),
            layer_norm: LayerNormConfig::new(h).with_epsilon(self.layer_norm_eps).init(device),
            decoder:    LinearConfig::new(h, self.vocab_size).init(device),
        };
        BertForPreTraining {
            bert,
            cls,
            seq_relationship: LinearConfig::new(h, 2).init(device),
            partition_ways:   self.partition_ways,
            partition_axis:   self.partition_axis,
        }
    }
}

// ─── Inputs ───────────────────────────────────────────────────────────────────

/// Everything one forward pass can take. Build with `from_ids` or
/// `from_embeds` and the `with_*` methods.
#[derive(Debug, Clone)]
pub struct PretrainingInput<B: Backend> {
    pub input_ids:            Option<Tensor<B, 2, Int>>,
    pub inputs_embeds:        Option<Tensor<B, 3>>,
    pub attention_mask:       Option<Tensor<B, 2, Int>>,
    pub token_type_ids:       Option<Tensor<B, 2, Int>>,
    pub position_ids:         Option<Tensor<B, 2, Int>>,
    /// [num_layers, num_heads] multiplier on attention probabilities
    pub head_mask:            Option<Tensor<B, 2>>,
    pub masked_lm_positions:  Tensor<B, 2, Int>,
    pub masked_lm_labels:     Option<Tensor<B, 2, Int>>,
    pub next_sentence_label:  Option<Tensor<B, 1, Int>>,
    pub training:             bool,
    pub output_attentions:    bool,
    pub output_hidden_states: bool,
    pub return_dict:          bool,
}

impl<B: Backend> PretrainingInput<B> {
    fn empty(masked_lm_positions: Tensor<B, 2, Int>) -> Self {
        Self {
            input_ids: None,
            inputs_embeds: None,
            attention_mask: None,
            token_type_ids: None,
            position_ids: None,
            head_mask: None,
            masked_lm_positions,
            masked_lm_labels: None,
            next_sentence_label: None,
            training: false,
            output_attentions: false,
            output_hidden_states: false,
            return_dict: true,
        }
    }

    pub fn from_ids(input_ids: Tensor<B, 2, Int>, masked_lm_positions: Tensor<B, 2, Int>) -> Self {
        Self { input_ids: Some(input_ids), ..Self::empty(masked_lm_positions) }
    }

    pub fn from_embeds(inputs_embeds: Tensor<B, 3>, masked_lm_positions: Tensor<B, 2, Int>) -> Self {
        Self { inputs_embeds: Some(inputs_embeds), ..Self::empty(masked_lm_positions) }
    }

    pub fn with_inputs_embeds(mut self, inputs_embeds: Tensor<B, 3>) -> Self {
        self.inputs_embeds = Some(inputs_embeds);
        self
    }

    pub fn with_attention_mask(mut self, mask: Tensor<B, 2, Int>) -> Self {
        self.attention_mask = Some(mask);
        self
    }

    pub fn with_token_type_ids(mut self, ids: Tensor<B, 2, Int>) -> Self {
        self.token_type_ids = Some(ids);
        self
    }

    pub fn with_position_ids(mut self, ids: Tensor<B, 2, Int>) -> Self {
        self.position_ids = Some(ids);
        self
    }

    pub fn with_head_mask(mut self, head_mask: Tensor<B, 2>) -> Self {
        self.head_mask = Some(head_mask);
        self
    }

    pub fn with_labels(
        mut self,
        masked_lm_labels:    Tensor<B, 2, Int>,
        next_sentence_label: Tensor<B, 1, Int>,
    ) -> Self {
        self.masked_lm_labels = Some(masked_lm_labels);
        self.next_sentence_label = Some(next_sentence_label);
        self
    }

    pub fn training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn output_attentions(mut self, enabled: bool) -> Self {
        self.output_attentions = enabled;
        self
    }

    pub fn output_hidden_states(mut self, enabled: bool) -> Self {
        self.output_hidden_states = enabled;
        self
    }

    pub fn return_dict(mut self, enabled: bool) -> Self {
        self.return_dict = enabled;
        self
    }
}

fn check_dims<const D: usize>(what: &str, actual: [usize; D], expected: [usize; D]) -> error::Result<()> {
    if actual != expected {
        return Err(Error::invalid_argument(format!(
            "{what} has shape {actual:?}, expected {expected:?}"
        )));
    }
    Ok(())
}

// ─── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BertModel<B: Backend> {
    pub embeddings: BertEmbeddings<B>,
    pub layers:     Vec<BertLayer<B>>,
    pub pooler:     Linear<B>,
}

pub struct EncoderOutput<B: Backend> {
    /// [batch, seq, hidden]
    pub sequence_output: Tensor<B, 3>,
    /// [batch, hidden], tanh-pooled first token
    pub pooled_output:   Tensor<B, 2>,
    pub hidden_states:   Option<Vec<Tensor<B, 3>>>,
    pub attentions:      Option<Vec<Tensor<B, 4>>>,
}

/// Per-token side inputs to the encoder, already shape-checked.
pub struct EncoderInput<B: Backend> {
    pub inputs_embeds:        Tensor<B, 3>,
    pub attention_mask:       Tensor<B, 2, Int>,
    pub token_type_ids:       Tensor<B, 2, Int>,
    pub position_ids:         Tensor<B, 2, Int>,
    pub head_mask:            Option<Tensor<B, 2>>,
    pub training:             bool,
    pub output_attentions:    bool,
    pub output_hidden_states: bool,
}

impl<B: Backend> BertModel<B> {
    pub fn forward(&self, input: EncoderInput<B>) -> EncoderOutput<B> {
        let mask  = additive_attention_mask(input.attention_mask);
        let heads = input.head_mask.as_ref().map(|m| m.dims()[1]).unwrap_or(0);

        let mut x = self.embeddings.forward(
            input.inputs_embeds,
            input.token_type_ids,
            input.position_ids,
            input.training,
        );
        let mut hidden_states = input.output_hidden_states.then(|| vec![x.clone()]);
        let mut attentions    = input.output_attentions.then(Vec::new);

        for (i, layer) in self.layers.iter().enumerate() {
            let layer_mask = input
                .head_mask
                .clone()
                .map(|m| m.slice([i..i + 1, 0..heads]).reshape([heads]));
            let (out, probs) = layer.forward(x, mask.clone(), layer_mask, input.training);
            x = out;
            if let Some(states) = hidden_states.as_mut() {
                states.push(x.clone());
            }
            if let Some(attn) = attentions.as_mut() {
                attn.push(probs);
            }
        }

        let [batch, _, width] = x.dims();
        let first  = x.clone().slice([0..batch, 0..1, 0..width]).reshape([batch, width]);
        let pooled = self.pooler.forward(first).tanh();

        EncoderOutput { sequence_output: x, pooled_output: pooled, hidden_states, attentions }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_heads(&self) -> usize {
        self.layers.first().map(|l| l.attention.num_heads).unwrap_or(0)
    }
}

impl<B: Backend> NamedParams<B> for BertModel<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> error::Result<Self> {
        self.embeddings = self.embeddings.visit_params(&scoped(scope, "embeddings"), visitor)?;
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.into_iter().enumerate() {
            layers.push(layer.visit_params(&scoped(scope, &format!("encoder/layer_{i}")), visitor)?);
        }
        self.layers = layers;
        self.pooler = self.pooler.visit_params(&scoped(scope, "pooler/dense"), visitor)?;
        Ok(self)
    }
}

// ─── Heads ────────────────────────────────────────────────────────────────────

/// Masked-LM head: dense → gelu → LayerNorm → vocab projection.
#[derive(Module, Debug)]
pub struct BertMlmHead<B: Backend> {
    pub transform:  Linear<B>,
    pub layer_norm: LayerNorm<B>,
    pub decoder:    Linear<B>,
}

impl<B: Backend> BertMlmHead<B> {
    /// [batch, n, hidden] → [batch, n, vocab]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.layer_norm.forward(gelu(self.transform.forward(x)));
        self.decoder.forward(x)
    }
}

impl<B: Backend> NamedParams<B> for BertMlmHead<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> error::Result<Self> {
        self.transform  = self.transform.visit_params(&scoped(scope, "transform/dense"), visitor)?;
        self.layer_norm = self.layer_norm.visit_params(&scoped(scope, "transform/LayerNorm"), visitor)?;
        self.decoder    = self.decoder.visit_params(&scoped(scope, "output"), visitor)?;
        Ok(self)
    }
}

// ─── Pretraining model ────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BertForPreTraining<B: Backend> {
    pub bert:             BertModel<B>,
    pub cls:              BertMlmHead<B>,
    pub seq_relationship: Linear<B>,
    pub partition_ways:   usize,
    pub partition_axis:   usize,
}

impl<B: Backend> BertForPreTraining<B> {
    pub fn partition(&self) -> Spmd {
        Spmd::new(self.partition_ways, self.partition_axis)
    }

    /// Encoder → gather masked positions → masked-LM head on (B, M, H)
    /// only; next-sentence head on the pooled output.
    pub fn forward(&self, input: PretrainingInput<B>) -> error::Result<PretrainingOutputs<B>> {
        let return_dict = input.return_dict;
        let (encoded, input) = self.encode(input)?;

        let positions = input.masked_lm_positions;
        let [batch, num_masked] = positions.dims();
        let gathered = gather_positions(encoded.sequence_output, positions)?;
        let prediction_logits = self.cls.forward(gathered);
        let seq_relationship_logits = self.seq_relationship.forward(encoded.pooled_output);

        let loss = match (input.masked_lm_labels, input.next_sentence_label) {
            (Some(mlm_labels), Some(nsp_labels)) => {
                check_dims("masked_lm_labels", mlm_labels.dims(), [batch, num_masked])?;
                check_dims("next_sentence_label", nsp_labels.dims(), [batch])?;
                Some(pretraining_loss(
                    prediction_logits.clone(),
                    mlm_labels,
                    seq_relationship_logits.clone(),
                    nsp_labels,
                ))
            }
            _ => None,
        };

        let output = PretrainingOutput {
            loss,
            prediction_logits,
            seq_relationship_logits,
            hidden_states: encoded.hidden_states,
            attentions: encoded.attentions,
        };
        Ok(if return_dict {
            PretrainingOutputs::Dict(output)
        } else {
            PretrainingOutputs::Tuple(output.into_tuple())
        })
    }

    /// Resolve inputs, apply the partition hint to the embeddings and
    /// run the encoder. Returns the rest of `input` for the heads.
    pub fn encode(&self, input: PretrainingInput<B>) -> error::Result<(EncoderOutput<B>, HeadInput<B>)> {
        let inputs_embeds = match (input.input_ids, input.inputs_embeds) {
            (Some(ids), None) => self.bert.embeddings.lookup(ids),
            (None, Some(embeds)) => embeds,
            (Some(_), Some(_)) => {
                return Err(Error::invalid_argument(
                    "specify either input_ids or inputs_embeds, not both",
                ))
            }
            (None, None) => {
                return Err(Error::invalid_argument(
                    "one of input_ids or inputs_embeds is required",
                ))
            }
        };

        let [batch, seq, width] = inputs_embeds.dims();
        let hidden = self.cls.transform.weight.val().dims()[0];
        if width != hidden {
            return Err(Error::invalid_argument(format!(
                "inputs_embeds width {width} does not match hidden size {hidden}"
            )));
        }
        let max_positions = self.bert.embeddings.max_positions();
        if seq > max_positions {
            return Err(Error::invalid_argument(format!(
                "sequence length {seq} exceeds max_position_embeddings {max_positions}"
            )));
        }
        let [pos_batch, _] = input.masked_lm_positions.dims();
        if pos_batch != batch {
            return Err(Error::invalid_argument(format!(
                "masked_lm_positions batch {pos_batch} does not match input batch {batch}"
            )));
        }

        let device = inputs_embeds.device();
        let attention_mask = match input.attention_mask {
            Some(mask) => {
                check_dims("attention_mask", mask.dims(), [batch, seq])?;
                mask
            }
            None => Tensor::ones([batch, seq], &device),
        };
        let token_type_ids = match input.token_type_ids {
            Some(ids) => {
                check_dims("token_type_ids", ids.dims(), [batch, seq])?;
                ids
            }
            None => Tensor::zeros([batch, seq], &device),
        };
        let position_ids = match input.position_ids {
            Some(ids) => {
                check_dims("position_ids", ids.dims(), [batch, seq])?;
                ids
            }
            None => Tensor::<B, 1, Int>::arange(0..seq as i64, &device)
                .unsqueeze::<2>()
                .expand([batch, seq]),
        };
        if let Some(head_mask) = &input.head_mask {
            check_dims(
                "head_mask",
                head_mask.dims(),
                [self.bert.num_layers(), self.bert.num_heads()],
            )?;
        }

        let inputs_embeds = self.partition().annotate(inputs_embeds);
        let encoded = self.bert.forward(EncoderInput {
            inputs_embeds,
            attention_mask,
            token_type_ids,
            position_ids,
            head_mask: input.head_mask,
            training: input.training,
            output_attentions: input.output_attentions,
            output_hidden_states: input.output_hidden_states,
        });

        let rest = HeadInput {
            masked_lm_positions: input.masked_lm_positions,
            masked_lm_labels:    input.masked_lm_labels,
            next_sentence_label: input.next_sentence_label,
        };
        Ok((encoded, rest))
    }
}

/// The part of `PretrainingInput` consumed after the encoder.
pub struct HeadInput<B: Backend> {
    pub masked_lm_positions: Tensor<B, 2, Int>,
    pub masked_lm_labels:    Option<Tensor<B, 2, Int>>,
    pub next_sentence_label: Option<Tensor<B, 1, Int>>,
}

impl<B: Backend> NamedParams<B> for BertForPreTraining<B> {
    fn visit_params<V: ParamVisitor<B>>(mut self, scope: &str, visitor: &mut V) -> error::Result<Self> {
        self.bert = self.bert.visit_params(&scoped(scope, "bert"), visitor)?;
        self.cls  = self.cls.visit_params(&scoped(scope, "cls/predictions"), visitor)?;
        self.seq_relationship = self
            .seq_relationship
            .visit_params(&scoped(scope, "cls/seq_relationship"), visitor)?;
        Ok(self)
    }
}

// ─── Loss ─────────────────────────────────────────────────────────────────────

/// Mean cross-entropy over masked slots whose label is not PAD_ID.
/// logits: [batch, m, vocab]; labels: [batch, m]
pub fn masked_lm_loss<B: Backend>(logits: Tensor<B, 3>, labels: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    let [batch, num_masked, vocab] = logits.dims();
    let n = batch * num_masked;
    if n == 0 {
        return Tensor::zeros([1], &logits.device());
    }

    let log_probs = log_softmax(logits.reshape([n, vocab]), 1);
    let labels    = labels.reshape([n]);
    let active    = labels.clone().not_equal_elem(PAD_ID as i64).float();
    let picked    = log_probs.gather(1, labels.reshape([n, 1])).reshape([n]);

    let total = (picked * active.clone()).sum().neg();
    total / active.sum().clamp_min(1.0)
}

/// Loss = masked-LM loss + next-sentence loss
pub fn pretraining_loss<B: Backend>(
    prediction_logits:       Tensor<B, 3>,
    masked_lm_labels:        Tensor<B, 2, Int>,
    seq_relationship_logits: Tensor<B, 2>,
    next_sentence_label:     Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let ce = CrossEntropyLossConfig::new().init(&seq_relationship_logits.device());
    masked_lm_loss(prediction_logits, masked_lm_labels)
        + ce.forward(seq_relationship_logits, next_sentence_label)
}
