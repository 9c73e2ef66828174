// ============================================================
// Layer 5 — Pretraining Outputs
// ============================================================
// The forward pass returns either a named struct or a plain
// ordered tuple, selected by `return_dict`. Tuple order:
//
//   [loss]  prediction_logits  seq_relationship_logits
//   [hidden_states]  [attentions]
//
// Bracketed entries are present only when computed/requested.

use burn::prelude::*;

/// Named form of the pretraining outputs.
#[derive(Debug, Clone)]
pub struct PretrainingOutput<B: Backend> {
    /// Masked-LM + next-sentence loss, when both label tensors were given
    pub loss: Option<Tensor<B, 1>>,
    /// [batch, num_masked, vocab]
    pub prediction_logits: Tensor<B, 3>,
    /// [batch, 2]
    pub seq_relationship_logits: Tensor<B, 2>,
    /// Embedding output followed by every layer output, each [batch, seq, hidden]
    pub hidden_states: Option<Vec<Tensor<B, 3>>>,
    /// Per layer, [batch, heads, seq, seq]
    pub attentions: Option<Vec<Tensor<B, 4>>>,
}

/// One entry of the tuple form.
#[derive(Debug, Clone)]
pub enum OutputField<B: Backend> {
    Loss(Tensor<B, 1>),
    PredictionLogits(Tensor<B, 3>),
    SeqRelationshipLogits(Tensor<B, 2>),
    HiddenStates(Vec<Tensor<B, 3>>),
    Attentions(Vec<Tensor<B, 4>>),
}

impl<B: Backend> OutputField<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            OutputField::Loss(_)                  => "loss",
            OutputField::PredictionLogits(_)      => "prediction_logits",
            OutputField::SeqRelationshipLogits(_) => "seq_relationship_logits",
            OutputField::HiddenStates(_)          => "hidden_states",
            OutputField::Attentions(_)            => "attentions",
        }
    }
}

impl<B: Backend> PretrainingOutput<B> {
    pub fn into_tuple(self) -> Vec<OutputField<B>> {
        let mut fields = Vec::with_capacity(5);
        if let Some(loss) = self.loss {
            fields.push(OutputField::Loss(loss));
        }
        fields.push(OutputField::PredictionLogits(self.prediction_logits));
        fields.push(OutputField::SeqRelationshipLogits(self.seq_relationship_logits));
        if let Some(hidden) = self.hidden_states {
            fields.push(OutputField::HiddenStates(hidden));
        }
        if let Some(attentions) = self.attentions {
            fields.push(OutputField::Attentions(attentions));
        }
        fields
    }
}

/// What `BertForPreTraining::forward` returns.
#[derive(Debug, Clone)]
pub enum PretrainingOutputs<B: Backend> {
    Dict(PretrainingOutput<B>),
    Tuple(Vec<OutputField<B>>),
}

impl<B: Backend> PretrainingOutputs<B> {
    /// The named form. A tuple converts back as long as it still
    /// carries both logits tensors.
    pub fn into_output(self) -> Option<PretrainingOutput<B>> {
        let fields = match self {
            PretrainingOutputs::Dict(output) => return Some(output),
            PretrainingOutputs::Tuple(fields) => fields,
        };

        let mut loss = None;
        let mut prediction_logits = None;
        let mut seq_relationship_logits = None;
        let mut hidden_states = None;
        let mut attentions = None;
        for field in fields {
            match field {
                OutputField::Loss(t)                  => loss = Some(t),
                OutputField::PredictionLogits(t)      => prediction_logits = Some(t),
                OutputField::SeqRelationshipLogits(t) => seq_relationship_logits = Some(t),
                OutputField::HiddenStates(t)          => hidden_states = Some(t),
                OutputField::Attentions(t)            => attentions = Some(t),
            }
        }
        Some(PretrainingOutput {
            loss,
            prediction_logits: prediction_logits?,
            seq_relationship_logits: seq_relationship_logits?,
            hidden_states,
            attentions,
        })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, PretrainingOutputs::Tuple(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn output(with_loss: bool, with_hidden: bool) -> PretrainingOutput<B> {
        let device = Default::default();
        PretrainingOutput {
            loss: with_loss.then(|| Tensor::zeros([1], &device)),
            prediction_logits: Tensor::zeros([2, 3, 7], &device),
            seq_relationship_logits: Tensor::zeros([2, 2], &device),
            hidden_states: with_hidden.then(|| vec![Tensor::zeros([2, 5, 4], &device)]),
            attentions: None,
        }
    }

    fn kinds(fields: &[OutputField<B>]) -> Vec<&'static str> {
        fields.iter().map(OutputField::kind).collect()
    }

    #[test]
    fn test_tuple_order_with_loss() {
        let fields = output(true, true).into_tuple();
        assert_eq!(
            kinds(&fields),
            ["loss", "prediction_logits", "seq_relationship_logits", "hidden_states"]
        );
    }

    #[test]
    fn test_tuple_without_loss_starts_with_logits() {
        let fields = output(false, false).into_tuple();
        assert_eq!(kinds(&fields), ["prediction_logits", "seq_relationship_logits"]);
    }

    #[test]
    fn test_tuple_converts_back() {
        let outputs = PretrainingOutputs::Tuple(output(true, false).into_tuple());
        assert!(outputs.is_tuple());
        let back = outputs.into_output().unwrap();
        assert!(back.loss.is_some());
        assert_eq!(back.prediction_logits.dims(), [2, 3, 7]);
        assert!(back.hidden_states.is_none());
    }

    #[test]
    fn test_tuple_missing_logits_does_not_convert() {
        let outputs = PretrainingOutputs::<B>::Tuple(vec![]);
        assert!(outputs.into_output().is_none());
    }
}
