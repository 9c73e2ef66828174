// ============================================================
// Layer 5 — Masked-Position Gather
// ============================================================
// Picks the hidden vectors at the masked token positions so
// the masked-LM head only runs on (B, M, H) instead of the
// full (B, S, H) encoder output.
//
//   hidden    [B, S, H] ──reshape──▶ [B·S, H]
//   positions [B, M]    ──+ b·S────▶ [B·M]      (flat row ids)
//   select(0, flat ids)            ▶ [B·M, H] ──▶ [B, M, H]
//
// One flat `select` replaces a per-example gather loop.
// Positions are bounds-checked before the lookup: the flat
// index of an out-of-range position would silently land in a
// neighbouring example.

use burn::prelude::*;

use crate::domain::error::{Error, Result};

/// `output[b, m, :] = hidden[b, positions[b, m], :]`
pub fn gather_positions<B: Backend>(
    hidden:    Tensor<B, 3>,
    positions: Tensor<B, 2, Int>,
) -> Result<Tensor<B, 3>> {
    let [batch, seq_len, width] = hidden.dims();
    let [pos_batch, num_masked] = positions.dims();

    if pos_batch != batch {
        return Err(Error::invalid_argument(format!(
            "masked positions have batch size {pos_batch} but hidden states have {batch}"
        )));
    }

    let device = hidden.device();
    if batch == 0 || num_masked == 0 {
        return Ok(Tensor::zeros([batch, num_masked, width], &device));
    }

    check_bounds(&positions, seq_len)?;

    let offsets = Tensor::<B, 1, Int>::arange(0..batch as i64, &device)
        .mul_scalar(seq_len as i64)
        .reshape([batch, 1])
        .expand([batch, num_masked]);
    let flat_positions = (positions + offsets).reshape([batch * num_masked]);
    let flat_hidden    = hidden.reshape([batch * seq_len, width]);

    Ok(flat_hidden
        .select(0, flat_positions)
        .reshape([batch, num_masked, width]))
}

fn check_bounds<B: Backend>(positions: &Tensor<B, 2, Int>, seq_len: usize) -> Result<()> {
    let min = positions.clone().min().into_scalar().elem::<i64>();
    let max = positions.clone().max().into_scalar().elem::<i64>();
    if min < 0 || max >= seq_len as i64 {
        return Err(Error::invalid_argument(format!(
            "masked positions must lie in [0, {seq_len}), got range [{min}, {max}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn sequential_hidden(batch: usize, seq: usize, width: usize) -> Tensor<B, 3> {
        let device = Default::default();
        Tensor::<B, 1, Int>::arange(0..(batch * seq * width) as i64, &device)
            .float()
            .reshape([batch, seq, width])
    }

    fn to_vec(t: Tensor<B, 3>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_gathers_expected_rows() {
        let device  = Default::default();
        let hidden  = sequential_hidden(2, 4, 3);
        let positions = Tensor::<B, 2, Int>::from_ints([[0, 2], [1, 3]], &device);

        let out = gather_positions(hidden, positions).unwrap();
        assert_eq!(out.dims(), [2, 2, 3]);

        // hidden[b, s, :] = (b*12 + s*3) .. +3
        let expected = vec![
            0.0, 1.0, 2.0,    6.0, 7.0, 8.0,     // b=0: s=0, s=2
            15.0, 16.0, 17.0, 21.0, 22.0, 23.0,  // b=1: s=1, s=3
        ];
        assert_eq!(to_vec(out), expected);
    }

    #[test]
    fn test_all_positions_in_order_is_identity() {
        let device = Default::default();
        let hidden = sequential_hidden(3, 5, 2);
        let positions = Tensor::<B, 1, Int>::arange(0..5, &device)
            .reshape([1, 5])
            .expand([3, 5]);

        let out = gather_positions(hidden.clone(), positions).unwrap();
        assert_eq!(to_vec(out), to_vec(hidden));
    }

    #[test]
    fn test_repeated_and_unordered_positions() {
        let device = Default::default();
        let hidden = sequential_hidden(1, 4, 1);
        let positions = Tensor::<B, 2, Int>::from_ints([[3, 3, 0]], &device);

        let out = gather_positions(hidden, positions).unwrap();
        assert_eq!(to_vec(out), vec![3.0, 3.0, 0.0]);
    }

    #[test]
    fn test_batch_mismatch_is_invalid_argument() {
        let device = Default::default();
        let hidden = sequential_hidden(2, 4, 3);
        let positions = Tensor::<B, 2, Int>::from_ints([[0, 1]], &device);

        let err = gather_positions(hidden, positions).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_out_of_range_position_is_rejected() {
        let device = Default::default();
        let positions = Tensor::<B, 2, Int>::from_ints([[0, 4], [1, 2]], &device);
        let err = gather_positions(sequential_hidden(2, 4, 3), positions).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let positions = Tensor::<B, 2, Int>::from_ints([[0, -1], [1, 2]], &device);
        let err = gather_positions(sequential_hidden(2, 4, 3), positions).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
