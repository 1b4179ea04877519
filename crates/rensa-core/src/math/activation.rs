//! Activation functions for the hidden and output layers.

/// Pre-activations are clamped into `[-PRE_ACTIVATION_LIMIT, PRE_ACTIVATION_LIMIT]`
/// before the logistic function.
pub const PRE_ACTIVATION_LIMIT: f32 = 50.0;

/// Logistic sigmoid with input clamping.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-PRE_ACTIVATION_LIMIT, PRE_ACTIVATION_LIMIT);
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax over one timestep's output units, in place.
///
/// The row maximum is subtracted before exponentiating.
pub fn softmax(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// `log(sum(exp(values)))` computed without overflow.
pub fn log_sum_exp(values: impl IntoIterator<Item = f32>) -> f32 {
    let values: Vec<f32> = values.into_iter().collect();
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return f32::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f32>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_clamped() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_eq!(sigmoid(1e9), sigmoid(50.0));
        assert_eq!(sigmoid(-1e9), sigmoid(-50.0));
        assert!(sigmoid(-1e9) > 0.0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let mut v = vec![1.0, 2.0, 3.0];
        softmax(&mut v);
        let sum: f32 = v.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(v[2] > v[1] && v[1] > v[0]);
    }

    #[test]
    fn softmax_handles_large_scores() {
        let mut v = vec![1000.0, 1000.0, -1000.0];
        softmax(&mut v);
        assert!((v[0] - 0.5).abs() < 1e-6);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn log_sum_exp_matches_naive() {
        let naive = (1.0f32.exp() + 2.0f32.exp()).ln();
        assert!((log_sum_exp([1.0, 2.0]) - naive).abs() < 1e-5);
        assert_eq!(log_sum_exp([f32::NEG_INFINITY]), f32::NEG_INFINITY);
    }
}
