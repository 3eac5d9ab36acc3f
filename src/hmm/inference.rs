//! Forward, backward and Viterbi passes.

use super::model::Hmm;
use crate::error::Result;

/// Output of the scaled forward pass.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ForwardResult {
    /// `alpha[t][i]`: P(state_t = i | o_0..=t). Each row sums to 1, or is
    /// all zeros once the sequence has become impossible under the model.
    pub alpha: Vec<Vec<f64>>,

    /// Normalizer of each step: `scales[t]` = P(o_t | o_0..t).
    pub scales: Vec<f64>,

    /// Normalizer of the final step only.
    ///
    /// This is the value the rescaled lattice yields directly; it equals the
    /// joint probability only for a single observation. Use
    /// [`log_likelihood`](Self::log_likelihood) for the exact quantity.
    pub relative_probability: f64,

    /// ln P(o_0..T), the sum of the log scale factors. `-inf` if impossible.
    pub log_likelihood: f64,
}

impl ForwardResult {
    /// Filtering posterior at the last step.
    pub fn posterior(&self) -> &[f64] {
        self.alpha.last().map_or(&[], Vec::as_slice)
    }

    /// Exact joint probability `exp(log_likelihood)`. Underflows to zero for
    /// long sequences.
    pub fn likelihood(&self) -> f64 {
        self.log_likelihood.exp()
    }
}

/// Output of Viterbi decoding.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViterbiResult {
    /// Most likely state index at each step.
    pub path: Vec<usize>,

    /// ln P(path, observations). `-inf` if every path is impossible.
    pub log_probability: f64,
}

impl Hmm {
    /// Scaled forward algorithm.
    pub fn forward(&self, observations: &[usize]) -> Result<ForwardResult> {
        self.check_sequence(observations)?;
        let n = self.num_states();
        let initial = self.initial();
        let transition = self.transition();
        let emission = self.emission();

        let mut alpha = Vec::with_capacity(observations.len());
        let mut scales = Vec::with_capacity(observations.len());

        let mut row: Vec<f64> = (0..n)
            .map(|i| initial[i] * emission[i][observations[0]])
            .collect();
        scales.push(normalize(&mut row));
        alpha.push(row);

        for &o in &observations[1..] {
            let prev = &alpha[alpha.len() - 1];
            let mut row: Vec<f64> = (0..n)
                .map(|j| {
                    let inflow: f64 = (0..n).map(|i| prev[i] * transition[i][j]).sum();
                    inflow * emission[j][o]
                })
                .collect();
            scales.push(normalize(&mut row));
            alpha.push(row);
        }

        let log_likelihood = scales.iter().map(|c| c.ln()).sum();
        let relative_probability = scales.last().copied().unwrap_or(0.0);

        Ok(ForwardResult {
            alpha,
            scales,
            relative_probability,
            log_likelihood,
        })
    }

    /// Scaled backward pass, using the scale factors of `forward`.
    ///
    /// With these betas, `alpha[t][i] * beta[t][i]` is the smoothed
    /// posterior of state `i` at step `t`.
    pub fn backward(
        &self,
        observations: &[usize],
        forward: &ForwardResult,
    ) -> Result<Vec<Vec<f64>>> {
        self.check_sequence(observations)?;
        let n = self.num_states();
        let t_len = observations.len();
        let transition = self.transition();
        let emission = self.emission();

        let mut beta = vec![vec![0.0; n]; t_len];
        beta[t_len - 1] = vec![1.0; n];

        for t in (0..t_len - 1).rev() {
            let o = observations[t + 1];
            let scale = forward.scales.get(t + 1).copied().unwrap_or(0.0);
            if scale <= 0.0 {
                continue;
            }
            for i in 0..n {
                let sum: f64 = (0..n)
                    .map(|j| transition[i][j] * emission[j][o] * beta[t + 1][j])
                    .sum();
                beta[t][i] = sum / scale;
            }
        }
        Ok(beta)
    }

    /// Per-step posteriors given the entire sequence (forward-backward).
    pub fn smooth(&self, observations: &[usize]) -> Result<Vec<Vec<f64>>> {
        let forward = self.forward(observations)?;
        let beta = self.backward(observations, &forward)?;

        Ok(forward
            .alpha
            .iter()
            .zip(&beta)
            .map(|(a, b)| {
                let mut gamma: Vec<f64> = a.iter().zip(b).map(|(x, y)| x * y).collect();
                normalize(&mut gamma);
                gamma
            })
            .collect())
    }

    /// Most likely state sequence, computed in log space.
    pub fn viterbi(&self, observations: &[usize]) -> Result<ViterbiResult> {
        self.check_sequence(observations)?;
        let n = self.num_states();
        let initial = self.initial();
        let log_trans: Vec<Vec<f64>> = self
            .transition()
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();
        let log_emit: Vec<Vec<f64>> = self
            .emission()
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();

        let mut delta: Vec<f64> = (0..n)
            .map(|i| initial[i].ln() + log_emit[i][observations[0]])
            .collect();
        let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(observations.len());

        for &o in &observations[1..] {
            let mut next = vec![f64::NEG_INFINITY; n];
            let mut pointers = vec![0usize; n];
            for j in 0..n {
                let (best_i, best) = argmax((0..n).map(|i| delta[i] + log_trans[i][j]));
                next[j] = best + log_emit[j][o];
                pointers[j] = best_i;
            }
            delta = next;
            backpointers.push(pointers);
        }

        let (mut state, log_probability) = argmax(delta.iter().copied());
        let mut path = vec![state];
        for pointers in backpointers.iter().rev() {
            state = pointers[state];
            path.push(state);
        }
        path.reverse();

        Ok(ViterbiResult {
            path,
            log_probability,
        })
    }

    /// ln P(states, observations) for an explicit state path.
    pub fn path_log_probability(&self, states: &[usize], observations: &[usize]) -> Result<f64> {
        self.check_sequence(observations)?;
        if states.len() != observations.len() || states.iter().any(|&s| s >= self.num_states()) {
            return Err(crate::error::PlanError::InvalidModel(
                "state path does not match the observation sequence".into(),
            ));
        }
        let mut lp =
            self.initial()[states[0]].ln() + self.emission()[states[0]][observations[0]].ln();
        for t in 1..states.len() {
            lp += self.transition()[states[t - 1]][states[t]].ln();
            lp += self.emission()[states[t]][observations[t]].ln();
        }
        Ok(lp)
    }
}

/// Scales `row` to sum to one and returns the original sum.
///
/// A zero row is left untouched.
fn normalize(row: &mut [f64]) -> f64 {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        row.iter_mut().for_each(|x| *x /= sum);
    }
    sum
}

/// First index of the maximum; `(0, -inf)` when every value is `-inf`.
fn argmax(values: impl Iterator<Item = f64>) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    /// Classic umbrella world.
    fn umbrella() -> Hmm {
        Hmm::new(
            names(&["rain", "dry"]),
            names(&["umbrella", "none"]),
            vec![0.5, 0.5],
            vec![vec![0.7, 0.3], vec![0.3, 0.7]],
            vec![vec![0.9, 0.1], vec![0.2, 0.8]],
        )
        .unwrap()
    }

    /// Sum over all state paths, for cross-checking.
    fn brute_force_likelihood(hmm: &Hmm, obs: &[usize]) -> f64 {
        let n = hmm.num_states();
        let total_paths = n.pow(obs.len() as u32);
        (0..total_paths)
            .map(|mut code| {
                let path: Vec<usize> = (0..obs.len())
                    .map(|_| {
                        let s = code % n;
                        code /= n;
                        s
                    })
                    .collect();
                hmm.path_log_probability(&path, obs).unwrap().exp()
            })
            .sum()
    }

    #[test]
    fn test_forward_umbrella_day_two() {
        let hmm = umbrella();
        let result = hmm.forward(&[0, 0]).unwrap();

        // Russell & Norvig: P(rain_2 | u_1, u_2) = 0.883
        assert!((result.posterior()[0] - 0.883).abs() < 1e-3);
        assert!((result.alpha[0][0] - 0.818).abs() < 1e-3);
        for row in &result.alpha {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_forward_matches_brute_force() {
        let hmm = umbrella();
        let obs = [0, 1, 1, 0, 0];
        let result = hmm.forward(&obs).unwrap();
        let exact = brute_force_likelihood(&hmm, &obs);

        assert!((result.likelihood() - exact).abs() < 1e-12);
        assert!((result.log_likelihood - exact.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_relative_probability_single_step() {
        let hmm = umbrella();
        let result = hmm.forward(&[0]).unwrap();
        // 0.5 * 0.9 + 0.5 * 0.2
        assert!((result.relative_probability - 0.55).abs() < 1e-12);
        assert!((result.likelihood() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_long_sequence_does_not_underflow() {
        let hmm = umbrella();
        let obs: Vec<usize> = (0..5000).map(|t| t % 2).collect();
        let result = hmm.forward(&obs).unwrap();

        assert!(result.log_likelihood.is_finite());
        assert!(result.log_likelihood < -1000.0);
        assert!((result.posterior().iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_impossible_sequence() {
        let hmm = Hmm::new(
            names(&["a", "b"]),
            names(&["x", "y"]),
            vec![1.0, 0.0],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let result = hmm.forward(&[0, 1]).unwrap();

        assert_eq!(result.log_likelihood, f64::NEG_INFINITY);
        assert!(result.posterior().iter().all(|&p| p == 0.0));

        let viterbi = hmm.viterbi(&[0, 1]).unwrap();
        assert_eq!(viterbi.log_probability, f64::NEG_INFINITY);
    }

    #[test]
    fn test_smoothing() {
        let hmm = umbrella();
        let obs = [0, 0];
        let gamma = hmm.smooth(&obs).unwrap();

        // Russell & Norvig: P(rain_1 | u_1, u_2) = 0.883
        assert!((gamma[0][0] - 0.883).abs() < 1e-3);
        for row in &gamma {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        // Last smoothed step equals the filtered posterior.
        let forward = hmm.forward(&obs).unwrap();
        assert!((gamma[1][0] - forward.posterior()[0]).abs() < 1e-12);
    }

    #[test]
    fn test_viterbi_beats_greedy() {
        // Emissions favor "spike" for "lo", but "spike" is hard to enter, so
        // the per-step greedy choice pays a heavy transition penalty.
        let hmm = Hmm::new(
            names(&["steady", "spike"]),
            names(&["lo", "hi"]),
            vec![0.95, 0.05],
            vec![vec![0.95, 0.05], vec![0.5, 0.5]],
            vec![vec![0.45, 0.55], vec![0.55, 0.45]],
        )
        .unwrap();
        let obs = [0, 1, 0, 1, 0];

        let greedy: Vec<usize> = obs
            .iter()
            .map(|&o| {
                let e = hmm.emission();
                if e[0][o] >= e[1][o] {
                    0
                } else {
                    1
                }
            })
            .collect();
        let greedy_lp = hmm.path_log_probability(&greedy, &obs).unwrap();

        let viterbi = hmm.viterbi(&obs).unwrap();
        assert!(viterbi.log_probability >= greedy_lp);
        assert!(viterbi.log_probability > greedy_lp + 1.0);
        assert_eq!(viterbi.path, vec![0; 5]);
        let recomputed = hmm.path_log_probability(&viterbi.path, &obs).unwrap();
        assert!((recomputed - viterbi.log_probability).abs() < 1e-9);
    }

    #[test]
    fn test_viterbi_is_max_over_all_paths() {
        let hmm = umbrella();
        let obs = [0, 0, 1, 0, 1, 1];
        let viterbi = hmm.viterbi(&obs).unwrap();

        let best = (0..(1usize << obs.len()))
            .map(|code| {
                let path: Vec<usize> = (0..obs.len()).map(|t| (code >> t) & 1).collect();
                hmm.path_log_probability(&path, &obs).unwrap()
            })
            .fold(f64::NEG_INFINITY, f64::max);
        assert!((viterbi.log_probability - best).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let hmm = umbrella();
        assert!(hmm.forward(&[]).is_err());
        assert!(hmm.viterbi(&[]).is_err());
        assert!(hmm.forward(&[5]).is_err());
    }

    proptest! {
        #[test]
        fn prop_forward_likelihood_non_increasing(obs in proptest::collection::vec(0usize..2, 1..40)) {
            let hmm = umbrella();
            let mut previous = 0.0f64;
            for t in 1..=obs.len() {
                let ll = hmm.forward(&obs[..t]).unwrap().log_likelihood;
                prop_assert!(ll <= previous + 1e-12, "step {}: {} > {}", t, ll, previous);
                previous = ll;
            }
        }
    }
}
