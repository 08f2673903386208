//! Log-space combinatorics and probability helpers shared by priors, likelihoods and dynamics.
//!
//! Every function returns natural logarithms; impossible events map to `f64::NEG_INFINITY`.

use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

/// Smallest transition probability reported by a dynamics model.
pub const PROB_EPSILON: f64 = 1e-15;

/// Absolute tolerance used by self-checks comparing cached and recomputed log-probabilities.
pub const CONSISTENCY_TOLERANCE: f64 = 1e-6;

#[inline]
pub fn log_factorial(n: usize) -> f64 {
    ln_factorial(n as u64)
}

/// `ln C(n, k)`, `-inf` when `k > n`.
pub fn log_binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    log_factorial(n) - log_factorial(k) - log_factorial(n - k)
}

/// `ln` of the number of multisets of size `k` drawn from `n` kinds, `C(n + k - 1, k)`.
pub fn log_multiset(n: usize, k: usize) -> f64 {
    if n == 0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    log_binomial(n + k - 1, k)
}

/// `ln (sum n_i)! / prod n_i!`.
pub fn log_multinomial(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    log_factorial(total) - counts.iter().map(|&n| log_factorial(n)).sum::<f64>()
}

/// Poisson log-mass at `x`.
pub fn log_poisson_pmf(x: usize, mean: f64) -> f64 {
    if mean <= 0.0 {
        return if x == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    x as f64 * mean.ln() - mean - ln_gamma(x as f64 + 1.0)
}

/// Poisson log-mass conditioned on `x >= 1`.
pub fn log_zero_truncated_poisson_pmf(x: usize, mean: f64) -> f64 {
    if x == 0 || mean <= 0.0 {
        return f64::NEG_INFINITY;
    }
    log_poisson_pmf(x, mean) - (-(-mean).exp_m1()).ln()
}

/// Log-mass of a geometric law on `{0, 1, ...}` with success probability `p`.
pub fn log_geometric_pmf(x: usize, p: f64) -> f64 {
    if p >= 1.0 {
        return if x == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    x as f64 * (1.0 - p).ln() + p.ln()
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn clip_prob(p: f64) -> f64 {
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

/// `ln(e^a + e^b)` without overflow.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln q(n, k)`, where `q(n, k)` counts the partitions of `n` into at most `k` parts.
///
/// Exact dynamic program over `q_j(m) = q_{j-1}(m) + q_j(m - j)`, run in log-space.
pub fn log_partitions_at_most(n: usize, k: usize) -> f64 {
    log_partition_table(n, k)[n]
}

/// `ln q(m, k)` for every `m` in `0..=n`.
pub fn log_partition_table(n: usize, k: usize) -> Vec<f64> {
    let mut table = vec![f64::NEG_INFINITY; n + 1];
    table[0] = 0.0;
    for part in 1..=k.min(n) {
        for m in part..=n {
            table[m] = log_sum_exp(table[m], table[m - part]);
        }
    }
    table
}
