//! Random combinatorial structures used when sampling priors and graphs.

use rand::seq::{index, SliceRandom};
use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::numeric::log_partition_table;

/// Draws `k` items with replacement, uniformly over the multisets of size `k` on `n` kinds.
///
/// Returns the count of every kind. Stars and bars: choosing `k` of the `n + k - 1` slots.
pub fn sample_multiset<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    k: usize,
) -> Result<Vec<usize>, NetInfError> {
    if n == 0 {
        return if k == 0 {
            Ok(Vec::new())
        } else {
            Err(NetInfError::InvalidArgument(format!(
                "cannot place {k} items in zero bins"
            )))
        };
    }
    let mut counts = vec![0; n];
    let mut slots = index::sample(rng, n + k - 1, k).into_vec();
    slots.sort_unstable();
    for (i, slot) in slots.into_iter().enumerate() {
        counts[slot - i] += 1;
    }
    Ok(counts)
}

/// Uniform composition of `n` into `parts` positive parts.
pub fn sample_composition<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    parts: usize,
) -> Result<Vec<usize>, NetInfError> {
    if parts == 0 || parts > n {
        return Err(NetInfError::InvalidArgument(format!(
            "cannot split {n} into {parts} positive parts"
        )));
    }
    let mut cuts = index::sample(rng, n - 1, parts - 1).into_vec();
    cuts.sort_unstable();
    let mut sizes = Vec::with_capacity(parts);
    let mut previous = 0;
    for cut in cuts {
        sizes.push(cut + 1 - previous);
        previous = cut + 1;
    }
    sizes.push(n - previous);
    Ok(sizes)
}

/// Labels `0..sizes.len()` repeated by size, shuffled.
pub fn shuffled_labels<R: Rng + ?Sized>(rng: &mut R, sizes: &[usize]) -> Vec<usize> {
    let mut labels: Vec<usize> = sizes
        .iter()
        .enumerate()
        .flat_map(|(r, &n)| std::iter::repeat(r).take(n))
        .collect();
    labels.shuffle(rng);
    labels
}

/// Uniform integer partition of `n` into at most `k` parts, largest part first.
///
/// Samples a partition with parts bounded by `k` through the recursion
/// `q_j(m) = q_{j-1}(m) + q_j(m - j)` and returns its conjugate.
pub fn sample_partition<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    k: usize,
) -> Result<Vec<usize>, NetInfError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if k == 0 {
        return Err(NetInfError::InvalidArgument(format!(
            "cannot partition {n} into zero parts"
        )));
    }
    let max_part = k.min(n);
    let tables: Vec<Vec<f64>> = (0..=max_part).map(|j| log_partition_table(n, j)).collect();
    let mut bounded_parts = Vec::new();
    let (mut m, mut j) = (n, max_part);
    while m > 0 {
        // q_j(m) = q_{j-1}(m) + q_j(m - j): keep a part of size j with the second share
        let keep = if j <= m {
            (tables[j][m - j] - tables[j][m]).exp()
        } else {
            0.0
        };
        if rng.gen::<f64>() < keep {
            bounded_parts.push(j);
            m -= j;
        } else {
            j -= 1;
        }
    }
    let parts = bounded_parts.first().copied().unwrap_or(0);
    Ok((1..=parts)
        .map(|i| bounded_parts.iter().filter(|&&p| p >= i).count())
        .collect())
}

/// Decodes `index` into the pair `(i, j)` with `i <= j < n`, enumerating rows in order.
pub fn pair_with_loops(mut index: usize, n: usize) -> (usize, usize) {
    for i in 0..n {
        let row = n - i;
        if index < row {
            return (i, i + index);
        }
        index -= row;
    }
    (n.saturating_sub(1), n.saturating_sub(1))
}

/// Decodes `index` into the pair `(i, j)` with `i < j < n`.
pub fn pair_without_loops(mut index: usize, n: usize) -> (usize, usize) {
    for i in 0..n {
        let row = n - i - 1;
        if index < row {
            return (i, i + 1 + index);
        }
        index -= row;
    }
    (n.saturating_sub(2), n.saturating_sub(1))
}
