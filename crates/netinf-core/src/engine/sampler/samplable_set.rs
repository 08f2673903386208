//! Composition-rejection sampling over a dynamic weighted set.
//!
//! Items are bucketed by weight into power-of-two groups relative to the declared minimum
//! weight. Sampling picks a group proportionally to its total weight, then rejection-samples
//! inside the group against the group's upper bound, which accepts with probability at least
//! one half. Insertion, removal and reweighting are O(1) through a position index and
//! `swap_remove`.

use std::hash::Hash;

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::engine::errors::NetInfError;

#[derive(Debug, Clone)]
struct Group<T> {
    items: Vec<(T, f64)>,
    total: f64,
    upper: f64,
}

/// Weighted set with O(1) amortized sampling and updates.
///
/// Weights must lie in the `[min_weight, max_weight]` range given at construction.
#[derive(Debug, Clone)]
pub struct SamplableSet<T> {
    min_weight: f64,
    max_weight: f64,
    groups: Vec<Group<T>>,
    positions: FxHashMap<T, (usize, usize)>,
    total_weight: f64,
}

impl<T: Copy + Eq + Hash> SamplableSet<T> {
    /// Creates an empty set accepting weights in `[min_weight, max_weight]`.
    pub fn new(min_weight: f64, max_weight: f64) -> Result<Self, NetInfError> {
        if !(min_weight > 0.0 && max_weight >= min_weight && max_weight.is_finite()) {
            return Err(NetInfError::InvalidArgument(format!(
                "invalid weight range [{min_weight}, {max_weight}]"
            )));
        }
        let group_count = (max_weight / min_weight).log2().floor() as usize + 1;
        let groups = (0..group_count)
            .map(|g| Group {
                items: Vec::new(),
                total: 0.0,
                upper: min_weight * 2f64.powi(g as i32 + 1),
            })
            .collect();
        Ok(Self {
            min_weight,
            max_weight,
            groups,
            positions: FxHashMap::default(),
            total_weight: 0.0,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Weight of `item`, or `None` if absent.
    pub fn weight(&self, item: &T) -> Option<f64> {
        self.positions
            .get(item)
            .map(|&(g, i)| self.groups[g].items[i].1)
    }

    fn group_of(&self, weight: f64) -> Result<usize, NetInfError> {
        if !(weight >= self.min_weight && weight <= self.max_weight) {
            return Err(NetInfError::WeightOutOfRange {
                weight,
                min: self.min_weight,
                max: self.max_weight,
            });
        }
        let g = (weight / self.min_weight).log2().floor() as usize;
        Ok(g.min(self.groups.len() - 1))
    }

    /// Inserts a new item. Inserting an item already present is an error.
    pub fn insert(&mut self, item: T, weight: f64) -> Result<(), NetInfError> {
        if self.positions.contains_key(&item) {
            return Err(NetInfError::InvalidArgument(
                "item is already in the samplable set".into(),
            ));
        }
        let g = self.group_of(weight)?;
        let group = &mut self.groups[g];
        group.items.push((item, weight));
        group.total += weight;
        self.positions.insert(item, (g, group.items.len() - 1));
        self.total_weight += weight;
        Ok(())
    }

    /// Removes `item` and returns its weight.
    pub fn erase(&mut self, item: &T) -> Option<f64> {
        let (g, i) = self.positions.remove(item)?;
        let group = &mut self.groups[g];
        let (_, weight) = group.items.swap_remove(i);
        if let Some(&(moved, _)) = group.items.get(i) {
            self.positions.insert(moved, (g, i));
        }
        group.total -= weight;
        if group.items.is_empty() {
            group.total = 0.0;
        }
        self.total_weight -= weight;
        if self.positions.is_empty() {
            self.total_weight = 0.0;
        }
        Some(weight)
    }

    /// Sets the weight of `item`, inserting it if needed.
    pub fn set_weight(&mut self, item: T, weight: f64) -> Result<(), NetInfError> {
        self.group_of(weight)?;
        self.erase(&item);
        self.insert(item, weight)
    }

    pub fn clear(&mut self) {
        for group in &mut self.groups {
            group.items.clear();
            group.total = 0.0;
        }
        self.positions.clear();
        self.total_weight = 0.0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.groups.iter().flat_map(|group| group.items.iter().copied())
    }

    /// Draws an item proportionally to its weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(T, f64)> {
        if self.is_empty() {
            return None;
        }
        let mut target = rng.gen::<f64>() * self.total_weight;
        let mut chosen = None;
        for group in self.groups.iter().filter(|group| !group.items.is_empty()) {
            chosen = Some(group);
            if target < group.total {
                break;
            }
            target -= group.total;
        }
        let group = chosen?;
        loop {
            let (item, weight) = group.items[rng.gen_range(0..group.items.len())];
            if rng.gen::<f64>() * group.upper < weight {
                return Some((item, weight));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn out_of_range_weight_is_rejected() {
        let mut set = SamplableSet::new(1.0, 100.0).expect("valid range");
        assert!(matches!(
            set.insert(0usize, 0.5),
            Err(NetInfError::WeightOutOfRange { .. })
        ));
        assert!(set.insert(0usize, 101.0).is_err());
        assert!(set.insert(0usize, 100.0).is_ok());
    }

    #[test]
    fn erase_keeps_positions_valid() {
        let mut set = SamplableSet::new(1.0, 64.0).expect("valid range");
        for i in 0..5usize {
            set.insert(i, 1.0).expect("insert");
        }
        assert_eq!(set.erase(&1), Some(1.0));
        assert_eq!(set.erase(&1), None);
        set.set_weight(4, 10.0).expect("reweight");
        assert_eq!(set.weight(&4), Some(10.0));
        assert_eq!(set.weight(&3), Some(1.0));
        assert_eq!(set.len(), 4);
        assert_eq!(set.total_weight(), 13.0);
    }

    #[test]
    fn sampling_frequencies_follow_weights() {
        let mut set = SamplableSet::new(1.0, 64.0).expect("valid range");
        set.insert('a', 1.0).expect("insert");
        set.insert('b', 3.0).expect("insert");
        set.insert('c', 12.0).expect("insert");
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 40_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            let (item, _) = set.sample(&mut rng).expect("non-empty");
            counts[(item as u8 - b'a') as usize] += 1;
        }
        let expected = [1.0 / 16.0, 3.0 / 16.0, 12.0 / 16.0];
        for (count, p) in counts.iter().zip(expected) {
            assert!((*count as f64 / draws as f64 - p).abs() < 0.02);
        }
    }

    #[test]
    fn empty_set_samples_nothing() {
        let set: SamplableSet<usize> = SamplableSet::new(1.0, 2.0).expect("valid range");
        let mut rng = StdRng::seed_from_u64(1);
        assert!(set.sample(&mut rng).is_none());
    }
}
