use std::collections::HashMap;

use rand::{Rng, seq::SliceRandom};

/// The row indices of the train and test partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn test_count(len: usize, test_size: f32) -> usize {
    ((len as f32 * test_size.clamp(0., 1.)).floor() as usize).min(len)
}

/// Splits `0..n` into train and test indices.
///
/// Without `groups` all indices are shuffled once and the first `floor(n * test_size)` go to
/// test. With `groups` (one group key per row) every group is shuffled and split on its own,
/// then the partitions are joined in first-appearance order of the groups.
///
/// # Arguments
/// * `n` - The amount of rows.
/// * `test_size` - The fraction of rows held out, clamped to `[0, 1]`.
/// * `groups` - The stratification key of every row.
/// * `rng` - A random number generator.
pub fn train_test_split<R: Rng>(
    n: usize,
    test_size: f32,
    groups: Option<&[String]>,
    rng: &mut R,
) -> Split {
    let Some(groups) = groups else {
        let mut indices: Vec<_> = (0..n).collect();
        indices.shuffle(rng);
        let train = indices.split_off(test_count(n, test_size));
        return Split {
            train,
            test: indices,
        };
    };

    let mut order: Vec<&str> = Vec::new();
    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, key) in groups.iter().enumerate().take(n) {
        let entry = members.entry(key.as_str()).or_insert_with(|| {
            order.push(key.as_str());
            Vec::new()
        });
        entry.push(i);
    }

    let mut split = Split::default();
    for key in order {
        let Some(mut indices) = members.remove(key) else {
            continue;
        };

        indices.shuffle(rng);
        let train = indices.split_off(test_count(indices.len(), test_size));
        split.test.extend(indices);
        split.train.extend(train);
    }

    split
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn assert_partition(split: &Split, n: usize) {
        assert_eq!(split.train.len() + split.test.len(), n);

        let train: HashSet<_> = split.train.iter().collect();
        let test: HashSet<_> = split.test.iter().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), n);
    }

    #[test]
    fn plain_split_sizes() {
        let mut rng = StdRng::seed_from_u64(1);
        let split = train_test_split(15, 0.2, None, &mut rng);

        assert_eq!(split.test.len(), 3);
        assert_partition(&split, 15);
    }

    #[test]
    fn stratified_split_keeps_proportions() {
        let groups: Vec<String> = (0..20)
            .map(|i| if i % 4 == 0 { "a" } else { "b" }.to_string())
            .collect();

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let split = train_test_split(groups.len(), 0.4, Some(&groups), &mut rng);

            assert_partition(&split, 20);
            let test_a = split.test.iter().filter(|&&i| groups[i] == "a").count();
            assert_eq!(test_a, 2);
            assert_eq!(split.test.len(), 2 + 6);
        }
    }

    #[test]
    fn stratified_split_includes_first_row() {
        let groups = vec!["x".to_string(); 3];
        let mut rng = StdRng::seed_from_u64(3);
        let split = train_test_split(3, 0.0, Some(&groups), &mut rng);

        assert!(split.train.contains(&0));
        assert!(split.test.is_empty());
    }

    #[test]
    fn same_seed_same_split() {
        let a = train_test_split(50, 0.3, None, &mut StdRng::seed_from_u64(9));
        let b = train_test_split(50, 0.3, None, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
