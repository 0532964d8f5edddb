use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, Axis, stack};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};

use super::Dataset;
use crate::{EvalErr, Result};

/// An n-shot k-way task: one query and `k * n` support samples.
///
/// The first `n` support samples always belong to the query's class.
#[derive(Debug, Clone)]
pub struct FewShotTask<S> {
    pub query: S,
    pub support: Vec<S>,
}

/// A source of few-shot tasks.
pub trait TaskBuilder {
    type Sample;

    /// Builds a fresh task with `k` classes and `n` samples per class.
    ///
    /// Implementations must put the query's class first in the support set.
    fn build_n_shot_task(&mut self, k: usize, n: usize) -> Result<FewShotTask<Self::Sample>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelledSample {
    pub x: Array1<f32>,
    pub label: usize,
}

/// A labelled dataset that samples few-shot tasks from its classes.
#[derive(Debug, Clone)]
pub struct FewShotDataset<R = StdRng> {
    features: Array2<f32>,
    labels: Vec<usize>,
    by_class: BTreeMap<usize, Vec<usize>>,
    rng: R,
}

impl FewShotDataset<StdRng> {
    /// Builds a few-shot dataset from a `Dataset` whose single target column holds class labels.
    ///
    /// # Arguments
    /// * `dataset` - The labelled rows.
    /// * `seed` - Seed for task sampling.
    pub fn from_dataset(dataset: &Dataset, seed: u64) -> Result<Self> {
        if dataset.is_empty() {
            return Err(EvalErr::EmptyDataset);
        }

        if dataset.y_size() != 1 {
            return Err(EvalErr::ShapeMismatch {
                what: "few-shot label columns",
                got: dataset.y_size(),
                expected: 1,
            });
        }

        let (x, y) = dataset.view()?;
        let labels = y
            .iter()
            .map(|&label| {
                if label < 0. || label.fract() != 0. || !label.is_finite() {
                    return Err(EvalErr::InvalidConfig(format!(
                        "class labels must be non-negative integers, got {label}"
                    )));
                }
                Ok(label as usize)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(x.to_owned(), labels, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> FewShotDataset<R> {
    /// Creates a new `FewShotDataset`.
    ///
    /// # Arguments
    /// * `features` - One sample per row.
    /// * `labels` - The class of each row.
    /// * `rng` - The random number generator used to sample tasks.
    pub fn new(features: Array2<f32>, labels: Vec<usize>, rng: R) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(EvalErr::ShapeMismatch {
                what: "labels",
                got: labels.len(),
                expected: features.nrows(),
            });
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(i);
        }

        Ok(Self {
            features,
            labels,
            by_class,
            rng,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.by_class.len()
    }

    pub fn sample(&self, index: usize) -> LabelledSample {
        LabelledSample {
            x: self.features.row(index).to_owned(),
            label: self.labels[index],
        }
    }
}

impl<R: Rng> TaskBuilder for FewShotDataset<R> {
    type Sample = LabelledSample;

    /// Picks a random query, then `n` other samples of its class, then `n` samples of each of
    /// `k - 1` other randomly chosen classes.
    fn build_n_shot_task(&mut self, k: usize, n: usize) -> Result<FewShotTask<LabelledSample>> {
        if k == 0 || n == 0 {
            return Err(EvalErr::InvalidTask(format!(
                "k and n must be positive, got k = {k}, n = {n}"
            )));
        }

        if self.is_empty() {
            return Err(EvalErr::InvalidTask("the dataset has no samples".into()));
        }

        let Self { by_class, rng, .. } = self;

        // The query's class must hold the query plus `n` supports.
        let query_classes: Vec<usize> = by_class
            .iter()
            .filter(|(_, rows)| rows.len() > n)
            .map(|(&class, _)| class)
            .collect();
        let &query_class = query_classes.choose(rng).ok_or_else(|| {
            EvalErr::InvalidTask(format!("no class has more than {n} samples"))
        })?;

        let candidates = &by_class[&query_class];
        let query = candidates[rng.random_range(0..candidates.len())];

        let same: Vec<usize> = candidates.iter().copied().filter(|&i| i != query).collect();
        let mut support: Vec<usize> = same.choose_multiple(rng, n).copied().collect();

        let others: Vec<usize> = by_class
            .iter()
            .filter(|&(&class, rows)| class != query_class && rows.len() >= n)
            .map(|(&class, _)| class)
            .collect();
        if others.len() < k - 1 {
            return Err(EvalErr::InvalidTask(format!(
                "need {} other classes with at least {n} samples, found {}",
                k - 1,
                others.len()
            )));
        }

        for class in others.choose_multiple(rng, k - 1) {
            support.extend(by_class[class].choose_multiple(rng, n).copied());
        }

        Ok(FewShotTask {
            query: self.sample(query),
            support: support.into_iter().map(|i| self.sample(i)).collect(),
        })
    }
}

/// Stacks a task's samples into a `(1, features)` query batch and a `(supports, features)` support
/// batch, the usual `prepare_batch` for few-shot evaluation.
pub fn stack_task(
    query: LabelledSample,
    support: Vec<LabelledSample>,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let query = query.x.insert_axis(Axis(0));
    let views: Vec<ArrayView1<f32>> = support.iter().map(|s| s.x.view()).collect();
    let support = stack(Axis(0), &views)?;

    Ok((query, support))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn dataset() -> FewShotDataset {
        let features = Array2::from_shape_fn((12, 2), |(i, j)| (i * 2 + j) as f32);
        let labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3];
        FewShotDataset::new(features, labels, StdRng::seed_from_u64(11)).unwrap()
    }

    #[test]
    fn first_support_shares_the_query_class() {
        let mut ds = dataset();

        for _ in 0..50 {
            let task = ds.build_n_shot_task(3, 1).unwrap();
            assert_eq!(task.support.len(), 3);
            assert_eq!(task.support[0].label, task.query.label);
            assert_ne!(task.support[0], task.query);

            for other in &task.support[1..] {
                assert_ne!(other.label, task.query.label);
            }
        }
    }

    #[test]
    fn classes_in_a_task_are_distinct() {
        let mut ds = dataset();
        let task = ds.build_n_shot_task(4, 2).unwrap();

        let mut labels: Vec<usize> = task.support.iter().map(|s| s.label).collect();
        assert_eq!(&labels[..2], &[task.query.label, task.query.label]);
        labels.dedup();
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn too_many_classes_is_an_invalid_task() {
        let mut ds = dataset();
        let err = ds.build_n_shot_task(5, 1).unwrap_err();
        assert!(matches!(err, EvalErr::InvalidTask(_)));
    }

    #[test]
    fn empty_dataset_builds_no_task() {
        let mut ds =
            FewShotDataset::new(Array2::zeros((0, 2)), vec![], StdRng::seed_from_u64(0)).unwrap();
        assert!(ds.is_empty());

        let err = ds.build_n_shot_task(2, 1).unwrap_err();
        assert!(matches!(err, EvalErr::InvalidTask(_)));
    }

    #[test]
    fn from_dataset_reads_label_column() {
        let raw = Dataset::new(vec![0.5, 0., 1.5, 1., 2.5, 1.], 1, 1).unwrap();
        let ds = FewShotDataset::from_dataset(&raw, 0).unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_classes(), 2);
        assert_eq!(ds.sample(1), LabelledSample { x: array![1.5], label: 1 });
    }

    #[test]
    fn from_dataset_rejects_empty_datasets() {
        let raw = Dataset::new(vec![], 1, 1).unwrap();
        assert!(matches!(
            FewShotDataset::from_dataset(&raw, 0),
            Err(EvalErr::EmptyDataset)
        ));
    }

    #[test]
    fn from_dataset_rejects_fractional_labels() {
        let raw = Dataset::new(vec![0.5, 0.3], 1, 1).unwrap();
        assert!(FewShotDataset::from_dataset(&raw, 0).is_err());
    }

    #[test]
    fn stack_task_shapes() {
        let query = LabelledSample { x: array![1., 2.], label: 0 };
        let support = vec![
            LabelledSample { x: array![1., 2.], label: 0 },
            LabelledSample { x: array![3., 4.], label: 1 },
        ];

        let (q, s) = stack_task(query, support).unwrap();
        assert_eq!(q, array![[1., 2.]]);
        assert_eq!(s, array![[1., 2.], [3., 4.]]);
    }
}
