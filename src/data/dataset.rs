use std::num::NonZeroUsize;

use ndarray::{ArrayView2, Axis};
use rand::{Rng, seq::SliceRandom};

use crate::{EvalErr, Result};

/// An in-memory dataset stored row-major: each row holds the `x_size` input features followed by
/// the `y_size` target values.
#[derive(Debug, Clone)]
pub struct Dataset {
    data: Vec<f32>,
    x_size: usize,
    y_size: usize,
    len: usize,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `data` - The raw rows.
    /// * `x_size` - The amount of input features per row.
    /// * `y_size` - The amount of target values per row.
    ///
    /// # Returns
    /// An error if the row size is zero or `data` doesn't split into whole rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let row_size = x_size + y_size;
        if row_size == 0 {
            return Err(EvalErr::InvalidConfig(
                "x_size + y_size must be greater than 0".into(),
            ));
        }

        if data.len() % row_size != 0 {
            return Err(EvalErr::InvalidConfig(format!(
                "dataset length ({}) is not divisible by x_size + y_size ({row_size})",
                data.len()
            )));
        }

        Ok(Self {
            len: data.len() / row_size,
            data,
            x_size,
            y_size,
        })
    }

    /// Returns the amount of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Returns the whole dataset split into its inputs and targets.
    pub fn view(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let rows = ArrayView2::from_shape((self.len, self.x_size + self.y_size), &self.data)?;
        Ok(rows.split_at(Axis(1), self.x_size))
    }

    /// Shuffles the rows in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let row_size = self.x_size + self.y_size;
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(rng);

        let mut shuffled = Vec::with_capacity(self.data.len());
        for i in order {
            shuffled.extend_from_slice(&self.data[i * row_size..(i + 1) * row_size]);
        }

        self.data = shuffled;
    }

    /// Iterates the dataset in batches of `batch_size` rows, the last one possibly smaller.
    ///
    /// # Returns
    /// An iterator of `(x, y)` views, borrowed from the dataset.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)>> {
        let row_size = self.x_size + self.y_size;
        let x_size = self.x_size;

        self.data
            .chunks(batch_size.get() * row_size)
            .map(move |chunk| -> Result<_> {
                let rows = ArrayView2::from_shape((chunk.len() / row_size, row_size), chunk)?;
                Ok(rows.split_at(Axis(1), x_size))
            })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset() -> Dataset {
        Dataset::new((0..10).map(|v| v as f32).collect(), 1, 1).unwrap()
    }

    #[test]
    fn rejects_partial_rows() {
        assert!(Dataset::new(vec![0.; 5], 1, 1).is_err());
        assert!(Dataset::new(vec![], 0, 0).is_err());
    }

    #[test]
    fn batches_respect_batch_size() {
        let ds = dataset();
        let batches: Vec<_> = ds
            .batches(NonZeroUsize::new(2).unwrap())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0, array![[0.], [2.]]);
        assert_eq!(batches[0].1, array![[1.], [3.]]);
        assert_eq!(batches[2].0, array![[8.]]);
    }

    #[test]
    fn shuffle_keeps_rows_together() {
        let mut ds = dataset();
        ds.shuffle(&mut StdRng::seed_from_u64(3));

        let (x, y) = ds.view().unwrap();
        for (x, y) in x.iter().zip(y.iter()) {
            assert_eq!(*y, *x + 1.);
        }
    }
}
