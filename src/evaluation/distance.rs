use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::{EvalErr, Result};

/// Offset added to the difference before taking its norm, keeping the distance differentiable at 0.
const PAIRWISE_EPS: f32 = 1e-6;

/// Euclidean distance between a single query embedding and each support embedding, taken as
/// `‖q - s + eps‖`.
///
/// # Arguments
/// * `query` - A `(1, d)` embedding, broadcast against every support row.
/// * `support` - A `(k, d)` batch of embeddings.
///
/// # Returns
/// The `k` distances, or a shape error.
pub fn pairwise_distances(query: ArrayView2<f32>, support: ArrayView2<f32>) -> Result<Array1<f32>> {
    if query.nrows() != 1 {
        return Err(EvalErr::ShapeMismatch {
            what: "query embeddings",
            got: query.nrows(),
            expected: 1,
        });
    }

    if query.ncols() != support.ncols() {
        return Err(EvalErr::ShapeMismatch {
            what: "support embedding width",
            got: support.ncols(),
            expected: query.ncols(),
        });
    }

    let diff = &query - &support + PAIRWISE_EPS;
    Ok(diff.map_axis(Axis(1), |row| row.dot(&row).sqrt()))
}

/// Index of the first minimum, or `None` for an empty input.
pub fn argmin(values: ArrayView1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, min)) if v >= min => {}
            _ => best = Some((i, v)),
        }
    }

    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn distances_to_each_support() {
        let query = array![[0., 0.]];
        let support = array![[3., 4.], [0., 0.], [1., 0.]];

        let d = pairwise_distances(query.view(), support.view()).unwrap();
        assert!((d[0] - 5.).abs() < 1e-4);
        assert!(d[1] < 1e-4);
        assert!((d[2] - 1.).abs() < 1e-4);
    }

    #[test]
    fn offset_is_added_to_query_minus_support() {
        let query = array![[0.]];
        let support = array![[2e-6], [-1e-6]];

        let d = pairwise_distances(query.view(), support.view()).unwrap();
        assert!((d[0] - 1e-6).abs() < 1e-9);
        assert!((d[1] - 2e-6).abs() < 1e-9);
        assert_eq!(argmin(d.view()), Some(0));
    }

    #[test]
    fn query_must_be_a_single_row() {
        let query = array![[0., 0.], [1., 1.]];
        let support = array![[3., 4.]];

        let err = pairwise_distances(query.view(), support.view()).unwrap_err();
        assert!(matches!(err, EvalErr::ShapeMismatch { got: 2, expected: 1, .. }));
    }

    #[test]
    fn argmin_breaks_ties_to_the_lowest_index() {
        assert_eq!(argmin(array![2., 1., 1., 3.].view()), Some(1));
        assert_eq!(argmin(array![0., 0.].view()), Some(0));
        assert_eq!(argmin(ArrayView1::from(&[] as &[f32])), None);
    }
}
