//! Dynamic (delta) features.

use ndarray::{Array2, ArrayView2, s};

use super::window::Window;

/// First-order time derivative of a `[T, dim]` sequence using the 3-tap
/// window `[-0.5, 0, 0.5]`. The first frame becomes `0.5 * x[1]` and the
/// last frame `-0.5 * x[T - 2]`.
pub fn delta(data: ArrayView2<f64>) -> Array2<f64> {
    Window::delta().apply(data)
}

/// Concatenate the static sequence and its delta into `[T, 2 * dim]`.
pub fn static_delta(data: ArrayView2<f64>) -> Array2<f64> {
    let (length, dim) = data.dim();
    let mut out = Array2::zeros((length, dim * 2));
    out.slice_mut(s![.., ..dim]).assign(&data);
    out.slice_mut(s![.., dim..]).assign(&delta(data));
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::{delta, static_delta};

    #[test]
    fn delta_boundary() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [4.0, 40.0], [8.0, 80.0]];
        let d = delta(data.view());
        assert_eq!(d.row(0).to_vec(), vec![1.0, 10.0]);
        assert_eq!(d.row(1).to_vec(), vec![1.5, 15.0]);
        assert_eq!(d.row(2).to_vec(), vec![3.0, 30.0]);
        assert_eq!(d.row(3).to_vec(), vec![-2.0, -20.0]);
    }

    #[test]
    fn static_delta_doubles_dimension() {
        for (length, dim) in [(2, 1), (5, 3), (17, 24)] {
            let data = Array2::from_shape_fn((length, dim), |(t, d)| (t * dim + d) as f64);
            let sd = static_delta(data.view());
            assert_eq!(sd.dim(), (length, dim * 2));
            assert_eq!(sd.slice(ndarray::s![.., ..dim]), data);
        }
    }

    #[test]
    fn delta_of_linear_ramp() {
        let data = Array2::from_shape_fn((6, 1), |(t, _)| 3.0 * t as f64);
        let d = delta(data.view());
        for t in 1..5 {
            assert_abs_diff_eq!(d[[t, 0]], 3.0, epsilon = 1e-12);
        }
    }
}
