use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Regression windows applied to a static trajectory. The first window is
/// the static (identity) window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Windows {
    windows: Vec<Window>,
}

impl Windows {
    pub fn new(windows: Vec<Window>) -> Self {
        Self { windows }
    }

    /// Static and 3-tap delta window, `[1]` and `[-0.5, 0, 0.5]`.
    pub fn static_delta() -> Self {
        Self::new(vec![Window::new(vec![1.0]), Window::delta()])
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &Window> {
        self.windows.iter()
    }
    pub fn size(&self) -> usize {
        self.windows.len()
    }
    pub fn max_width(&self) -> usize {
        self.windows.iter().map(Window::width).max().unwrap_or(0) / 2
    }
}

impl Default for Windows {
    fn default() -> Self {
        Self::static_delta()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    coefficients: Box<[f64]>,
}

impl Window {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self {
            coefficients: coefficients.into(),
        }
    }

    pub fn delta() -> Self {
        Self::new(vec![-0.5, 0.0, 0.5])
    }

    /// Iterate over `(relative frame offset, coefficient)` pairs.
    pub fn iter(&self) -> impl '_ + Iterator<Item = (isize, f64)> {
        let left = self.left_width() as isize;
        self.coefficients
            .iter()
            .enumerate()
            .map(move |(idx, coef)| (idx as isize - left, *coef))
    }

    /// Non-zero taps that land inside `0..length` when centered on frame `t`,
    /// as `(frame, coefficient)`.
    pub fn taps(&self, t: usize, length: usize) -> impl '_ + Iterator<Item = (usize, f64)> {
        self.iter().filter_map(move |(offset, coef)| {
            let frame = t as isize + offset;
            if coef == 0.0 || frame < 0 || frame >= length as isize {
                None
            } else {
                Some((frame as usize, coef))
            }
        })
    }

    /// Apply the window along the time axis. Taps falling outside the
    /// sequence are dropped, so the boundary frames use a one-sided window.
    pub fn apply(&self, data: ArrayView2<f64>) -> Array2<f64> {
        let (length, dim) = data.dim();
        let mut out = Array2::zeros((length, dim));
        for t in 0..length {
            for (frame, coef) in self.taps(t, length) {
                out.row_mut(t).scaled_add(coef, &data.row(frame));
            }
        }
        out
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.coefficients.len()
    }
    #[inline]
    pub fn left_width(&self) -> usize {
        self.width() / 2
    }
    #[inline]
    pub fn right_width(&self) -> usize {
        self.width() - self.left_width() - 1
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::{Window, Windows};

    #[test]
    fn width_1() {
        let window = Window::new(vec![1.0]);
        assert_eq!(window.width(), 1);
        assert_eq!(window.left_width(), 0);
        assert_eq!(window.right_width(), 0);
    }

    #[test]
    fn width_3() {
        let window = Window::delta();
        assert_eq!(window.width(), 3);
        assert_eq!(window.left_width(), 1);
        assert_eq!(window.right_width(), 1);
    }

    #[test]
    fn iterator() {
        let window = Window::delta();
        let iterated = window.iter().collect::<Vec<_>>();
        assert_eq!(iterated, vec![(-1, -0.5), (0, 0.0), (1, 0.5)]);
    }

    #[test]
    fn taps_at_boundary() {
        let window = Window::delta();
        assert_eq!(window.taps(0, 4).collect::<Vec<_>>(), vec![(1, 0.5)]);
        assert_eq!(window.taps(3, 4).collect::<Vec<_>>(), vec![(2, -0.5)]);
        assert_eq!(
            window.taps(1, 4).collect::<Vec<_>>(),
            vec![(0, -0.5), (2, 0.5)]
        );
    }

    #[test]
    fn max_width() {
        assert_eq!(Windows::static_delta().max_width(), 1);
        assert_eq!(Windows::static_delta().size(), 2);
    }

    #[test]
    fn apply() {
        let data = array![[1.0], [2.0], [4.0]];
        let applied = Window::delta().apply(data.view());
        assert_eq!(applied, array![[1.0], [1.5], [-1.0]]);
    }
}
