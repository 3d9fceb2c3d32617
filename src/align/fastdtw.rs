//! Windowed multi-resolution DTW.
//!
//! The path found on half-resolution sequences is projected back to full
//! resolution and widened by `radius`; only that band is searched. This
//! runs in linear time but may miss the exact optimum.
//!
//! For details, please refer to <https://doi.org/10.3233/IDA-2007-11508>.

use ndarray::{Array2, ArrayView2};

use crate::feature::Distance;

use super::{
    dtw::{SearchWindow, dtw_in_window},
    twf::TimeWarpFunction,
};

pub(crate) fn fastdtw(
    source: ArrayView2<f64>,
    target: ArrayView2<f64>,
    distance: Distance,
    radius: usize,
) -> (TimeWarpFunction, f64) {
    let min_size = radius + 2;
    if source.nrows() < min_size || target.nrows() < min_size {
        let window = SearchWindow::full(source.nrows(), target.nrows());
        return dtw_in_window(source, target, distance, &window);
    }

    let source_shrunk = reduce_by_half(source);
    let target_shrunk = reduce_by_half(target);
    let (coarse, _) = fastdtw(
        source_shrunk.view(),
        target_shrunk.view(),
        distance,
        radius,
    );

    let window = expand_window(&coarse, source.nrows(), target.nrows(), radius);
    dtw_in_window(source, target, distance, &window)
}

/// Average neighbouring frame pairs. A trailing odd frame is dropped.
fn reduce_by_half(data: ArrayView2<f64>) -> Array2<f64> {
    let half = data.nrows() / 2;
    Array2::from_shape_fn((half, data.ncols()), |(t, d)| {
        0.5 * (data[[2 * t, d]] + data[[2 * t + 1, d]])
    })
}

fn expand_window(
    coarse: &TimeWarpFunction,
    rows: usize,
    columns: usize,
    radius: usize,
) -> SearchWindow {
    let radius = radius as isize;
    let cells = coarse.pairs().iter().flat_map(move |&(i, j)| {
        (-radius..=radius).flat_map(move |a| {
            (-radius..=radius).flat_map(move |b| {
                let (i, j) = (i as isize + a, j as isize + b);
                [(0, 0), (0, 1), (1, 0), (1, 1)]
                    .into_iter()
                    .filter_map(move |(di, dj)| {
                        let (x, y) = (2 * i + di, 2 * j + dj);
                        (x >= 0 && y >= 0).then_some((x as usize, y as usize))
                    })
            })
        })
    });
    SearchWindow::from_cells(rows, columns, cells)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use crate::{align::dtw::SearchWindow, feature::Distance};

    use super::{dtw_in_window, fastdtw, reduce_by_half};

    #[test]
    fn reduce() {
        let data = array![[0.0], [2.0], [4.0], [6.0], [8.0]];
        assert_eq!(reduce_by_half(data.view()), array![[1.0], [5.0]]);
    }

    #[test]
    fn close_to_exact() {
        let source = Array2::from_shape_fn((60, 2), |(t, d)| ((t as f64) * 0.21 + d as f64).sin());
        let target =
            Array2::from_shape_fn((75, 2), |(t, d)| ((t as f64) * 0.168 + d as f64).sin());

        let (fast, fast_cost) = fastdtw(source.view(), target.view(), Distance::MelCepstral, 2);
        let window = SearchWindow::full(60, 75);
        let (_, exact_cost) =
            dtw_in_window(source.view(), target.view(), Distance::MelCepstral, &window);

        assert!(fast.is_monotonic());
        assert_eq!(fast.pairs()[0], (0, 0));
        assert_eq!(*fast.pairs().last().unwrap(), (59, 74));
        assert!(fast_cost >= exact_cost - 1e-9);
    }
}
