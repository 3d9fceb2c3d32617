//! Dynamic programming over a (possibly restricted) search window.

use ndarray::ArrayView2;

use crate::feature::Distance;

use super::twf::TimeWarpFunction;

/// Column range `[lo, hi]` (inclusive) that may be visited in each source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchWindow {
    ranges: Vec<(usize, usize)>,
    columns: usize,
}

impl SearchWindow {
    /// Every cell of a `rows x columns` grid.
    pub fn full(rows: usize, columns: usize) -> Self {
        Self {
            ranges: vec![(0, columns - 1); rows],
            columns,
        }
    }

    /// Window covering `cells`, completed so that a monotonic path from
    /// `(0, 0)` to `(rows - 1, columns - 1)` always exists.
    pub fn from_cells(
        rows: usize,
        columns: usize,
        cells: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        let mut ranges: Vec<Option<(usize, usize)>> = vec![None; rows];
        for (i, j) in cells {
            if i >= rows {
                continue;
            }
            let j = j.min(columns - 1);
            ranges[i] = Some(match ranges[i] {
                Some((lo, hi)) => (lo.min(j), hi.max(j)),
                None => (j, j),
            });
        }

        let mut filled = Vec::with_capacity(rows);
        let mut previous = (0, 0);
        for range in ranges {
            let range = range.unwrap_or(previous);
            filled.push(range);
            previous = range;
        }
        filled[0].0 = 0;
        filled[rows - 1].1 = columns - 1;
        for i in 1..rows {
            let (prev_lo, prev_hi) = filled[i - 1];
            let (lo, hi) = &mut filled[i];
            *lo = (*lo).min(prev_hi + 1).max(prev_lo);
            *hi = (*hi).max(prev_lo).max(*lo);
        }

        Self {
            ranges: filled,
            columns,
        }
    }

    pub fn rows(&self) -> usize {
        self.ranges.len()
    }
    pub fn columns(&self) -> usize {
        self.columns
    }
    pub fn range(&self, row: usize) -> (usize, usize) {
        self.ranges[row]
    }
    #[inline]
    fn contains(&self, row: usize, column: usize) -> bool {
        let (lo, hi) = self.ranges[row];
        lo <= column && column <= hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Diagonal,
    Vertical,
    Horizontal,
}

/// Minimum-cost monotonic path through `window`. Returns the path and the
/// sum of local distances along it.
pub(crate) fn dtw_in_window(
    source: ArrayView2<f64>,
    target: ArrayView2<f64>,
    distance: Distance,
    window: &SearchWindow,
) -> (TimeWarpFunction, f64) {
    let rows = window.rows();
    let mut cost: Vec<Vec<f64>> = Vec::with_capacity(rows);
    let mut steps: Vec<Vec<Step>> = Vec::with_capacity(rows);

    for i in 0..rows {
        let (lo, hi) = window.range(i);
        let mut row_cost = vec![f64::INFINITY; hi - lo + 1];
        let mut row_steps = vec![Step::Start; hi - lo + 1];

        for j in lo..=hi {
            let local = distance.between(source.row(i), target.row(j));
            let at = |i: usize, j: usize, cost: &[Vec<f64>]| {
                if window.contains(i, j) {
                    cost[i][j - window.range(i).0]
                } else {
                    f64::INFINITY
                }
            };

            let (best, step) = if i == 0 && j == 0 {
                (0.0, Step::Start)
            } else {
                // preference order on ties: diagonal, vertical, horizontal
                let diagonal = if i > 0 && j > 0 {
                    at(i - 1, j - 1, &cost)
                } else {
                    f64::INFINITY
                };
                let vertical = if i > 0 {
                    at(i - 1, j, &cost)
                } else {
                    f64::INFINITY
                };
                let horizontal = if j > lo {
                    row_cost[j - 1 - lo]
                } else {
                    f64::INFINITY
                };

                let mut best = (diagonal, Step::Diagonal);
                if vertical < best.0 {
                    best = (vertical, Step::Vertical);
                }
                if horizontal < best.0 {
                    best = (horizontal, Step::Horizontal);
                }
                best
            };

            row_cost[j - lo] = best + local;
            row_steps[j - lo] = step;
        }

        cost.push(row_cost);
        steps.push(row_steps);
    }

    let (mut i, mut j) = (rows - 1, window.columns() - 1);
    let total = cost[i][j - window.range(i).0];
    let mut pairs = vec![(i, j)];
    loop {
        match steps[i][j - window.range(i).0] {
            Step::Start => break,
            Step::Diagonal => {
                i -= 1;
                j -= 1;
            }
            Step::Vertical => i -= 1,
            Step::Horizontal => j -= 1,
        }
        pairs.push((i, j));
    }
    pairs.reverse();

    (TimeWarpFunction::new(pairs), total)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::feature::Distance;

    use super::{SearchWindow, dtw_in_window};

    #[test]
    fn full_window() {
        let window = SearchWindow::full(3, 4);
        assert_eq!(window.range(1), (0, 3));
    }

    #[test]
    fn completed_window() {
        let window = SearchWindow::from_cells(4, 4, [(1, 1), (2, 2)]);
        assert_eq!(window.range(0), (0, 0));
        assert_eq!(window.range(1), (1, 1));
        assert_eq!(window.range(2), (2, 2));
        assert_eq!(window.range(3), (2, 3));
    }

    #[test]
    fn repeated_frame() {
        let source = array![[0.0], [1.0], [2.0]];
        let target = array![[0.0], [1.0], [1.0], [2.0]];
        let window = SearchWindow::full(3, 4);
        let (twf, total) =
            dtw_in_window(source.view(), target.view(), Distance::Euclidean, &window);
        assert_eq!(twf.pairs(), &[(0, 0), (1, 1), (1, 2), (2, 3)]);
        assert_eq!(total, 0.0);
    }
}
