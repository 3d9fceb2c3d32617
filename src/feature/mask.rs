use ndarray::{Array2, ArrayView2, Axis};

/// Per-frame selection flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Vec<bool>);

impl FromIterator<bool> for Mask {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Mask {
    pub fn new(mask: Vec<bool>) -> Self {
        Self(mask)
    }
    /// Frames whose value is strictly greater than `threshold`.
    pub fn above(values: &[f64], threshold: f64) -> Self {
        values.iter().map(|v| *v > threshold).collect()
    }
    /// Voiced frames of an F0 sequence (`f0 > 0`).
    pub fn voiced(f0: &[f64]) -> Self {
        Self::above(f0, 0.0)
    }

    pub fn mask(&self) -> &[bool] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn count(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }
    /// Indices of the selected frames.
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, m)| if *m { Some(i) } else { None })
            .collect()
    }

    /// Keep the rows of `data` whose flag is set.
    pub fn select_rows(&self, data: ArrayView2<f64>) -> Array2<f64> {
        data.select(Axis(0), &self.indices())
    }

    /// Keep the values whose flag is set.
    pub fn filter<'a, T: 'a + Copy>(
        &'a self,
        values: impl 'a + IntoIterator<Item = &'a T>,
    ) -> impl 'a + Iterator<Item = T> {
        values
            .into_iter()
            .zip(&self.0)
            .filter_map(|(value, mask)| if *mask { Some(*value) } else { None })
    }

    /// Spread `masked` back over the selected positions, using `default`
    /// for the others.
    pub fn fill<'a, T: 'a + Clone>(
        &'a self,
        masked: impl 'a + IntoIterator<Item = T>,
        default: T,
    ) -> impl 'a + Iterator<Item = T> {
        let mut iter = masked.into_iter();
        self.0.iter().map(move |&mask| {
            if mask {
                iter.next().unwrap_or_else(|| default.clone())
            } else {
                default.clone()
            }
        })
    }
}
