use serde::{Deserialize, Serialize};

/// Column-wise min-max normalizer onto `[0, 1]`.
///
/// Fit once on the training partition and then only applied. A column whose
/// training values are all equal keeps a unit range, so it maps to `x - min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
}

impl MinMaxScaler {
    /// Returns `None` when `rows` is empty.
    pub fn fit<'a, I>(width: usize, rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut data_min = vec![f64::INFINITY; width];
        let mut data_max = vec![f64::NEG_INFINITY; width];
        let mut seen = 0usize;
        for row in rows {
            debug_assert_eq!(row.len(), width);
            for (col, value) in row.iter().enumerate() {
                data_min[col] = data_min[col].min(*value);
                data_max[col] = data_max[col].max(*value);
            }
            seen += 1;
        }
        (seen > 0).then_some(Self { data_min, data_max })
    }

    pub fn data_min(&self) -> &[f64] {
        &self.data_min
    }

    pub fn data_max(&self) -> &[f64] {
        &self.data_max
    }

    fn range(&self, col: usize) -> f64 {
        let range = self.data_max[col] - self.data_min[col];
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform_value(&self, col: usize, value: f64) -> f64 {
        (value - self.data_min[col]) / self.range(col)
    }

    pub fn inverse_value(&self, col: usize, value: f64) -> f64 {
        value * self.range(col) + self.data_min[col]
    }

    pub fn transform_in_place(&self, row: &mut [f64]) {
        for (col, value) in row.iter_mut().enumerate() {
            *value = self.transform_value(col, *value);
        }
    }

    pub fn inverse_in_place(&self, row: &mut [f64]) {
        for (col, value) in row.iter_mut().enumerate() {
            *value = self.inverse_value(col, *value);
        }
    }
}
