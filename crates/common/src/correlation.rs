//! Pearson correlation across the numeric ledger columns.

use serde::Serialize;

use crate::types::{NumericField, TransactionRecord};

/// Below this many qualifying records a pair is reported as uncorrelated.
pub const MIN_QUALIFYING_RECORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationCell {
    pub field_a: NumericField,
    pub field_b: NumericField,
    pub coefficient: f64,
}

/// Square, symmetric matrix stored row-major over `fields`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub fields: Vec<NumericField>,
    pub cells: Vec<CorrelationCell>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: NumericField, b: NumericField) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == a)?;
        let j = self.fields.iter().position(|f| *f == b)?;
        self.cells
            .get(i * self.fields.len() + j)
            .map(|c| c.coefficient)
    }

    pub fn row(&self, a: NumericField) -> Option<&[CorrelationCell]> {
        let n = self.fields.len();
        let i = self.fields.iter().position(|f| *f == a)?;
        self.cells.get(i * n..(i + 1) * n)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0].total_cmp(&w[1]).is_eq())
}

/// Coefficient for one pair over records where both fields are present.
pub fn pair_coefficient(records: &[TransactionRecord], a: NumericField, b: NumericField) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = records
        .iter()
        .filter_map(|r| Some((r.numeric(a)?, r.numeric(b)?)))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .unzip();

    if xs.len() < MIN_QUALIFYING_RECORDS {
        return 0.0;
    }

    let const_x = is_constant(&xs);
    let const_y = is_constant(&ys);
    if const_x || const_y {
        return if const_x && const_y { 1.0 } else { 0.0 };
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut ss_x = 0.0;
    let mut ss_y = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        num += dx * dy;
        ss_x += dx * dx;
        ss_y += dy * dy;
    }

    let denom = ss_x.sqrt() * ss_y.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    let r = num / denom;
    if r.is_nan() {
        return 0.0;
    }
    round2(r).clamp(-1.0, 1.0)
}

/// Full matrix over `fields`; the upper triangle is computed and mirrored.
pub fn correlation_matrix(
    records: &[TransactionRecord],
    fields: &[NumericField],
) -> CorrelationMatrix {
    let n = fields.len();
    let mut coeffs = vec![0.0; n * n];
    for i in 0..n {
        for j in i..n {
            let c = pair_coefficient(records, fields[i], fields[j]);
            coeffs[i * n + j] = c;
            coeffs[j * n + i] = c;
        }
    }

    let cells = coeffs
        .into_iter()
        .enumerate()
        .map(|(k, coefficient)| CorrelationCell {
            field_a: fields[k / n],
            field_b: fields[k % n],
            coefficient,
        })
        .collect();

    CorrelationMatrix {
        fields: fields.to_vec(),
        cells,
    }
}
