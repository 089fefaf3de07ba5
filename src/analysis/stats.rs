//! Rank correlation and goodness-of-fit primitives.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Average ranks (1-based). Tied values share the mean of the positions
/// they occupy, matching the convention statistics packages use.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = shared;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation coefficient. `NaN` when either side has zero
/// variance or the slices are shorter than two elements.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        f64::NAN
    } else {
        cov / denom
    }
}

/// Spearman rank correlation: Pearson over average ranks. Required here
/// because sixteen regions are too few for reliable linear correlation and
/// demographic tables tie often.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Chi-square goodness-of-fit test. Returns `(statistic, p_value)`, or
/// `None` when the test is undefined: mismatched or too-short inputs, a
/// non-positive expected count, or a non-finite statistic. Callers render
/// `None` as "unavailable" rather than propagating NaN.
pub fn chi_square_gof(observed: &[f64], expected: &[f64]) -> Option<(f64, f64)> {
    if observed.len() != expected.len() || observed.len() < 2 {
        return None;
    }
    if expected.iter().any(|&e| e <= 0.0) {
        return None;
    }

    let statistic: f64 = observed
        .iter()
        .zip(expected)
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();
    if !statistic.is_finite() {
        return None;
    }

    let df = (observed.len() - 1) as f64;
    let dist = ChiSquared::new(df).ok()?;
    let p_value = 1.0 - dist.cdf(statistic);
    Some((statistic, p_value))
}
