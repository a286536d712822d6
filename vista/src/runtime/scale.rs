//! Scales map data values onto screen positions.

use serde_json::Value as JsonValue;

use super::program::{Extent, ScaleDef, ScaleKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Scale {
    Linear {
        domain: (f64, f64),
        range: (f64, f64),
    },
    Band {
        keys: Vec<String>,
        start: f64,
        step: f64,
        bandwidth: f64,
    },
}

impl Scale {
    /// Fit a scale to the values of its domain field in the given rows,
    /// mapping onto a drawing area of the given size.
    pub fn fit(def: &ScaleDef, rows: &[JsonValue], width: f64, height: f64) -> Self {
        let values = rows.iter().filter_map(|row| row.get(&def.domain.field));
        match def.kind {
            ScaleKind::Linear => {
                let range = match def.range {
                    Extent::Width => (0.0, width),
                    // Screen y grows downwards.
                    Extent::Height => (height, 0.0),
                };
                Self::Linear {
                    domain: linear_domain(values.filter_map(JsonValue::as_f64), def.zero),
                    range,
                }
            }
            ScaleKind::Band => {
                let span = match def.range {
                    Extent::Width => width,
                    Extent::Height => height,
                };
                let mut keys: Vec<String> = Vec::new();
                for key in values.map(band_key) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                let padding = def.padding.clamp(0.0, 1.0);
                let step = span / (keys.len() as f64 + padding).max(1.0);
                Self::Band {
                    keys,
                    start: step * padding,
                    step,
                    bandwidth: step * (1.0 - padding),
                }
            }
        }
    }

    /// Map a data value to a position. Values outside a band scale's
    /// domain and non-numeric values of a linear scale have no position.
    pub fn apply(&self, value: &JsonValue) -> Option<f64> {
        match self {
            Self::Linear { domain, range } => {
                let v = value.as_f64()?;
                Some(range.0 + (v - domain.0) / (domain.1 - domain.0) * (range.1 - range.0))
            }
            Self::Band {
                keys, start, step, ..
            } => {
                let key = band_key(value);
                let idx = keys.iter().position(|k| k == &key)?;
                Some(start + idx as f64 * step)
            }
        }
    }

    pub fn bandwidth(&self) -> f64 {
        match self {
            Self::Linear { .. } => 0.0,
            Self::Band { bandwidth, .. } => *bandwidth,
        }
    }
}

fn linear_domain(values: impl Iterator<Item = f64>, zero: bool) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo > hi {
        return (0.0, 1.0);
    }
    if zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    if lo == hi {
        hi = lo + 1.0;
    }
    (lo, hi)
}

fn band_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
