//! # Maximum-likelihood (M-estimator) models
//!
//! Robust reweighting down-weights measures whose normalised residual `z` is large compared to a
//! *tweaking constant* `c`. The constant is not given directly: each cascade entry carries a
//! quantile `q ∈ (0, 1)` and `c` is the `q`-quantile of the residual distribution observed on the
//! previous iteration.
//!
//! | Model           | weight `w(z)` for `|z| ≤ c`  | weight for `|z| > c`             |
//! |-----------------|------------------------------|----------------------------------|
//! | `None`          | 1                            | 1                                |
//! | `Huber`         | 1                            | `c / |z|`                        |
//! | `ModifiedHuber` | `sin(z/c) / (z/c)`           | same until `π/2`, then `c / |z|` |
//! | `Welsch`        | `exp(-(z/c)²)`               | `exp(-(z/c)²)`                   |
//! | `Chen`          | `(1 - (z/c)²)²`              | tail weight (tunable, default 0) |
//!
//! Welsch and Chen are redescending and need a reasonable starting solution, which is why they
//! may not open a cascade.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::jigsaw_errors::JigsawError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaximumLikelihoodModel {
    None,
    Huber,
    ModifiedHuber,
    Welsch,
    Chen,
}

impl MaximumLikelihoodModel {
    /// True for the models that may not be the first entry of a cascade.
    pub fn is_redescending(&self) -> bool {
        matches!(self, Self::Welsch | Self::Chen)
    }

    /// Weight multiplier for a normalised residual.
    ///
    /// Arguments
    /// -----------------
    /// * `z`: normalised residual `√(dx² + dy²) / σ / √2`.
    /// * `c`: tweaking constant of the active tier. A non-positive constant disables reweighting.
    /// * `chen_tail_weight`: weight given by the Chen model beyond `c`.
    pub fn weight(&self, z: f64, c: f64, chen_tail_weight: f64) -> f64 {
        if !(c > 0.0) || !z.is_finite() {
            return 1.0;
        }
        let a = z.abs() / c;
        match self {
            Self::None => 1.0,
            Self::Huber => {
                if a <= 1.0 {
                    1.0
                } else {
                    1.0 / a
                }
            }
            Self::ModifiedHuber => {
                if a == 0.0 {
                    1.0
                } else if a < std::f64::consts::FRAC_PI_2 {
                    a.sin() / a
                } else {
                    1.0 / a
                }
            }
            Self::Welsch => (-(a * a)).exp(),
            Self::Chen => {
                if a <= 1.0 {
                    let t = 1.0 - a * a;
                    t * t
                } else {
                    chen_tail_weight
                }
            }
        }
    }
}

impl FromStr for MaximumLikelihoodModel {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "huber" => Ok(Self::Huber),
            "modifiedhuber" | "huber_modified" | "modified_huber" => Ok(Self::ModifiedHuber),
            "welsch" => Ok(Self::Welsch),
            "chen" => Ok(Self::Chen),
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown maximum likelihood model '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MaximumLikelihoodModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Huber => "Huber",
            Self::ModifiedHuber => "ModifiedHuber",
            Self::Welsch => "Welsch",
            Self::Chen => "Chen",
        };
        f.write_str(name)
    }
}

/// One tier of the cascade: a model and the quantile defining its tweaking constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaximumLikelihoodEntry {
    pub model: MaximumLikelihoodModel,
    pub quantile: f64,
}

impl MaximumLikelihoodEntry {
    pub fn new(model: MaximumLikelihoodModel, quantile: f64) -> Self {
        Self { model, quantile }
    }
}

/// Parse a cascade written as `Model:quantile` pairs separated by commas,
/// e.g. `Huber:0.5,Welsch:0.9`.
pub fn parse_cascade(value: &str) -> Result<Vec<MaximumLikelihoodEntry>, JigsawError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let (model, quantile) = item.split_once(':').ok_or_else(|| {
                JigsawError::InvalidSetting(format!(
                    "maximumLikelihoodCascade: expected Model:quantile, got '{item}'"
                ))
            })?;
            let quantile = quantile.trim().parse::<f64>().map_err(|_| {
                JigsawError::InvalidSetting(format!(
                    "maximumLikelihoodCascade: bad quantile in '{item}'"
                ))
            })?;
            Ok(MaximumLikelihoodEntry::new(model.parse()?, quantile))
        })
        .collect()
}
