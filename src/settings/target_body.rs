//! Target body solve settings.
//!
//! The body orientation follows the usual pole model
//!
//! * right ascension `α(T) = α₀ + α̇·T` and declination `δ(T) = δ₀ + δ̇·T`, `T` in Julian
//!   centuries past J2000,
//! * prime meridian `W(d) = W₀ + Ẇ·d + Ẅ·d²`, `d` in days past J2000,
//!
//! and its shape is either a triaxial ellipsoid `(a, b, c)` or a sphere of mean radius `R`.
//! Any subset of these may be solved, each with an optional a priori value and sigma read from a
//! `TBPARAMETERS` keyword file.
use std::{fmt, str::FromStr};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    constants::RADEG,
    jigsaw_errors::JigsawError,
    settings::options::{parse_f64, parse_keyword_file, parse_sigma, KeywordMap},
};

/// Which terms of a pole/prime-meridian polynomial are solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSolveOption {
    None,
    Position,
    Velocity,
    Acceleration,
}

impl TargetSolveOption {
    fn terms(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Position => 1,
            Self::Velocity => 2,
            Self::Acceleration => 3,
        }
    }
}

impl FromStr for TargetSolveOption {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "position" | "angles" => Ok(Self::Position),
            "velocity" => Ok(Self::Velocity),
            "acceleration" => Ok(Self::Acceleration),
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown target body solve option '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiiSolveOption {
    None,
    Triaxial,
    Mean,
}

impl FromStr for RadiiSolveOption {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "triaxial" | "all" => Ok(Self::Triaxial),
            "mean" => Ok(Self::Mean),
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown radii solve option '{other}'"
            ))),
        }
    }
}

/// A solvable target body parameter, in normal-equation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetParameterKind {
    PoleRa,
    PoleRaVelocity,
    PoleDec,
    PoleDecVelocity,
    PrimeMeridian,
    PrimeMeridianVelocity,
    PrimeMeridianAcceleration,
    TriaxialRadiusA,
    TriaxialRadiusB,
    TriaxialRadiusC,
    MeanRadius,
}

impl TargetParameterKind {
    /// Keyword stem used in `TBPARAMETERS` (`<stem>Value`, `<stem>Sigma`).
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::PoleRa => "Ra",
            Self::PoleRaVelocity => "RaVelocity",
            Self::PoleDec => "Dec",
            Self::PoleDecVelocity => "DecVelocity",
            Self::PrimeMeridian => "Pm",
            Self::PrimeMeridianVelocity => "PmVelocity",
            Self::PrimeMeridianAcceleration => "PmAcceleration",
            Self::TriaxialRadiusA => "RadiusA",
            Self::TriaxialRadiusB => "RadiusB",
            Self::TriaxialRadiusC => "RadiusC",
            Self::MeanRadius => "MeanRadius",
        }
    }

    pub fn is_radius(&self) -> bool {
        matches!(
            self,
            Self::TriaxialRadiusA | Self::TriaxialRadiusB | Self::TriaxialRadiusC | Self::MeanRadius
        )
    }

    /// Conversion from keyword units (degrees, degrees per century/day, km) to internal units
    /// (radians, radians per century/day, meters).
    pub fn unit_scale(&self) -> f64 {
        if self.is_radius() {
            1000.0
        } else {
            RADEG
        }
    }
}

impl fmt::Display for TargetParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One solved target body parameter with its optional a priori value and sigma
/// (internal units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetParameter {
    pub kind: TargetParameterKind,
    pub apriori_value: Option<f64>,
    pub apriori_sigma: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetBodySettings {
    pub pole_ra: TargetSolveOption,
    pub pole_dec: TargetSolveOption,
    pub prime_meridian: TargetSolveOption,
    pub radii: RadiiSolveOption,
    pub parameters: Vec<TargetParameter>,
}

impl TargetBodySettings {
    /// Build the solved parameter list from the solve options and a keyword map.
    ///
    /// Arguments
    /// -----------------
    /// * `pole_ra`, `pole_dec`: at most `Velocity`.
    /// * `prime_meridian`: up to `Acceleration`.
    /// * `radii`: triaxial or mean radius solve.
    /// * `keywords`: `<stem>Value` / `<stem>Sigma` entries (lower-cased keys).
    ///
    /// Return
    /// ----------
    /// * The settings, or [`JigsawError::InvalidSetting`] when nothing is solved, an option is
    ///   out of range, or a sigma is not strictly positive.
    pub fn new(
        pole_ra: TargetSolveOption,
        pole_dec: TargetSolveOption,
        prime_meridian: TargetSolveOption,
        radii: RadiiSolveOption,
        keywords: &KeywordMap,
    ) -> Result<Self, JigsawError> {
        use TargetParameterKind::*;

        if pole_ra == TargetSolveOption::Acceleration || pole_dec == TargetSolveOption::Acceleration
        {
            return Err(JigsawError::InvalidSetting(
                "pole right ascension and declination can be solved up to velocity only".into(),
            ));
        }

        let mut kinds = Vec::new();
        kinds.extend([PoleRa, PoleRaVelocity].into_iter().take(pole_ra.terms()));
        kinds.extend([PoleDec, PoleDecVelocity].into_iter().take(pole_dec.terms()));
        kinds.extend(
            [PrimeMeridian, PrimeMeridianVelocity, PrimeMeridianAcceleration]
                .into_iter()
                .take(prime_meridian.terms()),
        );
        match radii {
            RadiiSolveOption::None => {}
            RadiiSolveOption::Triaxial => {
                kinds.extend([TriaxialRadiusA, TriaxialRadiusB, TriaxialRadiusC])
            }
            RadiiSolveOption::Mean => kinds.push(MeanRadius),
        }
        if kinds.is_empty() {
            return Err(JigsawError::InvalidSetting(
                "target body solve requested but no target parameter is selected".into(),
            ));
        }

        let parameters = kinds
            .into_iter()
            .map(|kind| {
                let value_key = format!("{}value", kind.keyword().to_ascii_lowercase());
                let sigma_key = format!("{}sigma", kind.keyword().to_ascii_lowercase());
                let apriori_value = keywords
                    .get(&value_key)
                    .map(|v| parse_f64(&value_key, v))
                    .transpose()?
                    .map(|v| v * kind.unit_scale());
                let apriori_sigma = match keywords.get(&sigma_key) {
                    Some(v) => parse_sigma(&sigma_key, v)?,
                    None => None,
                };
                if let Some(sigma) = apriori_sigma {
                    if !(sigma > 0.0) {
                        return Err(JigsawError::InvalidSetting(format!(
                            "{sigma_key} must be > 0"
                        )));
                    }
                }
                Ok(TargetParameter {
                    kind,
                    apriori_value,
                    apriori_sigma: apriori_sigma.map(|s| s * kind.unit_scale()),
                })
            })
            .collect::<Result<Vec<_>, JigsawError>>()?;

        Ok(Self {
            pole_ra,
            pole_dec,
            prime_meridian,
            radii,
            parameters,
        })
    }

    /// Read a `TBPARAMETERS` keyword file.
    ///
    /// Recognised keywords: `Ra`, `Dec`, `Pm` (none | position | velocity | acceleration),
    /// `RadiiSolveOption` (none | triaxial | mean), and `<stem>Value` / `<stem>Sigma` for each
    /// solved parameter (degrees, degrees per century for the pole rates, degrees per day for the
    /// prime meridian rates, kilometers for radii).
    pub fn from_keyword_file(path: &Utf8Path) -> Result<Self, JigsawError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_keywords(&parse_keyword_file(&content)?)
    }

    pub fn from_keywords(keywords: &KeywordMap) -> Result<Self, JigsawError> {
        let option = |key: &str| -> Result<TargetSolveOption, JigsawError> {
            keywords
                .get(key)
                .map(|v| v.parse())
                .unwrap_or(Ok(TargetSolveOption::None))
        };
        let radii = keywords
            .get("radiisolveoption")
            .map(|v| v.parse())
            .unwrap_or(Ok(RadiiSolveOption::None))?;
        Self::new(option("ra")?, option("dec")?, option("pm")?, radii, keywords)
    }

    pub fn solves_radii(&self) -> bool {
        self.radii != RadiiSolveOption::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::options::parse_keyword_file;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_keywords() {
        let content = "Group = SolveTargetBody\n\
                       Ra = velocity\n\
                       RaValue = 269.9949\n\
                       RaSigma = 0.0013\n\
                       Pm = position\n\
                       RadiiSolveOption = mean\n\
                       MeanRadiusValue = 1737.4\n\
                       MeanRadiusSigma = 0.5\n\
                       End_Group\n";
        let tb = TargetBodySettings::from_keywords(&parse_keyword_file(content).unwrap()).unwrap();
        let kinds: Vec<_> = tb.parameters.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TargetParameterKind::PoleRa,
                TargetParameterKind::PoleRaVelocity,
                TargetParameterKind::PrimeMeridian,
                TargetParameterKind::MeanRadius
            ]
        );
        assert_relative_eq!(tb.parameters[0].apriori_value.unwrap(), 269.9949 * RADEG);
        assert_relative_eq!(tb.parameters[3].apriori_value.unwrap(), 1_737_400.0);
        assert_relative_eq!(tb.parameters[3].apriori_sigma.unwrap(), 500.0);
        assert!(tb.parameters[1].apriori_sigma.is_none());
    }

    #[test]
    fn test_nothing_solved_is_rejected() {
        let err = TargetBodySettings::from_keywords(&KeywordMap::new()).unwrap_err();
        assert!(matches!(err, JigsawError::InvalidSetting(_)));
    }

    #[test]
    fn test_pole_acceleration_is_rejected() {
        let mut map = KeywordMap::new();
        map.insert("ra".into(), "acceleration".into());
        assert!(TargetBodySettings::from_keywords(&map).is_err());
    }
}
