use serde::{Deserialize, Serialize};

use crate::errors::{CalError, ErrorInfo};

/// Engineering stress/strain pair a [`TensileTest`] was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeringCurve {
    /// Engineering strain samples.
    pub strain: Vec<f64>,
    /// Engineering stress samples, same length as `strain`.
    pub stress: Vec<f64>,
}

/// Uniaxial tensile-test curve.
///
/// True strain and true stress are always populated. Curves built from
/// engineering measurements keep the original engineering samples as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensileTest {
    true_strain: Vec<f64>,
    true_stress: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    engineering: Option<EngineeringCurve>,
}

impl TensileTest {
    /// Builds a curve from true strain and true stress samples.
    pub fn from_true(true_strain: Vec<f64>, true_stress: Vec<f64>) -> Result<Self, CalError> {
        check_pair("true", &true_strain, &true_stress)?;
        Ok(Self {
            true_strain,
            true_stress,
            engineering: None,
        })
    }

    /// Builds a curve from engineering strain and stress samples.
    ///
    /// Uses the constant-volume relations `ε_t = ln(1 + ε_e)` and
    /// `σ_t = σ_e (1 + ε_e)`.
    pub fn from_engineering(eng_strain: Vec<f64>, eng_stress: Vec<f64>) -> Result<Self, CalError> {
        check_pair("engineering", &eng_strain, &eng_stress)?;
        let true_strain: Vec<f64> = eng_strain.iter().map(|e| e.ln_1p()).collect();
        let true_stress: Vec<f64> = eng_strain
            .iter()
            .zip(&eng_stress)
            .map(|(e, s)| s * (1.0 + e))
            .collect();
        // Strains at or below -1 have no true measure.
        check_finite("true strain", &true_strain)?;
        check_finite("true stress", &true_stress)?;
        Ok(Self {
            true_strain,
            true_stress,
            engineering: Some(EngineeringCurve {
                strain: eng_strain,
                stress: eng_stress,
            }),
        })
    }

    /// True strain samples.
    pub fn true_strain(&self) -> &[f64] {
        &self.true_strain
    }

    /// True stress samples.
    pub fn true_stress(&self) -> &[f64] {
        &self.true_stress
    }

    /// Engineering samples, when the curve was built from them.
    pub fn engineering(&self) -> Option<&EngineeringCurve> {
        self.engineering.as_ref()
    }

    /// Number of samples on the curve.
    pub fn len(&self) -> usize {
        self.true_strain.len()
    }

    /// Always false for a constructed curve; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.true_strain.is_empty()
    }

    /// Smallest and largest true strain on the curve.
    pub fn strain_range(&self) -> (f64, f64) {
        self.true_strain
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &e| {
                (lo.min(e), hi.max(e))
            })
    }

    /// Linearly interpolated true stress at `strain`.
    ///
    /// Samples are taken in strain order. Outside the sampled range the
    /// nearest end value is returned.
    pub fn true_stress_at(&self, strain: f64) -> f64 {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.true_strain[a].total_cmp(&self.true_strain[b]));

        let first = order[0];
        let last = order[order.len() - 1];
        if strain <= self.true_strain[first] {
            return self.true_stress[first];
        }
        if strain >= self.true_strain[last] {
            return self.true_stress[last];
        }
        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (x0, x1) = (self.true_strain[a], self.true_strain[b]);
            if strain >= x0 && strain <= x1 {
                if x1 == x0 {
                    return self.true_stress[b];
                }
                let t = (strain - x0) / (x1 - x0);
                return self.true_stress[a] + t * (self.true_stress[b] - self.true_stress[a]);
            }
        }
        self.true_stress[last]
    }
}

fn check_pair(kind: &str, strain: &[f64], stress: &[f64]) -> Result<(), CalError> {
    if strain.is_empty() {
        return Err(CalError::Fitter(ErrorInfo::new(
            "lmcal_core.curve_empty",
            format!("{kind} tensile test has no samples"),
        )));
    }
    if strain.len() != stress.len() {
        return Err(CalError::Fitter(
            ErrorInfo::new(
                "lmcal_core.curve_length",
                format!("{kind} strain and stress lengths differ"),
            )
            .with_context("strain", strain.len().to_string())
            .with_context("stress", stress.len().to_string()),
        ));
    }
    check_finite(&format!("{kind} strain"), strain)?;
    check_finite(&format!("{kind} stress"), stress)
}

fn check_finite(series: &str, values: &[f64]) -> Result<(), CalError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(CalError::Fitter(
            ErrorInfo::new(
                "lmcal_core.curve_non_finite",
                format!("{series} holds a non-finite sample"),
            )
            .with_context("index", index.to_string())
            .with_context("value", values[index].to_string()),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engineering_curve_converts_to_true_measures() {
        let curve = TensileTest::from_engineering(vec![0.0, 0.1], vec![0.0, 450.0e6]).unwrap();
        assert_eq!(curve.true_strain()[0], 0.0);
        assert!((curve.true_strain()[1] - 1.1f64.ln()).abs() < 1e-12);
        assert!((curve.true_stress()[1] - 495.0e6).abs() < 1e-3);
        assert_eq!(curve.engineering().unwrap().stress[1], 450.0e6);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = TensileTest::from_true(vec![0.0, 0.1], vec![1.0]).unwrap_err();
        assert_eq!(err.info().code, "lmcal_core.curve_length");
        assert!(TensileTest::from_true(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let err = TensileTest::from_true(vec![0.0, 0.01], vec![0.0, f64::NAN]).unwrap_err();
        assert_eq!(err.info().code, "lmcal_core.curve_non_finite");
        assert_eq!(err.info().context["index"], "1");
        assert_eq!(err.info().context["value"], "NaN");

        let err = TensileTest::from_engineering(vec![0.0, -1.0], vec![0.0, 1.0]).unwrap_err();
        assert_eq!(err.info().code, "lmcal_core.curve_non_finite");
        assert!(TensileTest::from_true(vec![f64::INFINITY], vec![1.0]).is_err());
    }

    #[test]
    fn interpolation_clamps_outside_range() {
        let curve = TensileTest::from_true(vec![0.2, 0.0, 0.1], vec![30.0, 10.0, 20.0]).unwrap();
        assert_eq!(curve.true_stress_at(-1.0), 10.0);
        assert_eq!(curve.true_stress_at(0.05), 15.0);
        assert_eq!(curve.true_stress_at(0.15), 25.0);
        assert_eq!(curve.true_stress_at(5.0), 30.0);
        assert_eq!(curve.strain_range(), (0.0, 0.2));
    }
}
