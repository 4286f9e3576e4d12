// ==============================================================================
// prs.rs - Polygenic Risk Scoring
// ==============================================================================
// Description: Effect-size summation over matched panel variants, normalized
//              scoring, risk categorization and percentile estimation
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// rawScore = sum of effect sizes over panel entries whose risk allele was
// observed. normalizedScore maps [-M, +M] onto [0, 1] around the population
// average of 0.5, where M is the panel's maximum possible magnitude. Risk
// category is a deterministic threshold; percentile is an explicitly
// approximate estimate through a reference population distribution.
// ==============================================================================

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{DiseaseRisk, PrsResult, RiskCategory, Variant};
use crate::panel::{RiskPanel, RiskPanelRegistry, SnpPanelEntry};

/// Scoring errors confined to a single disease panel
#[derive(Error, Debug)]
pub enum PrsError {
    #[error("Panel '{0}' has zero total effect magnitude")]
    DegeneratePanel(String),
}

/// Polygenic risk calculator over a loaded panel registry
pub struct PolygenicRiskCalculator<'a> {
    registry: &'a RiskPanelRegistry,
}

impl<'a> PolygenicRiskCalculator<'a> {
    pub fn new(registry: &'a RiskPanelRegistry) -> Self {
        Self { registry }
    }

    /// Score every registered disease against the matched-variant list
    ///
    /// Panels are independent of each other: a failure in one is reported as
    /// an `Errored` entry for that tag alone and never aborts the others.
    pub fn score_all(&self, matched: &[Variant]) -> Vec<DiseaseRisk> {
        self.registry
            .disease_tags()
            .map(|tag| {
                // Tags come from the registry's own key set
                let panel = match self.registry.panel_for(tag) {
                    Some(p) => p,
                    None => {
                        return DiseaseRisk::Errored {
                            disease: tag.to_string(),
                            message: "panel disappeared from registry".to_string(),
                        }
                    }
                };
                match self.score_panel(panel, matched) {
                    Ok(result) => DiseaseRisk::Scored(result),
                    Err(e) => {
                        warn!(disease = tag, error = %e, "disease scoring failed");
                        DiseaseRisk::Errored {
                            disease: tag.to_string(),
                            message: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    /// Population-average fallback for every disease
    ///
    /// Used when the input carries no variant calls at all (FASTQ reads), so
    /// every score is the population average and flagged as such.
    pub fn fallback_all(&self) -> Vec<DiseaseRisk> {
        self.registry
            .disease_tags()
            .filter_map(|tag| self.registry.panel_for(tag))
            .map(|panel| DiseaseRisk::Scored(fallback_result(panel)))
            .collect()
    }

    fn score_panel(
        &self,
        panel: &RiskPanel,
        matched: &[Variant],
    ) -> Result<PrsResult, PrsError> {
        let max_magnitude = panel.max_magnitude();
        if max_magnitude <= 0.0 {
            return Err(PrsError::DegeneratePanel(panel.disease.clone()));
        }

        let mut raw_score = 0.0;
        let mut matched_count = 0usize;

        for entry in &panel.entries {
            if let Some(variant) = find_match(entry, matched) {
                if carries_risk_allele(entry, variant) {
                    raw_score += entry.effect_size;
                    matched_count += 1;
                }
            }
        }

        if matched_count == 0 {
            debug!(disease = %panel.disease, "no panel variants matched, using population average");
            return Ok(fallback_result(panel));
        }

        let normalized_score =
            (0.5 + raw_score / (2.0 * max_magnitude)).clamp(0.0, 1.0);
        let risk_category = RiskCategory::from_score(normalized_score);
        let percentile = percentile_of(normalized_score, panel);

        debug!(
            disease = %panel.disease,
            raw_score,
            normalized_score,
            matched_count,
            "disease scored"
        );

        Ok(PrsResult {
            disease: panel.disease.clone(),
            raw_score,
            normalized_score,
            risk_category,
            percentile,
            matched_count,
            panel_size: panel.entries.len(),
            fallback: false,
        })
    }
}

fn fallback_result(panel: &RiskPanel) -> PrsResult {
    PrsResult {
        disease: panel.disease.clone(),
        raw_score: 0.0,
        normalized_score: 0.5,
        risk_category: RiskCategory::from_score(0.5),
        percentile: percentile_of(0.5, panel),
        matched_count: 0,
        panel_size: panel.entries.len(),
        fallback: true,
    }
}

/// Locate the uploaded variant corresponding to a panel entry
///
/// Primary path is rsID equality; the chromosome+position fallback applies
/// only to variants whose ID column was absent, so a populated-but-different
/// rsID at the same locus never counts as a hit.
fn find_match<'v>(entry: &SnpPanelEntry, matched: &'v [Variant]) -> Option<&'v Variant> {
    matched.iter().find(|v| match &v.id {
        Some(id) => id.eq_ignore_ascii_case(&entry.rsid),
        None => v.chromosome == entry.chromosome && v.position == entry.position,
    })
}

/// True when the variant's called alternate alleles include the risk allele
fn carries_risk_allele(entry: &SnpPanelEntry, variant: &Variant) -> bool {
    variant
        .alternate
        .iter()
        .any(|alt| alt.eq_ignore_ascii_case(&entry.risk_allele))
}

/// Percentile of a score under the panel's reference population distribution
fn percentile_of(score: f64, panel: &RiskPanel) -> u8 {
    let cdf = normal_cdf(score, panel.population_mean, panel.population_std);
    (cdf * 100.0).round().clamp(0.0, 100.0) as u8
}

fn normal_cdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / (std * std::f64::consts::SQRT_2);
    0.5 * (1.0 + erf(z))
}

/// Abramowitz & Stegun 7.1.26 rational approximation, |error| < 1.5e-7
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VariantType, Variant};
    use crate::panel::RiskPanelRegistry;

    fn variant(id: &str, chromosome: &str, position: u64, alt: &str) -> Variant {
        Variant {
            chromosome: chromosome.to_string(),
            position,
            id: if id.is_empty() {
                None
            } else {
                Some(id.to_string())
            },
            reference: "A".to_string(),
            alternate: vec![alt.to_string()],
            quality: Some(99.0),
            variant_type: VariantType::Snv,
        }
    }

    fn diabetes_full_match() -> Vec<Variant> {
        vec![
            variant("rs7903146", "10", 114758349, "T"),
            variant("rs12255372", "10", 114808902, "T"),
            variant("rs1801282", "3", 12393125, "G"),
            variant("rs5219", "11", 17409572, "T"),
            variant("rs13266634", "8", 118184783, "C"),
        ]
    }

    fn scored_for<'a>(risks: &'a [DiseaseRisk], disease: &str) -> &'a PrsResult {
        risks
            .iter()
            .find_map(|r| match r {
                DiseaseRisk::Scored(p) if p.disease == disease => Some(p),
                _ => None,
            })
            .expect("disease should be scored")
    }

    #[test]
    fn test_full_panel_match_scores_high() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        let risks = calculator.score_all(&diabetes_full_match());

        let diabetes = scored_for(&risks, "diabetes");
        // raw = 0.34 + 0.29 - 0.14 + 0.08 + 0.11, M = 0.96
        assert!((diabetes.raw_score - 0.68).abs() < 1e-12);
        assert!((diabetes.normalized_score - (0.5 + 0.68 / 1.92)).abs() < 1e-12);
        assert_eq!(diabetes.risk_category, RiskCategory::High);
        assert_eq!(diabetes.matched_count, 5);
        assert_eq!(diabetes.panel_size, 5);
        assert!(!diabetes.fallback);
        assert!(diabetes.percentile >= 99);
    }

    #[test]
    fn test_protective_allele_lowers_score() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        // Only the protective PPARG variant is present
        let risks = calculator.score_all(&[variant("rs1801282", "3", 12393125, "G")]);

        let diabetes = scored_for(&risks, "diabetes");
        assert!((diabetes.raw_score - (-0.14)).abs() < 1e-12);
        assert!(diabetes.normalized_score < 0.5);
        assert_eq!(diabetes.risk_category, RiskCategory::Low);
        assert!(diabetes.percentile < 50);
    }

    #[test]
    fn test_zero_matches_falls_back_to_population_average() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        let risks = calculator.score_all(&[variant("rs0000001", "22", 1000, "T")]);

        for tag in ["diabetes", "alzheimer", "heart_disease"] {
            let result = scored_for(&risks, tag);
            assert!(result.fallback);
            assert!((result.normalized_score - 0.5).abs() < 1e-12);
            assert_eq!(result.matched_count, 0);
            assert_eq!(result.percentile, 50);
            assert_eq!(result.risk_category, RiskCategory::Moderate);
        }
    }

    #[test]
    fn test_allele_disagreement_is_not_a_match() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        // Right locus, wrong alternate allele
        let risks = calculator.score_all(&[variant("rs7903146", "10", 114758349, "G")]);

        let diabetes = scored_for(&risks, "diabetes");
        assert!(diabetes.fallback);
        assert_eq!(diabetes.matched_count, 0);
    }

    #[test]
    fn test_locus_match_without_rsid() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        // ID column absent, matched purely by chromosome+position
        let risks = calculator.score_all(&[variant("", "10", 114758349, "T")]);

        let diabetes = scored_for(&risks, "diabetes");
        assert_eq!(diabetes.matched_count, 1);
        assert!((diabetes.raw_score - 0.34).abs() < 1e-12);
        assert!(!diabetes.fallback);
    }

    #[test]
    fn test_foreign_rsid_at_panel_locus_is_not_a_match() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        // Same locus and allele as the TCF7L2 entry, but a different rsID
        let risks = calculator.score_all(&[variant("rs9999999", "10", 114758349, "T")]);

        let diabetes = scored_for(&risks, "diabetes");
        assert_eq!(diabetes.matched_count, 0);
        assert!(diabetes.fallback);
    }

    #[test]
    fn test_fallback_all_covers_every_disease() {
        let registry = RiskPanelRegistry::builtin();
        let calculator = PolygenicRiskCalculator::new(&registry);
        let risks = calculator.fallback_all();

        assert_eq!(risks.len(), registry.panel_count());
        for risk in &risks {
            match risk {
                DiseaseRisk::Scored(p) => {
                    assert!(p.fallback);
                    assert!((p.normalized_score - 0.5).abs() < 1e-12);
                }
                DiseaseRisk::Errored { .. } => panic!("fallback should never error"),
            }
        }
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.5, 0.5, 0.15) - 0.5).abs() < 1e-7);
        // One standard deviation above the mean
        assert!((normal_cdf(0.65, 0.5, 0.15) - 0.8413).abs() < 1e-3);
        assert!((normal_cdf(0.35, 0.5, 0.15) - 0.1587).abs() < 1e-3);
    }

    #[test]
    fn test_percentile_monotonic_in_score() {
        let registry = RiskPanelRegistry::builtin();
        let panel = registry.panel_for("diabetes").unwrap();

        let mut last = 0;
        for step in 0..=20 {
            let score = step as f64 / 20.0;
            let p = percentile_of(score, panel);
            assert!(p >= last, "percentile must not decrease with score");
            last = p;
        }
        assert_eq!(percentile_of(0.5, panel), 50);
    }

    #[test]
    fn test_degenerate_panel_reports_errored() {
        use crate::panel::{RiskPanel, SnpPanelEntry};

        let panel = RiskPanel::new(
            "zeroed",
            vec![SnpPanelEntry {
                rsid: "rs1".to_string(),
                chromosome: "1".to_string(),
                position: 100,
                risk_allele: "T".to_string(),
                effect_size: 0.0,
            }],
        );
        let registry = RiskPanelRegistry::from_panels(vec![panel]).unwrap();
        let calculator = PolygenicRiskCalculator::new(&registry);
        let risks = calculator.score_all(&[variant("rs1", "1", 100, "T")]);

        assert!(matches!(
            risks.as_slice(),
            [DiseaseRisk::Errored { disease, .. }] if disease == "zeroed"
        ));
    }
}
