// ==============================================================================
// panel.rs - Curated Risk-Variant Panels
// ==============================================================================
// Description: Disease-keyed panels of GWAS risk variants with effect sizes,
//              loaded once at startup and immutable afterwards
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-20
// Version: 1.0.0
// ==============================================================================
// Format (CSV, header required):
//   disease,rsid,chromosome,position,risk_allele,effect_size
//   diabetes,rs7903146,10,114758349,T,0.34
// Optional columns population_mean / population_std override the reference
// distribution used for percentile estimates (default N(0.5, 0.15)).
// ==============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::normalize_chromosome;

/// Default reference population mean for percentile mapping
pub const DEFAULT_POPULATION_MEAN: f64 = 0.5;

/// Default reference population standard deviation for percentile mapping
pub const DEFAULT_POPULATION_STD: f64 = 0.15;

/// One curated risk variant within a disease panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnpPanelEntry {
    /// rsID (e.g. "rs7903146")
    pub rsid: String,

    /// Normalized chromosome (no "chr" prefix)
    pub chromosome: String,

    /// 1-based GRCh37 position
    pub position: u64,

    /// Allele whose presence contributes the effect size
    pub risk_allele: String,

    /// Signed log-odds-like weight; negative means protective
    pub effect_size: f64,
}

/// All curated entries for one disease, plus its reference distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPanel {
    pub disease: String,
    pub entries: Vec<SnpPanelEntry>,

    /// Reference population distribution for percentile estimates
    pub population_mean: f64,
    pub population_std: f64,
}

impl RiskPanel {
    pub fn new(disease: impl Into<String>, entries: Vec<SnpPanelEntry>) -> Self {
        Self {
            disease: disease.into(),
            entries,
            population_mean: DEFAULT_POPULATION_MEAN,
            population_std: DEFAULT_POPULATION_STD,
        }
    }

    /// Theoretical maximum score magnitude: sum of |effect| over the panel
    pub fn max_magnitude(&self) -> f64 {
        self.entries.iter().map(|e| e.effect_size.abs()).sum()
    }
}

/// Errors raised while loading panel configuration
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Panel configuration is empty")]
    EmptyPanel,

    #[error("Invalid panel entry: {0}")]
    InvalidEntry(String),
}

/// CSV row shape for panel configuration files
#[derive(Debug, Deserialize)]
struct PanelCsvRow {
    disease: String,
    rsid: String,
    chromosome: String,
    position: u64,
    risk_allele: String,
    effect_size: f64,
    #[serde(default)]
    population_mean: Option<f64>,
    #[serde(default)]
    population_std: Option<f64>,
}

/// Immutable, disease-keyed collection of risk panels
///
/// Built once at process start; lookups are read-only afterwards, so the
/// registry is safe to share across concurrent pipeline invocations without
/// locking. The rsID and locus indexes give the VCF analyzer O(1) relevance
/// checks during its single pass.
#[derive(Debug)]
pub struct RiskPanelRegistry {
    panels: BTreeMap<String, RiskPanel>,
    rsid_index: HashMap<String, Vec<(String, usize)>>,
    locus_index: HashSet<(String, u64)>,
}

impl RiskPanelRegistry {
    /// Build a registry from validated panels
    ///
    /// Rejects non-finite effect sizes and blank identifiers at load time so
    /// scoring never encounters them.
    pub fn from_panels(panels: Vec<RiskPanel>) -> Result<Self, PanelError> {
        if panels.iter().all(|p| p.entries.is_empty()) {
            return Err(PanelError::EmptyPanel);
        }

        for panel in &panels {
            if panel.disease.trim().is_empty() {
                return Err(PanelError::InvalidEntry("blank disease tag".to_string()));
            }
            if !panel.population_std.is_finite() || panel.population_std <= 0.0 {
                return Err(PanelError::InvalidEntry(format!(
                    "panel '{}' has invalid population std {}",
                    panel.disease, panel.population_std
                )));
            }
            for entry in &panel.entries {
                if !entry.effect_size.is_finite() {
                    return Err(PanelError::InvalidEntry(format!(
                        "non-finite effect size for {} in panel '{}'",
                        entry.rsid, panel.disease
                    )));
                }
                if entry.rsid.trim().is_empty() && entry.chromosome.trim().is_empty() {
                    return Err(PanelError::InvalidEntry(format!(
                        "entry without rsID or locus in panel '{}'",
                        panel.disease
                    )));
                }
            }
        }

        Ok(Self::build(panels))
    }

    /// The curated built-in GWAS table (diabetes, alzheimer, heart disease)
    pub fn builtin() -> Self {
        Self::build(builtin_panels())
    }

    /// Load panels from a CSV configuration file
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, PanelError> {
        let file = std::fs::File::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "loading risk panel configuration");
        Self::from_csv_reader(file)
    }

    /// Load panels from any CSV byte source
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, PanelError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut grouped: BTreeMap<String, RiskPanel> = BTreeMap::new();

        for result in csv_reader.deserialize() {
            let row: PanelCsvRow = result?;

            if !row.effect_size.is_finite() {
                return Err(PanelError::InvalidEntry(format!(
                    "non-finite effect size for {}",
                    row.rsid
                )));
            }

            let panel = grouped
                .entry(row.disease.clone())
                .or_insert_with(|| RiskPanel::new(row.disease.clone(), Vec::new()));

            if let Some(mean) = row.population_mean {
                panel.population_mean = mean;
            }
            if let Some(std) = row.population_std {
                panel.population_std = std;
            }

            panel.entries.push(SnpPanelEntry {
                rsid: row.rsid,
                chromosome: normalize_chromosome(&row.chromosome),
                position: row.position,
                risk_allele: row.risk_allele.to_uppercase(),
                effect_size: row.effect_size,
            });
        }

        Self::from_panels(grouped.into_values().collect())
    }

    fn build(panels: Vec<RiskPanel>) -> Self {
        let mut rsid_index: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        let mut locus_index = HashSet::new();
        let mut map = BTreeMap::new();

        for panel in panels {
            for (idx, entry) in panel.entries.iter().enumerate() {
                if !entry.rsid.is_empty() {
                    rsid_index
                        .entry(entry.rsid.clone())
                        .or_default()
                        .push((panel.disease.clone(), idx));
                }
                locus_index.insert((entry.chromosome.clone(), entry.position));
            }
            map.insert(panel.disease.clone(), panel);
        }

        debug!(
            panels = map.len(),
            rsids = rsid_index.len(),
            "risk panel registry built"
        );

        Self {
            panels: map,
            rsid_index,
            locus_index,
        }
    }

    pub fn panel_for(&self, disease_tag: &str) -> Option<&RiskPanel> {
        self.panels.get(disease_tag)
    }

    /// Registered disease tags in deterministic (sorted) order
    pub fn disease_tags(&self) -> impl Iterator<Item = &str> {
        self.panels.keys().map(String::as_str)
    }

    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// O(1) check used by the VCF analyzer during its single pass
    pub fn contains_rsid(&self, rsid: &str) -> bool {
        self.rsid_index.contains_key(rsid)
    }

    /// O(1) fallback check for variants without an ID column
    pub fn contains_locus(&self, chromosome: &str, position: u64) -> bool {
        self.locus_index
            .contains(&(chromosome.to_string(), position))
    }

    /// All panel entries referencing a given rsID, across diseases
    pub fn entries_for_rsid(&self, rsid: &str) -> Vec<&SnpPanelEntry> {
        match self.rsid_index.get(rsid) {
            Some(refs) => refs
                .iter()
                .filter_map(|(disease, idx)| {
                    self.panels.get(disease).and_then(|p| p.entries.get(*idx))
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

fn entry(
    rsid: &str,
    chromosome: &str,
    position: u64,
    risk_allele: &str,
    effect_size: f64,
) -> SnpPanelEntry {
    SnpPanelEntry {
        rsid: rsid.to_string(),
        chromosome: chromosome.to_string(),
        position,
        risk_allele: risk_allele.to_string(),
        effect_size,
    }
}

/// Curated effect sizes from published GWAS (GRCh37 coordinates)
fn builtin_panels() -> Vec<RiskPanel> {
    vec![
        RiskPanel::new(
            "diabetes",
            vec![
                entry("rs7903146", "10", 114758349, "T", 0.34), // TCF7L2
                entry("rs12255372", "10", 114808902, "T", 0.29), // TCF7L2
                entry("rs1801282", "3", 12393125, "G", -0.14),  // PPARG
                entry("rs5219", "11", 17409572, "T", 0.08),     // KCNJ11
                entry("rs13266634", "8", 118184783, "C", 0.11), // SLC30A8
            ],
        ),
        RiskPanel::new(
            "alzheimer",
            vec![
                entry("rs429358", "19", 45411941, "C", 1.12), // APOE e4
                entry("rs7412", "19", 45412079, "T", -0.68),  // APOE e2, protective
                entry("rs11136000", "8", 27464519, "T", 0.15), // CLU
                entry("rs3851179", "11", 85868640, "T", 0.09), // PICALM
            ],
        ),
        RiskPanel::new(
            "heart_disease",
            vec![
                entry("rs599839", "1", 109822166, "G", 0.29), // SORT1/CELSR2/PSRC1
                entry("rs17465637", "1", 222823529, "C", 0.29), // MIA3
                entry("rs6922269", "6", 151040102, "A", 0.25), // MTHFD1L
                entry("rs1333049", "9", 22125503, "C", 0.21), // CDKN2A/CDKN2B
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_registry() {
        let registry = RiskPanelRegistry::builtin();
        assert_eq!(registry.panel_count(), 3);

        let tags: Vec<&str> = registry.disease_tags().collect();
        assert_eq!(tags, vec!["alzheimer", "diabetes", "heart_disease"]);

        let diabetes = registry.panel_for("diabetes").unwrap();
        assert_eq!(diabetes.entries.len(), 5);
        assert!((diabetes.max_magnitude() - 0.96).abs() < 1e-12);
    }

    #[test]
    fn test_builtin_table_passes_validation() {
        assert!(RiskPanelRegistry::from_panels(builtin_panels()).is_ok());
    }

    #[test]
    fn test_rsid_index() {
        let registry = RiskPanelRegistry::builtin();
        assert!(registry.contains_rsid("rs429358"));
        assert!(!registry.contains_rsid("rs0000000"));

        let entries = registry.entries_for_rsid("rs7903146");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chromosome, "10");
        assert!((entries[0].effect_size - 0.34).abs() < 1e-12);
    }

    #[test]
    fn test_locus_index() {
        let registry = RiskPanelRegistry::builtin();
        assert!(registry.contains_locus("19", 45411941));
        assert!(!registry.contains_locus("19", 1));
        assert!(!registry.contains_locus("2", 45411941));
    }

    #[test]
    fn test_csv_loading() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "disease,rsid,chromosome,position,risk_allele,effect_size").unwrap();
        writeln!(file, "diabetes,rs7903146,chr10,114758349,t,0.34").unwrap();
        writeln!(file, "diabetes,rs1801282,3,12393125,G,-0.14").unwrap();
        writeln!(file, "asthma,rs1420101,2,102957716,A,0.10").unwrap();
        file.flush().unwrap();

        let registry = RiskPanelRegistry::from_csv_path(file.path()).unwrap();
        assert_eq!(registry.panel_count(), 2);

        // Chromosome and allele are normalized on load
        let entries = registry.entries_for_rsid("rs7903146");
        assert_eq!(entries[0].chromosome, "10");
        assert_eq!(entries[0].risk_allele, "T");

        let asthma = registry.panel_for("asthma").unwrap();
        assert_eq!(asthma.population_mean, DEFAULT_POPULATION_MEAN);
        assert_eq!(asthma.population_std, DEFAULT_POPULATION_STD);
    }

    #[test]
    fn test_csv_population_overrides() {
        let csv = "disease,rsid,chromosome,position,risk_allele,effect_size,population_mean,population_std\n\
                   diabetes,rs7903146,10,114758349,T,0.34,0.55,0.2\n";
        let registry = RiskPanelRegistry::from_csv_reader(csv.as_bytes()).unwrap();
        let panel = registry.panel_for("diabetes").unwrap();
        assert_eq!(panel.population_mean, 0.55);
        assert_eq!(panel.population_std, 0.2);
    }

    #[test]
    fn test_empty_csv_rejected() {
        let csv = "disease,rsid,chromosome,position,risk_allele,effect_size\n";
        let err = RiskPanelRegistry::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PanelError::EmptyPanel));
    }

    #[test]
    fn test_non_finite_effect_rejected() {
        let panels = vec![RiskPanel::new(
            "broken",
            vec![entry("rs1", "1", 100, "A", f64::NAN)],
        )];
        let err = RiskPanelRegistry::from_panels(panels).unwrap_err();
        assert!(matches!(err, PanelError::InvalidEntry(_)));
    }
}
