use crate::models::enums::{ContraindicationCategory, FlagTier};

use super::types::{ContraindicationFlag, IntakeData};

// ---------------------------------------------------------------------------
// Keyword lists
// ---------------------------------------------------------------------------

const LITHIUM: &[&str] = &["lithium"];

const MAOI: &[&str] = &[
    "maoi", "phenelzine", "tranylcypromine", "selegiline", "isocarboxazid", "nardil",
    "parnate", "emsam", "marplan",
];

const PSYCHOSIS: &[&str] = &[
    "schizophrenia",
    "schizoaffective",
    "psychosis",
    "psychotic episode",
    "psychotic disorder",
];

const FIRST_DEGREE_RELATIVE: &[&str] = &[
    "parent", "mother", "father", "sibling", "brother", "sister", "first-degree",
    "first degree",
];

const BORDERLINE: &[&str] = &[
    "bpd",
    "borderline personality",
    "emotionally unstable personality",
];

const SUBSTANCE_USE: &[&str] = &[
    "substance use disorder",
    "alcohol use disorder",
    "opioid use disorder",
    "cocaine use disorder",
    "stimulant use disorder",
    "aud",
    "sud",
];

const SSRI: &[&str] = &[
    "ssri", "sertraline", "fluoxetine", "escitalopram", "citalopram", "paroxetine",
    "fluvoxamine", "zoloft", "prozac", "lexapro", "paxil",
];

const STIMULANT: &[&str] = &[
    "adderall", "amphetamine", "dextroamphetamine", "methamphetamine", "vyvanse",
    "lisdexamfetamine", "ritalin", "methylphenidate", "concerta",
];

/// Abbreviations that only count as whole words ("aud" must not hit "audiology").
const WHOLE_WORD_TERMS: &[&str] = &["aud", "sud", "bpd", "ssri", "maoi"];

// Thresholds
const CSSRS_ABSOLUTE: u8 = 4;
const SBP_ABSOLUTE_MDMA: u16 = 160;
const SBP_RELATIVE: u16 = 150;
const MIN_AGE_YEARS: u16 = 21;
const PHQ9_EXTREME: u8 = 24;
const GAD7_EXTREME: u8 = 18;
const PCL5_EXTREME: u8 = 60;
const BMI_LOW: f64 = 17.5;

const SRC_MEDICATIONS: &str = "Baseline Observations: Medication List";
const SRC_PSYCH_HISTORY: &str = "Baseline Observations: Psychiatric History";
const SRC_FAMILY_HISTORY: &str = "Baseline Observations: Family History";
const SRC_CSSRS: &str = "Baseline Assessment: C-SSRS";
const SRC_VITALS: &str = "Baseline Vitals: Blood Pressure";
const SRC_DEMOGRAPHICS: &str = "Patient Demographics";
const SRC_PHQ9: &str = "Baseline Assessment: PHQ-9";
const SRC_GAD7: &str = "Baseline Assessment: GAD-7";
const SRC_PCL5: &str = "Baseline Assessment: PCL-5";
const SRC_BMI: &str = "Baseline Vitals: Body Mass Index";

// ---------------------------------------------------------------------------
// Normalized intake + matching
// ---------------------------------------------------------------------------

/// Intake with every keyword list lower-cased and trimmed.
pub(crate) struct NormalizedIntake<'a> {
    pub raw: &'a IntakeData,
    pub substance: String,
    pub medications: Vec<String>,
    pub psychiatric_history: Vec<String>,
    pub family_history: Vec<String>,
}

impl<'a> NormalizedIntake<'a> {
    pub fn new(raw: &'a IntakeData) -> Self {
        Self {
            raw,
            substance: raw.substance.trim().to_lowercase(),
            medications: normalize_list(&raw.medications),
            psychiatric_history: normalize_list(&raw.psychiatric_history),
            family_history: normalize_list(&raw.family_history),
        }
    }

    /// Exact substance match; "mdma-assisted" or blends do not count.
    fn is_mdma(&self) -> bool {
        self.substance == "mdma"
    }
}

fn normalize_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn term_matches(item: &str, term: &str) -> bool {
    if WHOLE_WORD_TERMS.contains(&term) {
        item.split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == term)
    } else {
        item.contains(term)
    }
}

/// True when any list entry matches any term.
pub(crate) fn matches_any(items: &[String], terms: &[&str]) -> bool {
    items
        .iter()
        .any(|item| terms.iter().any(|t| term_matches(item, t)))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

struct Finding {
    headline: String,
    detail: String,
    source: &'static str,
}

impl Finding {
    fn new(headline: impl Into<String>, detail: impl Into<String>, source: &'static str) -> Self {
        Self {
            headline: headline.into(),
            detail: detail.into(),
            source,
        }
    }
}

struct CatalogRule {
    id: &'static str,
    tier: FlagTier,
    category: ContraindicationCategory,
    regulatory_basis: &'static str,
    check: fn(&NormalizedIntake) -> Option<Finding>,
}

impl CatalogRule {
    fn flag(&self, finding: Finding) -> ContraindicationFlag {
        ContraindicationFlag {
            id: self.id.to_string(),
            tier: self.tier,
            category: self.category,
            headline: finding.headline,
            detail: finding.detail,
            source: finding.source.to_string(),
            regulatory_basis: self.regulatory_basis.to_string(),
        }
    }
}

use ContraindicationCategory as Cat;
use FlagTier::{Absolute, Relative};

static CATALOG: &[CatalogRule] = &[
    // Absolute
    CatalogRule {
        id: "ABS-MEDICATION-LITHIUM",
        tier: Absolute,
        category: Cat::Medication,
        regulatory_basis: "OHA OAR 333-333-4020(3)(c); MAPS Protocol S2 §8.3.1",
        check: check_lithium,
    },
    CatalogRule {
        id: "ABS-MEDICATION-MAOI",
        tier: Absolute,
        category: Cat::Medication,
        regulatory_basis: "OHA OAR 333-333-4020(3)(c); MAPS Protocol S2 §8.3.2",
        check: check_maoi,
    },
    CatalogRule {
        id: "ABS-PSYCH-PSYCHOSIS-PERSONAL",
        tier: Absolute,
        category: Cat::Psychiatric,
        regulatory_basis: "OHA OAR 333-333-4020(3)(b); MAPS Protocol S2 §8.2",
        check: check_personal_psychosis,
    },
    CatalogRule {
        id: "ABS-PSYCH-PSYCHOSIS-FAMILY",
        tier: Absolute,
        category: Cat::Psychiatric,
        regulatory_basis: "OHA OAR 333-333-4020(3)(b); MAPS Protocol S2 §8.2",
        check: check_family_schizophrenia,
    },
    CatalogRule {
        id: "ABS-PSYCH-SUICIDALITY",
        tier: Absolute,
        category: Cat::Psychiatric,
        regulatory_basis: "OHA OAR 333-333-4020(3)(a); Joint Commission NPSG 15.01.01",
        check: check_suicidality,
    },
    CatalogRule {
        id: "ABS-CARDIOVASCULAR-HTN-MDMA",
        tier: Absolute,
        category: Cat::Cardiovascular,
        regulatory_basis: "MAPS Protocol S2 §7.4; AHA 2023 Hypertension Guidelines",
        check: check_mdma_hypertension,
    },
    CatalogRule {
        id: "ABS-DEMOGRAPHIC-PREGNANCY",
        tier: Absolute,
        category: Cat::Demographic,
        regulatory_basis: "OHA OAR 333-333-4020(3)(d)",
        check: check_pregnancy,
    },
    CatalogRule {
        id: "ABS-DEMOGRAPHIC-AGE",
        tier: Absolute,
        category: Cat::Demographic,
        regulatory_basis: "Oregon Measure 109; OHA OAR 333-333-4010",
        check: check_minimum_age,
    },
    // Relative
    CatalogRule {
        id: "REL-PSYCH-BPD",
        tier: Relative,
        category: Cat::Psychiatric,
        regulatory_basis: "MAPS Protocol S2 §8.4",
        check: check_borderline,
    },
    CatalogRule {
        id: "REL-PSYCH-SUD",
        tier: Relative,
        category: Cat::Psychiatric,
        regulatory_basis: "MAPS Protocol S2 §8.5",
        check: check_substance_use,
    },
    CatalogRule {
        id: "REL-MEDICATION-SSRI-MDMA",
        tier: Relative,
        category: Cat::Medication,
        regulatory_basis: "MAPS Protocol S2 §7.2; FDA Drug Interaction Guidance",
        check: check_ssri_with_mdma,
    },
    CatalogRule {
        id: "REL-ASSESSMENT-PHQ9-EXTREME",
        tier: Relative,
        category: Cat::Assessment,
        regulatory_basis: "Kroenke et al. 2001; MAPS Protocol S2 §8.6",
        check: check_phq9,
    },
    CatalogRule {
        id: "REL-ASSESSMENT-GAD7-EXTREME",
        tier: Relative,
        category: Cat::Assessment,
        regulatory_basis: "Spitzer et al. 2006",
        check: check_gad7,
    },
    CatalogRule {
        id: "REL-ASSESSMENT-PCL5-EXTREME",
        tier: Relative,
        category: Cat::Assessment,
        regulatory_basis: "Weathers et al. 2013; MAPS Protocol S2 §8.7",
        check: check_pcl5,
    },
    CatalogRule {
        id: "REL-DEMOGRAPHIC-LOW-BMI",
        tier: Relative,
        category: Cat::Demographic,
        regulatory_basis: "DSM-5 Anorexia Nervosa criteria; MAPS Protocol S2 §7.3",
        check: check_low_bmi,
    },
    CatalogRule {
        id: "REL-CARDIOVASCULAR-HTN",
        tier: Relative,
        category: Cat::Cardiovascular,
        regulatory_basis: "AHA 2023 Hypertension Guidelines; MAPS Protocol S2 §7.4",
        check: check_hypertension,
    },
    CatalogRule {
        id: "REL-MEDICATION-STIMULANT-MDMA",
        tier: Relative,
        category: Cat::Medication,
        regulatory_basis: "MAPS Protocol S2 §7.2",
        check: check_stimulant_with_mdma,
    },
];

/// Run every catalog rule in order. Returns `(absolute, relative)`.
pub(crate) fn evaluate_catalog(
    intake: &NormalizedIntake,
) -> (Vec<ContraindicationFlag>, Vec<ContraindicationFlag>) {
    let mut absolute = Vec::new();
    let mut relative = Vec::new();
    for rule in CATALOG {
        let Some(finding) = (rule.check)(intake) else {
            continue;
        };
        let flag = rule.flag(finding);
        match rule.tier {
            FlagTier::Absolute => absolute.push(flag),
            FlagTier::Relative => relative.push(flag),
        }
    }
    (absolute, relative)
}

/// Ids of every catalog rule, in evaluation order.
pub fn catalog_ids() -> Vec<&'static str> {
    CATALOG.iter().map(|r| r.id).collect()
}

// ---------------------------------------------------------------------------
// Absolute checks
// ---------------------------------------------------------------------------

fn check_lithium(i: &NormalizedIntake) -> Option<Finding> {
    if !matches_any(&i.medications, LITHIUM) {
        return None;
    }
    Some(Finding::new(
        "Lithium: seizure and neurotoxicity risk",
        "Medication list includes lithium, which lowers the seizure threshold with serotonergic psychedelics. Lithium must be discontinued under prescriber supervision before dosing.",
        SRC_MEDICATIONS,
    ))
}

fn check_maoi(i: &NormalizedIntake) -> Option<Finding> {
    if !matches_any(&i.medications, MAOI) {
        return None;
    }
    Some(Finding::new(
        "MAO inhibitor: serotonin syndrome risk",
        "Medication list includes a monoamine oxidase inhibitor. Combined serotonergic load can cause serotonin syndrome or hypertensive crisis.",
        SRC_MEDICATIONS,
    ))
}

fn check_personal_psychosis(i: &NormalizedIntake) -> Option<Finding> {
    if !matches_any(&i.psychiatric_history, PSYCHOSIS) {
        return None;
    }
    Some(Finding::new(
        "Personal history of psychotic disorder",
        "Psychiatric history includes a psychotic disorder. Psychedelic administration can precipitate or worsen psychosis.",
        SRC_PSYCH_HISTORY,
    ))
}

fn check_family_schizophrenia(i: &NormalizedIntake) -> Option<Finding> {
    let found = i.family_history.iter().any(|e| {
        e.contains("schizophrenia") && FIRST_DEGREE_RELATIVE.iter().any(|r| e.contains(r))
    });
    if !found {
        return None;
    }
    Some(Finding::new(
        "First-degree family history of schizophrenia",
        "Family history includes schizophrenia in a first-degree relative, which carries elevated risk of a psychotic break.",
        SRC_FAMILY_HISTORY,
    ))
}

fn check_suicidality(i: &NormalizedIntake) -> Option<Finding> {
    let score = i.raw.cssrs_score.filter(|s| *s >= CSSRS_ABSOLUTE)?;
    Some(Finding::new(
        "Active suicidal ideation with intent",
        format!("C-SSRS score {score} (threshold {CSSRS_ABSOLUTE}). A safety plan and psychiatric evaluation are required before any session."),
        SRC_CSSRS,
    ))
}

fn check_mdma_hypertension(i: &NormalizedIntake) -> Option<Finding> {
    if !i.is_mdma() {
        return None;
    }
    let sbp = i.raw.last_systolic_bp.filter(|s| *s > SBP_ABSOLUTE_MDMA)?;
    Some(Finding::new(
        "Uncontrolled hypertension with MDMA",
        format!("Last systolic pressure {sbp} mmHg exceeds {SBP_ABSOLUTE_MDMA} mmHg. MDMA raises blood pressure and heart rate."),
        SRC_VITALS,
    ))
}

fn check_pregnancy(i: &NormalizedIntake) -> Option<Finding> {
    if !i.raw.is_pregnant {
        return None;
    }
    Some(Finding::new(
        "Pregnancy",
        "Patient is pregnant. Psychedelic services are not permitted during pregnancy.",
        SRC_DEMOGRAPHICS,
    ))
}

fn check_minimum_age(i: &NormalizedIntake) -> Option<Finding> {
    let age = i.raw.age_years.filter(|a| *a < MIN_AGE_YEARS)?;
    Some(Finding::new(
        "Below minimum age",
        format!("Patient age {age} is below the legal minimum of {MIN_AGE_YEARS}."),
        SRC_DEMOGRAPHICS,
    ))
}

// ---------------------------------------------------------------------------
// Relative checks
// ---------------------------------------------------------------------------

fn check_borderline(i: &NormalizedIntake) -> Option<Finding> {
    if !matches_any(&i.psychiatric_history, BORDERLINE) {
        return None;
    }
    Some(Finding::new(
        "Borderline personality disorder",
        "Psychiatric history includes borderline personality disorder. Consider extended preparation and integration support.",
        SRC_PSYCH_HISTORY,
    ))
}

fn check_substance_use(i: &NormalizedIntake) -> Option<Finding> {
    if !matches_any(&i.psychiatric_history, SUBSTANCE_USE) {
        return None;
    }
    Some(Finding::new(
        "Substance use disorder",
        "Psychiatric history includes a substance use disorder. Confirm current use status and relapse-prevention plan.",
        SRC_PSYCH_HISTORY,
    ))
}

fn check_ssri_with_mdma(i: &NormalizedIntake) -> Option<Finding> {
    if !i.is_mdma() {
        return None;
    }
    if !matches_any(&i.medications, SSRI) {
        return None;
    }
    Some(Finding::new(
        "SSRI with MDMA: blunted response",
        "Medication list includes an SSRI, which blocks the serotonin transporter and can blunt MDMA effects. A supervised taper may be required.",
        SRC_MEDICATIONS,
    ))
}

fn check_phq9(i: &NormalizedIntake) -> Option<Finding> {
    let score = i.raw.phq9_score.filter(|s| *s > PHQ9_EXTREME)?;
    Some(Finding::new(
        "Extreme depression severity",
        format!("PHQ-9 score {score} exceeds {PHQ9_EXTREME}. Confirm stability before scheduling."),
        SRC_PHQ9,
    ))
}

fn check_gad7(i: &NormalizedIntake) -> Option<Finding> {
    let score = i.raw.gad7_score.filter(|s| *s > GAD7_EXTREME)?;
    Some(Finding::new(
        "Extreme anxiety severity",
        format!("GAD-7 score {score} exceeds {GAD7_EXTREME}. Consider additional preparation sessions."),
        SRC_GAD7,
    ))
}

fn check_pcl5(i: &NormalizedIntake) -> Option<Finding> {
    let score = i.raw.pcl5_score.filter(|s| *s > PCL5_EXTREME)?;
    Some(Finding::new(
        "Extreme PTSD symptom severity",
        format!("PCL-5 score {score} exceeds {PCL5_EXTREME}. Trauma material may surface with high intensity."),
        SRC_PCL5,
    ))
}

fn check_low_bmi(i: &NormalizedIntake) -> Option<Finding> {
    let bmi = i.raw.bmi.filter(|b| *b < BMI_LOW)?;
    Some(Finding::new(
        "Low body mass index",
        format!("BMI {bmi:.1} is below {BMI_LOW}. Screen for eating disorder and adjust dosing."),
        SRC_BMI,
    ))
}

fn check_hypertension(i: &NormalizedIntake) -> Option<Finding> {
    let sbp = i.raw.last_systolic_bp.filter(|s| *s > SBP_RELATIVE)?;
    // Already a hard stop for MDMA above the absolute threshold.
    if i.is_mdma() && sbp > SBP_ABSOLUTE_MDMA {
        return None;
    }
    Some(Finding::new(
        "Elevated blood pressure",
        format!("Last systolic pressure {sbp} mmHg exceeds {SBP_RELATIVE} mmHg. Recheck and monitor vitals during the session."),
        SRC_VITALS,
    ))
}

fn check_stimulant_with_mdma(i: &NormalizedIntake) -> Option<Finding> {
    if !i.is_mdma() {
        return None;
    }
    if !matches_any(&i.medications, STIMULANT) {
        return None;
    }
    Some(Finding::new(
        "Stimulant with MDMA: cardiovascular load",
        "Medication list includes a prescription stimulant, which adds sympathomimetic load to MDMA.",
        SRC_MEDICATIONS,
    ))
}
