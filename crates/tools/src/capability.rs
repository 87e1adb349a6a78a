//! The closed set of capabilities and the static specialty mapping.

use std::fmt;

use crew_common::{CrewError, Result, Specialty};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    QueryKnowledgeBase,
    SearchLiterature,
    LookupDiagnosticCriteria,
    Think,
    CalculateGfr,
    CalculateBmi,
    CalculateChads2vasc,
    CalculateFraminghamRisk,
    CalculateWellsDvt,
}

const BASE: [Capability; 4] = [
    Capability::QueryKnowledgeBase,
    Capability::SearchLiterature,
    Capability::LookupDiagnosticCriteria,
    Capability::Think,
];

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::QueryKnowledgeBase,
        Capability::SearchLiterature,
        Capability::LookupDiagnosticCriteria,
        Capability::Think,
        Capability::CalculateGfr,
        Capability::CalculateBmi,
        Capability::CalculateChads2vasc,
        Capability::CalculateFraminghamRisk,
        Capability::CalculateWellsDvt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::QueryKnowledgeBase => "query_knowledge_base",
            Capability::SearchLiterature => "search_literature",
            Capability::LookupDiagnosticCriteria => "lookup_diagnostic_criteria",
            Capability::Think => "think",
            Capability::CalculateGfr => "calculate_gfr",
            Capability::CalculateBmi => "calculate_bmi",
            Capability::CalculateChads2vasc => "calculate_chads2vasc",
            Capability::CalculateFraminghamRisk => "calculate_framingham_risk",
            Capability::CalculateWellsDvt => "calculate_wells_dvt",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == name.trim())
            .ok_or_else(|| CrewError::UnknownCapability(name.to_string()))
    }

    pub fn is_calculator(&self) -> bool {
        matches!(
            self,
            Capability::CalculateGfr
                | Capability::CalculateBmi
                | Capability::CalculateChads2vasc
                | Capability::CalculateFraminghamRisk
                | Capability::CalculateWellsDvt
        )
    }

    /// One-line usage shown to the specialist model.
    pub fn usage(&self) -> &'static str {
        match self {
            Capability::QueryKnowledgeBase => {
                "Search the specialty's clinical guidelines. Arguments: {\"query\": string, \"top_k\"?: int}"
            }
            Capability::SearchLiterature => {
                "Search PubMed for recent trials, reviews and meta-analyses. \
                 Arguments: {\"query\": string, \"max_results\"?: int, \"years_back\"?: int}"
            }
            Capability::LookupDiagnosticCriteria => {
                "Formal diagnostic criteria for a condition. Arguments: {\"condition\": string}"
            }
            Capability::Think => {
                "Record a clinical reasoning step before deciding what to do next. \
                 Arguments: {\"reflection\": string}"
            }
            Capability::CalculateGfr => {
                "eGFR by CKD-EPI 2021. Arguments: {\"creatinine_mg_dl\": number, \"age\": int, \
                 \"sex\": \"male\"|\"female\"}"
            }
            Capability::CalculateBmi => {
                "Body mass index. Arguments: {\"weight_kg\": number, \"height_cm\": number}"
            }
            Capability::CalculateChads2vasc => {
                "CHA2DS2-VASc stroke risk in atrial fibrillation. Arguments: {\"age\": int, \
                 \"sex\": \"male\"|\"female\", \"chf\"?: bool, \"hypertension\"?: bool, \
                 \"stroke_tia\"?: bool, \"vascular_disease\"?: bool, \"diabetes\"?: bool}"
            }
            Capability::CalculateFraminghamRisk => {
                "Framingham 10-year cardiovascular risk. Arguments: {\"age\": int, \
                 \"sex\": \"male\"|\"female\", \"total_cholesterol\": number, \
                 \"hdl_cholesterol\": number, \"systolic_bp\": number, \"on_bp_meds\"?: bool, \
                 \"smoker\"?: bool, \"diabetes\"?: bool}"
            }
            Capability::CalculateWellsDvt => {
                "Wells score for deep vein thrombosis. Arguments (all bool, default false): \
                 active_cancer, paralysis_paresis, recently_bedridden, localized_tenderness, \
                 entire_leg_swollen, calf_swelling, pitting_edema, collateral_veins, \
                 alternative_diagnosis"
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calculators a specialty gets on top of the base set.
fn specialty_calculators(specialty: Specialty) -> &'static [Capability] {
    match specialty {
        Specialty::Cardiology => &[
            Capability::CalculateChads2vasc,
            Capability::CalculateFraminghamRisk,
        ],
        Specialty::Emergency => &[Capability::CalculateWellsDvt],
        Specialty::InternalMedicine => &[
            Capability::CalculateGfr,
            Capability::CalculateBmi,
            Capability::CalculateFraminghamRisk,
        ],
        Specialty::Nutrition | Specialty::Surgery | Specialty::Gynecology => {
            &[Capability::CalculateBmi]
        }
        Specialty::Prevention => &[
            Capability::CalculateFraminghamRisk,
            Capability::CalculateBmi,
        ],
        Specialty::Pharmacology | Specialty::Neurology | Specialty::Epidemiology => &[],
    }
}

/// Capabilities available to `specialty`, in presentation order.
pub fn capabilities_for(specialty: Specialty) -> Vec<Capability> {
    BASE.iter()
        .chain(specialty_calculators(specialty))
        .copied()
        .collect()
}
