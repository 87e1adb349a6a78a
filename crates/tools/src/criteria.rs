//! Static diagnostic criteria table.

const DIABETES: &str = "\
**Diabetes Mellitus Diagnostic Criteria (ADA 2023)**

Any one of the following:
1. Fasting plasma glucose ≥126 mg/dL (7.0 mmol/L)
   - Fasting = no caloric intake for at least 8 hours
2. 2-hour plasma glucose ≥200 mg/dL (11.1 mmol/L) during OGTT
   - 75g oral glucose tolerance test
3. HbA1c ≥6.5% (48 mmol/mol)
   - Using standardized assay
4. Random plasma glucose ≥200 mg/dL (11.1 mmol/L) with symptoms
   - Classic symptoms: polyuria, polydipsia, unexplained weight loss

**Prediabetes:**
- Fasting glucose 100-125 mg/dL, OR
- 2-hour glucose 140-199 mg/dL, OR
- HbA1c 5.7-6.4%

*Criteria should be confirmed with repeat testing unless acute hyperglycemia with metabolic decompensation.*
";

const HEART_FAILURE: &str = "\
**Heart Failure Diagnostic Criteria**

**Framingham Criteria** (2 major OR 1 major + 2 minor):

*Major criteria:*
- Paroxysmal nocturnal dyspnea
- Neck vein distention
- Rales/crackles
- Radiographic cardiomegaly
- Acute pulmonary edema
- S3 gallop
- Increased central venous pressure (>16 cm H2O)
- Hepatojugular reflux
- Weight loss >4.5 kg in 5 days in response to treatment

*Minor criteria:*
- Bilateral ankle edema
- Nocturnal cough
- Dyspnea on exertion
- Hepatomegaly
- Pleural effusion
- Tachycardia (>120 bpm)

**ESC Criteria:**
Requires: Symptoms + Signs + Objective cardiac dysfunction
+ Response to HF therapy (if diagnosis uncertain)

**BNP/NT-proBNP:**
- BNP >35 pg/mL or NT-proBNP >125 pg/mL suggests HF
- Higher values increase likelihood
";

const SEPSIS: &str = "\
**Sepsis-3 Definitions (2016)**

**Sepsis:** Life-threatening organ dysfunction caused by dysregulated host response to infection

*Criteria:*
- Suspected or documented infection, AND
- Acute increase in SOFA score ≥2 points

**qSOFA (Quick SOFA) - Bedside screening:**
≥2 of the following suggests sepsis:
- Respiratory rate ≥22/min
- Altered mentation (GCS <15)
- Systolic BP ≤100 mmHg

**Septic Shock:**
Sepsis with:
- Vasopressor requirement to maintain MAP ≥65 mmHg, AND
- Lactate >2 mmol/L
- Despite adequate fluid resuscitation

*SOFA score components: PaO2/FiO2, platelets, bilirubin, MAP, GCS, creatinine/urine output*
";

/// (condition key, aliases, criteria text)
const CRITERIA: [(&str, &[&str], &str); 3] = [
    ("diabetes", &["diabetes", "dm2", "diabetes mellitus"], DIABETES),
    (
        "heart failure",
        &["heart failure", "insuficiencia cardiaca", "insuficiencia cardíaca"],
        HEART_FAILURE,
    ),
    ("sepsis", &["sepsis", "septic shock", "shock séptico"], SEPSIS),
];

/// Criteria text for `condition`, or a message listing what is available.
pub fn lookup_diagnostic_criteria(condition: &str) -> String {
    let needle = condition.trim().to_lowercase();
    let hit = CRITERIA.iter().find(|(_, aliases, _)| {
        aliases
            .iter()
            .any(|alias| !needle.is_empty() && (needle.contains(alias) || alias.contains(&needle)))
    });

    match hit {
        Some((_, _, text)) => (*text).to_string(),
        None => {
            let available = CRITERIA
                .iter()
                .map(|(key, _, _)| *key)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Diagnostic criteria for '{condition}' not found in the criteria table.\n\n\
                 Available conditions: {available}\n\n\
                 For other conditions:\n\
                 1. Use query_knowledge_base to search the specialty guidelines\n\
                 2. Use search_literature to find recent guidelines\n\
                 3. Name the guideline source (e.g. 'ADA criteria for diabetes')"
            )
        }
    }
}
