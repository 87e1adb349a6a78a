//! Clinical score calculators.
//!
//! Every calculator is a pure function of its parameters. The only failure
//! mode is invalid input, reported as [`CrewError::InvalidInput`].

use std::str::FromStr;

use crew_common::{CrewError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = CrewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            other => Err(CrewError::InvalidInput(format!(
                "sex must be 'male' or 'female', got '{other}'"
            ))),
        }
    }
}

fn ensure_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(CrewError::InvalidInput(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// eGFR (CKD-EPI 2021, race-free)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GfrParams {
    pub creatinine_mg_dl: f64,
    pub age: u32,
    pub sex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GfrResult {
    pub egfr: f64,
    pub stage: &'static str,
    pub stage_number: u8,
    pub units: &'static str,
}

pub fn calculate_gfr(params: &GfrParams) -> Result<GfrResult> {
    ensure_range("creatinine_mg_dl", params.creatinine_mg_dl, 0.1, 30.0)?;
    ensure_range("age", params.age as f64, 18.0, 120.0)?;
    let sex: Sex = params.sex.parse()?;

    let (kappa, alpha, sex_factor) = match sex {
        Sex::Female => (0.7, -0.241, 1.012),
        Sex::Male => (0.9, -0.302, 1.0),
    };
    let ratio = params.creatinine_mg_dl / kappa;
    let egfr = 142.0
        * ratio.min(1.0).powf(alpha)
        * ratio.max(1.0).powf(-1.200)
        * 0.9938_f64.powi(params.age as i32)
        * sex_factor;

    let (stage, stage_number) = match egfr {
        e if e >= 90.0 => ("G1 - Normal or high", 1),
        e if e >= 60.0 => ("G2 - Mildly decreased", 2),
        e if e >= 45.0 => ("G3a - Mild to moderate decrease", 3),
        e if e >= 30.0 => ("G3b - Moderate to severe decrease", 3),
        e if e >= 15.0 => ("G4 - Severely decreased", 4),
        _ => ("G5 - Kidney failure", 5),
    };

    Ok(GfrResult {
        egfr: round1(egfr),
        stage,
        stage_number,
        units: "mL/min/1.73m²",
    })
}

// ---------------------------------------------------------------------------
// BMI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BmiParams {
    pub weight_kg: f64,
    pub height_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmiResult {
    pub bmi: f64,
    pub classification: &'static str,
    pub weight_kg: f64,
    pub height_cm: f64,
}

pub fn calculate_bmi(params: &BmiParams) -> Result<BmiResult> {
    ensure_range("weight_kg", params.weight_kg, 1.0, 500.0)?;
    ensure_range("height_cm", params.height_cm, 30.0, 280.0)?;

    let height_m = params.height_cm / 100.0;
    let bmi = params.weight_kg / (height_m * height_m);
    let classification = match bmi {
        b if b < 18.5 => "Underweight",
        b if b < 25.0 => "Normal weight",
        b if b < 30.0 => "Overweight",
        b if b < 35.0 => "Obesity Class I",
        b if b < 40.0 => "Obesity Class II",
        _ => "Obesity Class III",
    };

    Ok(BmiResult {
        bmi: round1(bmi),
        classification,
        weight_kg: params.weight_kg,
        height_cm: params.height_cm,
    })
}

// ---------------------------------------------------------------------------
// CHA2DS2-VASc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Chads2VascParams {
    pub age: u32,
    pub sex: String,
    #[serde(default)]
    pub chf: bool,
    #[serde(default)]
    pub hypertension: bool,
    #[serde(default)]
    pub stroke_tia: bool,
    #[serde(default)]
    pub vascular_disease: bool,
    #[serde(default)]
    pub diabetes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chads2VascResult {
    pub score: u32,
    pub risk: &'static str,
    pub recommendation: &'static str,
}

pub fn calculate_chads2vasc(params: &Chads2VascParams) -> Result<Chads2VascResult> {
    ensure_range("age", params.age as f64, 0.0, 130.0)?;
    let sex: Sex = params.sex.parse()?;

    let age_points = match params.age {
        a if a >= 75 => 2,
        a if a >= 65 => 1,
        _ => 0,
    };
    let score = u32::from(params.chf)
        + u32::from(params.hypertension)
        + age_points
        + u32::from(params.diabetes)
        + 2 * u32::from(params.stroke_tia)
        + u32::from(params.vascular_disease)
        + u32::from(sex == Sex::Female);

    let (risk, recommendation) = match (score, sex) {
        (0, _) => ("Very low", "No antithrombotic therapy or consider aspirin"),
        (1, Sex::Male) => ("Low", "Consider oral anticoagulation or no therapy"),
        (1, Sex::Female) => ("Low", "Consider oral anticoagulation or aspirin"),
        _ => (
            "Moderate to High",
            "Oral anticoagulation recommended (DOACs preferred over warfarin)",
        ),
    };

    Ok(Chads2VascResult {
        score,
        risk,
        recommendation,
    })
}

// ---------------------------------------------------------------------------
// Framingham 10-year risk (ATP III, simplified points)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FraminghamParams {
    pub age: u32,
    pub sex: String,
    pub total_cholesterol: f64,
    pub hdl_cholesterol: f64,
    pub systolic_bp: f64,
    #[serde(default)]
    pub on_bp_meds: bool,
    #[serde(default)]
    pub smoker: bool,
    #[serde(default)]
    pub diabetes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraminghamResult {
    pub risk_percent: u32,
    pub category: &'static str,
    pub recommendation: &'static str,
    pub points: i32,
}

fn framingham_age_points(age: u32, sex: Sex) -> i32 {
    match sex {
        Sex::Male => match age {
            a if a < 35 => -1,
            a if a < 40 => 0,
            a if a < 45 => 1,
            a if a < 50 => 2,
            a if a < 55 => 3,
            a if a < 60 => 4,
            a if a < 65 => 5,
            a if a < 70 => 6,
            _ => 7,
        },
        Sex::Female => match age {
            a if a < 35 => -9,
            a if a < 40 => -4,
            a if a < 45 => 0,
            a if a < 50 => 3,
            a if a < 55 => 6,
            a if a < 60 => 7,
            _ => 8,
        },
    }
}

pub fn calculate_framingham(params: &FraminghamParams) -> Result<FraminghamResult> {
    ensure_range("age", params.age as f64, 20.0, 100.0)?;
    ensure_range("total_cholesterol", params.total_cholesterol, 50.0, 600.0)?;
    ensure_range("hdl_cholesterol", params.hdl_cholesterol, 5.0, 200.0)?;
    ensure_range("systolic_bp", params.systolic_bp, 60.0, 300.0)?;
    let sex: Sex = params.sex.parse()?;

    let mut points = framingham_age_points(params.age, sex);

    points += match params.total_cholesterol {
        c if c < 160.0 => 0,
        c if c < 200.0 => 1,
        c if c < 240.0 => 2,
        c if c < 280.0 => 3,
        _ => 4,
    };

    if params.hdl_cholesterol >= 60.0 {
        points -= 1;
    } else if params.hdl_cholesterol < 40.0 {
        points += 1;
    }

    let treated = i32::from(params.on_bp_meds);
    points += match params.systolic_bp {
        bp if bp < 120.0 => 0,
        bp if bp < 130.0 => treated,
        bp if bp < 140.0 => 1 + treated,
        bp if bp < 160.0 => 2 + treated,
        _ => 3 + treated,
    };

    if params.smoker {
        points += 2;
    }
    if params.diabetes {
        points += if sex == Sex::Male { 2 } else { 4 };
    }

    let risk_percent = match points {
        p if p < 0 => 1,
        p if p < 5 => 2,
        p if p < 10 => 6,
        p if p < 15 => 12,
        p if p < 20 => 20,
        _ => 30,
    };

    let (category, recommendation) = match risk_percent {
        r if r < 10 => (
            "Low risk",
            "Lifestyle modifications, consider statin if LDL >190 mg/dL",
        ),
        r if r < 20 => (
            "Moderate risk",
            "Lifestyle modifications + statin therapy recommended",
        ),
        _ => (
            "High risk",
            "Intensive lifestyle modifications + statin therapy + aspirin",
        ),
    };

    Ok(FraminghamResult {
        risk_percent,
        category,
        recommendation,
        points,
    })
}

// ---------------------------------------------------------------------------
// Wells score for DVT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WellsDvtParams {
    pub active_cancer: bool,
    pub paralysis_paresis: bool,
    pub recently_bedridden: bool,
    pub localized_tenderness: bool,
    pub entire_leg_swollen: bool,
    pub calf_swelling: bool,
    pub pitting_edema: bool,
    pub collateral_veins: bool,
    pub alternative_diagnosis: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellsDvtResult {
    pub score: i32,
    pub probability: &'static str,
    pub dvt_risk: &'static str,
    pub recommendation: &'static str,
}

pub fn calculate_wells_dvt(params: &WellsDvtParams) -> Result<WellsDvtResult> {
    let criteria = [
        params.active_cancer,
        params.paralysis_paresis,
        params.recently_bedridden,
        params.localized_tenderness,
        params.entire_leg_swollen,
        params.calf_swelling,
        params.pitting_edema,
        params.collateral_veins,
    ];
    let score = criteria.iter().filter(|c| **c).count() as i32
        - if params.alternative_diagnosis { 2 } else { 0 };

    let (probability, dvt_risk, recommendation) = match score {
        s if s <= 0 => (
            "Low",
            "~5%",
            "D-dimer; if negative, DVT excluded. If positive, ultrasound.",
        ),
        s if s <= 2 => (
            "Moderate",
            "~17%",
            "D-dimer + ultrasound. Consider ultrasound first.",
        ),
        _ => (
            "High",
            "~53%",
            "Ultrasound imaging recommended (skip D-dimer).",
        ),
    };

    Ok(WellsDvtResult {
        score,
        probability,
        dvt_risk,
        recommendation,
    })
}
