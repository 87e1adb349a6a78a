//! Structured notes exchanged between the coordinator and the specialists.
//!
//! Notes are immutable once issued: nothing in the workflow mutates a note
//! after construction, it only clones or moves it.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EvidenceLevel, Result, Specialty, Urgency};

/// A request from the coordinator to one specialist (interconsulta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationNote {
    pub id: String,
    pub specialty: Specialty,
    pub patient_context: String,
    pub clinical_question: String,
    /// Deliverable the coordinator expects back
    pub expected_response: String,
    #[serde(default)]
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
}

impl ConsultationNote {
    pub fn new(
        specialty: Specialty,
        patient_context: impl Into<String>,
        clinical_question: impl Into<String>,
        expected_response: impl Into<String>,
        urgency: Urgency,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            specialty,
            patient_context: patient_context.into(),
            clinical_question: clinical_question.into(),
            expected_response: expected_response.into(),
            urgency,
            created_at: Utc::now(),
        }
    }

    /// Build a note from an untyped specialty name, rejecting names outside
    /// the fixed specialty set.
    pub fn parse(
        specialty: &str,
        patient_context: impl Into<String>,
        clinical_question: impl Into<String>,
        expected_response: impl Into<String>,
        urgency: Urgency,
    ) -> Result<Self> {
        let specialty: Specialty = specialty.parse()?;
        Ok(Self::new(
            specialty,
            patient_context,
            clinical_question,
            expected_response,
            urgency,
        ))
    }
}

/// A specialist's structured answer to one consultation (contrarreferencia).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterReferralNote {
    /// Id of the [`ConsultationNote`] this answers
    pub consultation_id: String,
    pub specialty: Specialty,
    pub clinical_assessment: String,
    pub recommendations: String,
    #[serde(default)]
    pub evidence_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_criteria_met: Option<IndexMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info_needed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_level: Option<EvidenceLevel>,
    pub created_at: DateTime<Utc>,
}

impl CounterReferralNote {
    /// A bare answer to `note`; optional sections are filled with the
    /// `with_*` builders.
    pub fn answering(
        note: &ConsultationNote,
        clinical_assessment: impl Into<String>,
        recommendations: impl Into<String>,
    ) -> Self {
        Self {
            consultation_id: note.id.clone(),
            specialty: note.specialty,
            clinical_assessment: clinical_assessment.into(),
            recommendations: recommendations.into(),
            evidence_used: Vec::new(),
            diagnostic_criteria_met: None,
            additional_info_needed: None,
            evidence_level: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence_used = evidence;
        self
    }

    pub fn with_criteria(mut self, criteria: IndexMap<String, bool>) -> Self {
        self.diagnostic_criteria_met = Some(criteria);
        self
    }

    pub fn with_additional_info(mut self, info: Vec<String>) -> Self {
        self.additional_info_needed = Some(info);
        self
    }

    pub fn with_evidence_level(mut self, level: EvidenceLevel) -> Self {
        self.evidence_level = Some(level);
        self
    }

    /// Whether this note answers `note`.
    pub fn answers(&self, note: &ConsultationNote) -> bool {
        self.consultation_id == note.id && self.specialty == note.specialty
    }
}

/// The terminal artifact of a consultation run (expediente clínico).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub case_id: String,
    pub original_question: String,
    pub coordinator_summary: String,
    pub consultations: Vec<(ConsultationNote, CounterReferralNote)>,
    pub integrated_response: String,
    /// Workflow error that forced an early finalization, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClinicalRecord {
    /// Short case identifier: the first eight characters of a UUID v4.
    pub fn new_case_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}
