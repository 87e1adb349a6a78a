//! Record integration: pairs consultations with their answers and narrates
//! the final clinical record.

use std::collections::BTreeMap;

use chrono::Utc;
use crew_common::{
    ClinicalRecord, ConsultationNote, CounterReferralNote, Specialty, TranscriptEntry,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::json::parse_embedded;
use crate::models::RoleModel;
use crate::prompts;
use crate::state::WorkflowState;

/// Pair each issued note with the response that answers it, in issue order.
///
/// Notes without a response, and notes superseded by a later consultation
/// of the same specialty, are left out.
pub fn pair_consultations(
    notes: &[ConsultationNote],
    responses: &BTreeMap<Specialty, CounterReferralNote>,
) -> Vec<(ConsultationNote, CounterReferralNote)> {
    notes
        .iter()
        .filter_map(|note| match responses.get(&note.specialty) {
            Some(response) if response.answers(note) => Some((note.clone(), response.clone())),
            Some(_) => {
                warn!(
                    specialty = %note.specialty,
                    consultation_id = %note.id,
                    "Consultation superseded by a later one, omitted from the record"
                );
                None
            }
            None => {
                warn!(
                    specialty = %note.specialty,
                    consultation_id = %note.id,
                    "Consultation without response, omitted from the record"
                );
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct IntegrationReply {
    #[serde(default)]
    coordinator_summary: String,
    #[serde(default)]
    integrated_response: String,
}

/// Split an integration reply into (summary, integrated response).
fn narratives(reply: &str) -> (String, String) {
    let text = reply.trim();
    match parse_embedded::<IntegrationReply>(text) {
        Ok(parsed) => {
            let or_text = |s: String| {
                if s.trim().is_empty() {
                    text.to_string()
                } else {
                    s
                }
            };
            (
                or_text(parsed.coordinator_summary),
                or_text(parsed.integrated_response),
            )
        }
        Err(_) => (text.to_string(), text.to_string()),
    }
}

/// Builds the terminal [`ClinicalRecord`].
#[derive(Clone)]
pub struct RecordIntegrator {
    model: RoleModel,
    temperature: f32,
}

impl RecordIntegrator {
    pub fn new(model: RoleModel, temperature: f32) -> Self {
        Self { model, temperature }
    }

    /// Never fails: a failing model call yields explanatory narratives.
    pub async fn integrate(&self, state: &WorkflowState) -> ClinicalRecord {
        let consultations = pair_consultations(state.notes(), state.responses());
        let prompt = prompts::integration_prompt(&prompts::today(), &state.question, &consultations);

        let (coordinator_summary, integrated_response) = match self
            .model
            .complete_with_temperature(
                prompts::INTEGRATION_SYSTEM_PROMPT,
                &[TranscriptEntry::user(prompt)],
                self.temperature,
            )
            .await
        {
            Ok(reply) => narratives(&reply),
            Err(e) => {
                warn!(error = %e, "Record integration call failed");
                let message = format!(
                    "No se pudo generar la síntesis integrada: {e}. \
                     Consulte las interconsultas incluidas en este expediente."
                );
                (message.clone(), message)
            }
        };

        let record = ClinicalRecord {
            case_id: ClinicalRecord::new_case_id(),
            original_question: state.question.clone(),
            coordinator_summary,
            consultations,
            integrated_response,
            workflow_error: state.error.clone(),
            created_at: Utc::now(),
        };
        info!(
            case_id = %record.case_id,
            consultations = record.consultations.len(),
            issued = state.notes().len(),
            "Clinical record assembled"
        );
        record
    }
}
