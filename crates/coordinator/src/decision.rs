//! Coordinator decision protocol.
//!
//! The coordinator model answers every turn with
//! `{"reasoning": "...", "actions": [...]}`. Actions are parsed one by one
//! so a single malformed action becomes an observation instead of
//! discarding the whole turn.

use crew_common::{ConsultationNote, Specialty, Urgency};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::json::parse_embedded;

/// One action requested by the coordinator model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorAction {
    ConsultSpecialist(ConsultRequest),
    Think { reflection: String },
    ConsultationComplete,
    DirectAnswer { answer: String },
}

/// Untyped consult request as written by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsultRequest {
    pub specialty: String,
    #[serde(default)]
    pub patient_context: String,
    pub clinical_question: String,
    #[serde(default)]
    pub expected_response: String,
    #[serde(default)]
    pub urgency: Option<String>,
}

impl ConsultRequest {
    /// Turn the request into a [`ConsultationNote`], rejecting specialties
    /// outside the fixed set or not enabled for this run.
    pub fn into_note(self, available: &[Specialty]) -> Result<ConsultationNote, String> {
        let specialty: Specialty = self.specialty.parse().map_err(|_| {
            format!(
                "Error: Especialidad desconocida '{}'. Especialidades válidas: {}",
                self.specialty,
                Specialty::catalog(available)
            )
        })?;
        if !available.contains(&specialty) {
            return Err(format!(
                "Error: La especialidad '{specialty}' no está disponible en esta sesión. \
                 Especialidades disponibles: {}",
                Specialty::catalog(available)
            ));
        }

        let urgency = match self.urgency.as_deref() {
            None => Urgency::default(),
            Some(raw) => raw.parse::<Urgency>().unwrap_or_else(|_| {
                warn!(urgency = %raw, "Unrecognized urgency, using routine");
                Urgency::default()
            }),
        };

        Ok(ConsultationNote::new(
            specialty,
            self.patient_context,
            self.clinical_question,
            self.expected_response,
            urgency,
        ))
    }
}

#[derive(Deserialize)]
struct RawTurn {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    actions: Vec<Value>,
}

/// A coordinator reply sorted into what the loop has to do with it.
#[derive(Debug, Clone, Default)]
pub struct TurnPlan {
    pub reasoning: String,
    pub consultations: Vec<ConsultationNote>,
    pub reflections: Vec<String>,
    /// Observations for actions that could not be accepted
    pub rejected: Vec<String>,
    pub complete: bool,
    pub direct_answer: Option<String>,
}

impl TurnPlan {
    pub fn from_reply(reply: &str, available: &[Specialty]) -> Self {
        let Ok(raw) = parse_embedded::<RawTurn>(reply) else {
            debug!("Coordinator reply carried no decision object");
            return Self {
                reasoning: reply.trim().to_string(),
                ..Self::default()
            };
        };

        let mut plan = Self {
            reasoning: raw.reasoning,
            ..Self::default()
        };
        for value in raw.actions {
            match serde_json::from_value::<CoordinatorAction>(value.clone()) {
                Ok(CoordinatorAction::ConsultSpecialist(request)) => {
                    match request.into_note(available) {
                        Ok(note) => plan.consultations.push(note),
                        Err(observation) => plan.rejected.push(observation),
                    }
                }
                Ok(CoordinatorAction::Think { reflection }) => plan.reflections.push(reflection),
                Ok(CoordinatorAction::ConsultationComplete) => plan.complete = true,
                Ok(CoordinatorAction::DirectAnswer { answer }) => {
                    plan.direct_answer.get_or_insert(answer);
                }
                Err(e) => {
                    warn!(error = %e, "Rejected malformed coordinator action");
                    plan.rejected
                        .push(format!("Error: Acción inválida {value}: {e}"));
                }
            }
        }
        plan
    }

    /// No directive of any kind: nothing to dispatch, acknowledge or finish.
    pub fn is_empty(&self) -> bool {
        self.consultations.is_empty()
            && self.reflections.is_empty()
            && self.rejected.is_empty()
            && !self.complete
            && self.direct_answer.is_none()
    }
}
