//! Coordinator loop: the consultation state machine.
//!
//! ```text
//!            consult requests            batch aggregated
//! DECIDING ─────────────────► DISPATCHING ───────────────► DECIDING
//!    │  completion / turn cap / no directive / dispatch error
//!    ├──────────────────────────────────► FINALIZING ──► DONE (record)
//!    │  direct answer
//!    └──────────────────────────────────────────────────► DONE (answer)
//! ```

use std::sync::Arc;

use crew_common::render::{coordinator_observation, record_markdown};
use crew_common::{ClinicalRecord, ConsultationNote, Result, SpecialistResponder, TranscriptEntry};
use crew_tools::ToolServices;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{CrewConfig, WorkflowConfig};
use crate::decision::TurnPlan;
use crate::dispatch::{dispatch_batch, overflow_observation, split_batch};
use crate::integration::RecordIntegrator;
use crate::models::RoleModel;
use crate::prompts;
use crate::specialist::SpecialistLoop;
use crate::state::WorkflowState;

const CONSULT_TOOL: &str = "consult_specialist";
const THINK_TOOL: &str = "think";

/// What a consultation run hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsultationOutcome {
    DirectAnswer { answer: String },
    Record { record: ClinicalRecord, document: String },
}

impl ConsultationOutcome {
    /// User-visible text: the answer verbatim, or the rendered record.
    pub fn document(&self) -> &str {
        match self {
            ConsultationOutcome::DirectAnswer { answer } => answer,
            ConsultationOutcome::Record { document, .. } => document,
        }
    }

    pub fn record(&self) -> Option<&ClinicalRecord> {
        match self {
            ConsultationOutcome::Record { record, .. } => Some(record),
            ConsultationOutcome::DirectAnswer { .. } => None,
        }
    }
}

enum Phase {
    Deciding,
    Dispatching(Vec<ConsultationNote>),
    Finalizing,
    Done(ConsultationOutcome),
}

pub struct Coordinator {
    model: RoleModel,
    specialists: Arc<dyn SpecialistResponder>,
    integrator: RecordIntegrator,
    workflow: WorkflowConfig,
}

impl Coordinator {
    pub fn new(
        model: RoleModel,
        specialists: Arc<dyn SpecialistResponder>,
        integrator: RecordIntegrator,
        workflow: WorkflowConfig,
    ) -> Self {
        Self {
            model,
            specialists,
            integrator,
            workflow,
        }
    }

    /// Build the coordinator, the specialist loop and the integrator from
    /// configuration. Integration runs on the coordinator model.
    pub fn from_config(config: &CrewConfig, services: ToolServices) -> Result<Self> {
        let coordinator_model = RoleModel::from_config(&config.coordinator)?;
        let specialist_model = RoleModel::from_config(&config.specialist)?;
        info!(
            coordinator = %coordinator_model.model_name(),
            specialist = %specialist_model.model_name(),
            specialties = config.workflow.available_specialties.len(),
            "Initializing consultation crew"
        );

        let specialists = SpecialistLoop::new(
            specialist_model,
            config.workflow.clone(),
            config.tools.clone(),
            services,
        );
        let integrator = RecordIntegrator::new(
            coordinator_model.clone(),
            config.workflow.integration_temperature,
        );
        Ok(Self::new(
            coordinator_model,
            Arc::new(specialists),
            integrator,
            config.workflow.clone(),
        ))
    }

    /// Run one consultation to completion. Always terminates with a direct
    /// answer or a clinical record; internal failures end up in the record.
    pub async fn consult(&self, question: &str) -> ConsultationOutcome {
        let mut state = WorkflowState::new(question);
        let mut phase = Phase::Deciding;
        info!(question_chars = question.len(), "Consultation started");

        loop {
            phase = match phase {
                Phase::Deciding => self.decide(&mut state).await,
                Phase::Dispatching(notes) => self.dispatch(&mut state, notes).await,
                Phase::Finalizing => Phase::Done(self.finalize(&state).await),
                Phase::Done(outcome) => {
                    info!(
                        turns = state.iterations,
                        consultations = state.notes().len(),
                        direct = outcome.record().is_none(),
                        "Consultation finished"
                    );
                    return outcome;
                }
            };
        }
    }

    async fn decide(&self, state: &mut WorkflowState) -> Phase {
        if state.iterations >= self.workflow.max_coordinator_turns {
            info!(
                turns = state.iterations,
                max = self.workflow.max_coordinator_turns,
                "Coordinator turn cap reached, finalizing"
            );
            return Phase::Finalizing;
        }
        state.iterations += 1;

        let system = prompts::coordinator_system_prompt(
            &prompts::today(),
            &self.workflow.available_specialties,
            self.workflow.max_concurrent_consultations,
            &state.pending_consultations(),
        );
        let reply = match self.model.complete(&system, state.transcript()).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(turn = state.iterations, error = %e, "Coordinator decision failed");
                state.record_error(format!("El coordinador no pudo completar su decisión: {e}"));
                return Phase::Finalizing;
            }
        };

        let plan = TurnPlan::from_reply(&reply, &self.workflow.available_specialties);
        state.observe(TranscriptEntry::assistant(reply));
        info!(
            turn = state.iterations,
            consultations = plan.consultations.len(),
            reflections = plan.reflections.len(),
            rejected = plan.rejected.len(),
            complete = plan.complete,
            direct = plan.direct_answer.is_some(),
            "Coordinator decision"
        );

        if plan.is_empty() {
            warn!(turn = state.iterations, "Coordinator gave no directive, finalizing");
            return Phase::Finalizing;
        }
        if plan.complete {
            return Phase::Finalizing;
        }
        if let Some(answer) = plan.direct_answer {
            return Phase::Done(ConsultationOutcome::DirectAnswer { answer });
        }

        for reflection in plan.reflections {
            state.observe(TranscriptEntry::tool(
                THINK_TOOL,
                format!("Razonamiento clínico registrado: {reflection}"),
            ));
        }
        for observation in plan.rejected {
            state.observe(TranscriptEntry::tool(CONSULT_TOOL, observation));
        }

        if plan.consultations.is_empty() {
            Phase::Deciding
        } else {
            Phase::Dispatching(plan.consultations)
        }
    }

    async fn dispatch(&self, state: &mut WorkflowState, notes: Vec<ConsultationNote>) -> Phase {
        let cap = self.workflow.max_concurrent_consultations;
        let (accepted, overflow) = split_batch(notes, cap);
        if !overflow.is_empty() {
            warn!(
                accepted = accepted.len(),
                rejected = overflow.len(),
                cap,
                "Consultation batch exceeds concurrency cap"
            );
        }

        for note in &accepted {
            info!(
                specialty = %note.specialty,
                consultation_id = %note.id,
                urgency = ?note.urgency,
                "Consultation issued"
            );
            state.issue(note.clone());
        }

        match dispatch_batch(self.specialists.as_ref(), &accepted).await {
            Ok(responses) => {
                for response in responses {
                    state.observe(TranscriptEntry::tool(
                        CONSULT_TOOL,
                        coordinator_observation(&response),
                    ));
                    state.merge_response(response);
                }
            }
            Err(e) => {
                error!(error = %e, "Consultation batch failed, finalizing");
                state.record_error(e.to_string());
                return Phase::Finalizing;
            }
        }

        for note in &overflow {
            state.observe(TranscriptEntry::tool(CONSULT_TOOL, overflow_observation(cap, note)));
        }
        Phase::Deciding
    }

    async fn finalize(&self, state: &WorkflowState) -> ConsultationOutcome {
        let record = self.integrator.integrate(state).await;
        let document = record_markdown(&record);
        ConsultationOutcome::Record { record, document }
    }
}
