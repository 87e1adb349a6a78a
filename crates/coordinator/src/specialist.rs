//! Specialist loop: bounded research followed by a retried synthesis.

use async_trait::async_trait;
use crew_common::{
    ConsultationNote, CounterReferralNote, CrewError, EvidenceLevel, Result, SpecialistResponder,
    TranscriptEntry,
};
use crew_tools::{ToolCall, ToolGateway, ToolServices, ToolsConfig};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::json::parse_embedded;
use crate::models::RoleModel;
use crate::prompts;
use crate::retry::{Attempted, retry_with_fallback};
use crate::state::SpecialistState;

/// One parsed research step.
#[derive(Debug, Default)]
struct SpecialistStep {
    calls: Vec<ToolCall>,
    /// Observations for tool calls that could not be parsed
    invalid: Vec<String>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    tool_calls: Vec<Value>,
}

impl SpecialistStep {
    fn parse(reply: &str) -> Self {
        let Ok(raw) = parse_embedded::<RawStep>(reply) else {
            return Self::default();
        };

        let mut step = Self::default();
        for value in raw.tool_calls {
            match serde_json::from_value::<ToolCall>(value.clone()) {
                Ok(call) => step.calls.push(call),
                Err(e) => step
                    .invalid
                    .push(format!("Error: llamada a herramienta inválida {value}: {e}")),
            }
        }
        step
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl Default for TextOrList {
    fn default() -> Self {
        TextOrList::Text(String::new())
    }
}

impl TextOrList {
    fn into_text(self) -> String {
        match self {
            TextOrList::Text(text) => text,
            TextOrList::List(items) => items
                .iter()
                .map(|item| format!("- {item}"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Deserialize)]
struct SynthesisReply {
    #[serde(default)]
    clinical_assessment: TextOrList,
    #[serde(default)]
    recommendations: TextOrList,
    #[serde(default)]
    evidence_used: Vec<String>,
    #[serde(default)]
    diagnostic_criteria_met: Option<IndexMap<String, bool>>,
    #[serde(default)]
    additional_info_needed: Option<Vec<String>>,
    #[serde(default)]
    evidence_level: Option<String>,
}

/// Parse and validate a synthesis reply into a note answering `note`.
///
/// The consultation id and specialty always come from `note`.
pub fn parse_counter_referral(
    reply: &str,
    note: &ConsultationNote,
    min_evidence: EvidenceLevel,
    require_citations: bool,
) -> Result<CounterReferralNote> {
    let parsed: SynthesisReply = parse_embedded(reply)
        .map_err(|e| CrewError::Synthesis(format!("unparsable counter-referral: {e}")))?;

    let assessment = parsed.clinical_assessment.into_text();
    let recommendations = parsed.recommendations.into_text();
    if assessment.trim().is_empty() {
        return Err(CrewError::Synthesis("clinical_assessment is empty".into()));
    }
    if recommendations.trim().is_empty() {
        return Err(CrewError::Synthesis("recommendations are empty".into()));
    }
    let evidence: Vec<String> = parsed
        .evidence_used
        .into_iter()
        .filter(|e| !e.trim().is_empty())
        .collect();
    if require_citations && evidence.is_empty() {
        return Err(CrewError::Synthesis("no evidence cited".into()));
    }

    let mut response = CounterReferralNote::answering(note, assessment, recommendations)
        .with_evidence(evidence);
    if let Some(criteria) = parsed.diagnostic_criteria_met {
        response = response.with_criteria(criteria);
    }
    if let Some(info) = parsed.additional_info_needed.filter(|i| !i.is_empty()) {
        response = response.with_additional_info(info);
    }
    match parsed.evidence_level.as_deref().map(str::parse::<EvidenceLevel>) {
        Some(Ok(level)) => {
            if !level.meets(min_evidence) {
                warn!(
                    specialty = %note.specialty,
                    level = %level,
                    minimum = %min_evidence,
                    "Counter-referral evidence below configured minimum"
                );
            }
            response = response.with_evidence_level(level);
        }
        Some(Err(e)) => warn!(specialty = %note.specialty, error = %e, "Ignoring evidence level"),
        None => {}
    }
    Ok(response)
}

/// Degraded note returned when every synthesis attempt failed.
pub fn fallback_counter_referral(note: &ConsultationNote, error: &CrewError) -> CounterReferralNote {
    CounterReferralNote::answering(
        note,
        format!("Error al generar contrarreferencia: {error}"),
        "No se pudieron generar recomendaciones",
    )
}

fn tool_limit_observation(limit: usize) -> String {
    format!(
        "Error: herramienta no ejecutada: se excedió el límite de {limit} llamadas por iteración"
    )
}

/// Runs one consultation end to end for any specialty.
#[derive(Clone)]
pub struct SpecialistLoop {
    model: RoleModel,
    workflow: WorkflowConfig,
    tools: ToolsConfig,
    services: ToolServices,
}

impl SpecialistLoop {
    pub fn new(
        model: RoleModel,
        workflow: WorkflowConfig,
        tools: ToolsConfig,
        services: ToolServices,
    ) -> Self {
        Self {
            model,
            workflow,
            tools,
            services,
        }
    }

    /// Research `note` and produce its counter-referral.
    ///
    /// Tool failures become observations and synthesis failures end in a
    /// fallback note; only a failing reasoning-step model call is returned
    /// as an error.
    pub async fn run(&self, note: &ConsultationNote) -> Result<CounterReferralNote> {
        let gateway = ToolGateway::for_specialty(note.specialty, &self.tools, self.services.clone());
        let system =
            prompts::specialist_system_prompt(note.specialty, &prompts::today(), &gateway.describe());
        let mut state = SpecialistState::new(note.clone(), prompts::consultation_request(note));
        let limit = self.workflow.max_tool_calls_per_iteration.max(1);

        info!(
            specialty = %note.specialty,
            consultation_id = %note.id,
            model = %self.model.model_name(),
            "Specialist consultation started"
        );

        let research_finished = self.research(&gateway, &system, &mut state, limit).await?;
        if !research_finished {
            debug!(
                specialty = %note.specialty,
                iterations = state.iterations,
                "Iteration cap reached, synthesizing with gathered observations"
            );
        }

        let outcome = self.synthesize(&state).await;
        if let Some(error) = outcome.last_error() {
            warn!(
                specialty = %note.specialty,
                consultation_id = %note.id,
                error = %error,
                "Synthesis exhausted, returning fallback counter-referral"
            );
        }
        info!(
            specialty = %note.specialty,
            consultation_id = %note.id,
            iterations = state.iterations,
            tool_calls = state.tool_calls,
            synthesis_attempts = outcome.attempts(),
            fallback = outcome.is_fallback(),
            "Specialist consultation finished"
        );
        Ok(outcome.into_value())
    }

    /// Reasoning steps with tool execution until the model stops calling
    /// tools or the iteration cap is hit. Returns `true` when the model
    /// ended the research itself.
    async fn research(
        &self,
        gateway: &ToolGateway,
        system: &str,
        state: &mut SpecialistState,
        limit: usize,
    ) -> Result<bool> {
        while state.iterations < self.workflow.max_specialist_iterations {
            state.iterations += 1;
            let reply = self
                .model
                .complete(system, &state.transcript)
                .await
                .map_err(|e| {
                    CrewError::Dispatch(format!("{} reasoning step failed: {e}", state.note.specialty))
                })?;
            let mut step = SpecialistStep::parse(&reply);
            state.transcript.push(TranscriptEntry::assistant(reply));

            for observation in step.invalid.drain(..) {
                state.transcript.push(TranscriptEntry::tool("tool_call", observation));
            }
            if step.calls.is_empty() {
                debug!(
                    specialty = %state.note.specialty,
                    iteration = state.iterations,
                    "Research finished"
                );
                return Ok(true);
            }

            let skipped = if step.calls.len() > limit {
                step.calls.split_off(limit)
            } else {
                Vec::new()
            };
            debug!(
                specialty = %state.note.specialty,
                iteration = state.iterations,
                calls = step.calls.len(),
                skipped = skipped.len(),
                "Executing tool calls"
            );

            let observations = join_all(step.calls.iter().map(|call| gateway.invoke(call))).await;
            for (call, observation) in step.calls.iter().zip(observations) {
                state.transcript.push(TranscriptEntry::tool(&call.name, observation));
            }
            for call in &skipped {
                state
                    .transcript
                    .push(TranscriptEntry::tool(&call.name, tool_limit_observation(limit)));
            }
            state.tool_calls += step.calls.len();
        }
        Ok(false)
    }

    async fn synthesize(&self, state: &SpecialistState) -> Attempted<CounterReferralNote> {
        let note = &state.note;
        let prompt = prompts::synthesis_prompt(
            note,
            &state.research_log(),
            self.workflow.min_evidence_level,
            self.workflow.require_citations,
        );
        let request = [TranscriptEntry::user(prompt)];
        let request = &request;
        let model = &self.model;
        let workflow = &self.workflow;

        retry_with_fallback(
            self.workflow.synthesis_attempts,
            move |attempt| async move {
                debug!(specialty = %note.specialty, attempt, "Synthesizing counter-referral");
                let reply = model
                    .complete_with_temperature(
                        prompts::SYNTHESIS_SYSTEM_PROMPT,
                        request,
                        workflow.synthesis_temperature,
                    )
                    .await?;
                parse_counter_referral(
                    &reply,
                    note,
                    workflow.min_evidence_level,
                    workflow.require_citations,
                )
            },
            |error| fallback_counter_referral(note, error),
        )
        .await
    }
}

#[async_trait]
impl SpecialistResponder for SpecialistLoop {
    async fn respond(&self, note: &ConsultationNote) -> Result<CounterReferralNote> {
        self.run(note).await
    }
}
