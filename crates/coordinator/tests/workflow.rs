//! End-to-end tests of the consultation workflow with scripted models.
//!
//! No network: every model is a `ScriptedClient` replaying canned replies
//! and recording the requests it received.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crew_common::{
    ConsultationNote, CounterReferralNote, CrewError, Result, SpecialistResponder, Specialty,
};
use crew_coordinator::{
    ConsultationOutcome, Coordinator, RecordIntegrator, RoleModel, SpecialistLoop, WorkflowConfig,
};
use crew_llm::{LlmClient, LlmRequest, LlmResponse};
use crew_tools::{ToolServices, ToolsConfig};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All message contents of the `i`-th request, joined.
    fn request_text(&self, i: usize) -> String {
        self.requests.lock().unwrap()[i]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CrewError::Provider("script exhausted".into())))?;
        Ok(LlmResponse {
            content: reply,
            model: "scripted".into(),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Answers every consultation immediately and counts calls.
#[derive(Default)]
struct CountingSpecialist {
    calls: AtomicUsize,
    seen: Mutex<Vec<Specialty>>,
}

#[async_trait]
impl SpecialistResponder for CountingSpecialist {
    async fn respond(&self, note: &ConsultationNote) -> Result<CounterReferralNote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(note.specialty);
        Ok(CounterReferralNote::answering(
            note,
            format!("Evaluación de {}", note.specialty),
            "Recomendación",
        )
        .with_evidence(vec!["Guía clínica".into()]))
    }
}

struct FailingSpecialist;

#[async_trait]
impl SpecialistResponder for FailingSpecialist {
    async fn respond(&self, note: &ConsultationNote) -> Result<CounterReferralNote> {
        Err(CrewError::Dispatch(format!(
            "{} reasoning step failed: Provider error: 503",
            note.specialty
        )))
    }
}

fn model(client: &Arc<ScriptedClient>) -> RoleModel {
    RoleModel::new(client.clone(), Some(0.2), None)
}

fn coordinator(
    coordinator_client: &Arc<ScriptedClient>,
    integration_client: &Arc<ScriptedClient>,
    specialists: Arc<dyn SpecialistResponder>,
    workflow: WorkflowConfig,
) -> Coordinator {
    Coordinator::new(
        model(coordinator_client),
        specialists,
        RecordIntegrator::new(model(integration_client), 0.2),
        workflow,
    )
}

fn specialist_loop(client: &Arc<ScriptedClient>, workflow: &WorkflowConfig) -> SpecialistLoop {
    SpecialistLoop::new(
        model(client),
        workflow.clone(),
        ToolsConfig::default(),
        ToolServices::default(),
    )
}

const INTEGRATION_REPLY: &str =
    r#"{"coordinator_summary": "Resumen del médico general", "integrated_response": "Plan integrado"}"#;

const CONSULT_CARDIOLOGY: &str = r#"{"reasoning": "Necesito cardiología",
    "actions": [{"type": "consult_specialist", "specialty": "cardiology",
                 "patient_context": "Varón 75 años, FA, HTA, ICC",
                 "clinical_question": "¿Requiere anticoagulación?",
                 "expected_response": "Recomendación con nivel de evidencia",
                 "urgency": "urgent"}]}"#;

const COMPLETE: &str = r#"{"reasoning": "Tengo lo necesario", "actions": [{"type": "consultation_complete"}]}"#;

fn consult(specialty: &str) -> String {
    format!(
        r#"{{"type": "consult_specialist", "specialty": "{specialty}",
             "patient_context": "ctx", "clinical_question": "pregunta {specialty}",
             "expected_response": "respuesta"}}"#
    )
}

fn record(outcome: &ConsultationOutcome) -> &crew_common::ClinicalRecord {
    outcome.record().expect("expected a clinical record")
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn direct_answer_bypasses_specialists_and_record() {
    let gp = ScriptedClient::replying(&[
        r#"{"reasoning": "Pregunta simple",
            "actions": [{"type": "direct_answer", "answer": "Paracetamol 1 g cada 8 horas."}]}"#,
    ]);
    let integration = ScriptedClient::replying(&[]);
    let specialists = Arc::new(CountingSpecialist::default());

    let outcome = coordinator(&gp, &integration, specialists.clone(), WorkflowConfig::default())
        .consult("¿Analgésico en lumbalgia?")
        .await;

    assert!(matches!(outcome, ConsultationOutcome::DirectAnswer { .. }));
    assert_eq!(outcome.document(), "Paracetamol 1 g cada 8 horas.");
    assert_eq!(specialists.calls.load(Ordering::SeqCst), 0);
    assert_eq!(integration.request_count(), 0);
}

#[tokio::test]
async fn single_cardiology_consultation_end_to_end() {
    let workflow = WorkflowConfig::default();
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY, COMPLETE]);
    let cardio = ScriptedClient::replying(&[
        r#"{"reasoning": "Calculo CHA2DS2-VASc",
            "tool_calls": [{"name": "calculate_chads2vasc",
                            "arguments": {"age": 75, "sex": "male", "chf": true, "hypertension": true}}]}"#,
        r#"{"reasoning": "Suficiente", "tool_calls": []}"#,
        r#"{"clinical_assessment": "CHA2DS2-VASc de 4 puntos, riesgo moderado-alto",
            "recommendations": "Iniciar anticoagulación oral con apixabán",
            "evidence_used": ["2020 ESC Guidelines for Atrial Fibrillation"],
            "diagnostic_criteria_met": {"Fibrilación auricular documentada": true},
            "evidence_level": "A"}"#,
    ]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(specialist_loop(&cardio, &workflow)),
        workflow,
    )
    .consult("Varón de 75 años con FA: ¿anticoagular?")
    .await;

    let record = record(&outcome);
    assert_eq!(record.consultations.len(), 1);
    let (note, response) = &record.consultations[0];
    assert_eq!(note.specialty, Specialty::Cardiology);
    assert!(response.answers(note));
    assert!(response.clinical_assessment.contains("4 puntos"));
    assert_eq!(record.coordinator_summary, "Resumen del médico general");
    assert!(record.workflow_error.is_none());
    assert_eq!(record.case_id.len(), 8);

    let document = outcome.document();
    assert_eq!(document.matches("### Interconsulta ").count(), 1);
    assert_eq!(document.matches("### NOTA DE CONTRARREFERENCIA").count(), 1);
    assert!(document.contains("## RESPUESTA INTEGRADA\n\nPlan integrado"));
    assert!(document.contains("🟡 URGENTE"));

    // The calculator observation reached the specialist's second step.
    assert_eq!(cardio.request_count(), 3);
    let second_step = cardio.request_text(1);
    assert!(second_step.contains("[Observación: calculate_chads2vasc]"));
    assert!(second_step.contains("\"score\": 4"));

    // The counter-referral reached the coordinator's second turn.
    assert!(gp.request_text(1).contains("CONTRARREFERENCIA - CARDIOLOGY"));
}

#[tokio::test]
async fn exhausted_synthesis_yields_fallback_note_in_record() {
    let workflow = WorkflowConfig::default();
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY, COMPLETE]);
    let cardio = ScriptedClient::replying(&[
        "Sin herramientas necesarias.",
        "no es JSON",
        r#"{"clinical_assessment": "", "recommendations": "r", "evidence_used": ["x"]}"#,
        r#"{"clinical_assessment": "a", "recommendations": "r", "evidence_used": []}"#,
    ]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(specialist_loop(&cardio, &workflow)),
        workflow,
    )
    .consult("¿Anticoagular?")
    .await;

    let record = record(&outcome);
    assert_eq!(record.consultations.len(), 1);
    let (_, response) = &record.consultations[0];
    assert!(response
        .clinical_assessment
        .starts_with("Error al generar contrarreferencia:"));
    assert!(response.clinical_assessment.contains("no evidence cited"));
    assert_eq!(response.recommendations, "No se pudieron generar recomendaciones");
    assert!(response.evidence_used.is_empty());
    assert_eq!(cardio.request_count(), 4);
}

#[tokio::test]
async fn requests_beyond_cap_are_rejected_with_observation() {
    let workflow = WorkflowConfig {
        max_concurrent_consultations: 2,
        ..WorkflowConfig::default()
    };
    let batch = format!(
        r#"{{"reasoning": "Tres especialistas", "actions": [{}, {}, {}]}}"#,
        consult("cardiology"),
        consult("pharmacology"),
        consult("nutrition")
    );
    let gp = ScriptedClient::replying(&[&batch, COMPLETE]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);
    let specialists = Arc::new(CountingSpecialist::default());

    let outcome = coordinator(&gp, &integration, specialists.clone(), workflow)
        .consult("Caso complejo")
        .await;

    assert_eq!(specialists.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *specialists.seen.lock().unwrap(),
        vec![Specialty::Cardiology, Specialty::Pharmacology]
    );
    let second_turn = gp.request_text(1);
    assert!(second_turn.contains("se excedió el límite de 2 consultas concurrentes"));
    assert!(second_turn.contains("Especialidad solicitada: nutrition"));
    assert_eq!(record(&outcome).consultations.len(), 2);
}

#[tokio::test]
async fn turn_cap_forces_finalization() {
    let workflow = WorkflowConfig {
        max_coordinator_turns: 2,
        ..WorkflowConfig::default()
    };
    let think = r#"{"reasoning": "Dudo", "actions": [{"type": "think", "reflection": "Sigo pensando"}]}"#;
    let gp = ScriptedClient::replying(&[think, think, think, think]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(CountingSpecialist::default()),
        workflow,
    )
    .consult("¿Qué hago?")
    .await;

    assert_eq!(gp.request_count(), 2);
    assert!(gp
        .request_text(1)
        .contains("Razonamiento clínico registrado: Sigo pensando"));
    let record = record(&outcome);
    assert!(record.consultations.is_empty());
    assert!(record.workflow_error.is_none());
    assert!(outcome.document().contains("*No se realizaron interconsultas.*"));
}

#[tokio::test]
async fn reply_without_directive_finalizes() {
    let gp = ScriptedClient::replying(&["Creo que no necesito nada más."]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(CountingSpecialist::default()),
        WorkflowConfig::default(),
    )
    .consult("¿?")
    .await;

    assert_eq!(gp.request_count(), 1);
    assert_eq!(integration.request_count(), 1);
    assert!(record(&outcome).consultations.is_empty());
}

#[tokio::test]
async fn specialist_failure_escalates_to_finalization() {
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY, COMPLETE]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(FailingSpecialist),
        WorkflowConfig::default(),
    )
    .consult("¿Anticoagular?")
    .await;

    assert_eq!(gp.request_count(), 1);
    let record = record(&outcome);
    assert!(record.consultations.is_empty());
    assert!(record.workflow_error.as_deref().unwrap().contains("503"));
    assert!(outcome.document().contains("## INCIDENCIAS DEL FLUJO"));
}

#[tokio::test]
async fn failing_reasoning_step_is_a_dispatch_error() {
    let workflow = WorkflowConfig::default();
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY]);
    let cardio = ScriptedClient::new(vec![Err(CrewError::Provider("timed out".into()))]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(specialist_loop(&cardio, &workflow)),
        workflow,
    )
    .consult("¿Anticoagular?")
    .await;

    let error = record(&outcome).workflow_error.clone().unwrap();
    assert!(error.contains("cardiology reasoning step failed"));
}

#[tokio::test]
async fn unknown_specialty_is_fed_back_to_coordinator() {
    let first = format!(r#"{{"actions": [{}]}}"#, consult("dermatology"));
    let gp = ScriptedClient::replying(&[&first, COMPLETE]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);
    let specialists = Arc::new(CountingSpecialist::default());

    coordinator(&gp, &integration, specialists.clone(), WorkflowConfig::default())
        .consult("Lesión cutánea")
        .await;

    assert_eq!(specialists.calls.load(Ordering::SeqCst), 0);
    assert!(gp
        .request_text(1)
        .contains("Especialidad desconocida 'dermatology'"));
}

#[tokio::test]
async fn coordinator_model_failure_still_produces_record() {
    let gp = ScriptedClient::new(vec![Err(CrewError::Provider("401 Unauthorized".into()))]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(CountingSpecialist::default()),
        WorkflowConfig::default(),
    )
    .consult("¿?")
    .await;

    assert!(record(&outcome)
        .workflow_error
        .as_deref()
        .unwrap()
        .contains("401"));
}

#[tokio::test]
async fn integration_failure_keeps_consultations() {
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY, COMPLETE]);
    let integration = ScriptedClient::new(vec![Err(CrewError::Provider("overloaded".into()))]);

    let outcome = coordinator(
        &gp,
        &integration,
        Arc::new(CountingSpecialist::default()),
        WorkflowConfig::default(),
    )
    .consult("¿Anticoagular?")
    .await;

    let record = record(&outcome);
    assert_eq!(record.consultations.len(), 1);
    assert!(record
        .integrated_response
        .starts_with("No se pudo generar la síntesis integrada"));
}

#[tokio::test]
async fn reconsulting_a_specialty_keeps_latest_pair() {
    let again = format!(r#"{{"actions": [{}]}}"#, consult("cardiology"));
    let gp = ScriptedClient::replying(&[CONSULT_CARDIOLOGY, &again, COMPLETE]);
    let integration = ScriptedClient::replying(&[INTEGRATION_REPLY]);
    let specialists = Arc::new(CountingSpecialist::default());

    let outcome = coordinator(&gp, &integration, specialists.clone(), WorkflowConfig::default())
        .consult("¿Anticoagular?")
        .await;

    assert_eq!(specialists.calls.load(Ordering::SeqCst), 2);
    let record = record(&outcome);
    assert_eq!(record.consultations.len(), 1);
    assert_eq!(record.consultations[0].0.clinical_question, "pregunta cardiology");
}

#[tokio::test]
async fn specialist_iteration_cap_then_synthesis() {
    let workflow = WorkflowConfig {
        max_specialist_iterations: 2,
        ..WorkflowConfig::default()
    };
    let step = r#"{"tool_calls": [{"name": "think", "arguments": {"reflection": "revisar"}}]}"#;
    let neuro = ScriptedClient::replying(&[
        step,
        step,
        r#"{"clinical_assessment": "ictus isquémico", "recommendations": "trombólisis",
            "evidence_used": ["AHA/ASA 2019"]}"#,
    ]);
    let note = ConsultationNote::new(
        Specialty::Neurology,
        "Mujer 68 años, hemiparesia de 2 h",
        "¿Candidata a trombólisis?",
        "Conducta",
        crew_common::Urgency::Emergency,
    );

    let response = specialist_loop(&neuro, &workflow).run(&note).await.unwrap();

    assert_eq!(neuro.request_count(), 3);
    assert!(response.answers(&note));
    assert_eq!(response.clinical_assessment, "ictus isquémico");
    assert!(neuro
        .request_text(2)
        .contains("Razonamiento clínico registrado: revisar"));
}

#[tokio::test]
async fn excess_tool_calls_are_answered_with_error() {
    let workflow = WorkflowConfig {
        max_tool_calls_per_iteration: 1,
        max_specialist_iterations: 1,
        require_citations: false,
        ..WorkflowConfig::default()
    };
    let client = ScriptedClient::replying(&[
        r#"{"tool_calls": [
            {"name": "calculate_bmi", "arguments": {"weight_kg": 70, "height_cm": 170}},
            {"name": "calculate_bmi", "arguments": {"weight_kg": 70, "height_cm": 150}}]}"#,
        r#"{"clinical_assessment": "IMC normal", "recommendations": "mantener"}"#,
    ]);
    let note = ConsultationNote::new(
        Specialty::Nutrition,
        "ctx",
        "¿Estado nutricional?",
        "valoración",
        crew_common::Urgency::Routine,
    );

    specialist_loop(&client, &workflow).run(&note).await.unwrap();

    let synthesis = client.request_text(1);
    assert!(synthesis.contains("\"bmi\": 24.2"));
    assert!(synthesis.contains("se excedió el límite de 1 llamadas por iteración"));
    assert!(!synthesis.contains("\"bmi\": 31.1"));
}

#[tokio::test]
async fn failing_tool_calls_do_not_block_their_siblings() {
    let workflow = WorkflowConfig {
        max_specialist_iterations: 1,
        require_citations: false,
        ..WorkflowConfig::default()
    };
    let client = ScriptedClient::replying(&[
        r#"{"tool_calls": [
            {"name": "order_mri", "arguments": {"region": "cerebro"}},
            {"name": "calculate_bmi", "arguments": {"weight_kg": "setenta"}},
            {"name": "calculate_bmi", "arguments": {"weight_kg": 70, "height_cm": 170}}]}"#,
        r#"{"clinical_assessment": "IMC normal", "recommendations": "mantener"}"#,
    ]);
    let note = ConsultationNote::new(
        Specialty::Nutrition,
        "ctx",
        "¿Estado nutricional?",
        "valoración",
        crew_common::Urgency::Routine,
    );

    let response = specialist_loop(&client, &workflow).run(&note).await.unwrap();
    assert_eq!(response.clinical_assessment, "IMC normal");
    assert_eq!(client.request_count(), 2);

    let synthesis = client.request_text(1);
    let unknown = synthesis
        .find("Error: Unknown capability 'order_mri' for nutrition")
        .expect("unknown capability observation");
    let invalid = synthesis
        .find("Error executing calculate_bmi: Invalid input")
        .expect("bad arguments observation");
    let bmi = synthesis.find("\"bmi\": 24.2").expect("valid calculation");
    assert!(unknown < invalid && invalid < bmi);
}
