//! Workflow state and its reducers.
//!
//! The coordinator loop owns a single [`WorkflowState`] and mutates it only
//! between suspension points, after a dispatch batch has fully completed.
//! Specialist loops never touch it: each works on a private
//! [`SpecialistState`] and hands back one response that the coordinator
//! merges.

use std::collections::BTreeMap;

use crew_common::{ConsultationNote, CounterReferralNote, Specialty, TranscriptEntry};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub question: String,
    /// Every consultation issued, in issue order. Append-only.
    notes: Vec<ConsultationNote>,
    /// Latest response per specialty. Later merges overwrite earlier ones.
    responses: BTreeMap<Specialty, CounterReferralNote>,
    /// Coordinator conversation
    transcript: Vec<TranscriptEntry>,
    pub iterations: u32,
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            transcript: vec![TranscriptEntry::user(question.clone())],
            question,
            notes: Vec::new(),
            responses: BTreeMap::new(),
            iterations: 0,
            error: None,
        }
    }

    pub fn notes(&self) -> &[ConsultationNote] {
        &self.notes
    }

    pub fn responses(&self) -> &BTreeMap<Specialty, CounterReferralNote> {
        &self.responses
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn issue(&mut self, note: ConsultationNote) {
        self.notes.push(note);
    }

    /// Merge a response under its specialty, returning the one it replaced.
    pub fn merge_response(&mut self, response: CounterReferralNote) -> Option<CounterReferralNote> {
        let previous = self.responses.insert(response.specialty, response);
        if let Some(previous) = &previous {
            warn!(
                specialty = %previous.specialty,
                superseded = %previous.consultation_id,
                "Specialty consulted again, keeping the latest response"
            );
        }
        previous
    }

    pub fn observe(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    /// Record a workflow error. The first error wins; later ones are logged.
    pub fn record_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        match &self.error {
            Some(existing) => warn!(existing = %existing, error = %error, "Additional workflow error"),
            None => self.error = Some(error),
        }
    }

    /// Issued consultations with no response answering them.
    pub fn pending_consultations(&self) -> Vec<&ConsultationNote> {
        self.notes
            .iter()
            .filter(|note| {
                !self
                    .responses
                    .get(&note.specialty)
                    .is_some_and(|response| response.answers(note))
            })
            .collect()
    }
}

/// Private state of one specialist loop.
#[derive(Debug, Clone)]
pub struct SpecialistState {
    pub note: ConsultationNote,
    pub transcript: Vec<TranscriptEntry>,
    pub iterations: u32,
    pub tool_calls: usize,
}

impl SpecialistState {
    pub fn new(note: ConsultationNote, opening: impl Into<String>) -> Self {
        Self {
            note,
            transcript: vec![TranscriptEntry::user(opening)],
            iterations: 0,
            tool_calls: 0,
        }
    }

    /// The specialist's own reasoning and the observations it gathered,
    /// without the opening request.
    pub fn research_log(&self) -> String {
        self.transcript
            .iter()
            .skip(1)
            .map(TranscriptEntry::as_prompt_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
