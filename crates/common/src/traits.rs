//! Seam between the coordinator loop and whatever answers consultations.
//!
//! Defined here so that the coordinator and alternative specialist
//! runtimes (including test doubles) can share it without depending on
//! each other.

use async_trait::async_trait;

use crate::{ConsultationNote, CounterReferralNote, Result};

/// Produces exactly one counter-referral for a consultation.
///
/// Implementations absorb their own research and synthesis failures and
/// return a degraded note instead. An `Err` means the runtime itself broke
/// and is escalated by the coordinator.
#[async_trait]
pub trait SpecialistResponder: Send + Sync {
    async fn respond(&self, note: &ConsultationNote) -> Result<CounterReferralNote>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Specialty, Urgency};

    struct EchoSpecialist;

    #[async_trait]
    impl SpecialistResponder for EchoSpecialist {
        async fn respond(&self, note: &ConsultationNote) -> Result<CounterReferralNote> {
            Ok(CounterReferralNote::answering(
                note,
                format!("Evaluado: {}", note.clinical_question),
                "Sin cambios",
            ))
        }
    }

    #[tokio::test]
    async fn responder_answers_the_given_note() {
        let note = ConsultationNote::new(
            Specialty::Nutrition,
            "ctx",
            "¿Dieta hiposódica?",
            "plan",
            Urgency::Routine,
        );
        let responder: Box<dyn SpecialistResponder> = Box::new(EchoSpecialist);
        let response = responder.respond(&note).await.unwrap();
        assert!(response.answers(&note));
        assert_eq!(response.clinical_assessment, "Evaluado: ¿Dieta hiposódica?");
    }
}
