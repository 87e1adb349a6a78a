//! Capped, barrier-synchronized dispatch of consultation batches.

use std::panic::AssertUnwindSafe;

use crew_common::{ConsultationNote, CounterReferralNote, CrewError, Result, SpecialistResponder};
use futures::FutureExt;
use futures::future::try_join_all;

/// Split requests into the first `cap` accepted and the overflow.
pub fn split_batch<T>(mut requests: Vec<T>, cap: usize) -> (Vec<T>, Vec<T>) {
    let overflow = if requests.len() > cap {
        requests.split_off(cap)
    } else {
        Vec::new()
    };
    (requests, overflow)
}

/// Observation returned to the coordinator for a rejected request.
pub fn overflow_observation(cap: usize, note: &ConsultationNote) -> String {
    format!(
        "Error: No se ejecutó esta consulta porque se excedió el límite de {cap} consultas \
         concurrentes.\nEspecialidad solicitada: {}\nPregunta: {}",
        note.specialty, note.clinical_question
    )
}

/// Run every note through `responder` concurrently and wait for all of
/// them. Responses come back in request order. The first failure (an
/// error, a panic, or a response that does not answer its note) fails the
/// whole batch.
pub async fn dispatch_batch(
    responder: &dyn SpecialistResponder,
    notes: &[ConsultationNote],
) -> Result<Vec<CounterReferralNote>> {
    let runs = notes.iter().map(|note| async move {
        let response = AssertUnwindSafe(responder.respond(note))
            .catch_unwind()
            .await
            .map_err(|_| {
                CrewError::Dispatch(format!("{} specialist loop panicked", note.specialty))
            })??;
        if !response.answers(note) {
            return Err(CrewError::Dispatch(format!(
                "{} returned a response for consultation {} instead of {}",
                note.specialty, response.consultation_id, note.id
            )));
        }
        Ok(response)
    });
    try_join_all(runs).await
}
