//! Common types and traits shared across the consultation crew crates.
//!
//! This crate holds the note model exchanged between the coordinator and
//! the specialists, the closed specialty set, transcript entries and the
//! markdown rendering of the final clinical record.

pub mod error;
pub mod message;
pub mod notes;
pub mod render;
pub mod specialty;
pub mod traits;

pub use error::{CrewError, Result};
pub use message::{MessageRole, TranscriptEntry};
pub use notes::{ClinicalRecord, ConsultationNote, CounterReferralNote};
pub use specialty::{EvidenceLevel, Specialty, Urgency};
pub use traits::SpecialistResponder;
