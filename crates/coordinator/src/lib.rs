//! Orchestration of a multi-agent clinical consultation.
//!
//! A coordinating general practitioner triages the question, delegates to
//! specialist loops that research with their capabilities, and the record
//! integrator merges everything into one clinical record.
//!
//! # Architecture
//!
//! ```text
//! Clinical question
//!        │
//!        ▼
//! ┌──────────────────┐   direct answer
//! │   Coordinator    │ ───────────────────► answer text
//! │   (this crate)   │
//! └────────┬─────────┘
//!          │ ≤ K consultations per turn, awaited together
//!    ┌─────┴──────┬────────────┐
//!    ▼            ▼            ▼
//! [Cardiology] [Pharmacology] [...]   SpecialistLoop + ToolGateway
//!    │            │            │
//!    └─────┬──────┴────────────┘
//!          ▼ counter-referrals
//!   RecordIntegrator ──► ClinicalRecord ──► markdown document
//! ```

pub mod config;
pub mod coordinator;
pub mod decision;
pub mod dispatch;
pub mod integration;
pub mod json;
pub mod models;
pub mod prompts;
pub mod retry;
pub mod specialist;
pub mod state;

pub use config::{CrewConfig, WorkflowConfig};
pub use coordinator::{ConsultationOutcome, Coordinator};
pub use decision::{CoordinatorAction, ConsultRequest, TurnPlan};
pub use integration::{RecordIntegrator, pair_consultations};
pub use models::RoleModel;
pub use retry::{Attempted, retry_with_fallback};
pub use specialist::SpecialistLoop;
pub use state::{SpecialistState, WorkflowState};
