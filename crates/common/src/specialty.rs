//! Closed vocabularies: specialties, urgency and evidence levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CrewError;

/// One of the ten medical domains a consultation can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Cardiology,
    Pharmacology,
    Neurology,
    Emergency,
    Gynecology,
    InternalMedicine,
    Surgery,
    Nutrition,
    Prevention,
    Epidemiology,
}

impl Specialty {
    pub const ALL: [Specialty; 10] = [
        Specialty::Cardiology,
        Specialty::Pharmacology,
        Specialty::Neurology,
        Specialty::Emergency,
        Specialty::Gynecology,
        Specialty::InternalMedicine,
        Specialty::Surgery,
        Specialty::Nutrition,
        Specialty::Prevention,
        Specialty::Epidemiology,
    ];

    /// Wire identifier, also used as the knowledge base directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Cardiology => "cardiology",
            Specialty::Pharmacology => "pharmacology",
            Specialty::Neurology => "neurology",
            Specialty::Emergency => "emergency",
            Specialty::Gynecology => "gynecology",
            Specialty::InternalMedicine => "internal_medicine",
            Specialty::Surgery => "surgery",
            Specialty::Nutrition => "nutrition",
            Specialty::Prevention => "prevention",
            Specialty::Epidemiology => "epidemiology",
        }
    }

    /// Heading form used in rendered notes, e.g. `INTERNAL MEDICINE`.
    pub fn heading(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }

    /// Comma-separated wire identifiers of `specialties`.
    pub fn catalog(specialties: &[Specialty]) -> String {
        specialties
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Specialty {
    type Err = CrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|sp| sp.as_str() == normalized)
            .ok_or_else(|| CrewError::UnknownSpecialty(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Routine,
    Urgent,
    Emergency,
}

impl Urgency {
    pub fn badge(&self) -> &'static str {
        match self {
            Urgency::Routine => "🟢 RUTINA",
            Urgency::Urgent => "🟡 URGENTE",
            Urgency::Emergency => "🔴 EMERGENCIA",
        }
    }
}

impl FromStr for Urgency {
    type Err = CrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "routine" => Ok(Urgency::Routine),
            "urgent" => Ok(Urgency::Urgent),
            "emergency" => Ok(Urgency::Emergency),
            other => Err(CrewError::InvalidInput(format!(
                "urgency must be routine, urgent or emergency, got '{other}'"
            ))),
        }
    }
}

/// Quality rating of the evidence behind a recommendation, A best.
///
/// Ordering follows quality: `A > B > C > D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceLevel {
    A,
    B,
    C,
    D,
}

impl EvidenceLevel {
    fn rank(&self) -> u8 {
        match self {
            EvidenceLevel::A => 4,
            EvidenceLevel::B => 3,
            EvidenceLevel::C => 2,
            EvidenceLevel::D => 1,
        }
    }

    pub fn meets(&self, minimum: EvidenceLevel) -> bool {
        self.rank() >= minimum.rank()
    }

    pub fn badge(&self) -> &'static str {
        match self {
            EvidenceLevel::A => "🟢 Nivel A (Alta calidad)",
            EvidenceLevel::B => "🟡 Nivel B (Moderada calidad)",
            EvidenceLevel::C => "🟠 Nivel C (Baja calidad)",
            EvidenceLevel::D => "🔴 Nivel D (Muy baja calidad)",
        }
    }
}

impl PartialOrd for EvidenceLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvidenceLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            EvidenceLevel::A => "A",
            EvidenceLevel::B => "B",
            EvidenceLevel::C => "C",
            EvidenceLevel::D => "D",
        };
        f.write_str(letter)
    }
}

impl FromStr for EvidenceLevel {
    type Err = CrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(EvidenceLevel::A),
            "B" => Ok(EvidenceLevel::B),
            "C" => Ok(EvidenceLevel::C),
            "D" => Ok(EvidenceLevel::D),
            other => Err(CrewError::InvalidInput(format!(
                "evidence level must be one of A, B, C, D, got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ten_specialties_parse_from_wire_names() {
        for specialty in Specialty::ALL {
            let parsed: Specialty = specialty.as_str().parse().unwrap();
            assert_eq!(parsed, specialty);
        }
        assert_eq!(Specialty::ALL.len(), 10);
    }

    #[test]
    fn specialty_parse_is_lenient_on_case_and_separators() {
        assert_eq!(
            "Internal Medicine".parse::<Specialty>().unwrap(),
            Specialty::InternalMedicine
        );
        assert_eq!(
            "internal-medicine".parse::<Specialty>().unwrap(),
            Specialty::InternalMedicine
        );
    }

    #[test]
    fn unknown_specialty_is_rejected() {
        let err = "dermatology".parse::<Specialty>().unwrap_err();
        assert!(matches!(err, CrewError::UnknownSpecialty(ref s) if s == "dermatology"));
        assert!(err.to_string().contains("dermatology"));
    }

    #[test]
    fn specialty_serializes_snake_case() {
        let json = serde_json::to_string(&Specialty::InternalMedicine).unwrap();
        assert_eq!(json, "\"internal_medicine\"");
        assert!(serde_json::from_str::<Specialty>("\"oncology\"").is_err());
    }

    #[test]
    fn heading_replaces_underscores() {
        assert_eq!(Specialty::InternalMedicine.heading(), "INTERNAL MEDICINE");
        assert_eq!(Specialty::Cardiology.heading(), "CARDIOLOGY");
    }

    #[test]
    fn catalog_lists_given_specialties() {
        assert_eq!(
            Specialty::catalog(&[Specialty::Cardiology, Specialty::InternalMedicine]),
            "cardiology, internal_medicine"
        );
        assert!(Specialty::catalog(&Specialty::ALL).ends_with("epidemiology"));
    }

    #[test]
    fn urgency_defaults_to_routine() {
        assert_eq!(Urgency::default(), Urgency::Routine);
        assert_eq!("URGENT".parse::<Urgency>().unwrap(), Urgency::Urgent);
        assert!("asap".parse::<Urgency>().is_err());
    }

    #[test]
    fn evidence_levels_order_by_quality() {
        assert!(EvidenceLevel::A > EvidenceLevel::D);
        assert!(EvidenceLevel::B.meets(EvidenceLevel::C));
        assert!(!EvidenceLevel::D.meets(EvidenceLevel::C));
        assert!(EvidenceLevel::C.meets(EvidenceLevel::C));
        assert_eq!("b".parse::<EvidenceLevel>().unwrap(), EvidenceLevel::B);
    }
}
