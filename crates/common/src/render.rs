//! Markdown rendering of notes and of the final clinical record.
//!
//! The document is Spanish-language; labels here are part of the output
//! format and are matched by downstream readers.

use std::fmt::Write;

use crate::{ClinicalRecord, ConsultationNote, CounterReferralNote};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
const DOCUMENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FOOTER: &str = "*Este expediente clínico fue generado por Clinical Research Crew, \
un sistema multiagente de apoyo a decisiones clínicas basado en evidencia.*";

/// Request block (nota de interconsulta).
pub fn consultation_markdown(note: &ConsultationNote) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### NOTA DE INTERCONSULTA - {}\n", note.specialty.heading());
    let _ = writeln!(out, "**ID de Consulta:** `{}`  ", note.id);
    let _ = writeln!(out, "**Urgencia:** {}  ", note.urgency.badge());
    let _ = writeln!(out, "**Fecha:** {}\n", note.created_at.format(DATE_FORMAT));
    let _ = writeln!(out, "#### Contexto del Paciente\n{}\n", note.patient_context);
    let _ = writeln!(out, "#### Pregunta Clínica\n{}\n", note.clinical_question);
    let _ = writeln!(out, "#### Respuesta Esperada\n{}\n", note.expected_response);
    out.push_str("---\n");
    out
}

/// Response block (nota de contrarreferencia).
pub fn counter_referral_markdown(note: &CounterReferralNote) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "### NOTA DE CONTRARREFERENCIA - {}\n",
        note.specialty.heading()
    );
    let _ = writeln!(out, "**ID de Consulta:** `{}`  ", note.consultation_id);
    let _ = writeln!(out, "**Fecha:** {}  ", note.created_at.format(DATE_FORMAT));
    if let Some(level) = note.evidence_level {
        let _ = writeln!(out, "**Nivel de Evidencia:** {}", level.badge());
    }
    out.push('\n');

    let _ = writeln!(out, "#### Evaluación Clínica\n{}\n", note.clinical_assessment);
    let _ = writeln!(out, "#### Recomendaciones\n{}\n", note.recommendations);

    if let Some(criteria) = note.diagnostic_criteria_met.as_ref().filter(|c| !c.is_empty()) {
        out.push_str("#### Criterios Diagnósticos Evaluados\n");
        for (criterion, met) in criteria {
            let mark = if *met { "✅" } else { "❌" };
            let _ = writeln!(out, "- {mark} {criterion}");
        }
        out.push('\n');
    }

    if let Some(info) = note.additional_info_needed.as_ref().filter(|i| !i.is_empty()) {
        out.push_str("#### Información Adicional Requerida\n");
        for item in info {
            let _ = writeln!(out, "- {item}");
        }
        out.push('\n');
    }

    if !note.evidence_used.is_empty() {
        out.push_str("#### Referencias y Evidencia Utilizada\n");
        for (i, citation) in note.evidence_used.iter().enumerate() {
            let _ = writeln!(out, "{}. {citation}", i + 1);
        }
        out.push('\n');
    }

    out.push_str("---\n");
    out
}

/// Condensed form of a response fed back to the coordinator as an
/// observation after a dispatch batch.
pub fn coordinator_observation(note: &CounterReferralNote) -> String {
    let evidence = if note.evidence_used.is_empty() {
        "- Ninguna".to_string()
    } else {
        note.evidence_used
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let criteria = match &note.diagnostic_criteria_met {
        Some(c) if !c.is_empty() => c
            .iter()
            .map(|(k, v)| format!("{k}: {}", if *v { "sí" } else { "no" }))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "No evaluados".to_string(),
    };
    let additional = match &note.additional_info_needed {
        Some(i) if !i.is_empty() => i.join("; "),
        _ => "Ninguna".to_string(),
    };
    let level = note
        .evidence_level
        .map(|l| l.to_string())
        .unwrap_or_else(|| "No especificado".to_string());

    format!(
        "CONTRARREFERENCIA - {}\n\n\
         Evaluación Clínica:\n{}\n\n\
         Recomendaciones:\n{}\n\n\
         Nivel de Evidencia: {level}\n\n\
         Evidencia Utilizada:\n{evidence}\n\n\
         Criterios Diagnósticos: {criteria}\n\n\
         Información Adicional Necesaria: {additional}",
        note.specialty.heading(),
        note.clinical_assessment,
        note.recommendations,
    )
}

/// Full clinical record document.
pub fn record_markdown(record: &ClinicalRecord) -> String {
    let mut out = String::new();
    out.push_str("# EXPEDIENTE CLÍNICO\n\n");
    let _ = writeln!(out, "**ID de Caso:** `{}`  ", record.case_id);
    let _ = writeln!(
        out,
        "**Fecha de Generación:** {}\n",
        record.created_at.format(DOCUMENT_DATE_FORMAT)
    );
    out.push_str("---\n\n");

    let _ = writeln!(out, "## PREGUNTA CLÍNICA ORIGINAL\n\n{}\n", record.original_question);
    out.push_str("---\n\n");

    let _ = writeln!(out, "## NOTA DEL MÉDICO GENERAL\n\n{}\n", record.coordinator_summary);
    out.push_str("---\n\n");

    out.push_str("## INTERCONSULTAS REALIZADAS\n\n");
    if record.consultations.is_empty() {
        out.push_str("*No se realizaron interconsultas.*\n\n");
    }
    for (i, (note, response)) in record.consultations.iter().enumerate() {
        let _ = writeln!(out, "### Interconsulta {}\n", i + 1);
        out.push_str(&consultation_markdown(note));
        out.push('\n');
        out.push_str(&counter_referral_markdown(response));
        out.push('\n');
    }

    if let Some(error) = &record.workflow_error {
        let _ = writeln!(
            out,
            "## INCIDENCIAS DEL FLUJO\n\n⚠️ El flujo de interconsultas se finalizó de forma anticipada: {error}\n"
        );
        out.push_str("---\n\n");
    }

    let _ = writeln!(out, "## RESPUESTA INTEGRADA\n\n{}\n", record.integrated_response);
    out.push_str("---\n\n");
    out.push_str(FOOTER);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EvidenceLevel, Specialty, Urgency};
    use chrono::Utc;
    use indexmap::IndexMap;

    fn pair() -> (ConsultationNote, CounterReferralNote) {
        let note = ConsultationNote::new(
            Specialty::InternalMedicine,
            "Mujer de 60 años, creatinina 1.4",
            "¿Estadio de ERC?",
            "Estadio KDIGO y conducta",
            Urgency::Emergency,
        );
        let mut criteria = IndexMap::new();
        criteria.insert("TFG < 60 por > 3 meses".to_string(), true);
        criteria.insert("Albuminuria".to_string(), false);
        let response = CounterReferralNote::answering(&note, "ERC G3a", "Control de PA")
            .with_criteria(criteria)
            .with_additional_info(vec!["Cociente albúmina/creatinina".into()])
            .with_evidence(vec!["KDIGO 2024".into(), "CKD-EPI 2021".into()])
            .with_evidence_level(EvidenceLevel::B);
        (note, response)
    }

    #[test]
    fn consultation_block_has_badge_and_sections() {
        let (note, _) = pair();
        let md = consultation_markdown(&note);
        assert!(md.starts_with("### NOTA DE INTERCONSULTA - INTERNAL MEDICINE"));
        assert!(md.contains("🔴 EMERGENCIA"));
        assert!(md.contains("#### Contexto del Paciente\nMujer de 60 años"));
        assert!(md.contains(&format!("`{}`", note.id)));
        assert!(md.trim_end().ends_with("---"));
    }

    #[test]
    fn response_block_renders_optional_sections() {
        let (_, response) = pair();
        let md = counter_referral_markdown(&response);
        assert!(md.contains("🟡 Nivel B (Moderada calidad)"));
        assert!(md.contains("- ✅ TFG < 60 por > 3 meses"));
        assert!(md.contains("- ❌ Albuminuria"));
        assert!(md.contains("- Cociente albúmina/creatinina"));
        assert!(md.contains("1. KDIGO 2024\n2. CKD-EPI 2021"));
    }

    #[test]
    fn response_block_omits_absent_sections() {
        let (note, _) = pair();
        let bare = CounterReferralNote::answering(&note, "a", "r");
        let md = counter_referral_markdown(&bare);
        assert!(!md.contains("Nivel de Evidencia"));
        assert!(!md.contains("Criterios Diagnósticos"));
        assert!(!md.contains("Información Adicional"));
        assert!(!md.contains("Referencias"));
    }

    #[test]
    fn record_document_orders_sections() {
        let (note, response) = pair();
        let record = ClinicalRecord {
            case_id: "abcd1234".into(),
            original_question: "¿Cómo manejar la ERC?".into(),
            coordinator_summary: "Se consultó a medicina interna.".into(),
            consultations: vec![(note, response)],
            integrated_response: "Manejo conservador.".into(),
            workflow_error: None,
            created_at: Utc::now(),
        };
        let md = record_markdown(&record);
        let order = [
            "# EXPEDIENTE CLÍNICO",
            "## PREGUNTA CLÍNICA ORIGINAL",
            "## NOTA DEL MÉDICO GENERAL",
            "## INTERCONSULTAS REALIZADAS",
            "### NOTA DE INTERCONSULTA",
            "### NOTA DE CONTRARREFERENCIA",
            "## RESPUESTA INTEGRADA",
            "Clinical Research Crew",
        ];
        let positions: Vec<usize> = order.iter().map(|s| md.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!md.contains("INCIDENCIAS"));
    }

    #[test]
    fn record_document_surfaces_workflow_error() {
        let record = ClinicalRecord {
            case_id: "ffff0000".into(),
            original_question: "q".into(),
            coordinator_summary: "s".into(),
            consultations: vec![],
            integrated_response: "i".into(),
            workflow_error: Some("specialist runtime crashed".into()),
            created_at: Utc::now(),
        };
        let md = record_markdown(&record);
        assert!(md.contains("## INCIDENCIAS DEL FLUJO"));
        assert!(md.contains("specialist runtime crashed"));
        assert!(md.contains("No se realizaron interconsultas"));
    }

    #[test]
    fn coordinator_observation_summarizes_response() {
        let (_, response) = pair();
        let text = coordinator_observation(&response);
        assert!(text.starts_with("CONTRARREFERENCIA - INTERNAL MEDICINE"));
        assert!(text.contains("Evaluación Clínica:\nERC G3a"));
        assert!(text.contains("- KDIGO 2024"));
        assert!(text.contains("Información Adicional Necesaria: Cociente albúmina/creatinina"));
    }
}
