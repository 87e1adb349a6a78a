//! Configuration for a consultation run.
//!
//! Loaded from a TOML file with one table per concern:
//!
//! ```toml
//! [coordinator]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [specialist]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "CREW_SPECIALIST_KEY"
//!
//! [workflow]
//! max_concurrent_consultations = 3
//! min_evidence_level = "B"
//!
//! [tools]
//! enable_literature_search = false
//!
//! [knowledge]
//! base_path = "./knowledge_bases"
//! ```
//!
//! # Security
//!
//! On Unix, a config file holding an inline API key must not be readable by
//! group or others, and no config file may be world-writable.

use std::path::Path;

use anyhow::Context;
use crew_common::{CrewError, EvidenceLevel, Result, Specialty};
use crew_knowledge::KnowledgeConfig;
use crew_llm::LlmConfig;
use crew_tools::ToolsConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

const COORDINATOR_TEMPERATURE: f32 = 0.2;
const SPECIALIST_TEMPERATURE: f32 = 0.3;

/// Complete configuration of the consultation crew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewConfig {
    /// Model used for triage, dispatch decisions and record integration
    #[serde(default = "default_coordinator_model")]
    pub coordinator: LlmConfig,

    /// Model used by every specialist loop
    #[serde(default = "default_specialist_model")]
    pub specialist: LlmConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

fn default_coordinator_model() -> LlmConfig {
    LlmConfig::new("openai", "gpt-4o")
}

fn default_specialist_model() -> LlmConfig {
    LlmConfig::new("openai", "gpt-4o")
}

/// Loop limits and clinical policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_coordinator_turns")]
    pub max_coordinator_turns: u32,

    /// Reasoning steps per consultation before synthesis is forced
    #[serde(default = "default_max_specialist_iterations")]
    pub max_specialist_iterations: u32,

    /// Tool invocations executed within one specialist step
    #[serde(default = "default_max_tool_calls_per_iteration")]
    pub max_tool_calls_per_iteration: usize,

    /// Consultations dispatched concurrently per coordinator turn
    #[serde(default = "default_max_concurrent_consultations")]
    pub max_concurrent_consultations: usize,

    #[serde(default = "default_synthesis_attempts")]
    pub synthesis_attempts: u32,

    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,

    #[serde(default = "default_integration_temperature")]
    pub integration_temperature: f32,

    #[serde(default = "default_min_evidence_level")]
    pub min_evidence_level: EvidenceLevel,

    #[serde(default = "default_require_citations")]
    pub require_citations: bool,

    #[serde(default = "default_available_specialties")]
    pub available_specialties: Vec<Specialty>,
}

fn default_max_coordinator_turns() -> u32 {
    6
}

fn default_max_specialist_iterations() -> u32 {
    5
}

fn default_max_tool_calls_per_iteration() -> usize {
    6
}

fn default_max_concurrent_consultations() -> usize {
    3
}

fn default_synthesis_attempts() -> u32 {
    3
}

fn default_synthesis_temperature() -> f32 {
    0.1
}

fn default_integration_temperature() -> f32 {
    0.2
}

fn default_min_evidence_level() -> EvidenceLevel {
    EvidenceLevel::C
}

fn default_require_citations() -> bool {
    true
}

fn default_available_specialties() -> Vec<Specialty> {
    Specialty::ALL.to_vec()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_coordinator_turns: default_max_coordinator_turns(),
            max_specialist_iterations: default_max_specialist_iterations(),
            max_tool_calls_per_iteration: default_max_tool_calls_per_iteration(),
            max_concurrent_consultations: default_max_concurrent_consultations(),
            synthesis_attempts: default_synthesis_attempts(),
            synthesis_temperature: default_synthesis_temperature(),
            integration_temperature: default_integration_temperature(),
            min_evidence_level: default_min_evidence_level(),
            require_citations: default_require_citations(),
            available_specialties: default_available_specialties(),
        }
    }
}

impl Default for CrewConfig {
    fn default() -> Self {
        let mut config = Self {
            coordinator: default_coordinator_model(),
            specialist: default_specialist_model(),
            workflow: WorkflowConfig::default(),
            tools: ToolsConfig::default(),
            knowledge: KnowledgeConfig::default(),
        };
        config.apply_role_defaults();
        config
    }
}

impl CrewConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// On Unix the file must be a regular file, must not be world-writable,
    /// and must not be readable by group or others when it holds an inline
    /// API key.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;

        #[cfg(unix)]
        validate_config_file_permissions(path, config.has_inline_api_key())?;

        if config.has_inline_api_key() {
            warn!(
                "API key found in config file '{}'. For better security, use api_key_env \
                 or the OPENAI_API_KEY / ANTHROPIC_API_KEY environment variables.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.apply_role_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_role_defaults(&mut self) {
        self.coordinator.temperature.get_or_insert(COORDINATOR_TEMPERATURE);
        self.specialist.temperature.get_or_insert(SPECIALIST_TEMPERATURE);
    }

    pub fn has_inline_api_key(&self) -> bool {
        let inline = |llm: &LlmConfig| llm.api_key.as_deref().is_some_and(|k| !k.is_empty());
        inline(&self.coordinator) || inline(&self.specialist) || self.tools.pubmed_api_key.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let workflow = &self.workflow;
        if workflow.max_concurrent_consultations == 0 {
            return Err(CrewError::Config(
                "workflow.max_concurrent_consultations must be at least 1".into(),
            ));
        }
        if workflow.synthesis_attempts == 0 {
            return Err(CrewError::Config(
                "workflow.synthesis_attempts must be at least 1".into(),
            ));
        }
        if workflow.available_specialties.is_empty() {
            return Err(CrewError::Config(
                "workflow.available_specialties must name at least one specialty".into(),
            ));
        }

        let temperatures = [
            ("coordinator.temperature", self.coordinator.temperature),
            ("specialist.temperature", self.specialist.temperature),
            ("workflow.synthesis_temperature", Some(workflow.synthesis_temperature)),
            ("workflow.integration_temperature", Some(workflow.integration_temperature)),
        ];
        for (name, value) in temperatures {
            if let Some(t) = value {
                if !(0.0..=2.0).contains(&t) {
                    return Err(CrewError::Config(format!(
                        "{name} must be between 0 and 2, got {t}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn validate_config_file_permissions(path: &Path, has_inline_key: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_inline_key && permission_bits & 0o044 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is readable by group or others \
             (mode {:04o}). Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = CrewConfig::from_toml("").unwrap();
        assert_eq!(config.workflow.max_coordinator_turns, 6);
        assert_eq!(config.workflow.max_concurrent_consultations, 3);
        assert_eq!(config.workflow.synthesis_attempts, 3);
        assert_eq!(config.workflow.min_evidence_level, EvidenceLevel::C);
        assert_eq!(config.workflow.available_specialties.len(), 10);
        assert_eq!(config.coordinator.temperature, Some(0.2));
        assert_eq!(config.specialist.temperature, Some(0.3));
        assert!(config.tools.enable_calculators);
    }

    #[test]
    fn example_config_parses() {
        let config = CrewConfig::from_toml(include_str!("../../../crew.example.toml")).unwrap();
        assert_eq!(config.specialist.provider, "anthropic");
        assert_eq!(config.specialist.max_tokens, Some(4096));
        assert!(!config.has_inline_api_key());
    }

    #[test]
    fn sections_override_defaults() {
        let config = CrewConfig::from_toml(
            r#"
            [coordinator]
            provider = "anthropic"
            model = "claude-sonnet-4-5"
            temperature = 0.0

            [workflow]
            max_concurrent_consultations = 2
            min_evidence_level = "B"
            available_specialties = ["cardiology", "pharmacology"]

            [tools]
            enable_literature_search = false
            "#,
        )
        .unwrap();
        assert_eq!(config.coordinator.provider, "anthropic");
        assert_eq!(config.coordinator.temperature, Some(0.0));
        assert_eq!(config.specialist.temperature, Some(0.3));
        assert_eq!(config.workflow.max_concurrent_consultations, 2);
        assert_eq!(config.workflow.min_evidence_level, EvidenceLevel::B);
        assert_eq!(
            config.workflow.available_specialties,
            vec![Specialty::Cardiology, Specialty::Pharmacology]
        );
        assert!(!config.tools.enable_literature_search);
    }

    #[test]
    fn unknown_specialty_is_rejected() {
        let err = CrewConfig::from_toml(
            r#"
            [workflow]
            available_specialties = ["dermatology"]
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = CrewConfig::from_toml("[workflow]\nmax_concurrent_consultations = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("max_concurrent_consultations"));
    }

    #[test]
    fn empty_specialty_set_is_rejected() {
        let err =
            CrewConfig::from_toml("[workflow]\navailable_specialties = []\n").unwrap_err();
        assert!(err.to_string().contains("available_specialties"));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let err = CrewConfig::from_toml("[workflow]\nsynthesis_temperature = 3.5\n").unwrap_err();
        assert!(err.to_string().contains("synthesis_temperature"));
    }

    #[cfg(unix)]
    #[test]
    fn readable_file_with_inline_key_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crew.toml");
        std::fs::write(
            &path,
            "[coordinator]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\napi_key = \"sk-test\"\n",
        )
        .unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = CrewConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("readable by group or others"));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let config = CrewConfig::from_file(&path).unwrap();
        assert!(config.has_inline_api_key());
    }

    #[cfg(unix)]
    #[test]
    fn readable_file_without_keys_is_accepted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crew.toml");
        std::fs::write(&path, "[workflow]\nmax_coordinator_turns = 4\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let config = CrewConfig::from_file(&path).unwrap();
        assert_eq!(config.workflow.max_coordinator_turns, 4);
    }
}
