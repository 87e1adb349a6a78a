//! Per-specialist capability gateway.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crew_common::{CrewError, Result, Specialty};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::calculators::{
    BmiParams, Chads2VascParams, FraminghamParams, GfrParams, WellsDvtParams, calculate_bmi,
    calculate_chads2vasc, calculate_framingham, calculate_gfr, calculate_wells_dvt,
};
use crate::capability::{Capability, capabilities_for};
use crate::criteria::lookup_diagnostic_criteria;
use crate::knowledge::KnowledgeLookup;
use crate::literature::{LiteratureSearch, format_articles};

/// Capability switches and defaults, loaded from the `[tools]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub enable_literature_search: bool,

    #[serde(default = "default_true")]
    pub enable_calculators: bool,

    #[serde(default = "default_literature_max_results")]
    pub literature_max_results: u32,

    /// Publication window for literature search
    #[serde(default = "default_literature_years_back")]
    pub literature_years_back: u32,

    #[serde(default = "default_knowledge_top_k")]
    pub knowledge_top_k: usize,

    #[serde(default)]
    pub pubmed_api_key: Option<String>,

    /// Contact address sent to NCBI with every request
    #[serde(default)]
    pub pubmed_email: Option<String>,

    #[serde(default = "default_pubmed_timeout_ms")]
    pub pubmed_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_literature_max_results() -> u32 {
    5
}

fn default_literature_years_back() -> u32 {
    5
}

fn default_knowledge_top_k() -> usize {
    3
}

fn default_pubmed_timeout_ms() -> u64 {
    30_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_literature_search: true,
            enable_calculators: true,
            literature_max_results: default_literature_max_results(),
            literature_years_back: default_literature_years_back(),
            knowledge_top_k: default_knowledge_top_k(),
            pubmed_api_key: None,
            pubmed_email: None,
            pubmed_timeout_ms: default_pubmed_timeout_ms(),
        }
    }
}

/// Shared backends behind the retrieval capabilities.
#[derive(Clone, Default)]
pub struct ToolServices {
    pub knowledge: Option<Arc<dyn KnowledgeLookup>>,
    pub literature: Option<Arc<dyn LiteratureSearch>>,
}

impl ToolServices {
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeLookup>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_literature(mut self, literature: Arc<dyn LiteratureSearch>) -> Self {
        self.literature = Some(literature);
        self
    }
}

/// A capability request issued by a specialist model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, alias = "args")]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Deserialize)]
struct KnowledgeArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    specialty: Option<String>,
}

#[derive(Deserialize)]
struct LiteratureArgs {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
    #[serde(default)]
    years_back: Option<u32>,
}

#[derive(Deserialize)]
struct CriteriaArgs {
    condition: String,
}

#[derive(Deserialize)]
struct ThinkArgs {
    reflection: String,
}

/// The capabilities one specialist may use, plus the backends they need.
#[derive(Clone)]
pub struct ToolGateway {
    specialty: Specialty,
    capabilities: Vec<Capability>,
    config: ToolsConfig,
    services: ToolServices,
}

impl ToolGateway {
    pub fn for_specialty(specialty: Specialty, config: &ToolsConfig, services: ToolServices) -> Self {
        let capabilities = capabilities_for(specialty)
            .into_iter()
            .filter(|c| config.enable_literature_search || *c != Capability::SearchLiterature)
            .filter(|c| config.enable_calculators || !c.is_calculator())
            .collect();
        Self {
            specialty,
            capabilities,
            config: config.clone(),
            services,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn available_names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(Capability::name).collect()
    }

    /// Capability listing for the specialist system prompt.
    pub fn describe(&self) -> String {
        self.capabilities
            .iter()
            .map(|c| format!("- {}: {}", c.name(), c.usage()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execute `call` and return its observation text. Never fails: unknown
    /// capabilities, bad arguments, backend errors and panics all come back
    /// as `Error ...` observations.
    pub async fn invoke(&self, call: &ToolCall) -> String {
        let capability = match self.resolve(&call.name) {
            Ok(capability) => capability,
            Err(_) => {
                warn!(specialty = %self.specialty, capability = %call.name, "Unknown capability requested");
                return format!(
                    "Error: Unknown capability '{}' for {}. Available: {}",
                    call.name,
                    self.specialty,
                    self.available_names().join(", ")
                );
            }
        };

        debug!(specialty = %self.specialty, capability = %capability, "Invoking capability");
        let outcome = AssertUnwindSafe(self.execute(capability, &call.arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => {
                warn!(specialty = %self.specialty, capability = %capability, error = %e, "Capability failed");
                format!("Error executing {capability}: {e}")
            }
            Err(_) => {
                warn!(specialty = %self.specialty, capability = %capability, "Capability panicked");
                format!("Error executing {capability}: capability aborted unexpectedly")
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<Capability> {
        let capability = Capability::from_name(name)?;
        if self.capabilities.contains(&capability) {
            Ok(capability)
        } else {
            Err(CrewError::UnknownCapability(name.to_string()))
        }
    }

    async fn execute(&self, capability: Capability, arguments: &Value) -> Result<String> {
        match capability {
            Capability::QueryKnowledgeBase => {
                let args: KnowledgeArgs = parse_args(capability, arguments)?;
                let knowledge = self.services.knowledge.as_ref().ok_or_else(|| {
                    CrewError::Knowledge("no knowledge base is configured".to_string())
                })?;
                let specialty = match args.specialty.as_deref() {
                    Some(name) => name.parse()?,
                    None => self.specialty,
                };
                let top_k = args.top_k.unwrap_or(self.config.knowledge_top_k).max(1);
                knowledge.lookup(specialty, &args.query, top_k).await
            }
            Capability::SearchLiterature => {
                let args: LiteratureArgs = parse_args(capability, arguments)?;
                let literature = self.services.literature.as_ref().ok_or_else(|| {
                    CrewError::Literature("literature search is not configured".to_string())
                })?;
                let max_results = args
                    .max_results
                    .unwrap_or(self.config.literature_max_results)
                    .max(1);
                let years_back = args.years_back.unwrap_or(self.config.literature_years_back);
                let articles = literature.search(&args.query, max_results, years_back).await?;
                Ok(format_articles(&args.query, &articles))
            }
            Capability::LookupDiagnosticCriteria => {
                let args: CriteriaArgs = parse_args(capability, arguments)?;
                Ok(lookup_diagnostic_criteria(&args.condition))
            }
            Capability::Think => {
                let args: ThinkArgs = parse_args(capability, arguments)?;
                Ok(format!("Razonamiento clínico registrado: {}", args.reflection))
            }
            Capability::CalculateGfr => {
                to_observation(&calculate_gfr(&parse_args::<GfrParams>(capability, arguments)?)?)
            }
            Capability::CalculateBmi => {
                to_observation(&calculate_bmi(&parse_args::<BmiParams>(capability, arguments)?)?)
            }
            Capability::CalculateChads2vasc => to_observation(&calculate_chads2vasc(
                &parse_args::<Chads2VascParams>(capability, arguments)?,
            )?),
            Capability::CalculateFraminghamRisk => to_observation(&calculate_framingham(
                &parse_args::<FraminghamParams>(capability, arguments)?,
            )?),
            Capability::CalculateWellsDvt => to_observation(&calculate_wells_dvt(
                &parse_args::<WellsDvtParams>(capability, arguments)?,
            )?),
        }
    }
}

fn parse_args<T: DeserializeOwned>(capability: Capability, arguments: &Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(arguments)
        .map_err(|e| CrewError::InvalidInput(format!("invalid arguments for {capability}: {e}")))
}

fn to_observation<T: Serialize>(result: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
