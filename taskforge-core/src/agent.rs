//! Agent domain model and registry
//!
//! This module provides the agent roster for the Taskforge system. Agents
//! are named roles with a fixed capability set and an external skill
//! reference; they do not execute code themselves, only label who a
//! registered callback represents. The roster is loaded once at startup
//! from a config file or from built-in defaults and is immutable
//! thereafter.
//!
//! # Examples
//!
//! ```rust
//! use taskforge_core::agent::*;
//!
//! let registry = AgentRegistry::builtin_defaults();
//! let architect = registry.get(AgentType::Architect).unwrap();
//! assert!(architect.has_capability(Capability::Architecture));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// The fixed set of agent roles in the system
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    Architect,
    BackendDeveloper,
    DevopsEngineer,
    QaEngineer,
    CodeReviewer,
    DocsWriter,
}

impl AgentType {
    /// All agent types in enumeration order
    ///
    /// Declaration order doubles as the documented tie-break for
    /// capability-overlap selection.
    pub const ALL: [AgentType; 6] = [
        AgentType::Architect,
        AgentType::BackendDeveloper,
        AgentType::DevopsEngineer,
        AgentType::QaEngineer,
        AgentType::CodeReviewer,
        AgentType::DocsWriter,
    ];

    /// Wire name of the agent type
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Architect => "architect",
            AgentType::BackendDeveloper => "backend-developer",
            AgentType::DevopsEngineer => "devops-engineer",
            AgentType::QaEngineer => "qa-engineer",
            AgentType::CodeReviewer => "code-reviewer",
            AgentType::DocsWriter => "docs-writer",
        }
    }

    /// Default human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentType::Architect => "Architect",
            AgentType::BackendDeveloper => "Backend Developer",
            AgentType::DevopsEngineer => "DevOps Engineer",
            AgentType::QaEngineer => "QA Engineer",
            AgentType::CodeReviewer => "Code Reviewer",
            AgentType::DocsWriter => "Docs Writer",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "architect" => Ok(AgentType::Architect),
            "backend-developer" => Ok(AgentType::BackendDeveloper),
            "devops-engineer" => Ok(AgentType::DevopsEngineer),
            "qa-engineer" => Ok(AgentType::QaEngineer),
            "code-reviewer" => Ok(AgentType::CodeReviewer),
            "docs-writer" => Ok(AgentType::DocsWriter),
            other => Err(Error::invalid_agent(format!(
                "Unknown agent type: {}",
                other
            ))),
        }
    }
}

/// The fixed capability vocabulary agents are tagged with
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Architecture,
    Api,
    Database,
    Cli,
    Infrastructure,
    Testing,
    Security,
    Documentation,
}

impl Capability {
    /// All capabilities in vocabulary order
    pub const ALL: [Capability; 8] = [
        Capability::Architecture,
        Capability::Api,
        Capability::Database,
        Capability::Cli,
        Capability::Infrastructure,
        Capability::Testing,
        Capability::Security,
        Capability::Documentation,
    ];

    /// Wire name of the capability
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Architecture => "architecture",
            Capability::Api => "api",
            Capability::Database => "database",
            Capability::Cli => "cli",
            Capability::Infrastructure => "infrastructure",
            Capability::Testing => "testing",
            Capability::Security => "security",
            Capability::Documentation => "documentation",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "architecture" => Ok(Capability::Architecture),
            "api" => Ok(Capability::Api),
            "database" => Ok(Capability::Database),
            "cli" => Ok(Capability::Cli),
            "infrastructure" => Ok(Capability::Infrastructure),
            "testing" => Ok(Capability::Testing),
            "security" => Ok(Capability::Security),
            "documentation" => Ok(Capability::Documentation),
            other => Err(Error::validation(format!("Unknown capability: {}", other))),
        }
    }
}

/// An agent descriptor: role, display name, capability set, skill reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub agent_type: AgentType,
    pub display_name: String,
    pub capabilities: BTreeSet<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_file: Option<String>,
}

impl Agent {
    /// Create an agent descriptor
    pub fn new(
        agent_type: AgentType,
        display_name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        skill_file: Option<String>,
    ) -> Self {
        Self {
            agent_type,
            display_name: display_name.into(),
            capabilities: capabilities.into_iter().collect(),
            skill_file,
        }
    }

    /// Check if the agent declares a specific capability
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check if the agent declares all of the given capabilities
    pub fn has_all_capabilities(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.has_capability(*c))
    }

    /// Count how many of the given capabilities the agent declares
    pub fn capability_overlap(&self, capabilities: &BTreeSet<Capability>) -> usize {
        self.capabilities.intersection(capabilities).count()
    }
}

/// The immutable agent roster, keyed by agent type
///
/// Loading is lenient: individually broken config entries are skipped with
/// a warning, and an absent, unreadable, or empty config falls back to the
/// built-in default roster. The registry is therefore always non-empty.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentType, Agent>,
}

impl AgentRegistry {
    /// The built-in default roster: six agents with fixed capability triples
    pub fn builtin_defaults() -> Self {
        let agents = [
            Agent::new(
                AgentType::Architect,
                AgentType::Architect.display_name(),
                [Capability::Architecture, Capability::Api, Capability::Database],
                Some("agents/architect.md".to_string()),
            ),
            Agent::new(
                AgentType::BackendDeveloper,
                AgentType::BackendDeveloper.display_name(),
                [Capability::Api, Capability::Database, Capability::Security],
                Some("agents/backend-developer.md".to_string()),
            ),
            Agent::new(
                AgentType::DevopsEngineer,
                AgentType::DevopsEngineer.display_name(),
                [
                    Capability::Infrastructure,
                    Capability::Cli,
                    Capability::Security,
                ],
                Some("agents/devops-engineer.md".to_string()),
            ),
            Agent::new(
                AgentType::QaEngineer,
                AgentType::QaEngineer.display_name(),
                [Capability::Testing, Capability::Api, Capability::Cli],
                Some("agents/qa-engineer.md".to_string()),
            ),
            Agent::new(
                AgentType::CodeReviewer,
                AgentType::CodeReviewer.display_name(),
                [
                    Capability::Testing,
                    Capability::Security,
                    Capability::Architecture,
                ],
                Some("agents/code-reviewer.md".to_string()),
            ),
            Agent::new(
                AgentType::DocsWriter,
                AgentType::DocsWriter.display_name(),
                [Capability::Documentation, Capability::Api, Capability::Cli],
                Some("agents/docs-writer.md".to_string()),
            ),
        ];

        Self {
            agents: agents
                .into_iter()
                .map(|agent| (agent.agent_type, agent))
                .collect(),
        }
    }

    /// Load the roster from a JSON config file
    ///
    /// The file holds a list of `{name, capabilities, skillFile?}` entries.
    /// An absent or unreadable file is not an error; the built-in defaults
    /// are used instead.
    pub fn load_from_path(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Agent config {} not readable ({}), using built-in defaults",
                    path.display(),
                    e
                );
                return Self::builtin_defaults();
            }
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Agent config {} is not a JSON list ({}), using built-in defaults",
                    path.display(),
                    e
                );
                return Self::builtin_defaults();
            }
        };

        Self::from_entries(&entries)
    }

    /// Build the roster from raw config entries, skipping broken ones
    ///
    /// Zero valid entries falls back to the built-in defaults; the system
    /// must always have a usable, non-empty roster.
    pub fn from_entries(entries: &[serde_json::Value]) -> Self {
        let mut agents = BTreeMap::new();

        for entry in entries {
            match Self::parse_entry(entry) {
                Ok(agent) => {
                    debug!("Loaded agent {} from config", agent.agent_type);
                    agents.insert(agent.agent_type, agent);
                }
                Err(e) => {
                    warn!("Skipping agent config entry: {}", e);
                }
            }
        }

        if agents.is_empty() {
            warn!("Agent config yielded no valid agents, using built-in defaults");
            return Self::builtin_defaults();
        }

        Self { agents }
    }

    fn parse_entry(entry: &serde_json::Value) -> Result<Agent> {
        let name = entry
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::configuration("agent entry missing required \"name\" field"))?;

        let agent_type = AgentType::from_str(name)
            .map_err(|_| Error::configuration(format!("agent name {:?} is not a known role", name)))?;

        let mut capabilities = BTreeSet::new();
        if let Some(raw_caps) = entry.get("capabilities").and_then(|v| v.as_array()) {
            for raw in raw_caps {
                match raw.as_str().map(Capability::from_str) {
                    Some(Ok(cap)) => {
                        capabilities.insert(cap);
                    }
                    _ => {
                        warn!(
                            "Skipping unknown capability {} for agent {}",
                            raw, agent_type
                        );
                    }
                }
            }
        }

        let skill_file = entry
            .get("skillFile")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Agent::new(
            agent_type,
            agent_type.display_name(),
            capabilities,
            skill_file,
        ))
    }

    /// Look up an agent by type
    pub fn get(&self, agent_type: AgentType) -> Option<&Agent> {
        self.agents.get(&agent_type)
    }

    /// Iterate over the roster in enumeration order
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Number of agents in the roster
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the roster is empty (never true after loading)
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents declaring the given capability, in enumeration order
    pub fn agents_with_capability(&self, capability: Capability) -> Vec<&Agent> {
        self.agents
            .values()
            .filter(|agent| agent.has_capability(capability))
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin_defaults()
    }
}
