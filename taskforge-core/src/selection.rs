//! Agent selection strategies
//!
//! A selection strategy is a pure, total function from a task to an agent
//! type: it always returns an agent and never fails. Two strategies are
//! provided, a keyword matcher and a capability-overlap matcher; both are
//! pluggable behind the [`SelectionStrategy`] trait.

use crate::agent::{AgentRegistry, AgentType, Capability};
use crate::task::Task;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// Pure mapping from a task to the agent type that should own it
pub trait SelectionStrategy: Send + Sync {
    /// Select an agent for the task; total, never fails
    fn select_agent(&self, task: &Task) -> AgentType;
}

/// Ordered keyword table: first row with any description match wins.
///
/// Row order is load-bearing. Matching walks the table top to bottom and
/// stops at the first agent whose keyword list has ANY case-insensitive
/// substring hit, so earlier rows shadow later ones when a description
/// matches several lists.
const KEYWORD_TABLE: &[(AgentType, &[&str])] = &[
    (AgentType::Architect, &["architecture", "design", "schema", "structure"]),
    (
        AgentType::BackendDeveloper,
        &["api", "endpoint", "database", "server", "backend"],
    ),
    (
        AgentType::DevopsEngineer,
        &["deploy", "docker", "pipeline", "infrastructure", "terraform"],
    ),
    (AgentType::QaEngineer, &["test", "coverage", "regression", "flaky"]),
    (AgentType::CodeReviewer, &["review", "audit", "lint"]),
    (AgentType::DocsWriter, &["document", "readme", "changelog", "guide"]),
];

/// Task-type fallback table, consulted when no keyword row matches
const TYPE_TABLE: &[(&str, AgentType)] = &[
    ("feature", AgentType::BackendDeveloper),
    ("bugfix", AgentType::QaEngineer),
    ("refactor", AgentType::Architect),
    ("docs", AgentType::DocsWriter),
    ("infra", AgentType::DevopsEngineer),
    ("deployment", AgentType::DevopsEngineer),
    ("review", AgentType::CodeReviewer),
];

/// Fixed default when neither keywords nor the task type resolve
const DEFAULT_AGENT: AgentType = AgentType::Architect;

/// Keyword lookup tables mapping Capability to description markers
const CAPABILITY_KEYWORDS: &[(Capability, &[&str])] = &[
    (Capability::Architecture, &["architecture", "design", "structure"]),
    (Capability::Api, &["api", "endpoint", "rest", "grpc"]),
    (Capability::Database, &["database", "sql", "migration", "schema"]),
    (Capability::Cli, &["cli", "command", "flag"]),
    (
        Capability::Infrastructure,
        &["deploy", "docker", "pipeline", "infrastructure"],
    ),
    (Capability::Testing, &["test", "coverage", "regression"]),
    (Capability::Security, &["security", "auth", "token", "encryption"]),
    (Capability::Documentation, &["document", "readme", "guide"]),
];

/// Keyword-based selection
///
/// Tests the task description against [`KEYWORD_TABLE`] in definition
/// order, falls back to the task-type table, and finally to the fixed
/// architect default.
#[derive(Debug, Clone, Default)]
pub struct KeywordStrategy;

impl KeywordStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for KeywordStrategy {
    fn select_agent(&self, task: &Task) -> AgentType {
        let description = task.description.to_lowercase();

        for (agent_type, keywords) in KEYWORD_TABLE {
            if keywords.iter().any(|kw| description.contains(kw)) {
                debug!("Keyword match selected {} for {}", agent_type, task.id);
                return *agent_type;
            }
        }

        let task_type = task.task_type.to_lowercase();
        for (name, agent_type) in TYPE_TABLE {
            if task_type == *name {
                debug!(
                    "Task-type fallback selected {} for {}",
                    agent_type, task.id
                );
                return *agent_type;
            }
        }

        DEFAULT_AGENT
    }
}

/// Capability-overlap selection
///
/// Derives a required-capability set from explicit task metadata
/// (`required_capabilities`, validated against the vocabulary with invalid
/// entries dropped) or, failing that, inferred from description keywords.
/// The agent with the highest overlap against its declared capability set
/// wins; ties break by agent enumeration order. When no capabilities are
/// derivable at all, selection delegates to the keyword strategy.
#[derive(Debug, Clone)]
pub struct CapabilityStrategy {
    registry: AgentRegistry,
    fallback: KeywordStrategy,
}

impl CapabilityStrategy {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            fallback: KeywordStrategy::new(),
        }
    }

    /// Required capabilities from metadata, or inferred from the description
    fn required_capabilities(&self, task: &Task) -> BTreeSet<Capability> {
        if let Some(raw) = task
            .metadata
            .get("required_capabilities")
            .and_then(|v| v.as_array())
        {
            let mut required = BTreeSet::new();
            for value in raw {
                match value.as_str().map(Capability::from_str) {
                    Some(Ok(cap)) => {
                        required.insert(cap);
                    }
                    _ => {
                        warn!(
                            "Dropping invalid required capability {} on {}",
                            value, task.id
                        );
                    }
                }
            }
            if !required.is_empty() {
                return required;
            }
        }

        let description = task.description.to_lowercase();
        CAPABILITY_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| description.contains(kw)))
            .map(|(cap, _)| *cap)
            .collect()
    }
}

impl SelectionStrategy for CapabilityStrategy {
    fn select_agent(&self, task: &Task) -> AgentType {
        let required = self.required_capabilities(task);
        if required.is_empty() {
            return self.fallback.select_agent(task);
        }

        let mut best = AgentType::ALL[0];
        let mut best_overlap = 0usize;
        for agent_type in AgentType::ALL {
            let overlap = self
                .registry
                .get(agent_type)
                .map(|agent| agent.capability_overlap(&required))
                .unwrap_or(0);
            // Strictly-greater keeps the earliest agent on ties
            if overlap > best_overlap {
                best = agent_type;
                best_overlap = overlap;
            }
        }

        debug!(
            "Capability overlap selected {} for {} (overlap {})",
            best, task.id, best_overlap
        );
        best
    }
}
