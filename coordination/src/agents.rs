//! Agent-pair collaborators
//!
//! An agent pair is a proposing agent and an adversarial agent bound to one
//! role. The core never looks inside a pair: it sends a JSON payload and
//! gets a JSON payload (or a typed failure) back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload exchanged with collaborators
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Shared reference to an agent pair
pub type SharedAgentPair = Arc<dyn AgentPair>;

/// Errors raised by agent-pair collaborators
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent request failed: {0}")]
    RequestFailed(String),

    #[error("Agent returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited: retry after {0:?}")]
    RateLimited(Duration),
}

/// Which layer of the content framework a pair works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Strategy,
    Marketing,
    Content,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Marketing => "marketing",
            Self::Content => "content",
        }
    }

    /// Roles in framework order
    pub fn all() -> [AgentRole; 3] {
        [Self::Strategy, Self::Marketing, Self::Content]
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strategy" => Ok(Self::Strategy),
            "marketing" => Ok(Self::Marketing),
            "content" => Ok(Self::Content),
            other => Err(format!("unknown agent role: {other}")),
        }
    }
}

/// A primary/adversary collaborator pair.
///
/// Implementations must tolerate concurrent `invoke` calls from different
/// tasks and debates.
#[async_trait]
pub trait AgentPair: Send + Sync {
    /// Registry key for this pair
    fn id(&self) -> &str;

    fn role(&self) -> AgentRole;

    fn primary_agent_id(&self) -> &str;

    fn adversary_agent_id(&self) -> &str;

    /// Perform one unit of work
    async fn invoke(&self, request: Payload) -> Result<Payload, AgentError>;
}

type InvokeFn = dyn Fn(&Payload) -> Result<Payload, AgentError> + Send + Sync;

/// Agent pair backed by a synchronous closure.
///
/// Useful for offline runs and deterministic tests.
pub struct FnAgentPair {
    id: String,
    role: AgentRole,
    primary: String,
    adversary: String,
    handler: Box<InvokeFn>,
}

impl FnAgentPair {
    pub fn new<F>(id: impl Into<String>, role: AgentRole, handler: F) -> Self
    where
        F: Fn(&Payload) -> Result<Payload, AgentError> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            primary: format!("{id}.primary"),
            adversary: format!("{id}.adversary"),
            id,
            role,
            handler: Box::new(handler),
        }
    }

    /// Override the generated agent identities
    pub fn with_agents(mut self, primary: impl Into<String>, adversary: impl Into<String>) -> Self {
        self.primary = primary.into();
        self.adversary = adversary.into();
        self
    }

    pub fn shared(self) -> SharedAgentPair {
        Arc::new(self)
    }
}

#[async_trait]
impl AgentPair for FnAgentPair {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    fn primary_agent_id(&self) -> &str {
        &self.primary
    }

    fn adversary_agent_id(&self) -> &str {
        &self.adversary
    }

    async fn invoke(&self, request: Payload) -> Result<Payload, AgentError> {
        (self.handler)(&request)
    }
}

/// Explicit owned collection of agent pairs keyed by pair id
#[derive(Clone, Default)]
pub struct AgentPairRegistry {
    pairs: HashMap<String, SharedAgentPair>,
}

impl AgentPairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair, replacing any pair with the same id
    pub fn register(&mut self, pair: SharedAgentPair) -> Option<SharedAgentPair> {
        self.pairs.insert(pair.id().to_string(), pair)
    }

    pub fn with(mut self, pair: SharedAgentPair) -> Self {
        self.register(pair);
        self
    }

    pub fn get(&self, id: &str) -> Option<SharedAgentPair> {
        self.pairs.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pairs.contains_key(id)
    }

    /// First registered pair for a role, ordered by pair id
    pub fn by_role(&self, role: AgentRole) -> Option<SharedAgentPair> {
        let mut matches: Vec<_> = self.pairs.values().filter(|p| p.role() == role).collect();
        matches.sort_by(|a, b| a.id().cmp(b.id()));
        matches.first().map(|p| Arc::clone(p))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pairs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl std::fmt::Debug for AgentPairRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPairRegistry")
            .field("pairs", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(id: &str, role: AgentRole) -> SharedAgentPair {
        FnAgentPair::new(id, role, |req| Ok(req.clone())).shared()
    }

    #[tokio::test]
    async fn test_fn_pair_invokes_closure() {
        let pair = FnAgentPair::new("strategy", AgentRole::Strategy, |req| {
            let mut out = Payload::new();
            out.insert("seen".into(), json!(req.len()));
            Ok(out)
        });
        let mut req = Payload::new();
        req.insert("a".into(), json!(1));
        let out = pair.invoke(req).await.unwrap();
        assert_eq!(out["seen"], json!(1));
        assert_eq!(pair.primary_agent_id(), "strategy.primary");
        assert_eq!(pair.adversary_agent_id(), "strategy.adversary");
    }

    #[test]
    fn test_registry_lookup_by_role() {
        let registry = AgentPairRegistry::new()
            .with(echo("mkt-b", AgentRole::Marketing))
            .with(echo("mkt-a", AgentRole::Marketing))
            .with(echo("strat", AgentRole::Strategy));

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.by_role(AgentRole::Marketing).unwrap().id(),
            "mkt-a"
        );
        assert!(registry.by_role(AgentRole::Content).is_none());
        assert!(registry.contains("strat"));
        assert!(!registry.contains("content"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = AgentPairRegistry::new();
        assert!(registry.register(echo("p", AgentRole::Content)).is_none());
        assert!(registry.register(echo("p", AgentRole::Content)).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Strategy".parse::<AgentRole>().unwrap(), AgentRole::Strategy);
        assert!("sales".parse::<AgentRole>().is_err());
        assert_eq!(AgentRole::Content.to_string(), "content");
    }
}
