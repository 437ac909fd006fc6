//! Static capability registry.
//!
//! Capabilities are registered once at startup and resolved by name. A plan
//! referencing an unregistered name is rejected before execution starts,
//! never at dispatch time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::Capability;
use crate::error::EngineError;
use crate::plan::ExecutionPlan;

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        debug!(capability = %name, "registered capability");
        self.capabilities.insert(name, capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Registered names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that every task in the plan names a registered capability.
    pub fn resolve(&self, plan: &ExecutionPlan) -> Result<(), EngineError> {
        for task in plan.tasks() {
            if !self.contains(&task.capability) {
                return Err(EngineError::UnknownCapability {
                    task: task.id.clone(),
                    capability: task.capability.clone(),
                });
            }
        }
        Ok(())
    }
}
