//! Stage registry: `StageId -> Stage`, read-only once the engine is built.

use std::collections::HashMap;

use pipeline::{Stage, StageId};

/// The set of stages an engine dispatches to.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<StageId, Box<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `stage` under its own id, returning any stage it replaced.
    pub fn register(&mut self, stage: Box<dyn Stage>) -> Option<Box<dyn Stage>> {
        self.stages.insert(stage.id(), stage)
    }

    pub fn get(&self, id: StageId) -> Option<&dyn Stage> {
        self.stages.get(&id).map(|stage| &**stage)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Stage ids with no registered implementation, in execution order.
    pub fn missing(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|id| !self.contains(*id))
            .collect()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.stages.keys().copied().collect();
        ids.sort();
        f.debug_struct("StageRegistry").field("stages", &ids).finish()
    }
}
