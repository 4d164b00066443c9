use crate::core::entities::WorkflowState;
use std::collections::HashMap;

/// Parent execution id to child task ids, from each state's back-reference.
#[derive(Debug, Clone, Default)]
pub struct ChildrenIndex {
    children: HashMap<String, Vec<String>>,
}

impl ChildrenIndex {
    /// Single pass over the task states, in workflow insertion order.
    pub fn build(workflow_state: &WorkflowState) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (task_id, state) in &workflow_state.tasks {
            if let Some(parent_exec_id) = &state.parent_state_id {
                children
                    .entry(parent_exec_id.clone())
                    .or_default()
                    .push(task_id.clone());
            }
        }
        ChildrenIndex { children }
    }

    pub fn children_of(&self, exec_id: &str) -> &[String] {
        self.children
            .get(exec_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
