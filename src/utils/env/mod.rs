use crate::core::entities::EnvMap;

/// Layers environment maps; later layers win on conflicting keys.
pub struct EnvMerger;

impl EnvMerger {
    pub fn merge<'a, I>(layers: I) -> EnvMap
    where
        I: IntoIterator<Item = Option<&'a EnvMap>>,
    {
        let mut merged = EnvMap::new();
        for layer in layers.into_iter().flatten() {
            for (key, value) in layer {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Workflow environment overlaid by the task's.
    pub fn merge_with_defaults(workflow_env: Option<&EnvMap>, task_env: Option<&EnvMap>) -> EnvMap {
        Self::merge([workflow_env, task_env])
    }

    /// Workflow, then task, then component (agent or tool) environment.
    pub fn merge_three_levels(
        workflow_env: Option<&EnvMap>,
        task_env: Option<&EnvMap>,
        component_env: Option<&EnvMap>,
    ) -> EnvMap {
        Self::merge([workflow_env, task_env, component_env])
    }
}
