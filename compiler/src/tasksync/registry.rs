//! Pass registration and pipeline parsing
//!
//! A pipeline is a comma-separated list of pass names, each optionally
//! followed by one parameter in angle brackets, e.g.
//! `hip-task-sync,hip-task-sync<corrected>`.

use super::config::TaskSyncConfig;
use super::error::{TaskSyncError, TaskSyncResult};
use super::{PASS_ID, PassReport, TaskSyncPass};
use crate::hlir::IrModule;
use rustc_hash::FxHashMap;

/// A pass that runs over a whole module
pub trait ModulePass: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, module: &mut IrModule) -> TaskSyncResult<PassReport>;
}

impl ModulePass for TaskSyncPass {
    fn name(&self) -> &str {
        PASS_ID
    }

    fn run(&self, module: &mut IrModule) -> TaskSyncResult<PassReport> {
        TaskSyncPass::run(self, module)
    }
}

/// Builds a pass from its optional pipeline parameter
pub type PassFactory = fn(Option<&str>) -> TaskSyncResult<Box<dyn ModulePass>>;

fn task_sync_factory(param: Option<&str>) -> TaskSyncResult<Box<dyn ModulePass>> {
    let config = match param {
        None | Some("default") => TaskSyncConfig::default(),
        Some("legacy") => TaskSyncConfig::legacy(),
        Some("corrected") => TaskSyncConfig::corrected(),
        Some(other) => {
            return Err(TaskSyncError::Config(format!(
                "unknown {} parameter `{}`",
                PASS_ID, other
            )));
        }
    };
    Ok(Box::new(TaskSyncPass::with_config(config)))
}

/// Maps pipeline element names to pass factories
#[derive(Default)]
pub struct PassRegistry {
    factories: FxHashMap<String, PassFactory>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the task-sync pass pre-registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PASS_ID, task_sync_factory);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PassFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build one pass from a pipeline element such as `hip-task-sync<legacy>`
    pub fn create(&self, element: &str) -> TaskSyncResult<Box<dyn ModulePass>> {
        let element = element.trim();
        let (name, param) = match element.split_once('<') {
            Some((name, rest)) => {
                let param = rest.strip_suffix('>').ok_or_else(|| {
                    TaskSyncError::Config(format!("unterminated parameter in `{}`", element))
                })?;
                (name.trim(), Some(param.trim()))
            }
            None => (element, None),
        };
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TaskSyncError::UnknownPass(name.to_string()))?;
        factory(param)
    }

    /// Build every pass of a pipeline string, in order
    pub fn parse_pipeline(&self, pipeline: &str) -> TaskSyncResult<Vec<Box<dyn ModulePass>>> {
        pipeline
            .split(',')
            .filter(|e| !e.trim().is_empty())
            .map(|e| self.create(e))
            .collect()
    }

    /// Run a pipeline over a module, one report per pass
    pub fn run_pipeline(
        &self,
        pipeline: &str,
        module: &mut IrModule,
    ) -> TaskSyncResult<Vec<PassReport>> {
        let passes = self.parse_pipeline(pipeline)?;
        passes
            .iter()
            .map(|pass| {
                tracing::debug!(pass = pass.name(), "running pass");
                pass.run(module)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolves_task_sync() {
        let registry = PassRegistry::with_builtin();
        assert!(registry.contains(PASS_ID));
        let passes = registry.parse_pipeline("hip-task-sync").unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].name(), "hip-task-sync");
    }

    #[test]
    fn test_parameters() {
        let registry = PassRegistry::with_builtin();
        let passes = registry
            .parse_pipeline("hip-task-sync<legacy>, hip-task-sync<corrected>")
            .unwrap();
        assert_eq!(passes.len(), 2);
        assert!(matches!(
            registry.create("hip-task-sync<often>"),
            Err(TaskSyncError::Config(_))
        ));
        assert!(matches!(
            registry.create("hip-task-sync<legacy"),
            Err(TaskSyncError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_pass() {
        let registry = PassRegistry::with_builtin();
        match registry.parse_pipeline("hip-task-sync,licm") {
            Err(TaskSyncError::UnknownPass(name)) => assert_eq!(name, "licm"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("licm should not resolve"),
        }
    }

    #[test]
    fn test_run_pipeline_on_empty_module() {
        let registry = PassRegistry::with_builtin();
        let mut module = IrModule::new("m");
        let reports = registry.run_pipeline("hip-task-sync", &mut module).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].changed());
    }
}
