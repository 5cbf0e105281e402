//! Mock generator for tests
//!
//! Records every invocation it receives and fabricates library
//! artifacts on disk, so orchestration can be exercised end to end
//! without a real build toolchain. Failures can be scripted per
//! project.

use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};

use crate::generator::{
    Artifact, Generator, GeneratorError, GeneratorInvocation, GeneratorOutcome,
};

#[derive(Default)]
struct MockState {
    invocations: Vec<GeneratorInvocation>,
    fail_projects: HashSet<String>,
}

/// Recording generator with scripted failures
///
/// Clones share state, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Clone, Default)]
pub struct MockGenerator {
    state: Arc<Mutex<MockState>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a generator failure for every plan of the given project.
    pub fn fail_project(&self, project: &str) {
        self.state
            .lock()
            .expect("mock state poisoned")
            .fail_projects
            .insert(project.to_string());
    }

    /// All invocations recorded so far, in completion order.
    pub fn invocations(&self) -> Vec<GeneratorInvocation> {
        self.state
            .lock()
            .expect("mock state poisoned")
            .invocations
            .clone()
    }

    /// Projects invoked so far, in completion order.
    pub fn invoked_projects(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|inv| inv.project.clone())
            .collect()
    }
}

impl Generator for MockGenerator {
    fn generate(
        &self,
        invocation: &GeneratorInvocation,
    ) -> Result<GeneratorOutcome, GeneratorError> {
        let fail = {
            let mut state = self.state.lock().expect("mock state poisoned");
            state.invocations.push(invocation.clone());
            state.fail_projects.contains(&invocation.project)
        };

        if fail {
            return Err(GeneratorError::Failed {
                project: invocation.project.clone(),
                phase: "build",
                status: 2,
            });
        }

        fs::create_dir_all(&invocation.build_dir)?;
        let path = invocation
            .build_dir
            .join(format!("lib{}.a", invocation.project));
        fs::write(&path, format!("mock library for {}", invocation.project))?;

        let artifact = Artifact {
            path,
            logical_name: invocation.project.clone(),
            project: invocation.project.clone(),
        };
        Ok(GeneratorOutcome {
            artifacts: vec![artifact],
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Arch, OsName};
    use std::path::Path;

    fn invocation(project: &str, build_dir: &Path) -> GeneratorInvocation {
        GeneratorInvocation {
            project: project.to_string(),
            source_dir: build_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            os: OsName::Linux,
            arch: Arch::X64,
            variables: vec![],
            defines: vec![],
            options: vec![],
            flags: vec![],
            link_inputs: vec![],
        }
    }

    #[test]
    fn test_mock_records_and_fabricates() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockGenerator::new();
        let handle = mock.clone();

        let outcome = mock.generate(&invocation("zlib", tmp.path())).unwrap();
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].logical_name, "zlib");
        assert!(outcome.artifacts[0].path.exists());
        assert_eq!(handle.invoked_projects(), vec!["zlib"]);
    }

    #[test]
    fn test_mock_scripted_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockGenerator::new();
        mock.fail_project("libpng");

        let err = mock.generate(&invocation("libpng", tmp.path())).unwrap_err();
        assert!(matches!(err, GeneratorError::Failed { status: 2, .. }));
        assert_eq!(mock.invoked_projects(), vec!["libpng"]);
    }
}
