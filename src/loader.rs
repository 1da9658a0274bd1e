//! Loading suites and API descriptions from disk.

use crate::analyzer::ApiDescription;
use crate::model::TestSuite;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads test suites from files and directories.
#[derive(Debug)]
pub struct SuiteLoader {
    pub suite_paths: Vec<PathBuf>,
}

impl SuiteLoader {
    pub fn new() -> Self {
        Self {
            suite_paths: vec![PathBuf::from("tests/suites")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.suite_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a single suite file.
    ///
    /// `.json` files go through `serde_json`; `.yaml` / `.yml`
    /// through `serde_yaml`.
    pub fn load_suite<P: AsRef<Path>>(&self, path: P) -> Result<TestSuite> {
        let path = path.as_ref();
        info!("Loading test suite from {}", path.display());

        let content = fs::read_to_string(path).context(format!(
            "Failed to read suite file: {}",
            path.display()
        ))?;

        let suite = if is_json(path) {
            TestSuite::from_json(&content).context(format!(
                "Failed to parse JSON suite from {}",
                path.display()
            ))?
        } else {
            TestSuite::from_yaml(&content).context(format!(
                "Failed to parse YAML suite from {}",
                path.display()
            ))?
        };

        debug!("Loaded suite '{}' ({} cases)", suite.id, suite.cases.len());
        Ok(suite)
    }

    /// Load every suite file in `dir`, skipping files that fail to
    /// parse.
    pub fn load_suites_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<TestSuite>> {
        let dir = dir.as_ref();
        info!("Loading test suites from directory: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).context(format!(
            "Failed to read directory: {}",
            dir.display()
        ))? {
            let path = entry?.path();
            if path.is_file() && is_suite_file(&path) {
                paths.push(path);
            }
        }
        // read_dir order is platform dependent
        paths.sort();

        let mut suites = Vec::new();
        for path in paths {
            match self.load_suite(&path) {
                Ok(suite) => suites.push(suite),
                Err(err) => {
                    debug!(
                        "Failed to load suite from {}: {:#}",
                        path.display(),
                        err
                    );
                }
            }
        }

        info!("Loaded {} test suites from {}", suites.len(), dir.display());
        Ok(suites)
    }

    pub fn load_all_suites(&self) -> Result<Vec<TestSuite>> {
        let mut all = Vec::new();
        for path in &self.suite_paths {
            if path.is_dir() {
                match self.load_suites_from_dir(path) {
                    Ok(mut suites) => all.append(&mut suites),
                    Err(err) => {
                        debug!(
                            "Failed to load suites from {}: {}",
                            path.display(),
                            err
                        );
                    }
                }
            }
        }
        info!("Loaded {} test suites in total", all.len());
        Ok(all)
    }
}

impl Default for SuiteLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read an OpenAPI-like document (JSON or YAML) from disk.
pub fn load_api_description<P: AsRef<Path>>(path: P) -> Result<ApiDescription> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).context(format!(
        "Failed to read API description: {}",
        path.display()
    ))?;
    let document: serde_json::Value = if is_json(path) {
        serde_json::from_str(&content).context(format!(
            "Failed to parse JSON API description from {}",
            path.display()
        ))?
    } else {
        serde_yaml::from_str(&content).context(format!(
            "Failed to parse YAML API description from {}",
            path.display()
        ))?
    };
    Ok(ApiDescription::from_document(&document))
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// `true` for `.json`, `.yaml` and `.yml` files.
fn is_suite_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "json" || ext == "yaml" || ext == "yml")
}
