//! Prompt Loader
//!
//! Loads system prompts from an override directory or falls back to the
//! embedded defaults, and renders the per-call user prompts.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Planning user prompt: the rendered ledger followed by the task
const PLANNING_USER: &str = "{{ledger}}\nUser Task: {{task}}";

/// Diagnosis user prompt
const DIAGNOSIS_USER: &str = "Error: {{error}}";

/// Lookup reduction user prompt
const LOOKUP_USER: &str = "Task: {{task}}\n\nSearch results:\n{{results}}";

#[derive(Serialize)]
struct PlanningContext<'a> {
    ledger: &'a str,
    task: &'a str,
}

#[derive(Serialize)]
struct DiagnosisContext<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct LookupContext<'a> {
    task: &'a str,
    results: &'a str,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine (no HTML escaping: prompts are plain text)
    hbs: Handlebars<'static>,
    /// User override directory (`prompts.dir`)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded prompts
    ///
    /// A directory that does not exist is ignored.
    pub fn new(dir: Option<impl AsRef<Path>>) -> Self {
        let override_dir = dir.map(|d| d.as_ref().to_path_buf()).filter(|d| {
            let exists = d.is_dir();
            debug!(dir = ?d, %exists, "PromptLoader::new: override directory");
            exists
        });

        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. Override: `{prompts.dir}/{name}.pmt`
    /// 2. Embedded fallback
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in override directory");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// System prompt for planning rounds
    pub fn planning_system(&self) -> Result<String> {
        self.load_template("planning")
    }

    /// System prompt for failure diagnosis
    pub fn diagnosis_system(&self) -> Result<String> {
        self.load_template("diagnosis")
    }

    /// System prompt for reducing lookup results
    pub fn lookup_system(&self) -> Result<String> {
        self.load_template("lookup")
    }

    /// User prompt for a planning round
    pub fn planning_user(&self, ledger: &str, task: &str) -> Result<String> {
        debug!(ledger_len = ledger.len(), task_len = task.len(), "PromptLoader::planning_user: called");
        self.render(PLANNING_USER, &PlanningContext { ledger, task })
    }

    /// User prompt for a diagnosis call
    pub fn diagnosis_user(&self, error: &str) -> Result<String> {
        self.render(DIAGNOSIS_USER, &DiagnosisContext { error })
    }

    /// User prompt for a lookup reduction call
    pub fn lookup_user(&self, task: &str, results: &str) -> Result<String> {
        self.render(LOOKUP_USER, &LookupContext { task, results })
    }

    fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.hbs
            .render_template(template, context)
            .map_err(|e| eyre!("Failed to render prompt: {}", e))
    }
}
