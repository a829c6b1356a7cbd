//! Prompt Template System
//!
//! Loads `.pmt` (prompt template) files for planning, diagnosis and lookup.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{name}.pmt` (user override)
//! 2. Embedded fallback in code
//!
//! User prompts use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
