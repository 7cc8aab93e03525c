//! Widget executors.
//!
//! A widget is the work behind a [`ToolInvocation`](curie_core::models::ToolInvocation):
//! the conversation engine opens one, and an explicit run call executes it
//! exactly once.
//!
//! | Kind | Module | Upstream fallback |
//! |------|--------|-------------------|
//! | `resume_match` | [`resume_match`] | per-resume zero-score row |
//! | `doc_gen` | [`doc_gen`] | template returned unchanged |
//!
//! Executors take their collaborators as arguments rather than a
//! [`ServiceContext`](crate::context::ServiceContext), so the standalone
//! `/tools` endpoints and the chat flow share them.

pub mod doc_gen;
pub mod resume_match;

use curie_core::models::ToolKind;

/// Assistant text announcing a freshly opened widget.
pub fn announcement(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::ResumeMatch => {
            "I will open the Resume Match widget so you can provide the job description and candidate resumes."
        }
        ToolKind::DocGen => {
            "I will open the Document Generation widget so you can provide a template and variables to fill."
        }
    }
}
