//! Review orchestration: documents, prompt assembly, agent dispatch, output.
//!
//! Provides the review pipeline that turns a branch diff into a bounded
//! prompt, hands it to an external agent process, and persists the verdict.

pub mod agent;
pub mod documents;
pub mod git;
pub mod output;
pub mod pipeline;
pub mod prompt;
