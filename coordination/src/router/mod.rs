//! Model routing tables.
//!
//! Maps a [`TaskType`] and [`QualityTier`] onto an ordered list of
//! [`Candidate`] backends. The actual dispatch with retries and fallback
//! lives in the async agents crate; everything here is pure data.
//!
//! ```text
//! Task             | Primary            | Secondary        | Free
//! -----------------|--------------------|------------------|-------
//! IdeaGeneration   | claude-sonnet-4-5  | gpt-4o           | local
//! Evaluation       | gpt-4o-mini        | claude-haiku-4-5 | local
//! Planning         | claude-opus-4-5    | claude-sonnet-4-5| local
//! Review           | claude-sonnet-4-5  | gpt-4o           | local
//! Summarization    | local              | gpt-4o-mini      | local
//! ```

pub mod hierarchy;
pub mod task;

pub use hierarchy::{Candidate, HierarchyError, ModelHierarchy};
pub use task::{CostClass, QualityTier, TaskType};
