//! Domain types shared by every stage of a run.

pub mod recipe;
pub mod results;

pub use recipe::{NamingIssue, Recipe, RECIPE_SUFFIX};
pub use results::{BuildOutcome, BuildResult, PushOutcome, PushResult};
