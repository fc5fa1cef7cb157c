//! recipe-autobuild CI - builds and publication
//!
//! Runs the build tool once per changed recipe, pushes what built, and
//! drives a whole run through [`AutobuildPipeline`]. External tools are only
//! reached through [`CommandRunner`].

pub mod dispatcher;
pub mod fakes;
pub mod pipeline;
pub mod publisher;
pub mod runner;

pub use dispatcher::BuildDispatcher;
pub use pipeline::{AutobuildPipeline, RunOutcome};
pub use publisher::{remove_images, RegistryPublisher};
pub use runner::{CommandOutput, CommandRunner, Invocation, OutputSink, ProcessRunner, RunnerError};
