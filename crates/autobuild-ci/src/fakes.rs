//! In-memory [`CommandRunner`] for tests.
//!
//! Lets the dispatcher, publisher and pipeline be exercised without a build
//! tool or registry installed.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::runner::{CommandOutput, CommandRunner, Invocation, OutputSink, RunnerError};

/// Scripted response to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Exit normally with this code.
    Exit(i32),

    /// Report a timeout.
    Timeout,

    /// Fail to start the program.
    SpawnError,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<Scripted>,
}

/// Records every invocation and answers from a script.
///
/// Rules match when their needle occurs in the command line and are checked
/// in the order they were added. A rule given several responses replays them
/// one per call and then keeps repeating the last. Unmatched invocations exit
/// with the default code (0).
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
    default_exit: i32,
    create_images: bool,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code for invocations no rule matches.
    pub fn with_default_exit(mut self, code: i32) -> Self {
        self.default_exit = code;
        self
    }

    /// Queue `response` for commands containing `needle`.
    pub fn on(self, needle: &str, response: Scripted) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.responses.push_back(response),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    /// Touch the image file named by successful `build` invocations.
    pub fn creating_images(mut self) -> Self {
        self.create_images = true;
        self
    }

    /// All invocations so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations whose command line contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.command_line().contains(needle))
            .collect()
    }

    fn next_response(&self, command_line: &str) -> Scripted {
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| command_line.contains(&r.needle)) else {
            return Scripted::Exit(self.default_exit);
        };
        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or(Scripted::Exit(self.default_exit))
        } else {
            rule.responses
                .front()
                .copied()
                .unwrap_or(Scripted::Exit(self.default_exit))
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let command_line = invocation.command_line();

        if let OutputSink::File(path) = &invocation.output {
            std::fs::write(path, format!("$ {command_line}\n"))?;
        }

        let exit_code = match self.next_response(&command_line) {
            Scripted::Exit(code) => code,
            Scripted::Timeout => {
                return Ok(CommandOutput {
                    exit_code: -1,
                    output: String::new(),
                    duration_ms: invocation.timeout_secs * 1000,
                    timed_out: true,
                })
            }
            Scripted::SpawnError => {
                return Err(RunnerError::Spawn {
                    program: invocation.command.first().cloned().unwrap_or_default(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
                })
            }
        };

        let is_build = invocation.command.get(1).map(String::as_str) == Some("build");
        if exit_code == 0 && self.create_images && is_build {
            if let Some(image) = invocation.command.get(2) {
                std::fs::write(image, b"image")?;
            }
        }

        Ok(CommandOutput {
            exit_code,
            output: format!("scripted: {command_line}\n"),
            duration_ms: 1,
            timed_out: false,
        })
    }
}
