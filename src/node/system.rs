use super::{Fields, Node};
use crate::error::NodeError;
use crate::state::State;
use rand::Rng;
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Supplies interactive input to [`InputNode`]s. `Ok(None)` means the user cancelled.
pub trait InputProvider: Send + Sync {
    fn read_line(&self, label: &str, state: &State) -> Result<Option<String>, NodeError>;
}

/// Provider for hosts without any input channel: every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputProvider for NoInput {
    fn read_line(&self, label: &str, _: &State) -> Result<Option<String>, NodeError> {
        Err(NodeError::Input(format!(
            "no input provider configured for '{}'",
            label
        )))
    }
}

/// Hands out pre-recorded answers in order; cancels once they run out.
#[derive(Debug, Default)]
pub struct QueuedInput {
    answers: Mutex<VecDeque<String>>,
}

impl QueuedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

impl InputProvider for QueuedInput {
    fn read_line(&self, _: &str, _: &State) -> Result<Option<String>, NodeError> {
        self.answers
            .lock()
            .map(|mut answers| answers.pop_front())
            .map_err(|_| NodeError::Input("input queue poisoned".to_string()))
    }
}

/// Asks the [`InputProvider`] for a line before running and outputs it.
pub struct InputNode {
    provider: Arc<dyn InputProvider>,
}

impl InputNode {
    pub fn new(provider: Arc<dyn InputProvider>) -> Self {
        Self { provider }
    }
}

impl Node for InputNode {
    fn classname(&self) -> &'static str {
        "InputNode"
    }

    fn before(&self, label: &str, state: &State) -> Result<Option<String>, NodeError> {
        self.provider.read_line(label, state)
    }

    fn run(&self, _: &str, input: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        Ok(input)
    }
}

/// Outputs the current local time.
pub struct DateNode {
    datetime_format: String,
}

impl DateNode {
    pub const DEFAULT_FORMAT: &'static str = "%m/%d/%Y, %H:%M:%S";

    pub fn new(datetime_format: impl Into<String>) -> Self {
        Self {
            datetime_format: datetime_format.into(),
        }
    }
}

impl Default for DateNode {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FORMAT)
    }
}

impl Node for DateNode {
    fn classname(&self) -> &'static str {
        "DateNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        let mut out = String::new();
        write!(out, "{}", chrono::Local::now().format(&self.datetime_format)).map_err(|_| {
            NodeError::Failed(format!(
                "Invalid datetime format '{}'",
                self.datetime_format
            ))
        })?;
        Ok(Some(out))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "datetime_format".to_string(),
            self.datetime_format.clone().into(),
        );
        fields
    }
}

/// Outputs a random integer in `[min, max]`.
pub struct RandomNode {
    min: i64,
    max: i64,
}

impl RandomNode {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

impl Default for RandomNode {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

impl Node for RandomNode {
    fn classname(&self) -> &'static str {
        "RandomNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        if self.min > self.max {
            return Err(NodeError::Failed(format!(
                "Empty range: min {} is greater than max {}",
                self.min, self.max
            )));
        }
        let n = rand::rng().random_range(self.min..=self.max);
        Ok(Some(n.to_string()))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("min".to_string(), self.min.into());
        fields.insert("max".to_string(), self.max.into());
        fields
    }
}

/// Outputs the environment variable `key`, or `default` when it is unset.
pub struct EnvNode {
    key: String,
    default: String,
}

impl EnvNode {
    pub fn new(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: default.into(),
        }
    }
}

impl Node for EnvNode {
    fn classname(&self) -> &'static str {
        "EnvNode"
    }

    fn run(&self, label: &str, _: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        match std::env::var(&self.key) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(node = %label, key = %self.key, error = %e, "falling back to default");
                Ok(Some(self.default.clone()))
            }
        }
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("key".to_string(), self.key.clone().into());
        fields.insert("default".to_string(), self.default.clone().into());
        fields
    }
}
