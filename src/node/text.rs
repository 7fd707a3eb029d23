use super::{Fields, Node, TextData};
use crate::error::NodeError;
use crate::state::State;
use regex::Regex;
use tracing::info;

/// Formats a template against the state: `{state.result}`, `{state[Label]}`,
/// `{state.snapshot[Label]}`, with `{{`/`}}` as literal braces.
pub struct PromptNode {
    prompt: TextData,
}

impl PromptNode {
    pub fn new(prompt: TextData) -> Self {
        Self { prompt }
    }

    pub fn from_template(text: impl Into<String>) -> Self {
        Self::new(TextData::new("prompt", text))
    }
}

impl Node for PromptNode {
    fn classname(&self) -> &'static str {
        "PromptNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        format_template(&self.prompt.text, state).map(Some)
    }

    fn cost(&self, label: &str, state: &mut State) -> f64 {
        state.set(label, "");
        state.result = self.prompt.text.clone();
        0.0
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "prompt".to_string(),
            serde_json::to_value(&self.prompt).unwrap_or_default(),
        );
        fields
    }
}

pub(crate) fn format_template(template: &str, state: &State) -> Result<String, NodeError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(NodeError::Failed(
                                "Single '{' encountered in format string".to_string(),
                            ));
                        }
                    }
                }
                out.push_str(&resolve_placeholder(field.trim(), state)?);
            }
            '}' => {
                return Err(NodeError::Failed(
                    "Single '}' encountered in format string".to_string(),
                ));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn resolve_placeholder(field: &str, state: &State) -> Result<String, NodeError> {
    if field == "state.result" {
        return Ok(state.result.clone());
    }
    let key = field
        .strip_prefix("state.snapshot[")
        .or_else(|| field.strip_prefix("state["))
        .and_then(|rest| rest.strip_suffix(']'));
    match key {
        Some(key) => {
            let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
            Ok(state.get(key).to_string())
        }
        None => Err(NodeError::Failed(format!(
            "Unknown placeholder '{{{}}}'",
            field
        ))),
    }
}

/// Extracts capture group 1 of `regex` from the current result.
pub struct RegexNode {
    regex: Regex,
}

impl RegexNode {
    pub fn new(pattern: &str) -> Result<Self, NodeError> {
        let regex = Regex::new(pattern).map_err(|e| NodeError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex })
    }
}

impl Node for RegexNode {
    fn classname(&self) -> &'static str {
        "RegexNode"
    }

    fn run(
        &self,
        label: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        info!(node = %label, result = %state.result, "matching regex");
        let no_match = || NodeError::NoMatch {
            pattern: self.regex.as_str().to_string(),
        };
        let captures = self.regex.captures(&state.result).ok_or_else(no_match)?;
        let group = captures.get(1).ok_or_else(no_match)?;
        Ok(Some(group.as_str().to_string()))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("regex".to_string(), self.regex.as_str().into());
        fields
    }
}

/// Returns the text between `start_tag` and `end_tag`, or `""` when either is missing.
pub struct TagNode {
    start_tag: String,
    end_tag: String,
}

impl TagNode {
    pub fn new(start_tag: impl Into<String>, end_tag: impl Into<String>) -> Self {
        Self {
            start_tag: start_tag.into(),
            end_tag: end_tag.into(),
        }
    }
}

impl Node for TagNode {
    fn classname(&self) -> &'static str {
        "TagNode"
    }

    fn run(
        &self,
        label: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        info!(node = %label, result = %state.result, "extracting tag");
        let content = &state.result;
        let Some(start) = content.find(&self.start_tag) else {
            return Ok(Some(String::new()));
        };
        let inner_start = start + self.start_tag.len();
        let Some(length) = content[inner_start..].find(&self.end_tag) else {
            return Ok(Some(String::new()));
        };
        Ok(Some(content[inner_start..inner_start + length].to_string()))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("start_tag".to_string(), self.start_tag.clone().into());
        fields.insert("end_tag".to_string(), self.end_tag.clone().into());
        fields
    }
}
