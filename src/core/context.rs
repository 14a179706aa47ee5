//! Execution context - explicit per-target environment and variables
//!
//! Everything a subprocess needs (credentials, region, emulator endpoints)
//! travels in an [`ExecutionContext`] owned by its pipeline. The orchestrator
//! never writes to its own process environment.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

use crate::core::step::CommandSpec;

/// A credential value that never shows up in `Debug` or `Display`
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, only for handing to a subprocess
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Result of rendering a template string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholders that had no value and were left in place
    pub missing: Vec<String>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex"))
}

/// Per-pipeline execution context
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Target this context belongs to
    pub target: String,

    /// Cloud region, if the target has one
    pub region: Option<String>,

    /// Plain environment passed to every subprocess
    pub env: BTreeMap<String, String>,

    /// Credential environment passed to every subprocess
    pub secrets: BTreeMap<String, Secret>,

    /// Variables available to `{{ name }}` placeholders
    pub variables: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        let mut variables = BTreeMap::new();
        variables.insert("target".to_string(), target.clone());
        Self {
            target,
            variables,
            ..Default::default()
        }
    }

    /// Set the region and expose it as `{{ region }}` and, optionally, as an env var
    pub fn with_region(mut self, region: impl Into<String>, env_var: Option<&str>) -> Self {
        let region = region.into();
        self.variables.insert("region".to_string(), region.clone());
        if let Some(var) = env_var {
            self.env.insert(var.to_string(), region.clone());
        }
        self.region = Some(region);
        self
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn set_secret(&mut self, key: impl Into<String>, value: Secret) {
        self.secrets.insert(key.into(), value);
    }

    /// Expose another pipeline's outputs as `{{ <target>.<key> }}`
    pub fn publish_outputs(&mut self, target: &str, outputs: &BTreeMap<String, Value>) {
        for (key, value) in outputs {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            self.variables.insert(format!("{}.{}", target, key), rendered);
        }
    }

    /// Replace `{{ name }}` placeholders; unknown names are left untouched
    pub fn render(&self, template: &str) -> Rendered {
        let mut missing = Vec::new();
        let text = placeholder_regex()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                match self.variables.get(key) {
                    Some(value) => value.clone(),
                    None => {
                        missing.push(key.to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        Rendered { text, missing }
    }

    /// Render every argument of a command
    pub fn render_command(&self, command: &CommandSpec) -> CommandSpec {
        let mut args = Vec::with_capacity(command.args.len());
        for arg in &command.args {
            let rendered = self.render(arg);
            for key in &rendered.missing {
                warn!("No value for placeholder '{}' in target '{}'", key, self.target);
            }
            args.push(rendered.text);
        }
        CommandSpec {
            program: self.render(&command.program).text,
            args,
        }
    }
}
