//! Project configuration from YAML

use crate::core::{
    context::{ExecutionContext, Secret},
    pipeline::{FailurePolicy, Pipeline},
    replication::ReplicationConfig,
    step::{BackoffStrategy, CommandSpec, RetryPolicy, Step},
};
use crate::cost::ResourceShape;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Target id reserved for the DR-test pipeline
pub const DR_TARGET_ID: &str = "dr-test";

/// Top-level project configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used in reports and as `{{ project }}`
    pub project: String,

    /// Variables available to every step
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    /// Named variable overlays selected with `--environment`
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub replication: Option<ReplicationConfig>,

    #[serde(default)]
    pub dr_test: Option<DrTestConfig>,

    #[serde(default)]
    pub cost: Option<CostConfig>,

    /// Directory of the file this config was loaded from (not serialized)
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

/// External tool binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_provisioner")]
    pub provisioner: String,

    #[serde(default = "default_configuration")]
    pub configuration: String,
}

fn default_provisioner() -> String {
    "terraform".to_string()
}

fn default_configuration() -> String {
    "ansible-playbook".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            provisioner: default_provisioner(),
            configuration: default_configuration(),
        }
    }
}

/// Project-wide step defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub policy: FailurePolicy,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_secs() -> u64 {
    900
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff_secs: u64,

    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: 0,
            backoff: BackoffStrategy::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.backoff_secs),
            self.backoff,
        )
    }
}

/// How target pipelines inside one stage are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Sequential,
    #[default]
    Parallel,
    ParallelLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Overall wall-clock ceiling; exceeding it cancels the session
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Concurrency limit for `parallel-limited`
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_duration_secs() -> u64 {
    7200
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_parallel() -> usize {
    2
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration_secs(),
            report_dir: default_report_dir(),
            log_dir: default_log_dir(),
            strategy: StrategyKind::default(),
            max_parallel: default_max_parallel(),
        }
    }
}

/// One deployment target (one cloud backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,

    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Env var the region is exported as (e.g. `AWS_REGION`)
    #[serde(default)]
    pub region_env: Option<String>,

    /// Host env vars forwarded to subprocesses as masked credentials
    #[serde(default)]
    pub credentials_env: Vec<String>,

    /// Extra env used only in test mode (emulator endpoints)
    #[serde(default)]
    pub test_env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Overrides `defaults.policy`
    #[serde(default)]
    pub policy: Option<FailurePolicy>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub teardown: Vec<StepConfig>,
}

/// Provisioner subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerAction {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
}

/// Configuration-runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureConfig {
    pub hosts: Vec<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub private_key: Option<String>,

    /// Task list (playbook) identifier
    pub tasks: String,

    #[serde(default)]
    pub extra_vars: BTreeMap<String, String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,

    /// Raw argv
    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub provisioner: Option<ProvisionerAction>,

    #[serde(default)]
    pub configure: Option<ConfigureConfig>,

    /// Marks a raw command as mutating
    #[serde(default)]
    pub mutating: Option<bool>,

    /// Read-only equivalent of a mutating raw command
    #[serde(default)]
    pub dry_run_command: Option<Vec<String>>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry: Option<RetryConfig>,

    #[serde(default)]
    pub capture_outputs: bool,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// How the DR test obtains its RTO figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RtoMode {
    /// Real wall-clock timer around the failover
    #[default]
    Measured,
    /// Configured stand-in value, labelled as such in reports
    Simulated,
}

/// DR-test phase commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrTestConfig {
    #[serde(default)]
    pub configure_replication: Option<Vec<String>>,

    pub simulate_failure: Vec<String>,
    pub trigger_failover: Vec<String>,
    pub verify_secondary: Vec<String>,

    /// Readiness probe against the secondary
    pub measure_rto: Vec<String>,

    #[serde(default)]
    pub rto_mode: RtoMode,

    /// RTO value reported in simulated mode
    #[serde(default)]
    pub simulated_rto_secs: Option<u64>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Retry policy for the readiness probe
    #[serde(default)]
    pub measure_rto_retry: Option<RetryConfig>,
}

/// Cost comparison settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Pricing table file (YAML or JSON)
    pub pricing: PathBuf,

    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,

    /// Providers compared in session reports (exactly two, or empty)
    #[serde(default)]
    pub compare: Vec<String>,

    #[serde(default)]
    pub shapes: BTreeMap<String, ResourceShape>,
}

fn default_duration_hours() -> f64 {
    730.0
}

/// Per-run knobs that shape how pipelines are built
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub environment: Option<String>,

    /// Overrides the configured project name
    pub project: Option<String>,

    pub dry_run: bool,

    /// Adds each target's `test_env` (emulated backends)
    pub test_mode: bool,

    /// Build from `teardown` steps instead of `steps`
    pub teardown: bool,
}

/// Convert a YAML scalar into the string placed into commands
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn argv(argv: &[String], what: &str) -> Result<CommandSpec, ConfigError> {
    CommandSpec::from_argv(argv)
        .ok_or_else(|| ConfigError::Invalid(format!("{} must be a non-empty argv list", what)))
}

impl ProjectConfig {
    /// Load project configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse and validate project configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve a path relative to the project file's directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() && !base.as_os_str().is_empty() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.project.trim().is_empty() {
            return invalid("project name must not be empty".to_string());
        }
        if self.defaults.timeout_secs == 0 {
            return invalid("defaults.timeout_secs must be positive".to_string());
        }
        if self.defaults.retry.max_attempts == 0 {
            return invalid("defaults.retry.max_attempts must be at least 1".to_string());
        }
        if self.session.strategy == StrategyKind::ParallelLimited && self.session.max_parallel == 0 {
            return invalid("session.max_parallel must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return invalid("target id must not be empty".to_string());
            }
            if target.id == DR_TARGET_ID {
                return invalid(format!("target id '{}' is reserved", DR_TARGET_ID));
            }
            if !seen.insert(target.id.as_str()) {
                return invalid(format!("Duplicate target ID: {}", target.id));
            }
            if target.steps.is_empty() {
                return invalid(format!("Target '{}' has no steps", target.id));
            }
            Self::validate_steps(&target.id, &target.steps)?;
            Self::validate_steps(&target.id, &target.teardown)?;
        }

        for target in &self.targets {
            for dep in &target.depends_on {
                if dep == &target.id {
                    return invalid(format!("Target '{}' depends on itself", target.id));
                }
                if !seen.contains(dep.as_str()) {
                    return invalid(format!(
                        "Target '{}' depends on non-existent target '{}'",
                        target.id, dep
                    ));
                }
            }
        }
        self.check_cycles()?;

        if let Some(replication) = &self.replication {
            replication.validate(self.targets.iter().map(|t| t.id.as_str()))?;
        }

        if let Some(dr) = &self.dr_test {
            if self.replication.is_none() {
                return invalid("dr_test requires a replication section".to_string());
            }
            dr.validate()?;
        }

        if let Some(cost) = &self.cost {
            if !cost.compare.is_empty() && cost.compare.len() != 2 {
                return invalid("cost.compare must name exactly two providers".to_string());
            }
            for provider in &cost.compare {
                if !cost.shapes.contains_key(provider) {
                    return invalid(format!("cost.compare provider '{}' has no shape", provider));
                }
            }
            if cost.duration_hours.is_nan() || cost.duration_hours <= 0.0 {
                return invalid("cost.duration_hours must be positive".to_string());
            }
        }

        Ok(())
    }

    fn validate_steps(target: &str, steps: &[StepConfig]) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for step in steps {
            if step.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Target '{}' has a step without a name",
                    target
                )));
            }
            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Target '{}' has duplicate step name '{}'",
                    target, step.name
                )));
            }
            let forms = [
                step.command.is_some(),
                step.provisioner.is_some(),
                step.configure.is_some(),
            ];
            if forms.iter().filter(|f| **f).count() != 1 {
                return Err(ConfigError::Invalid(format!(
                    "Step '{}/{}' must have exactly one of command, provisioner or configure",
                    target, step.name
                )));
            }
            if let Some(retry) = &step.retry {
                if retry.max_attempts == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "Step '{}/{}' retry.max_attempts must be at least 1",
                        target, step.name
                    )));
                }
            }
            if step.timeout_secs == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "Step '{}/{}' timeout_secs must be positive",
                    target, step.name
                )));
            }
            if let Some(configure) = &step.configure {
                if configure.hosts.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Step '{}/{}' configure.hosts must not be empty",
                        target, step.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check for cycles in the target dependency graph
    fn check_cycles(&self) -> Result<(), ConfigError> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        for target in &self.targets {
            self.dfs_check(&target.id, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn dfs_check<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> Result<(), ConfigError> {
        if visited.contains(id) {
            return Ok(());
        }
        stack.insert(id);
        if let Some(target) = self.target(id) {
            for dep in &target.depends_on {
                if stack.contains(dep.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "Cycle detected in target dependencies involving '{}'",
                        dep
                    )));
                }
                self.dfs_check(dep, visited, stack)?;
            }
        }
        stack.remove(id);
        visited.insert(id);
        Ok(())
    }

    /// Project variables with the selected environment overlaid
    pub fn resolve_variables(
        &self,
        environment: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut vars: BTreeMap<String, String> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();

        if let Some(name) = environment {
            let overlay = self.environments.get(name).ok_or_else(|| {
                ConfigError::Invalid(format!("Unknown environment '{}'", name))
            })?;
            for (k, v) in &overlay.variables {
                vars.insert(k.clone(), value_to_string(v));
            }
            vars.insert("environment".to_string(), name.to_string());
        }
        Ok(vars)
    }

    /// Project name after the `--project` override
    pub fn project_name<'a>(&'a self, options: &'a PipelineOptions) -> &'a str {
        options.project.as_deref().unwrap_or(&self.project)
    }

    /// Execution context for one target, reading credentials through `lookup`
    pub fn target_context(
        &self,
        target: &TargetConfig,
        options: &PipelineOptions,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ExecutionContext, ConfigError> {
        let mut ctx = ExecutionContext::new(target.id.clone());
        for (k, v) in self.resolve_variables(options.environment.as_deref())? {
            ctx.set_variable(k, v);
        }
        ctx.set_variable("project", self.project_name(options));
        if let Some(provider) = &target.provider {
            ctx.set_variable("provider", provider.clone());
        }
        match (&target.region, target.region_env.as_deref()) {
            (Some(region), env_var) => ctx = ctx.with_region(region.clone(), env_var),
            (None, Some(var)) => match lookup(var) {
                Some(region) => ctx = ctx.with_region(region, Some(var)),
                None => warn!("Region variable {} for target '{}' is not set", var, target.id),
            },
            (None, None) => {}
        }

        for var in &target.credentials_env {
            match lookup(var) {
                Some(value) => ctx.set_secret(var.clone(), Secret::new(value)),
                None => warn!("Credential variable {} for target '{}' is not set", var, target.id),
            }
        }

        if options.test_mode {
            for (k, v) in &target.test_env {
                ctx.set_env(k.clone(), v.clone());
            }
        }
        Ok(ctx)
    }

    /// Build the pipeline for one target
    pub fn build_pipeline(
        &self,
        target: &TargetConfig,
        options: &PipelineOptions,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Pipeline, ConfigError> {
        let step_configs = if options.teardown {
            &target.teardown
        } else {
            &target.steps
        };
        let working_dir = target.working_dir.as_deref().map(|d| self.resolve_path(d));

        let steps = step_configs
            .iter()
            .map(|sc| {
                let mut step = self.build_step(sc)?;
                if step.working_dir.is_none() {
                    step.working_dir = working_dir.clone();
                }
                Ok(step)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut pipeline = Pipeline::new(target.id.clone(), steps)
            .with_policy(target.policy.unwrap_or(self.defaults.policy))
            .with_dry_run(options.dry_run)
            .with_context(self.target_context(target, options, lookup)?);
        if let Some(provider) = &target.provider {
            pipeline = pipeline.with_provider(provider.clone());
        }
        pipeline.depends_on = target.depends_on.clone();

        debug!(
            "Built pipeline '{}' with {} steps (dry_run: {})",
            pipeline.target_id,
            pipeline.steps.len(),
            pipeline.dry_run
        );
        Ok(pipeline)
    }

    /// Build pipelines for all targets; teardown targets without steps are left out
    pub fn build_pipelines(
        &self,
        options: &PipelineOptions,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Vec<Pipeline>, ConfigError> {
        self.targets
            .iter()
            .filter(|t| !options.teardown || !t.teardown.is_empty())
            .map(|t| self.build_pipeline(t, options, lookup))
            .collect()
    }

    /// Expand a step configuration into a domain step
    pub fn build_step(&self, config: &StepConfig) -> Result<Step, ConfigError> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(self.defaults.timeout_secs));
        let retry = config.retry.unwrap_or(self.defaults.retry).to_policy();

        let mut step = if let Some(command) = &config.command {
            let step = Step::new(config.name.clone(), argv(command, &format!("step '{}' command", config.name))?);
            if config.mutating.unwrap_or(false) || config.dry_run_command.is_some() {
                let read_only = config
                    .dry_run_command
                    .as_ref()
                    .map(|c| argv(c, &format!("step '{}' dry_run_command", config.name)))
                    .transpose()?;
                step.mutating(read_only)
            } else {
                step
            }
        } else if let Some(action) = config.provisioner {
            self.provisioner_step(&config.name, action)
        } else if let Some(configure) = &config.configure {
            self.configure_step(&config.name, configure)
        } else {
            return Err(ConfigError::Invalid(format!(
                "Step '{}' has no command",
                config.name
            )));
        };

        step = step.with_timeout(timeout).with_retry(retry);
        if config.capture_outputs {
            step = step.capturing_outputs();
        }
        if let Some(dir) = &config.working_dir {
            step = step.in_dir(self.resolve_path(dir));
        }
        Ok(step)
    }

    fn provisioner_step(&self, name: &str, action: ProvisionerAction) -> Step {
        let tool = self.tools.provisioner.as_str();
        let cmd = |args: &[&str]| CommandSpec::new(tool, args.iter().copied());
        match action {
            ProvisionerAction::Init => Step::new(name, cmd(&["init", "-input=false"])),
            ProvisionerAction::Plan => Step::new(name, cmd(&["plan", "-input=false"])),
            ProvisionerAction::Apply => Step::new(name, cmd(&["apply", "-auto-approve", "-input=false"]))
                .mutating(Some(cmd(&["plan", "-input=false"]))),
            ProvisionerAction::Destroy => Step::new(name, cmd(&["destroy", "-auto-approve", "-input=false"]))
                .mutating(Some(cmd(&["plan", "-destroy", "-input=false"]))),
            ProvisionerAction::Output => Step::new(name, cmd(&["output", "-json"])).capturing_outputs(),
        }
    }

    fn configure_step(&self, name: &str, configure: &ConfigureConfig) -> Step {
        // Trailing comma makes the runner treat the value as an inline host list
        let inventory = format!("{},", configure.hosts.join(","));
        let mut args = vec!["-i".to_string(), inventory];
        if let Some(user) = &configure.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        if let Some(key) = &configure.private_key {
            args.push("--private-key".to_string());
            args.push(key.clone());
        }
        for (k, v) in &configure.extra_vars {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }
        args.push(configure.tasks.clone());

        let command = CommandSpec::new(self.tools.configuration.clone(), args);
        let check = command.clone().with_args(["--check"]);
        Step::new(name, command).mutating(Some(check))
    }
}

impl DrTestConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let phases = [
            ("simulate_failure", &self.simulate_failure),
            ("trigger_failover", &self.trigger_failover),
            ("verify_secondary", &self.verify_secondary),
            ("measure_rto", &self.measure_rto),
        ];
        for (name, argv) in phases {
            if argv.is_empty() {
                return Err(ConfigError::Invalid(format!("dr_test.{} must not be empty", name)));
            }
        }
        if matches!(&self.configure_replication, Some(c) if c.is_empty()) {
            return Err(ConfigError::Invalid(
                "dr_test.configure_replication must not be empty".to_string(),
            ));
        }
        if self.rto_mode == RtoMode::Simulated && self.simulated_rto_secs.is_none() {
            return Err(ConfigError::Invalid(
                "dr_test.rto_mode simulated requires simulated_rto_secs".to_string(),
            ));
        }
        if let Some(retry) = &self.measure_rto_retry {
            if retry.max_attempts == 0 {
                return Err(ConfigError::Invalid(
                    "dr_test.measure_rto_retry.max_attempts must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Host environment lookup used outside tests
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
