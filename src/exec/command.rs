//! External command actions.
//!
//! [`CommandAction`] wraps a shell command or external executable so it can
//! serve as the payload of a task node. The builder configures arguments,
//! environment variables, a working directory, and an optional timeout.
//!
//! ```rust
//! use conveyor::CommandAction;
//! use std::time::Duration;
//!
//! let unzip = CommandAction::builder("tar")
//!     .args(["-xzf", "tolldata.tgz", "-C", "staging/"])
//!     .timeout(Duration::from_secs(60))
//!     .build();
//! ```
//!
//! Failure modes map onto [`ActionError`]:
//!
//! - non-zero exit code: [`ActionError::CommandFailed`] with the code and
//!   captured stderr
//! - timeout: [`ActionError::Timeout`]; the subprocess is terminated when the
//!   command future is dropped, without graceful-shutdown grace
//! - spawn failure (program not found, permissions): [`ActionError::Io`]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::action::{Action, ActionError};
use crate::core::artifact::ArtifactRef;

/// An action that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandAction {
    description: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    produces: Vec<ArtifactRef>,
}

impl CommandAction {
    /// Start building a command action for the given program.
    pub fn builder(program: impl Into<String>) -> CommandActionBuilder {
        CommandActionBuilder::new(program)
    }

    /// The program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if one was set.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// The execution timeout, if one was set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl Action for CommandAction {
    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| ActionError::Timeout(duration))??,
            None => cmd.output().await?,
        };

        if output.status.success() {
            debug!(program = %self.program, "command succeeded");
            Ok(self.produces.clone())
        } else {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ActionError::CommandFailed { code, stderr })
        }
    }
}

/// Builder for [`CommandAction`].
#[derive(Debug, Clone)]
pub struct CommandActionBuilder {
    description: Option<String>,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    produces: Vec<ArtifactRef>,
}

impl CommandActionBuilder {
    /// Create a builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            description: None,
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: None,
            produces: Vec::new(),
        }
    }

    /// Override the description; defaults to the rendered command line.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable for the subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Declare an artifact this command writes on success.
    pub fn produces(mut self, artifact: ArtifactRef) -> Self {
        self.produces.push(artifact);
        self
    }

    /// Build the action.
    pub fn build(self) -> CommandAction {
        let description = self.description.unwrap_or_else(|| {
            if self.args.is_empty() {
                self.program.clone()
            } else {
                format!("{} {}", self.program, self.args.join(" "))
            }
        });
        CommandAction {
            description,
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
            produces: self.produces,
        }
    }
}
