//! # Managed-server configuration.
//!
//! [`ServerConfig`] is the effective configuration the supervisor spawns with.
//! It starts from compiled-in defaults, absorbs [`ServerOverrides`] on every
//! `listen` call, and returns to the defaults on `reset`.
//!
//! ## Merge rules
//! - An override field that is set **replaces** the stored value.
//! - An unset override field **retains** the stored value.
//! - Merging is one level deep: `args` and `env` are replaced as a whole.
//!
//! ## Sentinel values
//! - `delay = 0s` → no readiness timeout (see [`ServerConfig::delay_timeout`])
//! - `success_message = None` / `error_message = None` → that signal is disabled
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use devvisor::{ServerConfig, ServerOverrides};
//!
//! let cfg = ServerConfig::default().merged(
//!     &ServerOverrides::new()
//!         .path("./target/debug/api")
//!         .args(["--port", "1337"])
//!         .delay(Duration::from_millis(50)),
//! );
//!
//! assert_eq!(cfg.args, vec!["--port", "1337"]);
//! assert_eq!(cfg.delay_timeout(), Some(Duration::from_millis(50)));
//! assert!(cfg.validate().is_ok());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::error::ServerError;
use crate::signal::Signal;

/// Environment variable set for the managed process unless `env` is overridden.
pub const DEV_ENV_KEY: &str = "APP_ENV";

const DEFAULT_DELAY: Duration = Duration::from_millis(600);
const DEFAULT_SUCCESS_MESSAGE: &str = "^server listening$";
const DEFAULT_ERROR_MESSAGE: &str = "[eE]rror|[eE]xception";

/// Text pattern matched against single lines of process output.
///
/// Thin wrapper over [`Regex`] that compares by source text, so two
/// configurations built from the same pattern strings are equal.
#[derive(Clone)]
pub struct MessagePattern(Regex);

impl MessagePattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Returns `true` if `line` contains a match.
    #[inline]
    pub fn is_match(&self, line: &str) -> bool {
        self.0.is_match(line)
    }

    /// Returns the source text of the pattern.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn builtin(pattern: &'static str) -> Self {
        Self(Regex::new(pattern).expect("built-in pattern compiles"))
    }
}

impl From<Regex> for MessagePattern {
    fn from(re: Regex) -> Self {
        Self(re)
    }
}

impl PartialEq for MessagePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for MessagePattern {}

impl fmt::Debug for MessagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

/// Process-creation parameters passed through verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Program that runs `path` (for example `node` or `python3`).
    ///
    /// When unset, `path` itself is executed and `interpreter_args` are ignored.
    pub interpreter: Option<PathBuf>,
    /// Interpreter-level flags placed before `path`.
    pub interpreter_args: Vec<String>,
    /// Working directory of the process (`None` = inherit).
    pub cwd: Option<PathBuf>,
    /// User id to run as (unix only).
    pub uid: Option<u32>,
    /// Group id to run as (unix only).
    pub gid: Option<u32>,
}

/// Effective configuration of the managed server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Executable or entry point to spawn. Required before the first `listen`.
    pub path: PathBuf,
    /// Arguments passed to the process.
    pub args: Vec<String>,
    /// Variables layered over the inherited host environment.
    pub env: HashMap<String, String>,
    /// Interpreter, working directory and identity.
    pub exec: ExecOptions,
    /// Silence period after which the process is assumed ready (`0s` = disabled).
    pub delay: Duration,
    /// Stdout line that declares readiness immediately.
    pub success_message: Option<MessagePattern>,
    /// Stderr line that declares a failed start immediately.
    pub error_message: Option<MessagePattern>,
    /// Signal used by `kill` when the caller gives none.
    pub kill_signal: Signal,
}

impl ServerConfig {
    /// Returns the readiness timeout as an `Option`.
    ///
    /// - `None` → no timeout signal, readiness depends on messages only
    /// - `Some(d)` → assume ready after `d` of silence
    #[inline]
    pub fn delay_timeout(&self) -> Option<Duration> {
        if self.delay == Duration::ZERO {
            None
        } else {
            Some(self.delay)
        }
    }

    /// Returns `true` once a non-empty `path` is configured.
    #[inline]
    pub fn has_path(&self) -> bool {
        !self.path.as_os_str().is_empty()
    }

    /// Checks that the configuration can be spawned.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.has_path() {
            return Err(ServerError::PathRequired);
        }
        Ok(())
    }

    /// Returns a copy with every field set in `overrides` replaced.
    #[must_use]
    pub fn merged(&self, overrides: &ServerOverrides) -> Self {
        let mut next = self.clone();
        next.merge(overrides);
        next
    }

    /// Replaces every field set in `overrides`, in place.
    pub fn merge(&mut self, overrides: &ServerOverrides) {
        let o = overrides.clone();
        if let Some(v) = o.path {
            self.path = v;
        }
        if let Some(v) = o.args {
            self.args = v;
        }
        if let Some(v) = o.env {
            self.env = v;
        }
        if let Some(v) = o.exec {
            self.exec = v;
        }
        if let Some(v) = o.delay {
            self.delay = v;
        }
        if let Some(v) = o.success_message {
            self.success_message = v;
        }
        if let Some(v) = o.error_message {
            self.error_message = v;
        }
        if let Some(v) = o.kill_signal {
            self.kill_signal = v;
        }
    }

    /// Returns `(program, argv)` as handed to process creation.
    pub(crate) fn command_line(&self) -> (PathBuf, Vec<String>) {
        match &self.exec.interpreter {
            Some(interpreter) => {
                let mut argv = self.exec.interpreter_args.clone();
                argv.push(self.path.to_string_lossy().into_owned());
                argv.extend(self.args.iter().cloned());
                (interpreter.clone(), argv)
            }
            None => (self.path.clone(), self.args.clone()),
        }
    }
}

impl Default for ServerConfig {
    /// Compiled-in defaults:
    ///
    /// - `path` empty (must be supplied by the first `listen`)
    /// - `env = { APP_ENV: "development" }`
    /// - `delay = 600ms`
    /// - `success_message = /^server listening$/`
    /// - `error_message = /[eE]rror|[eE]xception/`
    /// - `kill_signal = SIGTERM`
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            args: Vec::new(),
            env: HashMap::from([(DEV_ENV_KEY.to_string(), "development".to_string())]),
            exec: ExecOptions::default(),
            delay: DEFAULT_DELAY,
            success_message: Some(MessagePattern::builtin(DEFAULT_SUCCESS_MESSAGE)),
            error_message: Some(MessagePattern::builtin(DEFAULT_ERROR_MESSAGE)),
            kill_signal: Signal::SIGTERM,
        }
    }
}

/// Caller-supplied partial configuration for `listen`.
///
/// Every field is optional; unset fields keep the stored value.
/// Pattern fields are doubly optional so a caller can disable a signal
/// (`Some(None)`) as opposed to leaving it unchanged (`None`).
#[derive(Clone, Debug, Default)]
pub struct ServerOverrides {
    pub path: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub env: Option<HashMap<String, String>>,
    pub exec: Option<ExecOptions>,
    pub delay: Option<Duration>,
    pub success_message: Option<Option<MessagePattern>>,
    pub error_message: Option<Option<MessagePattern>>,
    pub kill_signal: Option<Signal>,
}

impl ServerOverrides {
    /// Creates an empty override set (keeps everything).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the whole environment map layered over the host environment.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn exec(mut self, exec: ExecOptions) -> Self {
        self.exec = Some(exec);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn delay_ms(self, ms: u64) -> Self {
        self.delay(Duration::from_millis(ms))
    }

    /// Sets the readiness line pattern; `None` disables the success signal.
    pub fn success_message(mut self, pattern: Option<MessagePattern>) -> Self {
        self.success_message = Some(pattern);
        self
    }

    /// Sets the failure line pattern; `None` disables the error signal.
    pub fn error_message(mut self, pattern: Option<MessagePattern>) -> Self {
        self.error_message = Some(pattern);
        self
    }

    pub fn kill_signal(mut self, signal: Signal) -> Self {
        self.kill_signal = Some(signal);
        self
    }
}
