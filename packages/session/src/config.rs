//! Session configuration.

use std::borrow::Cow;
use std::path::PathBuf;

use procbridge_pipe::{Entrypoint, SubprocessConfig};
use serde::{Deserialize, Serialize};

/// Peer loop shipped with the crate. Needs a Python 3 interpreter; numpy is
/// optional and only required for ndarray values.
pub const DEFAULT_BOOTSTRAP: &str = include_str!("bootstrap.py");

pub const DEFAULT_INTERPRETER: &str = "/usr/bin/python3";

/// How to start the peer.
///
/// The peer runs as `<interpreter> -c <bootstrap> <request-fd> <response-fd>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub interpreter: PathBuf,
    pub bootstrap: Cow<'static, str>,
    pub subprocess: SubprocessConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            bootstrap: Cow::Borrowed(DEFAULT_BOOTSTRAP),
            subprocess: SubprocessConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: impl Into<Cow<'static, str>>) -> Self {
        self.bootstrap = bootstrap.into();
        self
    }

    pub fn with_subprocess(mut self, subprocess: SubprocessConfig) -> Self {
        self.subprocess = subprocess;
        self
    }

    pub fn entrypoint(&self) -> Entrypoint {
        Entrypoint::new(self.interpreter.clone())
            .arg("-c")
            .arg(&*self.bootstrap)
    }
}
