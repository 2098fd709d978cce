use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::command::Command;
use crate::variable::Variable;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read configuration `{}`: {1}", _0.display())]
    Read(PathBuf, #[source] io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A trace session described in TOML.
///
/// ```toml
/// program = "./target"
/// args = ["1", "2"]
///
/// [variable]
/// name = "global_var"
/// signed = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub disable_aslr: bool,
    pub variable: VariableConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub name: String,
    #[serde(default)]
    pub signed: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;
        text.parse()
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if self.disable_aslr {
            command.disable_aslr();
        }
        command
    }

    pub fn variable(&self) -> Variable {
        Variable::new(self.variable.name.clone(), self.variable.signed)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
