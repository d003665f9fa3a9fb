use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// One COLMAP call: `<colmap> <subcommand> --flag value ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    subcommand: &'static str,
    options: Vec<(String, OsString)>,
}

impl Invocation {
    pub fn new(subcommand: &'static str) -> Self {
        Self {
            subcommand,
            options: Vec::new(),
        }
    }

    /// Append `--<flag> <value>`
    pub fn option(mut self, flag: &str, value: impl Into<OsString>) -> Self {
        self.options.push((flag.to_string(), value.into()));
        self
    }

    pub fn path(self, flag: &str, value: &Path) -> Self {
        self.option(flag, value.as_os_str())
    }

    /// COLMAP boolean options take 0/1
    pub fn flag(self, flag: &str, enabled: bool) -> Self {
        self.option(flag, if enabled { "1" } else { "0" })
    }

    #[cfg(test)]
    pub fn subcommand(&self) -> &'static str {
        self.subcommand
    }

    /// Value passed for `flag`, if any
    #[cfg(test)]
    pub fn value(&self, flag: &str) -> Option<&std::ffi::OsStr> {
        self.options
            .iter()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value.as_os_str())
    }

    /// Arguments following the executable
    pub fn args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(1 + self.options.len() * 2);
        args.push(OsString::from(self.subcommand));
        for (flag, value) in &self.options {
            args.push(OsString::from(format!("--{}", flag)));
            args.push(value.clone());
        }
        args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subcommand)?;
        for (flag, value) in &self.options {
            write!(f, " --{} {}", flag, value.to_string_lossy())?;
        }
        Ok(())
    }
}

/// How a COLMAP process ended. `None` means it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus(Option<i32>);

impl ToolStatus {
    #[cfg(test)]
    pub fn from_code(code: i32) -> Self {
        Self(Some(code))
    }

    #[cfg(test)]
    pub fn signaled() -> Self {
        Self(None)
    }

    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.0
    }
}

impl From<ExitStatus> for ToolStatus {
    fn from(status: ExitStatus) -> Self {
        Self(status.code())
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by a signal"),
        }
    }
}

/// Runs COLMAP invocations. Every call blocks until the tool exits.
pub trait ToolRunner {
    fn run(&mut self, invocation: &Invocation) -> io::Result<ToolStatus>;
}

/// Spawns the real executable, inheriting stdout/stderr so COLMAP's own
/// progress output reaches the console.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
}

impl ProcessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> io::Result<ToolStatus> {
        let status = Command::new(&self.executable)
            .args(invocation.args())
            .status()?;
        Ok(status.into())
    }
}
