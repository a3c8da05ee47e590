use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// An external program invocation: program, arguments, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command. `code` is `None` when the child was
/// terminated by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe_code(&self) -> String {
        match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

impl From<Output> for CommandOutcome {
    fn from(out: Output) -> Self {
        Self {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        }
    }
}

/// Seam between the archiver and the processes it drives.
///
/// `Err` means the command could not be run at all; a non-zero exit is still
/// `Ok` and left to the caller to interpret.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        (**self).run(spec)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    pub timeout_secs: Option<u64>,
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        tracing::debug!(command = %spec, "executing");
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.args.iter().map(OsString::from));
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        let out = run_command_with_optional_timeout(&mut cmd, self.timeout_secs)
            .with_context(|| format!("failed to run `{spec}`"))?;
        let outcome = CommandOutcome::from(out);
        tracing::debug!(
            command = %spec,
            code = %outcome.describe_code(),
            stdout = %outcome.stdout.trim(),
            stderr = %outcome.stderr.trim(),
            "finished"
        );
        Ok(outcome)
    }
}

fn drain<P: Read + Send + 'static>(pipe: Option<P>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `cmd` to completion, killing it after `timeout_secs`. Output is drained
/// while the child runs so a full pipe cannot stall it.
pub fn run_command_with_optional_timeout(
    cmd: &mut Command,
    timeout_secs: Option<u64>,
) -> Result<Output> {
    cmd.stdin(Stdio::null());
    let Some(timeout_secs) = timeout_secs else {
        return Ok(cmd.output()?);
    };
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout
                .join()
                .map_err(|_| anyhow::anyhow!("stdout reader panicked"))?;
            let stderr = stderr
                .join()
                .map_err(|_| anyhow::anyhow!("stderr reader panicked"))?;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            // Readers are left detached: a grandchild may still hold the pipes.
            anyhow::bail!("command timed out after {}s", timeout_secs);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Use `configured` when it names an existing file, otherwise look it up on PATH.
pub fn resolve_bin(configured: &Path) -> Result<PathBuf> {
    if configured.is_file() {
        return Ok(configured.to_path_buf());
    }
    which::which(configured)
        .with_context(|| format!("{} not found as a file or on PATH", configured.display()))
}
