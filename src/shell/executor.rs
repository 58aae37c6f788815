// src/shell/executor.rs
use anyhow::{Context, Result};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc;
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{close, dup2, execvp, fork, ForkResult, Pid};
use std::ffi::{CStr, CString};
use std::fmt;
use std::io::Write;
use std::os::unix::io::RawFd;

use crate::config::{NULL_DEVICE, OUTPUT_FILE_MODE};
use crate::shell::command_parser::CommandLine;
use crate::shell::signal_handler::SignalHandler;
use crate::shell::status::ExitStatus;
use crate::shell::Session;

/// A failure inside a forked child. Reported on the child's stderr, after
/// which the child exits with status 1.
#[derive(Debug)]
pub struct ChildError {
    subject: String,
    errno: Errno,
}

impl ChildError {
    fn new(subject: impl Into<String>, errno: Errno) -> Self {
        ChildError {
            subject: subject.into(),
            errno,
        }
    }
}

impl fmt::Display for ChildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "smallsh: {}: {}", self.subject, self.errno.desc())
    }
}

/// Everything the child needs, converted to C strings before forking so the
/// child does no fallible conversions of its own.
#[derive(Debug)]
pub struct LaunchPlan {
    program: CString,
    argv: Vec<CString>,
    input: Option<CString>,
    output: Option<CString>,
    null_device: CString,
    background: bool,
}

impl LaunchPlan {
    pub fn prepare(line: &CommandLine) -> Result<Self> {
        let argv = line
            .args
            .iter()
            .map(|arg| to_cstring(arg))
            .collect::<Result<Vec<_>>>()?;
        let program = argv.first().cloned().context("missing command")?;

        Ok(LaunchPlan {
            program,
            argv,
            input: line.redirections.input.as_deref().map(to_cstring).transpose()?,
            output: line.redirections.output.as_deref().map(to_cstring).transpose()?,
            null_device: to_cstring(NULL_DEVICE)?,
            background: line.background,
        })
    }
}

fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("argument contains a NUL byte: {:?}", value))
}

/// Rebinds stdin/stdout of the current process according to `plan`. Only
/// ever called in a child between fork and exec.
pub fn apply_redirections(plan: &LaunchPlan) -> Result<(), ChildError> {
    let output_flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
    let output_mode = Mode::from_bits_truncate(OUTPUT_FILE_MODE as libc::mode_t);

    match (&plan.input, plan.background) {
        (Some(path), _) => bind(path, OFlag::O_RDONLY, Mode::empty(), libc::STDIN_FILENO)?,
        (None, true) => bind(&plan.null_device, OFlag::O_RDWR, Mode::empty(), libc::STDIN_FILENO)?,
        (None, false) => {}
    }

    match (&plan.output, plan.background) {
        (Some(path), _) => bind(path, output_flags, output_mode, libc::STDOUT_FILENO)?,
        (None, true) => bind(&plan.null_device, OFlag::O_RDWR, Mode::empty(), libc::STDOUT_FILENO)?,
        (None, false) => {}
    }

    Ok(())
}

fn bind(path: &CStr, flags: OFlag, mode: Mode, target: RawFd) -> Result<(), ChildError> {
    let subject = || path.to_string_lossy().into_owned();
    let fd = open(path, flags, mode).map_err(|errno| ChildError::new(subject(), errno))?;
    if fd != target {
        dup2(fd, target).map_err(|errno| ChildError::new(subject(), errno))?;
        let _ = close(fd);
    }
    Ok(())
}

pub struct Executor;

impl Executor {
    /// Forks and runs an external program. Foreground commands are waited
    /// for; background ones are handed to the job tracker. Only a failing
    /// `fork` is returned as an error.
    pub fn execute(line: &CommandLine, session: &mut Session, out: &mut dyn Write) -> Result<()> {
        let plan = match LaunchPlan::prepare(line) {
            Ok(plan) => plan,
            Err(e) => {
                writeln!(out, "smallsh: {:#}", e)?;
                return Ok(());
            }
        };

        // The child inherits our buffers; anything pending would be written twice
        out.flush()?;

        let forked = unsafe { fork() }.context("Failed to fork")?;
        let child = match forked {
            ForkResult::Child => Self::exec_child(&plan),
            ForkResult::Parent { child } => child,
        };
        debug!("Forked {} for {:?} (background: {})", child, line.args, plan.background);

        if plan.background {
            session.jobs.add(child);
            writeln!(out, "Background process, pid: {} created.", child)?;
        } else {
            Self::wait_foreground(child, &mut session.last_status, out)?;
        }

        Ok(())
    }

    fn exec_child(plan: &LaunchPlan) -> ! {
        if let Err(errno) = SignalHandler::prepare_child(plan.background) {
            Self::abort_child(ChildError::new("sigaction", errno));
        }

        if let Err(e) = apply_redirections(plan) {
            Self::abort_child(e);
        }

        match execvp(&plan.program, &plan.argv) {
            Ok(never) => match never {},
            Err(errno) => Self::abort_child(ChildError::new(
                plan.program.to_string_lossy().into_owned(),
                errno,
            )),
        }
    }

    fn abort_child(err: ChildError) -> ! {
        eprintln!("{}", err);
        // Skip atexit handlers and buffer flushes inherited from the parent
        unsafe { libc::_exit(1) }
    }

    fn wait_foreground(pid: Pid, last_status: &mut ExitStatus, out: &mut dyn Write) -> Result<()> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some(status) = ExitStatus::from_wait(status) {
                        debug!("Foreground process {} finished: {:?}", pid, status);
                        *last_status = status;
                        return Ok(());
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("Failed to wait for foreground process {}: {}", pid, e);
                    writeln!(out, "smallsh: wait for process {} failed: {}", pid, e.desc())?;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::command_parser::CommandParser;

    #[test]
    fn test_prepare_keeps_program_arguments_only() {
        let line = CommandParser::parse("sort -r < in.txt > out.txt &").unwrap();
        let plan = LaunchPlan::prepare(&line).unwrap();
        assert_eq!(plan.program.as_c_str().to_str().unwrap(), "sort");
        let argv: Vec<&str> = plan.argv.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, vec!["sort", "-r"]);
        assert_eq!(plan.input.as_deref().unwrap().to_str().unwrap(), "in.txt");
        assert_eq!(plan.output.as_deref().unwrap().to_str().unwrap(), "out.txt");
        assert_eq!(plan.null_device.to_str().unwrap(), "/dev/null");
        assert!(plan.background);
    }

    #[test]
    fn test_prepare_rejects_nul_bytes() {
        let line = CommandParser::parse("echo a\0b").unwrap();
        let err = LaunchPlan::prepare(&line).unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn test_prepare_rejects_empty_command() {
        assert!(LaunchPlan::prepare(&CommandLine::default()).is_err());
    }

    #[test]
    fn test_child_error_message() {
        let err = ChildError::new("missing.txt", Errno::ENOENT);
        assert_eq!(err.to_string(), "smallsh: missing.txt: No such file or directory");
    }
}
