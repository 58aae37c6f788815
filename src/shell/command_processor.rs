// src/shell/command_processor.rs
use anyhow::Result;
use log::debug;
use std::io::Write;
use std::path::PathBuf;

use crate::shell::command_parser::CommandLine;
use crate::shell::executor::Executor;
use crate::shell::Session;

const USAGE: &str = "command [arg1 arg2 ...] [< input_file] [> output_file] [&]";

/// Whether the shell loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Runs `cd`, `status` and `exit` in-process, skips blanks and comments,
/// and hands everything else to the executor.
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        CommandProcessor
    }

    pub fn dispatch(
        &self,
        line: &CommandLine,
        session: &mut Session,
        out: &mut dyn Write,
    ) -> Result<Flow> {
        if line.is_blank() || line.is_comment() {
            return Ok(Flow::Continue);
        }

        debug!("Dispatching {:?}", line.args);
        match line.args[0].as_str() {
            "cd" => {
                Self::change_dir(&line.args[1..], out)?;
                Ok(Flow::Continue)
            }
            "status" => {
                writeln!(out, "{}", session.last_status)?;
                Ok(Flow::Continue)
            }
            "exit" => {
                writeln!(out, "Exiting shell...")?;
                Ok(Flow::Exit)
            }
            _ => {
                Executor::execute(line, session, out)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn change_dir(args: &[String], out: &mut dyn Write) -> Result<()> {
        let target = match args {
            [] => match dirs::home_dir() {
                Some(home) => home,
                None => {
                    writeln!(out, "cd: HOME not set")?;
                    return Ok(());
                }
            },
            [dir] => PathBuf::from(dir),
            _ => {
                writeln!(out, "{}", USAGE)?;
                return Ok(());
            }
        };

        if let Err(e) = std::env::set_current_dir(&target) {
            writeln!(out, "cd: {}: {}", target.display(), e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::shell::command_parser::CommandParser;
    use crate::shell::status::ExitStatus;
    use std::sync::Arc;

    fn run(session: &mut Session, input: &str) -> (Flow, String) {
        let line = CommandParser::parse(input).unwrap();
        let mut out = Vec::new();
        let flow = CommandProcessor::new()
            .dispatch(&line, session, &mut out)
            .unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    fn session() -> Session {
        Session::new(Arc::new(Config::from_lookup(|_| None)))
    }

    #[test]
    fn test_blank_and_comment_lines_do_nothing() {
        let mut session = session();
        session.last_status = ExitStatus::Signaled(2);
        for input in ["", "   \n", "# a comment", "#nospace > &"] {
            let (flow, output) = run(&mut session, input);
            assert_eq!(flow, Flow::Continue);
            assert!(output.is_empty());
        }
        assert_eq!(session.last_status, ExitStatus::Signaled(2));
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn test_status_is_idempotent() {
        let mut session = session();
        session.last_status = ExitStatus::Exited(2);
        let (_, first) = run(&mut session, "status");
        let (_, second) = run(&mut session, "status");
        assert_eq!(first, "Exited with status: 2\n");
        assert_eq!(first, second);

        session.last_status = ExitStatus::Signaled(9);
        let (_, output) = run(&mut session, "status &");
        assert_eq!(output, "terminated by signal: 9\n");
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let mut session = session();
        let (flow, output) = run(&mut session, "exit");
        assert_eq!(flow, Flow::Exit);
        assert_eq!(output, "Exiting shell...\n");
    }

    #[test]
    fn test_cd_with_too_many_arguments_prints_usage() {
        let mut session = session();
        let before = std::env::current_dir().unwrap();
        let (flow, output) = run(&mut session, "cd / /tmp");
        assert_eq!(flow, Flow::Continue);
        assert_eq!(output, format!("{}\n", USAGE));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_cd_to_missing_directory_reports_error() {
        let mut session = session();
        let before = std::env::current_dir().unwrap();
        let (flow, output) = run(&mut session, "cd /definitely/not/here");
        assert_eq!(flow, Flow::Continue);
        assert!(output.starts_with("cd: /definitely/not/here: "));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}
