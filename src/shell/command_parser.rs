// src/shell/command_parser.rs
use anyhow::{bail, Result};

pub const INPUT_MARKER: &str = "<";
pub const OUTPUT_MARKER: &str = ">";
pub const BACKGROUND_MARKER: &str = "&";
pub const COMMENT_PREFIX: char = '#';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Redirections {
    pub input: Option<String>,  // <
    pub output: Option<String>, // >
}

impl Redirections {
    /// Pulls the first `<` and the first `>` out of `args`, together with the
    /// file names that follow them. The remaining tokens keep their order.
    pub fn extract(args: &mut Vec<String>) -> Result<Self> {
        let input_at = find_input_marker(args);
        let output_at = find_output_marker(args);

        let input = match input_at {
            Some(index) => Some(target_of(args, index, INPUT_MARKER)?),
            None => None,
        };
        let output = match output_at {
            Some(index) => Some(target_of(args, index, OUTPUT_MARKER)?),
            None => None,
        };

        let mut doomed: Vec<usize> = input_at
            .into_iter()
            .chain(output_at)
            .flat_map(|index| [index, index + 1])
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for index in doomed {
            args.remove(index);
        }

        Ok(Redirections { input, output })
    }
}

fn target_of(args: &[String], marker_at: usize, marker: &str) -> Result<String> {
    match args.get(marker_at + 1) {
        Some(target) if target != INPUT_MARKER && target != OUTPUT_MARKER => Ok(target.clone()),
        _ => bail!("syntax error: expected a file name after '{}'", marker),
    }
}

/// Index of the first token that is exactly `<`.
pub fn find_input_marker(args: &[String]) -> Option<usize> {
    find_marker(args, INPUT_MARKER)
}

/// Index of the first token that is exactly `>`.
pub fn find_output_marker(args: &[String]) -> Option<usize> {
    find_marker(args, OUTPUT_MARKER)
}

fn find_marker(args: &[String], marker: &str) -> Option<usize> {
    args.iter().position(|arg| arg == marker)
}

/// Splits a raw input line into tokens. No quoting: a token is a maximal run
/// of non-whitespace characters.
pub fn tokenize(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_string).collect()
}

/// One parsed input line. `args` no longer contains redirection tokens or
/// the trailing `&`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLine {
    pub args: Vec<String>,
    pub redirections: Redirections,
    pub background: bool,
}

impl CommandLine {
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.args.is_empty()
    }

    pub fn is_comment(&self) -> bool {
        self.program()
            .map_or(false, |first| first.starts_with(COMMENT_PREFIX))
    }
}

pub struct CommandParser;

impl CommandParser {
    pub fn parse(input: &str) -> Result<CommandLine> {
        let mut args = tokenize(input);

        // Blank lines and comments are never interpreted any further
        if args.first().map_or(true, |first| first.starts_with(COMMENT_PREFIX)) {
            return Ok(CommandLine {
                args,
                ..CommandLine::default()
            });
        }

        let background = args.last().map_or(false, |last| last == BACKGROUND_MARKER);
        if background {
            args.pop();
        }

        let redirections = Redirections::extract(&mut args)?;

        if args.is_empty() {
            bail!("syntax error: missing command");
        }

        Ok(CommandLine {
            args,
            redirections,
            background,
        })
    }
}
