use lazy_static::lazy_static;
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;

/// Where background streams without an explicit redirection are bound.
pub const NULL_DEVICE: &str = "/dev/null";

/// Permission bits for files created by `>` (rw-rw-r--, before umask).
pub const OUTPUT_FILE_MODE: u32 = 0o664;

const DEFAULT_PROMPT: &str = ": ";
const DEFAULT_HISTORY_SIZE: usize = 1000;
const HISTORY_FILE_NAME: &str = ".smallsh_history";

/// What happens to outstanding background jobs when the shell exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    Terminate,
    Wait,
    Detach,
}

impl ExitPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "terminate" => Some(ExitPolicy::Terminate),
            "wait" => Some(ExitPolicy::Wait),
            "detach" => Some(ExitPolicy::Detach),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
    pub history_size: usize,
    pub on_exit: ExitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: DEFAULT_PROMPT.to_string(),
            history_file: dirs::home_dir().map(|home| home.join(HISTORY_FILE_NAME)),
            history_size: DEFAULT_HISTORY_SIZE,
            on_exit: ExitPolicy::Terminate,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from a key-value lookup, falling back to defaults
    /// for anything missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(prompt) = lookup("SMALLSH_PROMPT") {
            config.prompt = prompt;
        }

        if let Some(path) = lookup("SMALLSH_HISTFILE") {
            config.history_file = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Some(size) = lookup("SMALLSH_HISTSIZE") {
            match size.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.history_size = size,
                _ => warn!("ignoring invalid SMALLSH_HISTSIZE value {:?}", size),
            }
        }

        if let Some(policy) = lookup("SMALLSH_ON_EXIT") {
            match ExitPolicy::parse(&policy) {
                Some(policy) => config.on_exit = policy,
                None => warn!("ignoring invalid SMALLSH_ON_EXIT value {:?}", policy),
            }
        }

        config
    }
}

lazy_static! {
    pub static ref CONFIG: Arc<Config> = Arc::new(Config::from_env());
}
