use log::debug;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// The two dispositions the shell ever installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPolicy {
    Ignore,
    Default,
}

impl SignalPolicy {
    fn handler(self) -> SigHandler {
        match self {
            SignalPolicy::Ignore => SigHandler::SigIgn,
            SignalPolicy::Default => SigHandler::SigDfl,
        }
    }

    /// Installs this disposition for `signal` and returns the one it replaced.
    pub fn apply(self, signal: Signal) -> Result<SigHandler, nix::Error> {
        let action = SigAction::new(self.handler(), SaFlags::empty(), SigSet::all());
        // SIG_IGN and SIG_DFL carry no handler code, so nothing here can race
        let previous = unsafe { signal::sigaction(signal, &action)? };
        Ok(previous.handler())
    }
}

pub struct SignalHandler;

impl SignalHandler {
    /// The shell itself never dies from an interrupt typed at the terminal.
    /// Re-applied before every prompt.
    pub fn initialize() -> Result<(), nix::Error> {
        debug!("Ignoring SIGINT in the shell");
        SignalPolicy::Ignore.apply(Signal::SIGINT)?;
        Ok(())
    }

    /// Runs in a freshly forked child before exec. Foreground children become
    /// interruptible again; background children keep SIGINT ignored. SIGPIPE
    /// is ignored by the Rust runtime and must not leak into programs we run.
    pub fn prepare_child(background: bool) -> Result<(), nix::Error> {
        SignalPolicy::Default.apply(Signal::SIGPIPE)?;
        if !background {
            SignalPolicy::Default.apply(Signal::SIGINT)?;
        }
        Ok(())
    }
}
