use anyhow::Result;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ExitPolicy;
use crate::shell::status::ExitStatus;

/// How long jobs get to exit after SIGTERM before they are killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outstanding background children, in launch order. An entry is dropped as
/// soon as it has been reaped so a recycled pid is never polled by mistake.
#[derive(Debug, Default)]
pub struct JobControl {
    background_jobs: Vec<Pid>,
}

impl JobControl {
    pub fn new() -> Self {
        JobControl {
            background_jobs: Vec::new(),
        }
    }

    pub fn add(&mut self, pid: Pid) {
        debug!("Tracking background job {}", pid);
        self.background_jobs.push(pid);
    }

    pub fn pids(&self) -> &[Pid] {
        &self.background_jobs
    }

    pub fn is_empty(&self) -> bool {
        self.background_jobs.is_empty()
    }

    /// Polls every job without blocking, reports the ones that finished and
    /// records the last of them in `last_status`.
    pub fn check_background(
        &mut self,
        last_status: &mut ExitStatus,
        out: &mut dyn Write,
    ) -> Result<()> {
        let mut finished = Vec::new();

        self.background_jobs.retain(|&pid| {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => match ExitStatus::from_wait(status) {
                    Some(status) => {
                        finished.push((pid, status));
                        false
                    }
                    None => true,
                },
                Err(Errno::EINTR) => true,
                Err(Errno::ECHILD) => {
                    warn!("Background job {} is no longer our child, dropping it", pid);
                    false
                }
                Err(e) => {
                    warn!("Failed to poll background job {}: {}", pid, e);
                    true
                }
            }
        });

        if let Some(&(_, status)) = finished.last() {
            *last_status = status;
        }

        for (pid, status) in finished {
            debug!("Reaped background job {}: {:?}", pid, status);
            match status {
                ExitStatus::Exited(code) => writeln!(
                    out,
                    "Background Process PID: {} exited with status of {}",
                    pid, code
                )?,
                ExitStatus::Signaled(signal) => writeln!(
                    out,
                    "Background Process PID: {} terminated by signal {}",
                    pid, signal
                )?,
            }
        }

        Ok(())
    }

    /// Deals with whatever is still running when the shell exits.
    pub fn shutdown(&mut self, policy: ExitPolicy) {
        if self.is_empty() {
            return;
        }
        debug!("Shutting down background jobs {:?} ({:?})", self.pids(), policy);

        match policy {
            ExitPolicy::Detach => self.background_jobs.clear(),
            ExitPolicy::Wait => self.reap_all(),
            ExitPolicy::Terminate => {
                self.signal_all(Signal::SIGTERM);
                self.reap_until(Instant::now() + TERMINATE_GRACE);
                if !self.is_empty() {
                    warn!("Jobs {:?} ignored SIGTERM, killing them", self.pids());
                    self.signal_all(Signal::SIGKILL);
                }
                self.reap_all();
            }
        }
    }

    fn signal_all(&self, sig: Signal) {
        for &pid in &self.background_jobs {
            match signal::kill(pid, sig) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to send {} to {}: {}", sig, pid, e),
            }
        }
    }

    /// Reaps jobs without blocking until they are all gone or `deadline`
    /// passes. Whatever is left stays tracked.
    fn reap_until(&mut self, deadline: Instant) {
        loop {
            self.background_jobs.retain(|&pid| {
                match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(status) => ExitStatus::from_wait(status).is_none(),
                    Err(Errno::EINTR) => true,
                    Err(e) => {
                        warn!("Failed to reap background job {}: {}", pid, e);
                        false
                    }
                }
            });

            if self.is_empty() || Instant::now() >= deadline {
                return;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    fn reap_all(&mut self) {
        for pid in self.background_jobs.drain(..) {
            loop {
                match waitpid(pid, None) {
                    Ok(status) if ExitStatus::from_wait(status).is_some() => break,
                    Ok(_) | Err(Errno::EINTR) => continue,
                    Err(e) => {
                        warn!("Failed to reap background job {}: {}", pid, e);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    fn poll_until_empty(jobs: &mut JobControl, status: &mut ExitStatus) -> String {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !jobs.is_empty() && Instant::now() < deadline {
            jobs.check_background(status, &mut out).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_reports_exit_code_and_forgets_job() {
        let mut jobs = JobControl::new();
        let mut status = ExitStatus::default();
        let pid = spawn("sh", &["-c", "exit 3"]);
        jobs.add(pid);

        let output = poll_until_empty(&mut jobs, &mut status);
        assert!(jobs.is_empty());
        assert_eq!(status, ExitStatus::Exited(3));
        assert_eq!(
            output,
            format!("Background Process PID: {} exited with status of 3\n", pid)
        );
    }

    #[test]
    fn test_reports_signal() {
        let mut jobs = JobControl::new();
        let mut status = ExitStatus::default();
        let pid = spawn("sleep", &["30"]);
        jobs.add(pid);
        signal::kill(pid, Signal::SIGKILL).unwrap();

        let output = poll_until_empty(&mut jobs, &mut status);
        assert_eq!(status, ExitStatus::Signaled(9));
        assert_eq!(
            output,
            format!("Background Process PID: {} terminated by signal 9\n", pid)
        );
    }

    #[test]
    fn test_running_job_stays_tracked_until_shutdown() {
        let mut jobs = JobControl::new();
        let mut status = ExitStatus::Exited(7);
        let pid = spawn("sleep", &["30"]);
        jobs.add(pid);

        let mut out = Vec::new();
        jobs.check_background(&mut status, &mut out).unwrap();
        assert_eq!(jobs.pids(), &[pid]);
        assert!(out.is_empty());
        assert_eq!(status, ExitStatus::Exited(7));

        jobs.shutdown(ExitPolicy::Terminate);
        assert!(jobs.is_empty());
        assert_eq!(signal::kill(pid, None::<Signal>), Err(Errno::ESRCH));
    }

    #[test]
    fn test_foreign_pid_is_dropped_silently() {
        let mut jobs = JobControl::new();
        let mut status = ExitStatus::Exited(5);
        jobs.add(Pid::from_raw(1));

        let mut out = Vec::new();
        jobs.check_background(&mut status, &mut out).unwrap();
        assert!(jobs.is_empty());
        assert!(out.is_empty());
        assert_eq!(status, ExitStatus::Exited(5));
    }

    #[test]
    fn test_terminate_kills_job_that_ignores_sigterm() {
        let mut jobs = JobControl::new();
        let pid = spawn("sh", &["-c", "trap '' TERM; while :; do sleep 1; done"]);
        jobs.add(pid);
        // Give the trap time to be installed before we signal
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        jobs.shutdown(ExitPolicy::Terminate);
        assert!(started.elapsed() < TERMINATE_GRACE + Duration::from_secs(3));
        assert!(jobs.is_empty());
        assert_eq!(signal::kill(pid, None::<Signal>), Err(Errno::ESRCH));
    }

    #[test]
    fn test_detach_policy_leaves_jobs_running() {
        let mut jobs = JobControl::new();
        let pid = spawn("sleep", &["30"]);
        jobs.add(pid);

        jobs.shutdown(ExitPolicy::Detach);
        assert!(jobs.is_empty());
        assert_eq!(signal::kill(pid, None::<Signal>), Ok(()));

        signal::kill(pid, Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();
    }

    #[test]
    fn test_wait_policy_reaps_everything() {
        let mut jobs = JobControl::new();
        jobs.add(spawn("true", &[]));
        jobs.add(spawn("sh", &["-c", "exit 1"]));
        jobs.shutdown(ExitPolicy::Wait);
        assert!(jobs.is_empty());
    }
}
