use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::Stdio;

use log::debug;

use crate::job_control::{self, WaitReport};

/// How a pipeline member executes: in-process, or as a forked child.
#[derive(Debug)]
pub enum ProcId {
    Builtin,
    External { pid: libc::pid_t },
}

/// Runtime record of one pipeline member.
#[derive(Debug)]
pub struct Proc {
    pub argv: Vec<String>,
    pub id: ProcId,
    pub stopped: bool,
    pub finished: bool,
    /// Last status reported by `waitpid`; meaningless for builtins.
    pub status: libc::c_int,
}

impl Proc {
    pub fn new(argv: Vec<String>) -> Self {
        Proc {
            argv,
            id: ProcId::Builtin,
            stopped: false,
            finished: false,
            status: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    pub fn pid(&self) -> Option<libc::pid_t> {
        match self.id {
            ProcId::External { pid } => Some(pid),
            ProcId::Builtin => None,
        }
    }

    pub fn state_name(&self) -> &'static str {
        if self.finished {
            "done"
        } else if self.stopped {
            "stopped"
        } else {
            "running"
        }
    }
}

/// A standard stream of a job: either the shell's own (never closed by the
/// job) or a descriptor the job owns and closes on destruction.
#[derive(Debug)]
pub enum JobStdio {
    Inherit(RawFd),
    Owned(OwnedFd),
}

impl JobStdio {
    pub fn as_raw(&self) -> RawFd {
        match self {
            JobStdio::Inherit(fd) => *fd,
            JobStdio::Owned(fd) => fd.as_raw_fd(),
        }
    }

    /// A `Stdio` handle for spawning; owned fds are duplicated so the job
    /// keeps its descriptor for later stages and for its own teardown.
    pub fn to_stdio(&self) -> io::Result<Stdio> {
        match self {
            JobStdio::Inherit(_) => Ok(Stdio::inherit()),
            JobStdio::Owned(fd) => Ok(Stdio::from(std::fs::File::from(fd.try_clone()?))),
        }
    }
}

/// One executing pipeline: a process group tracked as a unit for signal
/// delivery and terminal control.
pub struct Job {
    /// Pid of the group leader (first forked child); 0 while no child has
    /// forked, which is final for all-builtin jobs.
    pub pgid: libc::pid_t,
    pub procs: Vec<Proc>,
    pub stdin: JobStdio,
    pub stdout: JobStdio,
    pub stderr: JobStdio,
    pub background: bool,
    /// Whether the current state has been shown to the user.
    pub notified: bool,
    /// Terminal attributes saved when the job last left the foreground.
    pub tmodes: Option<libc::termios>,
    pub cmdline: String,
}

impl Job {
    pub fn finished(&self) -> bool {
        self.procs.iter().all(|p| p.finished)
    }

    pub fn stopped(&self) -> bool {
        !self.finished() && self.procs.iter().all(|p| p.stopped || p.finished)
    }

    pub fn state_name(&self) -> &'static str {
        if self.finished() {
            "done"
        } else if self.stopped() {
            "stopped"
        } else {
            "running"
        }
    }

    fn is_leader(&self, proc: &Proc) -> bool {
        proc.pid() == Some(self.pgid) && self.pgid != 0
    }

    /// `[<id>] + <state> <cmdline>`
    pub fn write_default(&self, out: &mut dyn Write, id: usize) -> io::Result<()> {
        writeln!(out, "[{}] + {} {}", id, self.state_name(), self.cmdline)
    }

    /// One row per process; `+` marks the group leader and continuation rows
    /// carry a blank prefix instead of the job id.
    pub fn write_long(&self, out: &mut dyn Write, id: usize) -> io::Result<()> {
        let prefix = format!("[{id}] ");
        let blank = " ".repeat(prefix.len());

        for (i, proc) in self.procs.iter().enumerate() {
            let lead = if i == 0 { &prefix } else { &blank };
            let mark = if self.is_leader(proc) { '+' } else { ' ' };
            let pid = proc.pid().unwrap_or(0);
            writeln!(
                out,
                "{}{} {:>6} {} {}",
                lead,
                mark,
                pid,
                proc.state_name(),
                proc.name()
            )?;
        }
        Ok(())
    }

    /// Like the long form but only the group leader's row.
    pub fn write_pids(&self, out: &mut dyn Write, id: usize) -> io::Result<()> {
        let prefix = format!("[{id}] ");
        for proc in &self.procs {
            if self.is_leader(proc) {
                writeln!(
                    out,
                    "{}+ {:>6} {} {}",
                    prefix,
                    proc.pid().unwrap_or(0),
                    proc.state_name(),
                    proc.name()
                )?;
            }
        }
        Ok(())
    }
}

/// All live jobs, most recent first. Job ids are 1-based positions, so id 1
/// is always the most recently launched job still in the table.
#[derive(Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Insert at the front; the new job becomes id 1.
    pub fn push_front(&mut self, job: Job) {
        self.jobs.insert(0, job);
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Job> {
        self.jobs.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> Job {
        self.jobs.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }

    /// Translate a 1-based job id into a table index.
    pub fn index_of_id(&self, id: usize) -> Option<usize> {
        if id >= 1 && id <= self.jobs.len() {
            Some(id - 1)
        } else {
            None
        }
    }

    /// Apply one `waitpid` report to whichever proc it belongs to. Returns
    /// false if the pid is not ours (already-removed job, for instance).
    pub fn apply_status(&mut self, pid: libc::pid_t, status: libc::c_int) -> bool {
        for (index, job) in self.jobs.iter_mut().enumerate() {
            for proc in &mut job.procs {
                if proc.pid() != Some(pid) {
                    continue;
                }

                proc.status = status;
                if libc::WIFSTOPPED(status) {
                    proc.stopped = true;
                    debug!("pid {pid} stopped");
                } else if libc::WIFCONTINUED(status) {
                    proc.stopped = false;
                    debug!("pid {pid} continued");
                } else {
                    proc.finished = true;
                    if libc::WIFSIGNALED(status) {
                        let signal = libc::WTERMSIG(status);
                        eprintln!("[{}] {} Terminated by signal {}.", index + 1, pid, signal);
                    }
                    debug!("pid {pid} finished");
                }
                job.notified = false;
                return true;
            }
        }
        false
    }

    /// Non-blocking status collection: drain every pending report and apply
    /// the transitions. Never blocks and never removes jobs.
    pub fn reap(&mut self) {
        loop {
            match job_control::wait_any(libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED) {
                Ok(WaitReport::Child { pid, status }) => {
                    self.apply_status(pid, status);
                }
                Ok(WaitReport::NoneReady) | Ok(WaitReport::NoChildren) => break,
                Err(err) => {
                    eprintln!("pgsh: waitpid: {err}");
                    break;
                }
            }
        }
    }
}
