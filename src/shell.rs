use std::env;
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use log::debug;

use crate::job_control::{self, FdWriter, WaitReport};
use crate::jobs::JobTable;

// The SIGCHLD handler may only touch async-signal-safe state; it reads the
// shell's fd and pgid from these, written once during init.
static SHELL_FD: AtomicI32 = AtomicI32::new(-1);
static SHELL_PGID: AtomicI32 = AtomicI32::new(0);

/// On any child state change except a continue, hand the terminal back to the
/// shell so it is responsive the moment a background child exits. Status
/// collection itself happens in the polled reaper, never here.
extern "C" fn sigchld_handler(
    _signal: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let code = unsafe { (*info).si_code };
    if code != libc::CLD_CONTINUED {
        let fd = SHELL_FD.load(Ordering::Relaxed);
        let pgid = SHELL_PGID.load(Ordering::Relaxed);
        if fd >= 0 && pgid > 0 {
            unsafe {
                libc::tcsetpgrp(fd, pgid);
            }
        }
    }
}

/// Process-wide shell state: the controlling fd, saved terminal attributes,
/// and the job table. Everything that touches them takes this by reference.
pub struct Shell {
    pub input_fd: RawFd,
    pub interactive: bool,
    pub pgid: libc::pid_t,
    /// Canonical terminal attributes, captured at init and restored whenever
    /// a foreground job returns the terminal.
    pub term_attrs: Option<libc::termios>,
    pub jobs: JobTable,
    /// Set by the `exit` builtin; the REPL unwinds when it sees this.
    pub exit_request: Option<i32>,
    /// Cumulative newline count across all input chunks, for error positions.
    pub lines_read: usize,
}

impl Shell {
    /// Interactive setup: wait until we are in the foreground, ignore the
    /// job-control signals, take our own process group and the terminal, save
    /// termios, and register the SIGCHLD handler. A non-tty stdin skips all
    /// of it.
    pub fn init() -> io::Result<Shell> {
        let input_fd = libc::STDIN_FILENO;
        let interactive = unsafe { libc::isatty(input_fd) } == 1;

        let mut shell = Shell {
            input_fd,
            interactive,
            pgid: unsafe { libc::getpgrp() },
            term_attrs: None,
            jobs: JobTable::new(),
            exit_request: None,
            lines_read: 0,
        };

        if !interactive {
            debug!("stdin is not a tty, job control disabled");
            return Ok(shell);
        }

        // If we were launched from another job-control shell, stop until it
        // puts us in the foreground.
        loop {
            shell.pgid = unsafe { libc::getpgrp() };
            if job_control::terminal_foreground_group(input_fd)? == shell.pgid {
                break;
            }
            job_control::kill_group(shell.pgid, libc::SIGTTIN)?;
        }

        for signal in [
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTSTP,
            libc::SIGTTIN,
            libc::SIGTTOU,
        ] {
            job_control::ignore_signal(signal)?;
        }

        let pid = unsafe { libc::getpid() };
        job_control::set_process_group(pid, pid)?;
        shell.pgid = pid;

        job_control::set_terminal_foreground(input_fd, shell.pgid)?;
        shell.term_attrs = Some(job_control::terminal_attrs(input_fd)?);

        SHELL_FD.store(input_fd, Ordering::Relaxed);
        SHELL_PGID.store(shell.pgid, Ordering::Relaxed);

        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
            sigchld_handler;
        action.sa_sigaction = handler as usize;
        action.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        debug!("interactive shell, pgid {}", shell.pgid);
        Ok(shell)
    }

    /// Write the prompt to the shell fd: the highlighted cwd basename and a
    /// marker (`$` unless the caller supplies one). Interactive only.
    pub fn prompt(&self, marker: Option<&str>) {
        if !self.interactive {
            return;
        }
        let marker = marker.unwrap_or("$");

        let text = match env::current_dir() {
            Ok(cwd) => {
                let base = cwd
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| cwd.to_string_lossy().into_owned());
                format!("\x1b[38;5;32;1m{base}\x1b[0m {marker} ")
            }
            Err(_) => format!("{marker} "),
        };

        let _ = FdWriter(self.input_fd).write_all(text.as_bytes());
    }

    /// Block until the job at `index` is fully stopped or finished, applying
    /// every reported status on the way; a background job may stop or die
    /// while a foreground job is being waited on.
    pub fn job_wait(&mut self, index: usize) {
        loop {
            {
                let job = match self.jobs.get(index) {
                    Some(job) => job,
                    None => return,
                };
                if job.finished() || job.stopped() {
                    return;
                }
            }

            match job_control::wait_any(libc::WUNTRACED) {
                Ok(WaitReport::Child { pid, status }) => {
                    self.jobs.apply_status(pid, status);
                }
                Ok(WaitReport::NoChildren) => {
                    // Nothing left to reap; whatever we did not see is gone.
                    if let Some(job) = self.jobs.get_mut(index) {
                        for proc in &mut job.procs {
                            proc.finished = true;
                        }
                    }
                    return;
                }
                Ok(WaitReport::NoneReady) => return,
                Err(err) => {
                    eprintln!("pgsh: waitpid: {err}");
                    return;
                }
            }
        }
    }

    /// Give the job the terminal, optionally continue it, wait, then take the
    /// terminal back and swap termios: the job's are saved for its next
    /// foreground stint, the shell's canonical ones are restored.
    pub fn job_foreground(&mut self, index: usize, to_continue: bool) {
        let pgid = match self.jobs.get(index) {
            Some(job) => job.pgid,
            None => return,
        };

        if self.interactive && pgid > 0 {
            if let Err(err) = job_control::set_terminal_foreground(self.input_fd, pgid) {
                eprintln!("pgsh: tcsetpgrp: {err}");
            }
        }

        if to_continue {
            if self.interactive {
                if let Some(tmodes) = self.jobs.get(index).and_then(|job| job.tmodes) {
                    let _ = job_control::restore_terminal_attrs(self.input_fd, &tmodes);
                }
            }
            if pgid > 0 {
                if let Err(err) = job_control::kill_group(pgid, libc::SIGCONT) {
                    eprintln!("pgsh: kill (SIGCONT): {err}");
                }
            }
        }

        self.job_wait(index);

        if self.interactive {
            if let Ok(tmodes) = job_control::terminal_attrs(self.input_fd) {
                if let Some(job) = self.jobs.get_mut(index) {
                    job.tmodes = Some(tmodes);
                }
            }
            if let Some(attrs) = self.term_attrs {
                let _ = job_control::restore_terminal_attrs(self.input_fd, &attrs);
            }
            if let Err(err) = job_control::set_terminal_foreground(self.input_fd, self.pgid) {
                eprintln!("pgsh: tcsetpgrp: {err}");
            }
        }
    }

    /// Resume in the background: just SIGCONT, no terminal transfer.
    pub fn job_background(&mut self, index: usize, to_continue: bool) {
        if !to_continue {
            return;
        }
        if let Some(job) = self.jobs.get(index) {
            if job.pgid > 0 {
                if let Err(err) = job_control::kill_group(job.pgid, libc::SIGCONT) {
                    eprintln!("pgsh: kill (SIGCONT): {err}");
                }
            }
        }
    }

    /// Restart a stopped job in the foreground or background.
    pub fn job_continue(&mut self, index: usize, background: bool) {
        if let Some(job) = self.jobs.get_mut(index) {
            for proc in &mut job.procs {
                proc.stopped = false;
            }
            job.notified = false;
            job.background = background;
        } else {
            return;
        }

        if background {
            self.job_background(index, true);
        } else {
            self.job_foreground(index, true);
        }
    }

    /// Post-line housekeeping: reap pending statuses, reconcile vanished
    /// groups, then report. Finished jobs leave the table (background ones
    /// with a display line); jobs with unreported changes are shown once.
    pub fn notifications(&mut self) {
        self.jobs.reap();
        self.reconcile_vanished();

        let mut stderr = io::stderr();
        let mut index = 0;
        while index < self.jobs.len() {
            let id = index + 1;
            let job = self.jobs.get(index).expect("index in bounds");

            if job.finished() {
                if job.background {
                    let _ = job.write_default(&mut stderr, id);
                }
                let job = self.jobs.remove(index);
                debug!("job '{}' removed", job.cmdline);
                // ids above shift down; re-examine the same index
                continue;
            }

            if !job.notified {
                let _ = job.write_default(&mut stderr, id);
                if let Some(job) = self.jobs.get_mut(index) {
                    job.notified = true;
                }
            }
            index += 1;
        }
    }

    /// A job whose process group no longer exists will never produce another
    /// `waitpid` report (for instance if a SIGCHLD was missed); mark it
    /// finished so the next pass removes it. Only already-notified jobs are
    /// probed, so a just-launched group is never touched.
    fn reconcile_vanished(&mut self) {
        for job in self.jobs.iter_mut() {
            if !job.notified || job.finished() || job.pgid <= 0 {
                continue;
            }
            if !job_control::group_exists(job.pgid) {
                debug!("process group {} vanished, marking '{}' done", job.pgid, job.cmdline);
                for proc in &mut job.procs {
                    proc.finished = true;
                }
            }
        }
    }
}
