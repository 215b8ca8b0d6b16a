use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// What a `waitpid(-1, ...)` round reported.
pub enum WaitReport {
    /// One child changed state.
    Child { pid: libc::pid_t, status: libc::c_int },
    /// WNOHANG and nothing was ready.
    NoneReady,
    /// ECHILD: the shell has no children left to reap.
    NoChildren,
}

/// `waitpid(-1, ...)` with EINTR retry.
pub fn wait_any(flags: libc::c_int) -> io::Result<WaitReport> {
    let mut status: libc::c_int = 0;
    loop {
        let pid = unsafe { libc::waitpid(-1, &mut status, flags) };
        if pid > 0 {
            return Ok(WaitReport::Child { pid, status });
        }
        if pid == 0 {
            return Ok(WaitReport::NoneReady);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::ECHILD) => return Ok(WaitReport::NoChildren),
            _ => return Err(err),
        }
    }
}

/// Blocking `waitpid` on one specific pid, discarding the status. Used when
/// tearing down a partially built pipeline.
pub fn wait_pid_discard(pid: libc::pid_t) {
    let mut status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc >= 0 {
            return;
        }
        if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return;
        }
    }
}

pub fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            // The child already exec'd (and set its own group) or is gone;
            // either way the group is settled.
            Some(libc::EACCES) | Some(libc::ESRCH) => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Signal an entire process group.
pub fn kill_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// True if the process group still has at least one member.
pub fn group_exists(pgid: libc::pid_t) -> bool {
    kill_group(pgid, 0).is_ok()
}

pub fn set_terminal_foreground(fd: RawFd, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

pub fn terminal_foreground_group(fd: RawFd) -> io::Result<libc::pid_t> {
    let pgid = unsafe { libc::tcgetpgrp(fd) };
    if pgid < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pgid)
}

pub fn terminal_attrs(fd: RawFd) -> io::Result<libc::termios> {
    let mut attrs = unsafe { std::mem::zeroed::<libc::termios>() };
    if unsafe { libc::tcgetattr(fd, &mut attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(attrs)
}

/// `tcsetattr(TCSADRAIN)`: apply after pending output has drained.
pub fn restore_terminal_attrs(fd: RawFd, attrs: &libc::termios) -> io::Result<()> {
    if unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn ignore_signal(signal: libc::c_int) -> io::Result<()> {
    if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Open `name`, resolving a relative name through `dirfd` so a `cd` between
/// parse and launch cannot change what the redirection refers to.
pub fn open_at(
    dirfd: Option<RawFd>,
    name: &str,
    relative: bool,
    flags: libc::c_int,
    mode: libc::mode_t,
) -> io::Result<OwnedFd> {
    let c_name = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file name contains NUL"))?;

    loop {
        let fd = match (relative, dirfd) {
            (true, Some(dirfd)) => unsafe {
                libc::openat(dirfd, c_name.as_ptr(), flags, mode as libc::c_uint)
            },
            _ => unsafe { libc::open(c_name.as_ptr(), flags, mode as libc::c_uint) },
        };
        if fd >= 0 {
            return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Open a directory for use as an `openat` anchor.
pub fn open_directory(path: &std::path::Path) -> io::Result<OwnedFd> {
    let name = path
        .to_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 cwd"))?;
    open_at(None, name, false, libc::O_RDONLY | libc::O_DIRECTORY, 0)
}

/// `Write` over a borrowed raw fd. The fd is not closed on drop; builtins and
/// the prompt write through fds they do not own.
pub struct FdWriter(pub RawFd);

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let n = unsafe { libc::write(self.0, buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
