use std::env;
use std::io;
use std::os::fd::AsRawFd;
use std::process::{Command, Stdio};

use log::debug;
use os_pipe::{PipeReader, PipeWriter};

use crate::analyzer::{PathSpec, Pipeline, ProcessSpec};
use crate::builtins;
use crate::error::ShellError;
use crate::job_control::{self, open_at};
use crate::jobs::{Job, JobStdio, Proc, ProcId};
use crate::shell::Shell;

/// Where a pipeline stage reads from.
enum StageInput {
    /// The job's stdin (shell-inherited or a redirection).
    JobStdin,
    /// The read end of the pipe from the previous stage.
    Pipe(PipeReader),
}

/// Where a pipeline stage writes to.
enum StageOutput {
    JobStdout,
    Pipe(PipeWriter),
}

/// Materialize one pipeline as a job: open redirections, wire pipes, run
/// builtins in-process, fork externals into one process group, then hand the
/// job to the table and dispatch it foreground or background.
pub fn launch(shell: &mut Shell, pipeline: &Pipeline) -> Result<(), ShellError> {
    // Snapshot the cwd as a directory descriptor so relative redirections
    // stay anchored even when an earlier pipeline on this line ran a cd.
    let cwd = env::current_dir()?;
    let dirfd = job_control::open_directory(&cwd)?;

    let stdin = match &pipeline.stdin {
        Some(spec) => JobStdio::Owned(open_redirect(
            dirfd.as_raw_fd(),
            spec,
            libc::O_RDONLY,
            0,
        )?),
        None => JobStdio::Inherit(shell.input_fd),
    };
    let stdout = match &pipeline.stdout {
        Some(spec) => JobStdio::Owned(open_redirect(
            dirfd.as_raw_fd(),
            spec,
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o666,
        )?),
        None => JobStdio::Inherit(libc::STDOUT_FILENO),
    };
    drop(dirfd);

    let mut job = Job {
        pgid: 0,
        procs: pipeline
            .procs
            .iter()
            .map(|spec| Proc::new(spec.argv.clone()))
            .collect(),
        stdin,
        stdout,
        stderr: JobStdio::Inherit(libc::STDERR_FILENO),
        background: pipeline.background,
        notified: false,
        tmodes: None,
        cmdline: pipeline.to_string(),
    };

    let count = pipeline.procs.len();
    let mut prev_reader: Option<PipeReader> = None;

    for index in 0..count {
        let last = index + 1 == count;
        let spec = &pipeline.procs[index];

        let input = match prev_reader.take() {
            Some(reader) => StageInput::Pipe(reader),
            None => StageInput::JobStdin,
        };

        let (output, next_reader) = if last {
            (StageOutput::JobStdout, None)
        } else {
            match os_pipe::pipe() {
                Ok((reader, writer)) => (StageOutput::Pipe(writer), Some(reader)),
                Err(err) => {
                    abort_partial(&mut job);
                    return Err(ShellError::Pipe(err));
                }
            }
        };

        if let Some(builtin) = builtins::find(&spec.program.name) {
            // In-process, no fork; the stage's fds are handed to the builtin
            // and the pipe ends close when `input`/`output` drop below.
            // Builtin output stays far below the pipe buffer, so writing
            // before the downstream stage has spawned cannot block.
            let in_fd = match &input {
                StageInput::JobStdin => job.stdin.as_raw(),
                StageInput::Pipe(reader) => reader.as_raw_fd(),
            };
            let out_fd = match &output {
                StageOutput::JobStdout => job.stdout.as_raw(),
                StageOutput::Pipe(writer) => writer.as_raw_fd(),
            };
            let status = (builtin.run)(shell, &spec.argv, in_fd, out_fd);
            let proc = &mut job.procs[index];
            proc.finished = true;
            proc.status = status;
        } else {
            match spawn_stage(shell, &job, spec, input, output, pipeline.background) {
                Ok(pid) => {
                    job.procs[index].id = ProcId::External { pid };
                    if job.pgid == 0 {
                        job.pgid = pid;
                    }
                    if shell.interactive {
                        // Mirrors the child's own setpgid; whichever side wins
                        // the race, the group is correct before dispatch.
                        if let Err(err) = job_control::set_process_group(pid, job.pgid) {
                            eprintln!("pgsh: setpgid: {err}");
                        }
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    ) =>
                {
                    // The exec-failure case: report, mark the slot finished,
                    // and keep building the rest of the pipeline. Its pipe
                    // ends closed with the failed spawn, so neighbours see
                    // EOF / EPIPE exactly as if a child had exec-failed.
                    report_spawn_error(&spec.program.name, &err);
                    job.procs[index].finished = true;
                }
                Err(err) => {
                    abort_partial(&mut job);
                    return Err(ShellError::PipelineAborted(err));
                }
            }
        }

        prev_reader = next_reader;
    }

    debug!(
        "launched '{}': pgid {}, {} procs, background={}",
        job.cmdline,
        job.pgid,
        job.procs.len(),
        job.background
    );

    let already_finished = job.finished();
    shell.jobs.push_front(job);

    // All builtins (or nothing spawned): there is no child to wait for.
    if already_finished {
        return Ok(());
    }

    if !shell.interactive {
        shell.job_wait(0);
    } else if pipeline.background {
        shell.job_background(0, false);
    } else {
        shell.job_foreground(0, false);
    }

    Ok(())
}

fn open_redirect(
    dirfd: libc::c_int,
    spec: &PathSpec,
    flags: libc::c_int,
    mode: libc::mode_t,
) -> Result<std::os::fd::OwnedFd, ShellError> {
    open_at(Some(dirfd), &spec.name, spec.is_relative, flags, mode).map_err(|source| {
        ShellError::Redirect {
            name: spec.name.clone(),
            source,
        }
    })
}

/// Spawn one external stage. The child joins the job's process group (or
/// founds it), takes the terminal when the job is foreground, resets the
/// job-control signal dispositions, and execs; `Stdio` performs the dup2
/// wiring.
fn spawn_stage(
    shell: &Shell,
    job: &Job,
    spec: &ProcessSpec,
    input: StageInput,
    output: StageOutput,
    background: bool,
) -> io::Result<libc::pid_t> {
    let mut command = Command::new(&spec.program.name);
    command.args(&spec.argv[1..]);

    let stdin = match input {
        StageInput::JobStdin => job.stdin.to_stdio()?,
        StageInput::Pipe(reader) => Stdio::from(reader),
    };
    let stdout = match output {
        StageOutput::JobStdout => job.stdout.to_stdio()?,
        StageOutput::Pipe(writer) => Stdio::from(writer),
    };
    let stderr = job.stderr.to_stdio()?;
    command.stdin(stdin).stdout(stdout).stderr(stderr);

    let interactive = shell.interactive;
    let shell_fd = shell.input_fd;
    let captured_pgid = if job.pgid != 0 { Some(job.pgid) } else { None };

    unsafe {
        use std::os::unix::process::CommandExt;
        command.pre_exec(move || {
            if interactive {
                let pid = libc::getpid();
                // First stage founds the group; later stages join it. The
                // parent repeats this setpgid to close the race.
                let pgid = captured_pgid.unwrap_or(pid);
                libc::setpgid(0, pgid);
                if !background {
                    libc::tcsetpgrp(shell_fd, pgid);
                }
            }
            // The shell ignores the job-control signals; SIG_IGN survives
            // exec, so children must go back to the default dispositions.
            let signals = [
                libc::SIGINT,
                libc::SIGQUIT,
                libc::SIGTSTP,
                libc::SIGTTIN,
                libc::SIGTTOU,
                libc::SIGCHLD,
            ];
            for signal in signals {
                if libc::signal(signal, libc::SIG_DFL) == libc::SIG_ERR {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }

    let child = command.spawn()?;
    Ok(child.id() as libc::pid_t)
}

fn report_spawn_error(program: &str, err: &io::Error) {
    if err.kind() == io::ErrorKind::NotFound {
        eprintln!("pgsh: command not found: {program}");
    } else {
        eprintln!("pgsh: {program}: {err}");
    }
}

/// Tear down a partially built pipeline after pipe or fork exhaustion:
/// terminate the group that exists so far, reap what was spawned, and leave
/// the job out of the table. Redirection fds close when the job drops.
fn abort_partial(job: &mut Job) {
    if job.pgid <= 0 {
        return;
    }
    let _ = job_control::kill_group(job.pgid, libc::SIGTERM);
    for proc in &mut job.procs {
        if let Some(pid) = proc.pid() {
            if !proc.finished {
                job_control::wait_pid_discard(pid);
                proc.finished = true;
            }
        }
    }
}
