use std::env;
use std::io::Write;
use std::os::fd::RawFd;

use crate::job_control::FdWriter;
use crate::shell::Shell;

/// An in-process command. Builtins receive the fds the launcher wired for
/// their pipeline position and write through them, never through the shell's
/// own streams.
pub struct Builtin {
    pub name: &'static str,
    pub run: fn(&mut Shell, &[String], RawFd, RawFd) -> i32,
    pub usage: &'static str,
    pub description: &'static str,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "cd",
        run: builtin_cd,
        usage: "cd [path]",
        description: "Change the working directory (home when no path is given).",
    },
    Builtin {
        name: "jobs",
        run: builtin_jobs,
        usage: "jobs [-l|-p] [id]",
        description: "List jobs; -l shows every process, -p only group leaders.",
    },
    Builtin {
        name: "fg",
        run: builtin_fg,
        usage: "fg [id]",
        description: "Continue a job in the foreground.",
    },
    Builtin {
        name: "bg",
        run: builtin_bg,
        usage: "bg [id]",
        description: "Continue a job in the background.",
    },
    Builtin {
        name: "exit",
        run: builtin_exit,
        usage: "exit [n]",
        description: "Exit the shell with status n (0 when absent).",
    },
    Builtin {
        name: "help",
        run: builtin_help,
        usage: "help",
        description: "List the available builtins.",
    },
];

pub fn find(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn builtin_cd(_shell: &mut Shell, argv: &[String], _in_fd: RawFd, _out_fd: RawFd) -> i32 {
    let target = match argv.get(1) {
        Some(path) => path.clone(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                eprintln!("cd: HOME not set");
                return -1;
            }
        },
    };

    if let Err(err) = env::set_current_dir(&target) {
        eprintln!("cd: {target}: {err}");
        return -1;
    }
    0
}

/// Resolve a `[id]` builtin argument (optionally `%`-prefixed) to a table
/// index; no argument means job 1, the most recent.
fn resolve_job_index(shell: &Shell, name: &str, arg: Option<&String>) -> Option<usize> {
    let id = match arg {
        None => 1,
        Some(raw) => match raw.trim_start_matches('%').parse::<usize>() {
            Ok(id) => id,
            Err(_) => {
                eprintln!("{name}: {raw}: no such job");
                return None;
            }
        },
    };

    match shell.jobs.index_of_id(id) {
        Some(index) => Some(index),
        None => {
            if arg.is_none() {
                eprintln!("{name}: no current job");
            } else {
                eprintln!("{name}: {id}: no such job");
            }
            None
        }
    }
}

fn builtin_jobs(shell: &mut Shell, argv: &[String], _in_fd: RawFd, out_fd: RawFd) -> i32 {
    let mut long = false;
    let mut pids_only = false;
    let mut id_arg: Option<&String> = None;

    for arg in &argv[1..] {
        match arg.as_str() {
            "-l" => long = true,
            "-p" => pids_only = true,
            _ if arg.starts_with('-') => {
                eprintln!("jobs: {arg}: invalid option\nusage: jobs [-l|-p] [id]");
                return -1;
            }
            _ => id_arg = Some(arg),
        }
    }

    let selected = match id_arg {
        Some(_) => match resolve_job_index(shell, "jobs", id_arg) {
            Some(index) => Some(index),
            None => return -1,
        },
        None => None,
    };

    let mut out = FdWriter(out_fd);
    for (index, job) in shell.jobs.iter().enumerate() {
        if selected.is_some_and(|sel| sel != index) {
            continue;
        }
        let id = index + 1;
        let result = if pids_only {
            job.write_pids(&mut out, id)
        } else if long {
            job.write_long(&mut out, id)
        } else {
            job.write_default(&mut out, id)
        };
        if result.is_err() {
            return -1;
        }
    }
    0
}

fn builtin_fg(shell: &mut Shell, argv: &[String], _in_fd: RawFd, _out_fd: RawFd) -> i32 {
    match resolve_job_index(shell, "fg", argv.get(1)) {
        Some(index) => {
            shell.job_continue(index, false);
            0
        }
        None => -1,
    }
}

fn builtin_bg(shell: &mut Shell, argv: &[String], _in_fd: RawFd, _out_fd: RawFd) -> i32 {
    match resolve_job_index(shell, "bg", argv.get(1)) {
        Some(index) => {
            shell.job_continue(index, true);
            0
        }
        None => -1,
    }
}

fn builtin_exit(shell: &mut Shell, argv: &[String], _in_fd: RawFd, _out_fd: RawFd) -> i32 {
    let code = argv
        .get(1)
        .and_then(|arg| arg.parse::<i32>().ok())
        .unwrap_or(0);
    shell.exit_request = Some(code);
    0
}

fn builtin_help(_shell: &mut Shell, _argv: &[String], _in_fd: RawFd, out_fd: RawFd) -> i32 {
    let mut out = FdWriter(out_fd);
    for builtin in BUILTINS {
        if writeln!(out, "{:<20} {}", builtin.usage, builtin.description).is_err() {
            return -1;
        }
    }
    0
}
