use std::io;

use thiserror::Error;

/// Failures that abort the launch of a single pipeline. None of these take
/// down the session; the REPL reports them and returns to the prompt.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A redirection target could not be opened; named for `perror`-style output.
    #[error("{name}: {source}")]
    Redirect { name: String, source: io::Error },

    #[error("pipe: {0}")]
    Pipe(io::Error),

    /// Pipe or fork exhaustion mid-build; the partial process group was
    /// terminated and reaped before this was returned.
    #[error("pipeline aborted: {0}")]
    PipelineAborted(io::Error),

    #[error("{0}")]
    Io(#[from] io::Error),
}
