use std::fmt;

use crate::parser::{ParseNode, Prod};

/// A file name destined for `open`/`openat`. Relative names resolve against
/// the directory the shell was in when the command line was read.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSpec {
    pub name: String,
    pub is_relative: bool,
}

impl PathSpec {
    fn from_text(text: &str) -> Self {
        PathSpec {
            name: text.to_string(),
            is_relative: !text.starts_with('/'),
        }
    }
}

/// One process of a pipeline: the program plus its full argv.
/// `argv[0]` is always the program name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub program: PathSpec,
    pub argv: Vec<String>,
}

/// Flat record of one pipeline, ready for the launcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub procs: Vec<ProcessSpec>,
    pub stdin: Option<PathSpec>,
    pub stdout: Option<PathSpec>,
    pub background: bool,
}

impl fmt::Display for Pipeline {
    /// Canonical command line, used as the job's display string. The
    /// background marker is a launch attribute and is not rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, proc) in self.procs.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", proc.argv.join(" "))?;
        }
        if let Some(file) = &self.stdin {
            write!(f, " < {}", file.name)?;
        }
        if let Some(file) = &self.stdout {
            write!(f, " > {}", file.name)?;
        }
        Ok(())
    }
}

/// Flatten a parse tree into pipeline records in source order.
pub fn analyze(tree: &ParseNode<'_>) -> Vec<Pipeline> {
    let mut pipelines = Vec::new();
    collect_pipelines(tree, &mut pipelines);
    pipelines
}

fn collect_pipelines(node: &ParseNode<'_>, out: &mut Vec<Pipeline>) {
    match node.prod {
        Prod::Program | Prod::Line | Prod::LinesList | Prod::PlnList => {
            for child in &node.children {
                collect_pipelines(child, out);
            }
        }
        Prod::Pipeline => out.push(flatten_pipeline(node)),
        _ => {}
    }
}

/// PIPELINE children sit in the fixed order
/// NAME ARGLIST STDIN_PIPE PIPELINE_TAIL STDOUT_PIPE AMP_OP.
fn flatten_pipeline(node: &ParseNode<'_>) -> Pipeline {
    let mut procs = Vec::new();
    procs.push(process_spec(&node.children[0], &node.children[1]));
    collect_tail(&node.children[3], &mut procs);

    Pipeline {
        procs,
        stdin: redirection_target(&node.children[2]),
        stdout: redirection_target(&node.children[4]),
        background: !node.children[5].is_empty(),
    }
}

/// PIPELINE_TAIL is [PIPE] NAME ARGLIST PIPELINE_TAIL or ε; unroll the chain.
fn collect_tail(mut node: &ParseNode<'_>, procs: &mut Vec<ProcessSpec>) {
    while !node.is_empty() {
        procs.push(process_spec(&node.children[1], &node.children[2]));
        node = &node.children[3];
    }
}

/// Build a `ProcessSpec` from a NAME node and its ARGLIST sibling.
fn process_spec(name: &ParseNode<'_>, arglist: &ParseNode<'_>) -> ProcessSpec {
    let token = name.children[0].token.expect("NAME wraps a terminal");
    let program = PathSpec::from_text(&token.text);

    let mut argv = vec![program.name.clone()];
    let mut node = arglist;
    while !node.is_empty() {
        let arg = node.children[0].children[0]
            .token
            .expect("NAME wraps a terminal");
        argv.push(arg.text.clone());
        node = &node.children[1];
    }

    ProcessSpec { program, argv }
}

/// STDIN_PIPE / STDOUT_PIPE is [op] NAME or ε.
fn redirection_target(node: &ParseNode<'_>) -> Option<PathSpec> {
    if node.is_empty() {
        return None;
    }
    let token = node.children[1].children[0]
        .token
        .expect("NAME wraps a terminal");
    Some(PathSpec::from_text(&token.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{TokenKind, tokenize};
    use crate::parser::parse;

    fn pipelines(input: &str) -> Vec<Pipeline> {
        let tokens = tokenize(input);
        let mut errors = Vec::new();
        let tree = parse(&tokens, 0, &mut errors).expect("parse failed");
        assert!(errors.is_empty());
        analyze(&tree)
    }

    #[test]
    fn simple_command() {
        let plns = pipelines("ls -l -a\n");
        assert_eq!(plns.len(), 1);
        assert_eq!(plns[0].procs.len(), 1);
        assert_eq!(plns[0].procs[0].argv, vec!["ls", "-l", "-a"]);
        assert_eq!(plns[0].procs[0].program.name, "ls");
        assert!(plns[0].procs[0].program.is_relative);
        assert!(!plns[0].background);
        assert!(plns[0].stdin.is_none() && plns[0].stdout.is_none());
    }

    #[test]
    fn pipeline_processes_in_source_order() {
        let plns = pipelines("ls | grep foo | wc -l\n");
        assert_eq!(plns.len(), 1);
        let argvs: Vec<&Vec<String>> = plns[0].procs.iter().map(|p| &p.argv).collect();
        assert_eq!(argvs[0], &vec!["ls".to_string()]);
        assert_eq!(argvs[1], &vec!["grep".to_string(), "foo".to_string()]);
        assert_eq!(argvs[2], &vec!["wc".to_string(), "-l".to_string()]);
    }

    #[test]
    fn redirections_fill_slots() {
        let plns = pipelines("cat < a.txt > /tmp/b.txt\n");
        let pln = &plns[0];
        let stdin = pln.stdin.as_ref().unwrap();
        assert_eq!(stdin.name, "a.txt");
        assert!(stdin.is_relative);
        let stdout = pln.stdout.as_ref().unwrap();
        assert_eq!(stdout.name, "/tmp/b.txt");
        assert!(!stdout.is_relative);
    }

    #[test]
    fn ampersand_sets_background() {
        let plns = pipelines("sleep 10 &\n");
        assert!(plns[0].background);
    }

    #[test]
    fn semicolons_yield_pipelines_in_order() {
        let plns = pipelines("echo a; echo b; echo c\n");
        assert_eq!(plns.len(), 3);
        assert_eq!(plns[0].procs[0].argv, vec!["echo", "a"]);
        assert_eq!(plns[1].procs[0].argv, vec!["echo", "b"]);
        assert_eq!(plns[2].procs[0].argv, vec!["echo", "c"]);
    }

    #[test]
    fn trailing_semicolon_yields_only_leading_pipeline() {
        let plns = pipelines("echo one;\n");
        assert_eq!(plns.len(), 1);
    }

    #[test]
    fn empty_line_yields_no_pipelines() {
        assert!(pipelines("\n").is_empty());
    }

    #[test]
    fn quoted_arguments_keep_their_text() {
        let plns = pipelines("grep \"a b\" 'c d'\n");
        assert_eq!(plns[0].procs[0].argv, vec!["grep", "a b", "c d"]);
    }

    /// The flattened argv strings equal the input's non-operator tokens in
    /// order, across pipelines and pipe stages alike.
    #[test]
    fn flattening_preserves_word_order() {
        let input = "ls -l | grep x; cat < in > out &\n";
        let tokens = tokenize(input);
        let words: Vec<String> = tokens
            .iter()
            .filter(|t| t.kind.is_name())
            .map(|t| t.text.clone())
            .collect();

        let plns = pipelines(input);
        let mut flat = Vec::new();
        for pln in &plns {
            for proc in &pln.procs {
                flat.extend(proc.argv.iter().cloned());
            }
            if let Some(file) = &pln.stdin {
                flat.push(file.name.clone());
            }
            if let Some(file) = &pln.stdout {
                flat.push(file.name.clone());
            }
        }
        assert_eq!(flat, words);
    }

    #[test]
    fn display_renders_canonical_command_line() {
        let plns = pipelines("ls -l < in | wc > out &\n");
        assert_eq!(plns[0].to_string(), "ls -l | wc < in > out");
    }
}
