//! Command line parser
//!
//! Splits a line into `;`-separated pipelines. There is no quoting, globbing
//! or expansion: a word is any run of characters that are neither whitespace
//! nor one of the operators `|`, `<`, `>`, `&` and `;`.

use regex::Regex;

use crate::errors::{Error, Result};
use crate::job::{Job, Process};

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[|<>&;]|[^\s|<>&;]+").unwrap();
}

#[derive(Clone, Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Pipe,
    Input,
    Output,
    Background,
    Semicolon,
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    TOKEN
        .find_iter(line)
        .map(|m| match m.as_str() {
            "|" => Token::Pipe,
            "<" => Token::Input,
            ">" => Token::Output,
            "&" => Token::Background,
            ";" => Token::Semicolon,
            word => Token::Word(word),
        })
        .collect()
}

/// Parses `line` into jobs, one per `;`-separated pipeline, in order.
///
/// Returns an empty list for a blank line.
pub fn parse(line: &str) -> Result<Vec<Job>> {
    let tokens = tokenize(line);
    let jobs = tokens
        .split(|token| *token == Token::Semicolon)
        .filter(|pipeline| !pipeline.is_empty())
        .map(|pipeline| parse_pipeline(line, pipeline))
        .collect::<Result<Vec<_>>>()?;
    debug!("parsed {} job(s) from: {}", jobs.len(), line);
    Ok(jobs)
}

fn parse_pipeline(line: &str, tokens: &[Token<'_>]) -> Result<Job> {
    let (tokens, background) = match tokens.split_last() {
        Some((Token::Background, rest)) => (rest, true),
        _ => (tokens, false),
    };

    let mut processes = Vec::new();
    for command in tokens.split(|token| *token == Token::Pipe) {
        processes.push(parse_command(line, command)?);
    }

    let input = processes
        .iter()
        .map(Process::to_string)
        .collect::<Vec<_>>()
        .join(" | ");
    Ok(Job::new(input, processes, background))
}

fn parse_command(line: &str, tokens: &[Token<'_>]) -> Result<Process> {
    let mut argv = Vec::new();
    let mut stdin = None;
    let mut stdout = None;

    let mut tokens = tokens.iter();
    while let Some(token) = tokens.next() {
        match *token {
            Token::Word(word) => argv.push(word),
            Token::Input => stdin = Some(redirect_target(line, tokens.next())?),
            Token::Output => stdout = Some(redirect_target(line, tokens.next())?),
            _ => return Err(Error::syntax(line)),
        }
    }

    if argv.is_empty() {
        return Err(Error::syntax(line));
    }

    let mut process = Process::new(&argv[..]);
    if let Some(path) = stdin {
        process = process.with_stdin(path);
    }
    if let Some(path) = stdout {
        process = process.with_stdout(path);
    }
    Ok(process)
}

fn redirect_target<'a>(line: &str, token: Option<&Token<'a>>) -> Result<&'a str> {
    match token {
        Some(&Token::Word(target)) => Ok(target),
        _ => Err(Error::syntax(line)),
    }
}
