//! Minimal script shell around the interpreter.
//!
//! Scripts use a small Tcl-like surface: one command per line (or
//! separated by `;`), `{...}` for verbatim words, `"..."` for words
//! with substitution, `$name` and `$name(index)` variable references,
//! `[command]` substitution, `\` escapes and line continuation, and
//! `#` comments. The shell adds the builtins `set`, `puts`, `source`,
//! and `exit`; every other command goes to the interpreter.
//!
//! This is deliberately not a full Tcl: no control flow, no procs, no
//! expr. It is enough to drive the binding from script files and an
//! interactive prompt.

use std::fmt::Write as _;
use std::path::Path;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{anychar, char, none_of},
    combinator::{map, recognize},
    multi::{many0, many1},
    sequence::delimited,
    IResult, Parser,
};

use crate::error::{Error, Result};
use crate::interp::Interp;

/// A substitutable fragment of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Literal text.
    Literal(String),
    /// `$name` or `$name(index)` variable reference.
    Var(String),
    /// `[...]` command substitution; holds the inner script.
    Cmd(String),
}

/// One word of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    /// `{...}` word, used verbatim.
    Braced(String),
    /// Bare or quoted word, built from parts at evaluation time.
    Parts(Vec<Part>),
}

fn nom_fail(input: &str, kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Consume a balanced `open`..`close` group, yielding the inner text.
/// Backslash escapes the next character at any depth.
fn balanced(open: char, close: char) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let mut chars = input.char_indices();
        match chars.next() {
            Some((_, c)) if c == open => {}
            _ => return Err(nom_fail(input, nom::error::ErrorKind::Char)),
        }
        let mut depth = 1usize;
        let mut escaped = false;
        for (i, c) in chars {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    let inner = &input[open.len_utf8()..i];
                    return Ok((&input[i + close.len_utf8()..], inner));
                }
            }
        }
        Err(nom_fail(input, nom::error::ErrorKind::TakeUntil))
    }
}

/// `$name` or `$name(index)`. Names are alphanumerics, underscores, and
/// `::` qualifiers.
fn variable(input: &str) -> IResult<&str, Part> {
    let (rest, _) = char('$').parse(input)?;
    let (rest, name) = recognize(many1(alt((
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        tag("::"),
    ))))
    .parse(rest)?;
    if rest.starts_with('(') {
        let (rest, index) = balanced('(', ')')(rest)?;
        Ok((rest, Part::Var(format!("{name}({index})"))))
    } else {
        Ok((rest, Part::Var(name.to_string())))
    }
}

/// `[...]` command substitution.
fn bracketed(input: &str) -> IResult<&str, Part> {
    map(balanced('[', ']'), |s: &str| Part::Cmd(s.to_string())).parse(input)
}

/// A backslash escape inside a substitutable word.
fn escape(input: &str) -> IResult<&str, char> {
    let (rest, _) = char('\\').parse(input)?;
    let (rest, c) = anychar(rest)?;
    let out = match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    };
    Ok((rest, out))
}

/// One part of a quoted word.
fn quoted_part(input: &str) -> IResult<&str, Part> {
    alt((
        variable,
        bracketed,
        map(escape, |c| Part::Literal(c.to_string())),
        map(
            recognize(many1(none_of("\"\\$["))),
            |s: &str| Part::Literal(s.to_string()),
        ),
    ))
    .parse(input)
}

/// One part of a bare word. Stops at whitespace and command separators.
fn bare_part(input: &str) -> IResult<&str, Part> {
    alt((
        variable,
        bracketed,
        map(escape, |c| Part::Literal(c.to_string())),
        map(
            recognize(many1(none_of(" \t\r\n;\\$[\"{}"))),
            |s: &str| Part::Literal(s.to_string()),
        ),
    ))
    .parse(input)
}

/// A `"..."` word: substitutable parts between the quotes.
fn quoted_word(input: &str) -> IResult<&str, Vec<Part>> {
    delimited(char('"'), many0(quoted_part), char('"')).parse(input)
}

/// A single word: braced, quoted, or bare.
fn word(input: &str) -> IResult<&str, Word> {
    alt((
        map(balanced('{', '}'), |s: &str| Word::Braced(s.to_string())),
        map(quoted_word, Word::Parts),
        map(many1(bare_part), Word::Parts),
    ))
    .parse(input)
}

/// Skip spaces, tabs, and backslash-newline continuations.
fn skip_space(mut input: &str) -> &str {
    loop {
        if let Some(rest) = input.strip_prefix([' ', '\t']) {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("\\\n") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("\\\r\n") {
            input = rest;
        } else {
            return input;
        }
    }
}

/// Split a script into commands, each a list of unexpanded words.
pub fn parse_script(src: &str) -> Result<Vec<Vec<Word>>> {
    let mut commands = Vec::new();
    let mut rest = src;
    loop {
        rest = skip_space(rest);
        match rest.chars().next() {
            None => break,
            Some('\n') | Some(';') => {
                rest = &rest[1..];
                continue;
            }
            Some('\r') => {
                rest = &rest[1..];
                continue;
            }
            Some('#') => {
                rest = rest.find('\n').map_or("", |i| &rest[i..]);
                continue;
            }
            Some(_) => {}
        }

        let mut words = Vec::new();
        loop {
            match word(rest) {
                Ok((after, w)) => {
                    words.push(w);
                    rest = skip_space(after);
                }
                Err(_) => {
                    return Err(Error::Script(format!(
                        "malformed word at: {}",
                        rest.lines().next().unwrap_or(rest)
                    )));
                }
            }
            match rest.chars().next() {
                None => break,
                Some('\n') | Some('\r') | Some(';') => {
                    rest = &rest[1..];
                    break;
                }
                Some(_) => {}
            }
        }
        commands.push(words);
    }
    Ok(commands)
}

/// The interactive/script-file shell.
pub struct Shell {
    interp: Interp,
}

impl Shell {
    pub fn new(interp: Interp) -> Self {
        Shell { interp }
    }

    /// Access the underlying interpreter.
    pub fn interp(&mut self) -> &mut Interp {
        &mut self.interp
    }

    /// Evaluate a script; the result is the last command's result.
    pub fn eval_script(&mut self, src: &str) -> Result<String> {
        let mut result = String::new();
        for command in parse_script(src)? {
            result = self.eval_command(&command)?;
        }
        Ok(result)
    }

    /// Read and evaluate a script file.
    pub fn run_file(&mut self, path: &Path) -> Result<String> {
        let src = std::fs::read_to_string(path)?;
        self.eval_script(&src)
    }

    fn eval_command(&mut self, words: &[Word]) -> Result<String> {
        let expanded = words
            .iter()
            .map(|w| self.expand(w))
            .collect::<Result<Vec<String>>>()?;
        if expanded.is_empty() {
            return Ok(String::new());
        }
        match expanded[0].as_str() {
            "set" => self.builtin_set(&expanded[1..]),
            "puts" => self.builtin_puts(&expanded[1..]),
            "source" => self.builtin_source(&expanded[1..]),
            "exit" => self.builtin_exit(&expanded[1..]),
            _ => self.interp.eval(&expanded),
        }
    }

    fn expand(&mut self, word: &Word) -> Result<String> {
        match word {
            Word::Braced(text) => Ok(text.clone()),
            Word::Parts(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        Part::Literal(text) => out.push_str(text),
                        Part::Var(name) => {
                            let value = self.interp.get_var(name).ok_or_else(|| {
                                Error::Script(format!(
                                    "can't read \"{name}\": no such variable"
                                ))
                            })?;
                            out.push_str(value);
                        }
                        Part::Cmd(script) => {
                            let _ = write!(out, "{}", self.eval_script(script)?);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    fn builtin_set(&mut self, args: &[String]) -> Result<String> {
        match args {
            [name] => self
                .interp
                .get_var(name)
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::Script(format!("can't read \"{name}\": no such variable"))
                }),
            [name, value] => {
                self.interp.set_var(name, value.clone());
                Ok(value.clone())
            }
            _ => Err(Error::WrongArgs {
                usage: "set varName ?newValue?".into(),
            }),
        }
    }

    fn builtin_puts(&mut self, args: &[String]) -> Result<String> {
        match args {
            [text] => println!("{text}"),
            [flag, text] if flag == "-nonewline" => print!("{text}"),
            _ => {
                return Err(Error::WrongArgs {
                    usage: "puts ?-nonewline? string".into(),
                })
            }
        }
        Ok(String::new())
    }

    fn builtin_source(&mut self, args: &[String]) -> Result<String> {
        let [path] = args else {
            return Err(Error::WrongArgs {
                usage: "source fileName".into(),
            });
        };
        self.run_file(Path::new(path))
    }

    fn builtin_exit(&mut self, args: &[String]) -> Result<String> {
        let code = match args {
            [] => 0,
            [code] => code
                .parse::<i32>()
                .map_err(|_| Error::ExpectedInteger(code.clone()))?,
            _ => {
                return Err(Error::WrongArgs {
                    usage: "exit ?returnCode?".into(),
                })
            }
        };
        std::process::exit(code);
    }
}
