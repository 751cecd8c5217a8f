//! Command templates with `${NAME}` substitution.
//!
//! A template is split into whitespace-separated words *before*
//! substitution, so a substituted path containing spaces stays one
//! argument. A word that is exactly `${NAME}` expands to every value of a
//! multi-valued variable (one argument each); inside a larger word the
//! values are joined with spaces.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::builder::toolchain::CommandSpec;
use crate::util::errors::BerthError;

/// Variable bindings for template expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    vars: BTreeMap<String, Vec<String>>,
}

impl TemplateVars {
    pub fn new() -> Self {
        TemplateVars::default()
    }

    /// Bind a single value, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), vec![value.into()]);
        self
    }

    /// Bind a list of values, replacing any previous binding.
    pub fn set_list<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vars
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Bind a list of paths.
    pub fn set_paths<'a>(
        &mut self,
        name: impl Into<String>,
        paths: impl IntoIterator<Item = &'a PathBuf>,
    ) -> &mut Self {
        self.set_list(name, paths.into_iter().map(|p| p.display().to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.vars.get(name).map(Vec::as_slice)
    }

    /// Add every binding from `other`, overriding existing names.
    pub fn merge(&mut self, other: &TemplateVars) {
        for (name, values) in &other.vars {
            self.vars.insert(name.clone(), values.clone());
        }
    }
}

/// Piece of a template word.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed command template such as `${MAKENSO} ${SRC} ${TGT}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    words: Vec<Vec<Segment>>,
}

impl CommandTemplate {
    /// Parse a template. Fails on an unterminated `${` or an empty name.
    pub fn parse(raw: &str) -> Result<Self, BerthError> {
        let invalid = |reason: &str| BerthError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut words = Vec::new();
        for word in raw.split_whitespace() {
            let mut segments = Vec::new();
            let mut rest = word;

            while let Some(start) = rest.find("${") {
                if start > 0 {
                    segments.push(Segment::Literal(rest[..start].to_string()));
                }
                let after = &rest[start + 2..];
                let end = after.find('}').ok_or_else(|| invalid("unterminated `${`"))?;
                let name = &after[..end];
                if name.is_empty() {
                    return Err(invalid("empty variable name"));
                }
                segments.push(Segment::Var(name.to_string()));
                rest = &after[end + 1..];
            }
            if !rest.is_empty() {
                segments.push(Segment::Literal(rest.to_string()));
            }
            words.push(segments);
        }

        if words.is_empty() {
            return Err(invalid("template is empty"));
        }

        Ok(CommandTemplate {
            raw: raw.to_string(),
            words,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of all referenced variables, in order of first use.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in self.words.iter().flatten() {
            if let Segment::Var(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute variables and return the argument vector.
    pub fn expand(&self, vars: &TemplateVars) -> Result<Vec<String>, BerthError> {
        let lookup = |name: &str| {
            vars.get(name).ok_or_else(|| BerthError::UnknownTemplateVar {
                template: self.raw.clone(),
                name: name.to_string(),
            })
        };

        let mut argv = Vec::new();
        for word in &self.words {
            match word.as_slice() {
                [Segment::Var(name)] => argv.extend(lookup(name)?.iter().cloned()),
                segments => {
                    let mut arg = String::new();
                    for segment in segments {
                        match segment {
                            Segment::Literal(text) => arg.push_str(text),
                            Segment::Var(name) => arg.push_str(&lookup(name)?.join(" ")),
                        }
                    }
                    argv.push(arg);
                }
            }
        }
        Ok(argv)
    }

    /// Expand into a runnable command; the first argument is the program.
    pub fn to_command(&self, vars: &TemplateVars) -> Result<CommandSpec, BerthError> {
        let mut argv = self.expand(vars)?.into_iter();
        let program = argv.next().ok_or_else(|| BerthError::InvalidTemplate {
            template: self.raw.clone(),
            reason: "template expands to an empty command".to_string(),
        })?;
        Ok(CommandSpec::new(program).args(argv))
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
