//! Compiler options and their command-line form.

use flint_const::ConstOptions;
use flint_flow::FlowOptions;
use flint_scope::FunctionKind;

use crate::CompileError;

/// Options shared by every function compiled in one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Lower `assert` statements instead of dropping them.
    pub enable_asserts: bool,
    /// Emit stack overflow checks at entries and loop headers.
    pub stack_checks: bool,
    /// `-D name=value` environment defines, in command-line order.
    pub defines: Vec<(String, String)>,
    /// Worker threads for whole-unit compilation; rayon's default when `None`.
    pub jobs: Option<usize>,
    pub verbose: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enable_asserts: false,
            stack_checks: true,
            defines: Vec::new(),
            jobs: None,
            verbose: false,
        }
    }
}

impl CompilerOptions {
    /// Merge `other` into `self`.
    ///
    /// Flags that differ from their default win. Defines accumulate, and a
    /// later define of the same name replaces the earlier one.
    pub fn merge(&mut self, other: &Self) {
        if other.enable_asserts {
            self.enable_asserts = true;
        }
        if !other.stack_checks {
            self.stack_checks = false;
        }
        for (name, value) in &other.defines {
            self.define(name, value);
        }
        if other.jobs.is_some() {
            self.jobs = other.jobs;
        }
        if other.verbose {
            self.verbose = true;
        }
    }

    pub fn define(&mut self, name: &str, value: &str) {
        match self.defines.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => value.clone_into(&mut entry.1),
            None => self.defines.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn const_options(&self) -> ConstOptions {
        self.defines
            .iter()
            .fold(ConstOptions::default(), |options, (name, value)| {
                options.with_define(name, value)
            })
    }

    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            enable_asserts: self.enable_asserts,
            stack_checks: self.stack_checks,
        }
    }
}

/// A parsed command line after the command name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub options: CompilerOptions,
    /// `--kind=` override for the compiled member.
    pub kind: Option<FunctionKind>,
    pub positional: Vec<String>,
}

/// Parse options and positional arguments.
///
/// `-D` takes its define either attached (`-Dname=value`) or as the next
/// argument.
pub fn parse_command_line(args: &[String]) -> Result<CommandLine, CompileError> {
    let mut line = CommandLine::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        i += 1;
        if arg == "--enable-asserts" {
            line.options.enable_asserts = true;
        } else if arg == "--no-stack-checks" {
            line.options.stack_checks = false;
        } else if arg == "-v" || arg == "--verbose" {
            line.options.verbose = true;
        } else if let Some(jobs) = arg.strip_prefix("--jobs=") {
            let jobs = jobs
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(arg, "expected a positive thread count"))?;
            line.options.jobs = Some(jobs);
        } else if let Some(name) = arg.strip_prefix("--kind=") {
            let kind = parse_kind(name).ok_or_else(|| invalid(arg, "unknown function kind"))?;
            line.kind = Some(kind);
        } else if arg == "-D" {
            let define = args.get(i).ok_or_else(|| invalid(arg, "missing name=value"))?;
            i += 1;
            parse_define(&mut line.options, define)?;
        } else if let Some(define) = arg.strip_prefix("-D") {
            parse_define(&mut line.options, define)?;
        } else if arg.starts_with('-') {
            return Err(invalid(arg, "unknown option"));
        } else {
            line.positional.push(arg.to_owned());
        }
    }
    Ok(line)
}

fn parse_define(options: &mut CompilerOptions, define: &str) -> Result<(), CompileError> {
    match define.split_once('=') {
        Some((name, value)) if !name.is_empty() => {
            options.define(name, value);
            Ok(())
        }
        _ => Err(invalid(define, "expected name=value")),
    }
}

fn invalid(arg: &str, reason: &str) -> CompileError {
    CompileError::InvalidOption {
        option: arg.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Names accepted by `--kind=`.
pub fn parse_kind(name: &str) -> Option<FunctionKind> {
    let kind = match name {
        "regular" => FunctionKind::Regular,
        "constructor" => FunctionKind::Constructor,
        "factory" => FunctionKind::Factory,
        "getter" => FunctionKind::ImplicitGetter,
        "setter" => FunctionKind::ImplicitSetter,
        "static-getter" => FunctionKind::ImplicitStaticGetter,
        "extractor" => FunctionKind::MethodExtractor,
        "tear-off" => FunctionKind::ImplicitClosure,
        "dynamic-forwarder" => FunctionKind::DynamicInvocationForwarder,
        "nsm-forwarder" => FunctionKind::NoSuchMethodForwarder,
        _ => return None,
    };
    Some(kind)
}
