//! Command-line grammar
//!
//! `wuffcrypt [-d | -e] -p <PASSWORD> <INFILE> <OUTFILE>`
//!
//! Parsing is kept apart from the binary so that every usage error can be
//! turned into a [`WuffcryptError`] and tested without spawning a process.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;

use crate::error::{ErrorCategory, ErrorKind, Result, WuffcryptError};
use crate::secret::SecretBuffer;

const AFTER_HELP: &str = "\
wuffcrypt is experimental software; while it is believed to provide strong
encryption, it has not undergone any third-party vetting or peer review.
Use it only where you are willing to accept the cost of faulty functioning.";

#[derive(Parser)]
#[command(name = "wuffcrypt")]
#[command(version)]
#[command(about = "Password-based file encryption.", long_about = None)]
#[command(override_usage = "wuffcrypt [-d | -e] -p <PASSWORD> <INFILE> <OUTFILE>")]
#[command(after_help = AFTER_HELP)]
struct Args {
    /// Decrypt INFILE into OUTFILE
    #[arg(short = 'd', overrides_with = "encrypt")]
    decrypt: bool,

    /// Encrypt INFILE into OUTFILE
    #[arg(short = 'e', overrides_with = "decrypt")]
    encrypt: bool,

    /// Password to derive the key from
    #[arg(short = 'p', value_name = "PASSWORD", allow_hyphen_values = true)]
    password: Option<String>,

    /// Path to the file to read
    #[arg(value_name = "INFILE")]
    input: PathBuf,

    /// Path to the file to write
    #[arg(value_name = "OUTFILE")]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

/// A fully validated request to encrypt or decrypt one file.
#[derive(Debug)]
pub struct Invocation {
    pub operation: Operation,
    pub input: PathBuf,
    pub output: PathBuf,
    pub password: SecretBuffer,
}

#[derive(Debug)]
pub enum Command {
    /// Help or version text was requested; print it and exit successfully.
    Info(String),
    Run(Invocation),
}

/// Parse a full argument vector, program name included.
pub fn parse_args<I, T>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(e) => {
            return match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                    Ok(Command::Info(e.to_string()))
                }
                ClapErrorKind::MissingRequiredArgument => Err(usage_error(
                    ErrorKind::NoPath,
                    format!("No path provided\n\n{}", e),
                )),
                _ => Err(usage_error(ErrorKind::Usage, e.to_string())),
            };
        }
    };

    let operation = match (args.encrypt, args.decrypt) {
        (true, _) => Operation::Encrypt,
        (_, true) => Operation::Decrypt,
        (false, false) => {
            return Err(WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::Usage,
                "No operation provided (use -e or -d)",
            ));
        }
    };

    let password = match args.password {
        Some(p) if !p.is_empty() => SecretBuffer::from_consumed_string(p),
        _ => {
            return Err(WuffcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::Usage,
                "No password provided (use -p)",
            ));
        }
    };

    Ok(Command::Run(Invocation {
        operation,
        input: args.input,
        output: args.output,
        password,
    }))
}

// clap's rendering already includes the usage line, so the clap error is
// not kept as a source.
fn usage_error(kind: ErrorKind, msg: String) -> WuffcryptError {
    WuffcryptError::with_kind(ErrorCategory::User, kind, msg.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        parse_args(std::iter::once("wuffcrypt").chain(args.iter().copied()))
    }

    fn invocation(args: &[&str]) -> Invocation {
        match parse(args).unwrap() {
            Command::Run(inv) => inv,
            Command::Info(text) => panic!("unexpected info output: {}", text),
        }
    }

    fn error_kind(args: &[&str]) -> Option<ErrorKind> {
        parse(args).expect_err("expected usage error").kind
    }

    #[test]
    fn test_encrypt() {
        let inv = invocation(&["-e", "-p", "abc", "in.txt", "out.wuff"]);
        assert_eq!(inv.operation, Operation::Encrypt);
        assert_eq!(inv.input, PathBuf::from("in.txt"));
        assert_eq!(inv.output, PathBuf::from("out.wuff"));
        assert_eq!(inv.password.as_bytes(), b"abc");
    }

    #[test]
    fn test_decrypt_with_options_after_paths() {
        let inv = invocation(&["in.wuff", "out.txt", "-d", "-p", "abc"]);
        assert_eq!(inv.operation, Operation::Decrypt);
        assert_eq!(inv.input, PathBuf::from("in.wuff"));
        assert_eq!(inv.output, PathBuf::from("out.txt"));
    }

    #[test]
    fn test_last_operation_wins() {
        let inv = invocation(&["-e", "-d", "-p", "abc", "a", "b"]);
        assert_eq!(inv.operation, Operation::Decrypt);

        let inv = invocation(&["-d", "-e", "-p", "abc", "a", "b"]);
        assert_eq!(inv.operation, Operation::Encrypt);
    }

    #[test]
    fn test_password_may_start_with_hyphen() {
        let inv = invocation(&["-e", "-p", "-not-a-flag", "a", "b"]);
        assert_eq!(inv.password.as_bytes(), b"-not-a-flag");
    }

    #[test]
    fn test_help() {
        for flag in ["-h", "--help"] {
            match parse(&[flag]).unwrap() {
                Command::Info(text) => assert!(text.contains("Usage")),
                Command::Run(_) => panic!("expected help output"),
            }
        }
    }

    #[test]
    fn test_help_wins_over_other_errors() {
        assert!(matches!(parse(&["-e", "-h"]).unwrap(), Command::Info(_)));
    }

    #[test]
    fn test_missing_paths() {
        assert_eq!(error_kind(&["-e", "-p", "abc"]), Some(ErrorKind::NoPath));
        assert_eq!(error_kind(&["-e", "-p", "abc", "only-one"]), Some(ErrorKind::NoPath));
    }

    #[test]
    fn test_too_many_paths() {
        assert_eq!(
            error_kind(&["-e", "-p", "abc", "a", "b", "c"]),
            Some(ErrorKind::Usage)
        );
    }

    #[test]
    fn test_unknown_option() {
        assert_eq!(error_kind(&["-x", "-p", "abc", "a", "b"]), Some(ErrorKind::Usage));
    }

    #[test]
    fn test_missing_operation() {
        assert_eq!(error_kind(&["-p", "abc", "a", "b"]), Some(ErrorKind::Usage));
    }

    #[test]
    fn test_missing_password() {
        assert_eq!(error_kind(&["-e", "a", "b"]), Some(ErrorKind::Usage));
        assert_eq!(error_kind(&["-e", "-p", "", "a", "b"]), Some(ErrorKind::Usage));
    }
}
