//! wuffcrypt CLI - Password-based file encryption
//!
//! Command-line interface for encrypting and decrypting files into the
//! wuffcrypt container format.

use std::error::Error as _;
use std::process;

use tracing_subscriber::EnvFilter;

use wuffcrypt::cli::{self, Command, Invocation, Operation};
use wuffcrypt::config::Settings;
use wuffcrypt::error::{Result, WuffcryptError};
use wuffcrypt::file_ops;

fn main() {
    // Logging goes to stderr and is quiet unless RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli::parse_args(std::env::args_os()) {
        Ok(Command::Info(text)) => {
            print!("{}", text);
            return;
        }
        Ok(Command::Run(invocation)) => run(invocation),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", report(&e));
        process::exit(1);
    }
}

fn run(invocation: Invocation) -> Result<()> {
    let Invocation {
        operation,
        input,
        output,
        password,
    } = invocation;

    match operation {
        Operation::Encrypt => {
            let settings = Settings::from_env()?;
            file_ops::encrypt_file(&input, &output, &password, &settings.encrypt)
        }
        Operation::Decrypt => file_ops::decrypt_file(&input, &output, &password),
    }
}

/// Renders the error followed by every underlying cause.
fn report(err: &WuffcryptError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
