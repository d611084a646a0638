//! Thin entry point: parses arguments, runs the selected command, and
//! maps any error to a process exit code.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match spindle_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
