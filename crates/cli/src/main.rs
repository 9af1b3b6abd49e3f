use std::process::ExitCode;

fn main() -> ExitCode {
    gemba_cli::run()
}
