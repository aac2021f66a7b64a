use std::process::ExitCode;

fn main() -> ExitCode {
    schedman_cli::run()
}
