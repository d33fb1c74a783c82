use std::process::ExitCode;

fn main() -> ExitCode {
    claimdesk_cli::run()
}
