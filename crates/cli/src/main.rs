use std::process::ExitCode;

fn main() -> ExitCode {
    shipshape_cli::run()
}
