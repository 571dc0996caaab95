use std::process::ExitCode;

fn main() -> ExitCode {
    match facs::runner::run_with_args() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("facs: {error}");
            ExitCode::FAILURE
        }
    }
}
