use std::process::ExitCode;

fn main() -> ExitCode {
    match mirvcs::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(u8::try_from(err.code().as_i32()).unwrap_or(1))
        }
    }
}
