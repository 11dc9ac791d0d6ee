#[tokio::main]
async fn main() -> std::process::ExitCode {
    match factlens_lib::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("factlens: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
