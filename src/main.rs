#[tokio::main]
async fn main() {
    // Tracing is initialised by the CLI once the config file is known
    if let Err(e) = reelflow::cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
