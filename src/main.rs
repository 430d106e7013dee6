#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = genolab::run().await {
        log::error!("Server exited with error: {}", e);
        std::process::exit(1);
    }
}
