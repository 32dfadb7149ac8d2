use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(error) = launchkit_metering::run().await {
        error!("Metering service exited with error: {}", error);
        std::process::exit(1);
    }
}
