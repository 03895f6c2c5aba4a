use telemetry::TelemetrySubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    TelemetrySubscriber::init(std::io::stdout)?;

    if let Err(err) = overlay_cli::run().await {
        telemetry::error!(%err, "overlay process exited with an error");
        std::process::exit(1);
    }

    Ok(())
}
