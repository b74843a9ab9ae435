#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sydney_events_lib::run().await
}
