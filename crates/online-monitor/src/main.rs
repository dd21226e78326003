#[tokio::main]
async fn main() -> anyhow::Result<()> {
    online_monitor::bootstrap::run().await
}
