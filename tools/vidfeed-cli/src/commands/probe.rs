//! Show source information.

use vidfeed_capture_engine::backend::{default_backend, MediaBackend};

pub async fn run(uri: String) -> anyhow::Result<()> {
    let backend = default_backend();
    let duration = backend
        .probe_duration(&uri)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {uri}: {e}"))?;

    println!("Source: {uri}");
    println!("  Backend: {}", backend.name());
    println!("  Duration: {duration:.3}s");
    Ok(())
}
