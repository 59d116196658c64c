//! Background task that purges expired records and their ciphertext.

use std::sync::Arc;

use crate::services::FileRegistry;

/// Run `sweep_expired` every `interval`. Failures are logged and the loop keeps going.
pub fn spawn_expiry_sweep(registry: Arc<FileRegistry>, interval: std::time::Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match registry.sweep_expired().await {
                Ok(outcome) => {
                    if outcome.removed > 0 || outcome.failed > 0 {
                        tracing::info!(
                            "Expiry sweep: removed {} records, {} failed, {} blobs left behind",
                            outcome.removed,
                            outcome.failed,
                            outcome.orphaned_blobs
                        );
                    } else {
                        tracing::debug!("Expiry sweep: nothing expired");
                    }
                }
                Err(e) => {
                    tracing::error!("Expiry sweep error: {}", e);
                }
            }
        }
    });
}
