use crate::cli::PipeArgs;
use logship::config::{Config, StorageConfig, StorageProvider};
use logship::storage::{self, ObjectStoreStorage};
use logship::{Key, Processor, Storage};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(args: PipeArgs) -> Result<(), AnyError> {
    let config = match args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let storage: Arc<dyn Storage> = Arc::new(open_storage(&config.storage)?);
    let processor = Processor::new(config.processor_options());
    let key = Key::new(args.project, args.bucket, args.prefix);

    let consumer = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.run().await })
    };

    info!(%key, "Shipping entries from stdin");
    let input = BufReader::new(tokio::io::stdin());
    let pumped = tokio::select! {
        result = pump_lines(input, &processor, &storage, &key) => result,
        () = shutdown_signal() => Ok(()),
    };

    // Buffered entries are flushed even when reading failed.
    let finished = finish(&processor, consumer).await;

    let metrics = processor.metrics().snapshot();
    info!(
        accepted = metrics.entries_accepted,
        rejected = metrics.entries_rejected,
        uploaded = metrics.uploads_succeeded,
        dropped = metrics.uploads_dropped,
        "Log shipping finished"
    );

    pumped?;
    finished
}

/// Close the processor, then wait for the consumer unless the upload queue
/// was abandoned on timeout.
async fn finish(
    processor: &Processor,
    consumer: JoinHandle<logship::Result<()>>,
) -> Result<(), AnyError> {
    let closed = processor.close().await;

    match &closed {
        Err(e) if e.is_shutdown_timeout() => {
            warn!(in_flight = processor.queue_depth(), "Abandoning pending uploads");
            consumer.abort();
        }
        _ => consumer.await??,
    }

    closed?;
    Ok(())
}

async fn pump_lines<R>(
    mut input: R,
    processor: &Arc<Processor>,
    storage: &Arc<dyn Storage>,
    key: &Key,
) -> Result<(), AnyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();

    loop {
        raw.clear();
        if input.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }

        let line = String::from_utf8_lossy(trim_newline(&raw));
        match processor.queue_entry(Arc::clone(storage), key, &*line).await {
            Ok(()) => {}
            // Both are per-entry losses; keep reading
            Err(e) if e.is_too_large() || e.is_queue_limit() => {
                warn!(error = %e, size = line.len(), "Entry dropped");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Reached end of input");
    Ok(())
}

fn trim_newline(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

fn open_storage(config: &StorageConfig) -> storage::Result<ObjectStoreStorage> {
    match config.provider {
        StorageProvider::Memory => {
            warn!("Using in-memory storage, shipments are discarded on exit");
            Ok(ObjectStoreStorage::in_memory())
        }
        StorageProvider::Local => ObjectStoreStorage::local(&config.root),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
