use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use groupsync_core::{config, MembershipSnapshot};
use groupsync_directory::FileDirectory;
use groupsync_engine::{notify::OutboxNotifier, split};

use crate::error::DaemonError;
use crate::session::{InMemoryTransport, SessionReport, SessionRouter};
use crate::stage::SyncStage;

/// Run `future` to completion on a fresh multi-threaded runtime.
pub fn block_on<F, T>(future: F) -> Result<T, DaemonError>
where
    F: Future<Output = Result<T, DaemonError>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DaemonError::Io {
            path: "tokio-runtime".into(),
            source: e,
        })?;
    runtime.block_on(future)
}

/// Push `snapshots` through the whole pipeline on this machine: chunk each
/// one, deliver the chunks over an in-memory transport (one session per
/// snapshot), and sync against the file-backed directory under `home`.
/// Notifications go to the outbox file.
pub async fn run_local(
    home: &Path,
    snapshots: Vec<MembershipSnapshot>,
) -> Result<Vec<SessionReport>, DaemonError> {
    let config = config::load_at(home)?;
    let chunk_size = config.chunk_size;
    let stage = Arc::new(SyncStage::new(
        home.to_path_buf(),
        config,
        Arc::new(FileDirectory::at_home(home)),
        Arc::new(OutboxNotifier::at_home(home)),
    ));
    let transport = Arc::new(InMemoryTransport::new());
    let mut router = SessionRouter::new(Arc::clone(&transport), stage);

    let mut token = 0u64;
    for snapshot in snapshots {
        let session = format!("{}:{}:{}", snapshot.job, snapshot.run_id, snapshot.part.index);
        for chunk in split(snapshot, chunk_size)? {
            router.deliver(&session, chunk, token).await?;
            token += 1;
        }
    }

    let reports = router.finish().await?;
    let log = transport.log();
    tracing::debug!(
        completed = log.completed.len(),
        closed = log.closed.len(),
        "local run finished",
    );
    Ok(reports)
}

/// Set to any value to log JSON lines instead of text.
pub const LOG_JSON_ENV: &str = "GROUPSYNC_LOG_JSON";

/// Install the `fmt` subscriber with `RUST_LOG` filtering (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if std::env::var_os(LOG_JSON_ENV).is_some() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
