use std::io::BufRead;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Cancels `cancel` on the first Ctrl-C.
pub fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "volley::console", "interrupt received, cancelling remaining jobs");
            cancel.cancel();
        }
    });
}

/// Each line read from stdin becomes one progress request.
///
/// Reads happen on a plain thread so a pending read never holds up exit.
pub fn progress_requests() -> anyhow::Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::Builder::new()
        .name("volley-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() {
                    break;
                }
                // A full channel already has a report pending.
                match tx.try_send(()) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                    Err(mpsc::error::TrySendError::Closed(())) => break,
                }
            }
        })?;
    Ok(rx)
}
