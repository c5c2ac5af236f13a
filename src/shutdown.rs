//! Process signal handling
//!
//! Maps SIGINT (Ctrl-C) and, on Unix, SIGTERM onto a [`CancellationToken`].
//! Nothing else in the crate touches signal APIs.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first termination signal
///
/// The listener also ends once the token is cancelled from elsewhere.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(listen(token, wait_for_signal()))
}

/// Cancel `token` once `signal` yields a signal name
///
/// `None` means no handler could be installed. That is reported and the
/// token is left alone, so the daemon keeps running until it is stopped
/// some other way.
async fn listen<F>(token: CancellationToken, signal: F)
where
    F: Future<Output = Option<&'static str>>,
{
    tokio::select! {
        _ = token.cancelled() => {}
        received = signal => match received {
            Some(name) => {
                eprintln!("Received {}", name);
                token.cancel();
            }
            None => {
                eprintln!("Signal handling unavailable, SIGINT/SIGTERM will not stop the probes cleanly");
                token.cancelled().await;
            }
        },
    }
}

/// Name of the signal received, or `None` if no handler could be installed
#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to install SIGTERM handler: {}", e);
            return tokio::signal::ctrl_c().await.ok().map(|()| "SIGINT");
        }
    };

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => return Some("SIGTERM"),
    };

    match interrupted {
        Ok(()) => Some("SIGINT"),
        Err(e) => {
            eprintln!("Failed to install SIGINT handler: {}", e);
            terminate.recv().await.map(|_| "SIGTERM")
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl-C")
}
