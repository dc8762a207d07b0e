//! # OS termination signals.
//!
//! [`wait_for_termination`] completes when the process receives a termination
//! signal and reports which one, for the shutdown log record.
//!
//! **Unix**: `SIGINT`, `SIGTERM`, `SIGQUIT` (and Ctrl-C).
//! **Other platforms**: Ctrl-C via [`tokio::signal::ctrl_c`].

/// Waits for a termination signal and returns its name.
///
/// Each call installs its own listeners. Fails if a listener cannot be
/// registered.
#[cfg(unix)]
pub(crate) async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
#[cfg(not(unix))]
pub(crate) async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
