//! Forwards OS signals into the control plane as typed events, grounded
//! on the teacher's `linux-client::main` signal-polling loop (`SIGHUP`
//! there triggers `session.reconnect()`; here it drives
//! `PipelineController::reload`).

use tokio::signal::unix::{signal, SignalKind};

pub enum ControlEvent {
    Reload,
    Shutdown,
}

/// Awaits the next control-plane event: `SIGHUP` maps to [`ControlEvent::
/// Reload`], `SIGINT`/`SIGTERM` to [`ControlEvent::Shutdown`]. Returns
/// `Shutdown` if signal registration itself fails, since a broken signal
/// handler leaves no other way to stop cleanly.
pub async fn next_event() -> ControlEvent {
    let registered = (|| -> std::io::Result<_> {
        Ok((signal(SignalKind::hangup())?, signal(SignalKind::interrupt())?, signal(SignalKind::terminate())?))
    })();
    let (mut sighup, mut sigint, mut sigterm) = match registered {
        Ok(signals) => signals,
        Err(error) => {
            tracing::error!(%error, "failed to register signal handlers");
            return ControlEvent::Shutdown;
        }
    };

    tokio::select! {
        _ = sighup.recv() => {
            tracing::info!("received SIGHUP, reloading configuration");
            ControlEvent::Reload
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
            ControlEvent::Shutdown
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            ControlEvent::Shutdown
        }
    }
}
