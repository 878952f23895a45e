//! Connection lifecycle: connect, pump frames, reconnect
//!
//! One task per started session. It holds only a weak reference to the
//! session, so dropping every `Session` handle ends the task along with it.

use super::{Link, Status};
use crate::logging::Level;
use crate::result::TransportError;
use crate::session::{Halt, Session, Shared};
use std::sync::Weak;
use tokio::sync::{mpsc, watch};

/// Why a live link stopped.
enum LinkEnd {
    /// Shutdown was requested or the session is gone.
    Stopped,
    /// The peer closed or the link failed.
    Dropped(Option<TransportError>),
}

pub(crate) async fn run(
    weak: Weak<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let Some(session) = Session::upgrade(&weak) else {
            return;
        };
        let shared = session.shared();
        let url = shared.config.url.clone();
        let connect_timeout = shared.config.connect_timeout;
        let connector = shared.connector.clone();

        session.set_status(Status::Connecting);
        session.log(
            Level::Info,
            format!("Connecting to '{}', attempt {}", url, session.retries()),
        );
        drop(session);

        let attempt = tokio::select! {
            _ = stopped(&mut shutdown) => return,
            result = tokio::time::timeout(connect_timeout, connector.connect(&url)) => {
                result.unwrap_or(Err(TransportError::Timeout(connect_timeout)))
            }
        };

        let Some(session) = Session::upgrade(&weak) else {
            return;
        };

        match attempt {
            Ok(mut link) => {
                if *shutdown.borrow() {
                    link.close().await;
                    return;
                }

                session.reset_retries();
                session.set_status(Status::Connected);
                session.log(Level::Info, "Connection established");
                session.shared().hooks.connection_established(&session);
                drop(session);

                let end = pump(&weak, link.as_mut(), &mut outbound, &mut shutdown).await;
                let reason = match end {
                    LinkEnd::Stopped => return,
                    LinkEnd::Dropped(reason) => reason,
                };

                let Some(session) = Session::upgrade(&weak) else {
                    return;
                };
                let discarded = discard_queued(&mut outbound);
                match reason {
                    Some(e) => session.log(Level::Info, format!("Connection dropped: {}", e)),
                    None => session.log(Level::Info, "Connection dropped"),
                }
                if discarded > 0 {
                    session.log(
                        Level::Warning,
                        format!("Discarded {} unsent frames", discarded),
                    );
                }

                session.set_status(Status::Disconnected);
                let retries = session.bump_retries();
                session.shared().hooks.connection_closed(&session);
                if exhausted(&session, retries) {
                    return;
                }
                // Reconnect right away after a drop
            }
            Err(e) => {
                session.log(Level::Info, format!("Failed to connect: {}", e));
                session.set_status(Status::Disconnected);
                let retries = session.bump_retries();
                session.shared().hooks.connection_closed(&session);
                if exhausted(&session, retries) {
                    return;
                }

                let delay = session.shared().config.reconnect_delay;
                drop(session);

                tokio::select! {
                    _ = stopped(&mut shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Move frames both ways until the link ends or shutdown is requested.
async fn pump(
    weak: &Weak<Shared>,
    link: &mut dyn Link,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: &mut watch::Receiver<bool>,
) -> LinkEnd {
    loop {
        tokio::select! {
            _ = stopped(shutdown) => {
                link.close().await;
                return LinkEnd::Stopped;
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = link.send(frame).await {
                        return LinkEnd::Dropped(Some(e));
                    }
                }
                None => {
                    link.close().await;
                    return LinkEnd::Stopped;
                }
            },
            inbound = link.recv() => match inbound {
                Some(Ok(wire)) => {
                    let Some(session) = Session::upgrade(weak) else {
                        link.close().await;
                        return LinkEnd::Stopped;
                    };
                    session.dispatch(&wire);
                }
                Some(Err(e)) => return LinkEnd::Dropped(Some(e)),
                None => return LinkEnd::Dropped(None),
            },
        }
    }
}

/// Resolves once shutdown has been requested or the session is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn discard_queued(outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> usize {
    let mut count = 0;
    while outbound.try_recv().is_ok() {
        count += 1;
    }
    count
}

/// Whether the retry cap has been exceeded; gives up on the session if so.
fn exhausted(session: &Session, retries: u32) -> bool {
    let Some(max) = session.shared().config.max_retries else {
        return false;
    };
    if retries <= max {
        return false;
    }

    session.log(
        Level::Error,
        format!("Giving up after {} failed attempts", retries),
    );
    session.halt(Halt::GaveUp);
    true
}
