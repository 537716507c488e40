//! Connectivity signals and what the engine does about them.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::RemoteGateway;
use crate::store::Storage;
use crate::sync::{DrainReport, SyncEngine};

/// Host signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Connectivity came back (or was there at startup)
  Online,
  /// Connectivity went away
  Offline,
  /// Periodic probe with no change
  Tick,
}

/// Event handler that turns a periodic reachability probe into transitions
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Probe every `interval`. The first probe always reports `Online` or
  /// `Offline`; after that only changes do, with `Tick` in between.
  pub fn new<P, Fut>(interval: Duration, probe: P) -> Self
  where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut last: Option<bool> = None;
      loop {
        let online = probe().await;
        let event = match last {
          Some(prev) if prev == online => Event::Tick,
          _ if online => Event::Online,
          _ => Event::Offline,
        };
        last = Some(online);

        if tx.send(event).is_err() {
          break;
        }
        tokio::time::sleep(interval).await;
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// React to a host signal. `Online` drains the pending queues.
pub async fn dispatch<G: RemoteGateway, S: Storage>(
  engine: &SyncEngine<G, S>,
  event: Event,
) -> Option<DrainReport> {
  match event {
    Event::Online => {
      info!("Online, draining pending writes");
      Some(engine.drain().await)
    }
    Event::Offline => {
      info!("Offline, writes will be queued");
      None
    }
    Event::Tick => {
      debug!("No connectivity change");
      None
    }
  }
}
