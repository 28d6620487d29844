//! Broadcast fan-in for decoded quotes.

use crate::quote::Quote;
use kiwoom_ws::QuoteSink;
use tokio::sync::broadcast;
use tracing::trace;

/// Publishes every quote on a tokio broadcast channel.
///
/// Publishing never blocks: with no subscribers quotes are discarded, and
/// slow subscribers observe `Lagged` on their side.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Quote>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Quote> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl QuoteSink<Vec<Quote>> for BroadcastSink {
    fn publish(&self, quotes: Vec<Quote>) {
        for quote in quotes {
            if self.tx.send(quote).is_err() {
                trace!("No quote subscribers");
            }
        }
    }
}
