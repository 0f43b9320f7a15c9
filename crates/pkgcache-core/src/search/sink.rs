use tokio::sync::mpsc;
use tracing::trace;

use crate::models::{CoreError, PackageHit};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchStatus {
    Query,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchOutcome {
    Success,
    Failure,
    Cancelled,
}

/// Receives the stream produced by one search.
///
/// Call order: `status`, `no_percentage_updates`, any number of `package`,
/// at most one `error`, then exactly one `finished`. A search cancelled
/// before it started only sees `finished`.
pub trait SearchSink: Send {
    fn status(&mut self, status: SearchStatus);

    fn no_percentage_updates(&mut self);

    fn package(&mut self, hit: PackageHit);

    fn error(&mut self, error: &CoreError);

    fn finished(&mut self, outcome: SearchOutcome);
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchEvent {
    Status(SearchStatus),
    NoPercentageUpdates,
    Package(PackageHit),
    Error(CoreError),
    Finished(SearchOutcome),
}

/// Forwards sink calls as [`SearchEvent`]s over an unbounded channel.
///
/// The receiver yields `None` once the search has finished and dropped the
/// sink.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: SearchEvent) {
        if self.sender.send(event).is_err() {
            trace!("search event receiver dropped");
        }
    }
}

impl SearchSink for ChannelSink {
    fn status(&mut self, status: SearchStatus) {
        self.emit(SearchEvent::Status(status));
    }

    fn no_percentage_updates(&mut self) {
        self.emit(SearchEvent::NoPercentageUpdates);
    }

    fn package(&mut self, hit: PackageHit) {
        self.emit(SearchEvent::Package(hit));
    }

    fn error(&mut self, error: &CoreError) {
        self.emit(SearchEvent::Error(error.clone()));
    }

    fn finished(&mut self, outcome: SearchOutcome) {
        self.emit(SearchEvent::Finished(outcome));
    }
}
