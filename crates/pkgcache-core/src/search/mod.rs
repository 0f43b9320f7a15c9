pub mod engine;
pub mod sink;

pub use engine::SearchEngine;
pub use sink::{ChannelSink, SearchEvent, SearchOutcome, SearchSink, SearchStatus};
