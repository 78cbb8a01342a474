//! Live data plumbing: tick-to-candle aggregation and the quote feed task

pub mod aggregator;
pub mod feed;

pub use aggregator::CandleAggregator;
pub use feed::QuoteFeedHandle;
