pub mod error;
pub mod feed;
pub mod store;
pub mod synchronizer;
pub mod transport;

pub use error::{FeedConnectionError, FeedParseError, RequestError, TransportError};
pub use feed::{
    ConnectionState, FeedConnector, FeedSocket, LiveFeedConnection, TungsteniteConnector,
    RECONNECT_DELAY,
};
pub use store::{ConversationStore, MessageSequence};
pub use synchronizer::{ConversationSynchronizer, SelectionToken, SyncEvent};
pub use transport::{feed_url_for, ChatApi, HttpTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/end_to_end_tests.rs"]
mod end_to_end_tests;
