//! Watch sessions: change sources, the session registry and the
//! incremental reparse coordinator.

pub mod coordinator;
pub mod session;
pub mod source;

pub use session::{SessionInfo, SessionRegistry, SessionState, WatchSession};
pub use source::{
    ChangeKind, ChangeNotification, ChangeSource, ChangeStream, ChannelSource, NotifySource,
    SourceEvent,
};
