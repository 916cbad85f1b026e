pub mod config;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod frameworks;
pub mod manifest;
pub mod matcher;
pub mod scanner;
pub mod watch;

pub use config::{EngineConfig, ProjectConfig, RetryPolicy};
pub use dependencies::{Dependency, DescriptorInfo, DescriptorRegistry, Ecosystem};
pub use engine::{DiscoveryEngine, EngineEvent};
pub use error::{DiscoveryError, Result};
pub use extractor::{Endpoint, HandlerRef, HttpMethod};
pub use frameworks::{Framework, FrameworkDetection, Signal, SignalKind};
pub use manifest::{EndpointDiff, Manifest, Statistics};
pub use matcher::{ParseError, RawMatch, RouteMatcher};
pub use scanner::{ProjectKind, ProjectRoot, ScanResult, ScanRoot, Scanner};
pub use watch::{ChangeKind, ChangeNotification, ChangeSource, ChannelSource, SessionState};
