//! Connectivity monitoring.
//!
//! Classifies the link as online, offline or slow and replays the
//! operation queue when connectivity returns.

pub mod info;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod target;

pub use info::{ConnectionInfo, ConnectionStatus, EffectiveType, LinkQuality};
pub use monitor::{ConnectivityMonitor, PlatformEvent, Subscription};
pub use notify::{LogNotifier, Notifier};
pub use probe::{HttpProbe, LivenessProbe};
pub use target::SyncTarget;
