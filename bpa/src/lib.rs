/*!
The bundle-processing core of a delay-tolerant networking node.

A [`node::Node`] owns the persistent [`storage::Store`], the convergence-layer
[`cla::Manager`], the [`cron::Cron`] scheduler, a pluggable
[`routing::Algorithm`], and the [`dispatcher::Dispatcher`] that drives every
bundle through receive → dispatch → deliver/forward. Subsystems communicate
over channels and capability handles rather than back-pointers.
*/

pub mod agent;
pub mod cla;
pub mod config;
pub mod cron;
pub mod discovery;
pub mod dispatcher;
pub mod node;
pub mod pack;
pub mod routing;
pub mod storage;

use mule_bpv7 as bpv7;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

// Re-export for consistency
pub use async_trait::async_trait;
