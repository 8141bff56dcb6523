//! # envil-core
//!
//! The live-code dispatch engine. Visual code is split into statements and
//! broadcast to connected runtimes; audio code is reduced to the bracket region
//! around the cursor and evaluated by sclang.

pub mod config;
pub mod dispatch;
pub mod region;
pub mod scope;
pub mod segment;

pub use config::{Config, ConfigError};
pub use dispatch::{Command, DispatchState, Dispatcher, Outcome, StatementSink, TcpBroadcast};
pub use region::{extract_region, find_regions, region_text, RegionError};
pub use scope::{OracleError, ScopeMap, ScopeOracle, SclangScopes};
pub use segment::{evaluation_text, segment, RewriteRule, Segmenter, Segments};
