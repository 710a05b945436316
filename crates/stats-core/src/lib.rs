//! Statistics aggregation and periodic reporting for a multi-worker load generator.

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod counters;
pub mod error;
pub mod report;
pub mod ticker;
pub mod urls;
pub mod worker;

pub use aggregate::*;
pub use clock::*;
pub use config::*;
pub use counters::*;
pub use error::*;
pub use report::*;
pub use ticker::*;
pub use urls::*;
pub use worker::*;
