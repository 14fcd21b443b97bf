//! # ccp-sync
//!
//! Child-case synchronization: selects flagged parent rows from the store,
//! fetches their child cases from the remote SOAP service, and writes a
//! consolidated update back through a stored procedure.
//!
//! **Flow:** Row Selector → Concurrent Fetcher → Extractor/Validator →
//! Batch Builder → Store writes (see [`pipeline`]).

pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod store;

pub use config::Config;
pub use context::{RunContext, RunMode};
pub use error::{RemoteCallError, Result, SyncError};
pub use pipeline::{run_pipeline, PipelineState, RunReport};
pub use remote::{RemoteAdapter, SoapClient};
pub use store::StoreAdapter;
