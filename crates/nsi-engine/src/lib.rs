pub mod context;
pub mod error;
pub mod handlers;
pub mod job_engine;
pub mod messages;
pub mod processors;
pub mod query;
pub mod requester;

pub use context::EngineContext;
pub use error::EngineError;
pub use job_engine::JobEngine;
pub use messages::{Ack, ConnectionCorrelated, JobPayload, ReserveRequest};
pub use query::{query_notification, query_recursive, query_result, query_summary, QuerySummaryFilter, QuerySummaryResponse};
pub use requester::{HttpRequesterClient, NoopRequesterClient, RequesterClient, RequesterMessage};
