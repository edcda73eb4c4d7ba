//! Cache store, admission control and the participation pipeline.

pub mod admission;
pub mod automation;
pub mod cache;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod proxy;
pub mod reclaimer;
pub mod recorder;
pub mod retry;

pub use admission::{AdmissionController, CategoryStatus, ClientStatus};
pub use automation::{AutomationCallConfig, AutomationClient, AutomationRequest, AutomationResponse};
pub use cache::{estimate_size, CacheStats, CacheStore};
pub use error::{AppResult, AutomationError, PipelineError, SnapshotError};
pub use job::{JobStatus, OpportunityId, ParticipationJob, ParticipationRequest, ProfileId};
pub use pipeline::{JobTicket, ParticipationPipeline, PipelineSettings, PipelineStats};
pub use proxy::ProxySelector;
pub use reclaimer::{Reclaim, ReclaimTarget, Reclaimer};
pub use recorder::{ConfirmationDetails, HistoryTag, OutcomeRecorder};
pub use retry::{retry_with_backoff, RetryPolicy};
