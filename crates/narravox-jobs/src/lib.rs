//! Job orchestration model: typed Job/JobStep rows, the lifecycle state
//! machine, and the store/queue collaborator contracts with in-memory
//! reference implementations.

pub mod queue;
pub mod state;
pub mod store;
pub mod types;

pub use queue::{MemoryTaskQueue, TaskQueue};
pub use state::{JobEvent, JobStateMachine};
pub use store::{JobFilter, JobStore, MemoryJobStore};
pub use types::{
    ChapterMeta, ContentSource, Job, JobConfig, JobResultData, JobStatus, JobStep, JobType,
    StepStatus,
};
