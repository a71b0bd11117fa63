//! Warm single-browser extraction gateway.
//!
//! One persistent Chromium session serves every job: navigate-and-extract
//! against arbitrary URLs, web search, and maps place collection. Jobs are
//! serialized through a FIFO queue so they never interleave on the shared
//! session, landed pages are classified for cookie walls and CAPTCHAs
//! before extraction runs, and a dead session is relaunched transparently
//! on the next job.
//!
//! [`service::GateService`] is the entry point; everything else supports it.

pub mod blockers;
pub mod detect;
pub mod error;
pub mod extract;
pub mod queue;
pub mod service;
pub mod session;
pub mod types;

pub use {
    blockers::{BlockerEvidence, BlockerKind, BlockerVerdict},
    error::{BrowserError, Result},
    extract::{
        fields::FieldSpec,
        maps::MapsEntry,
        search::{SearchResult, TopStory},
    },
    queue::JobQueue,
    service::GateService,
    session::{SessionManager, SessionState},
    types::{
        EvalSpec, FetchRequest, Health, JobOutput, JobStatus, MapsRequest, SearchRequest,
    },
};
