//! Recruitment pipeline projection.
//!
//! Averages historical stage-to-stage conversion rates and projects the
//! candidate volume each upstream stage needs to reach a hire target.

pub mod conversion;
pub mod error;
pub mod ingest;
pub mod models;
pub mod report;
pub mod session;
pub mod stages;

pub use error::{PipelineError, Result};
pub use session::{Session, SessionState};
pub use stages::StageList;
