pub mod candidate_ctx;
pub mod hunting;
pub mod quota_watch;

pub use candidate_ctx::CandidateCtx;
pub use hunting::{
    AttemptOutcome, Evaluation, HuntSettings, HuntingEngine, NextStep, ResumeOutcome,
    SelectOutcome, SubmitOutcome, Verdict,
};
pub use quota_watch::{wait_deadline, CycleOutcome, QuotaWatcher, ReloadTimer};
