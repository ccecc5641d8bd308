//! The five concrete pipeline stages.

pub mod compliance;
pub mod enhance;
pub mod fix;
pub mod report;
pub mod scan;

pub use compliance::ComplianceStage;
pub use enhance::AiEnhanceStage;
pub use fix::FixSuggestStage;
pub use report::{compose_report, ReportInputs, ReportOutput, ReportStage};
pub use scan::ScanStage;
