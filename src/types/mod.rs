pub mod error;
pub mod report;

pub use error::{
    DeliveryError, ErrorCategory, ErrorClassifier, ProviderError, PulseError, Result, ResultExt,
    ValidationError, ValidationErrorKind,
};
pub use report::{
    Cadence, ReportConfig, ReportHistory, ReportPeriod, ReportStatus, TenantProfile, Transport,
};
