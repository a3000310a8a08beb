mod config;
mod operation_state;
mod report;
mod scan_result;

pub use config::{Exclusion, ExclusionType, IgnoredErrorPattern, ScanConfiguration, ScanSchedule, SCAN_PATHS_KEY};
pub use operation_state::{OperationCounters, OperationKind, OperationState, TerminalPhase};
pub use report::ScanReport;
pub use scan_result::{NewScanResult, ScanResult, ScanStatus};
