use tokio::sync::oneshot;

use crate::catalog::ScanResultUpdate;
use crate::error::Result;
use crate::model::{NewScanResult, OperationState, ScanReport};

/// One unit of catalog mutation, enqueued by a producer and applied by the
/// serializer's single consumer task in submission order.
#[derive(Debug)]
pub enum WriteMessage {
    InsertDiscovered(NewScanResult),
    CreateOperation(OperationState),
    UpdateOperation(OperationState),
    UpdateScanResult { id: i64, update: ScanResultUpdate },
    BatchUpdateScanResults(ScanResultUpdateBatch),
    SetMarkedGood { id: i64, marked_as_good: bool },
    DeleteScanResults(Vec<i64>),
    InsertReport(ScanReport),
}

/// A batch of scan-result updates applied as one message, used by the
/// scanning phase to amortize channel round trips across many files.
#[derive(Debug)]
pub struct ScanResultUpdateBatch {
    pub items: Vec<BatchItem>,
}

#[derive(Debug)]
pub struct BatchItem {
    pub id: i64,
    pub update: ScanResultUpdate,
}

pub(super) enum WriteCommand {
    Apply {
        message: WriteMessage,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}
