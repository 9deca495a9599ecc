use std::fmt;

/// A batch that could not be written. Everything the batch did was rolled
/// back; the run carries on with the next batch.
#[derive(Debug)]
pub struct BatchWriteError {
    pub batch_size: usize,
    pub source: anyhow::Error,
}

impl BatchWriteError {
    pub fn new(batch_size: usize, source: anyhow::Error) -> Self {
        Self { batch_size, source }
    }
}

impl fmt::Display for BatchWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch write failed (batch_size={}): {:#}",
            self.batch_size, self.source
        )
    }
}

impl std::error::Error for BatchWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// A propagation pass that failed. The whole pass was rolled back, so no
/// flag was cleared and no dependent record changed; running it again is safe.
#[derive(Debug)]
pub struct PropagationError {
    /// Rows selected before the failure (0 when selection itself failed).
    pub rows_selected: usize,
    pub source: anyhow::Error,
}

impl fmt::Display for PropagationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "propagation failed (rows_selected={}): {:#}",
            self.rows_selected, self.source
        )
    }
}

impl std::error::Error for PropagationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
