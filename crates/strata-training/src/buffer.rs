use crate::sampling::ReservoirSampler;
use strata_abstraction::Row;

/// Raw rows awaiting a flush: either every row, or a reservoir sample of them.
#[derive(Debug, Clone)]
pub enum RowBuffer {
    Plain(Vec<Row>),
    Reservoir { sampler: ReservoirSampler<Row>, seed: u64 },
}

impl RowBuffer {
    pub fn plain() -> Self {
        Self::Plain(Vec::new())
    }

    pub fn reservoir(capacity: usize, seed: u64) -> Self {
        Self::Reservoir { sampler: ReservoirSampler::new(capacity, seed), seed }
    }

    pub fn push(&mut self, row: Row) {
        match self {
            Self::Plain(rows) => rows.push(row),
            Self::Reservoir { sampler, .. } => sampler.offer(row),
        }
    }

    /// Rows currently held.
    pub fn len(&self) -> usize {
        match self {
            Self::Plain(rows) => rows.len(),
            Self::Reservoir { sampler, .. } => sampler.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand over the held rows and reset. A reservoir restarts from its seed.
    pub fn take(&mut self) -> Vec<Row> {
        match self {
            Self::Plain(rows) => std::mem::take(rows),
            Self::Reservoir { sampler, seed } => sampler.drain(*seed),
        }
    }
}
