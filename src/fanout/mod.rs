mod appender;
#[cfg(test)]
mod fanout_tests;
mod querier;
mod secondary;

pub use appender::FanoutAppender;
pub use querier::{MergeChunkQuerier, MergeQuerier};
pub use secondary::{SecondaryChunkQuerier, SecondaryQuerier};

use crate::common::{QueryContext, Timestamp};
use crate::error::{MultiError, TsdbResult};
use crate::storage::{BoxAppender, BoxQuerier, Storage};
use tracing::warn;

/// A single logical store composed of one authoritative primary backend and
/// any number of best-effort secondaries.
///
/// Writes are broadcast through [`FanoutAppender`]; reads are scattered and
/// merged through [`MergeQuerier`]. The primary's failures are fatal, while a
/// secondary's failures degrade its contribution to a warning.
pub struct FanoutStorage {
    primary: Box<dyn Storage>,
    secondaries: Vec<Box<dyn Storage>>,
}

impl FanoutStorage {
    pub fn new(primary: Box<dyn Storage>, secondaries: Vec<Box<dyn Storage>>) -> Self {
        Self {
            primary,
            secondaries,
        }
    }
}

impl Storage for FanoutStorage {
    fn start_time(&self) -> TsdbResult<Timestamp> {
        let mut start = self.primary.start_time()?;
        for storage in &self.secondaries {
            start = start.min(storage.start_time()?);
        }
        Ok(start)
    }

    fn querier(
        &self,
        ctx: QueryContext,
        mint: Timestamp,
        maxt: Timestamp,
    ) -> TsdbResult<BoxQuerier> {
        let primary = self.primary.querier(ctx.clone(), mint, maxt)?;

        let mut secondaries = Vec::with_capacity(self.secondaries.len());
        let mut open_err = None;
        for storage in &self.secondaries {
            match storage.querier(ctx.clone(), mint, maxt) {
                Ok(querier) => secondaries.push(querier),
                Err(e) => {
                    open_err = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = open_err {
            // unwind everything opened so far, keeping every close error
            let mut errs = MultiError::new();
            errs.push(e);
            let opened = secondaries.len() + 1;
            for mut querier in std::iter::once(primary).chain(secondaries) {
                errs.add(querier.close());
            }
            warn!(
                closed = opened,
                "failed to open fanout querier on a secondary backend"
            );
            return Err(errs.into_err());
        }

        Ok(Box::new(MergeQuerier::new(ctx, primary, secondaries)))
    }

    fn appender(&self) -> BoxAppender {
        Box::new(FanoutAppender::new(
            self.primary.appender(),
            self.secondaries.iter().map(|s| s.appender()).collect(),
        ))
    }

    fn close(&mut self) -> TsdbResult<()> {
        let mut errs = MultiError::new();
        errs.add(self.primary.close());
        for storage in &mut self.secondaries {
            errs.add(storage.close());
        }
        errs.err()
    }
}
