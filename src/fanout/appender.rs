use crate::common::Timestamp;
use crate::error::TsdbResult;
use crate::labels::Labels;
use crate::storage::{Appender, BoxAppender, SeriesRef};
use tracing::warn;

/// Broadcasts writes to every backend with primary-authoritative semantics.
///
/// `add`/`add_fast` write the primary first and abort on the first failure
/// anywhere. The series reference handed back is the primary's and is passed
/// verbatim to every secondary, so all backends must share the primary's
/// reference namespace.
pub struct FanoutAppender {
    primary: BoxAppender,
    secondaries: Vec<BoxAppender>,
}

impl FanoutAppender {
    pub fn new(primary: BoxAppender, secondaries: Vec<BoxAppender>) -> Self {
        Self {
            primary,
            secondaries,
        }
    }
}

impl Appender for FanoutAppender {
    fn add(&mut self, labels: &Labels, ts: Timestamp, value: f64) -> TsdbResult<SeriesRef> {
        let series_ref = self.primary.add(labels, ts, value)?;
        for appender in &mut self.secondaries {
            appender.add(labels, ts, value)?;
        }
        Ok(series_ref)
    }

    fn add_fast(&mut self, series_ref: SeriesRef, ts: Timestamp, value: f64) -> TsdbResult<()> {
        self.primary.add_fast(series_ref, ts, value)?;
        for appender in &mut self.secondaries {
            appender.add_fast(series_ref, ts, value)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> TsdbResult<()> {
        let mut err = self.primary.commit().err();
        for appender in &mut self.secondaries {
            match err {
                None => err = appender.commit().err(),
                Some(_) => {
                    if let Err(e) = appender.rollback() {
                        warn!(error = %e, "unable to rollback secondary appender after failed commit");
                    }
                }
            }
        }
        match err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn rollback(&mut self) -> TsdbResult<()> {
        let mut err = self.primary.rollback().err();
        for appender in &mut self.secondaries {
            match (&err, appender.rollback()) {
                (None, Err(e)) => err = Some(e),
                (Some(_), Err(e)) => {
                    warn!(error = %e, "suppressing rollback error of secondary appender");
                }
                _ => {}
            }
        }
        match err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
