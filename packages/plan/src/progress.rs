//! Per-county progress for the parcel join.
//!
//! The join counts work in counties: [`ProgressCallback::set_total`]
//! receives the number of configured counties, each finished county
//! advances the count by one, and the message names the county just
//! joined. Rendering is left to the caller.

use std::sync::Arc;

/// Receives county-level progress from the join.
///
/// Called from blocking join tasks, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of counties about to be joined.
    fn set_total(&self, counties: u64);

    /// `counties` more counties have finished.
    fn inc(&self, counties: u64);

    /// Names the most recently finished county.
    fn set_message(&self, msg: String);

    /// Every county is done; `msg` summarizes the joined row count.
    fn finish(&self, msg: String);
}

/// Discards progress. Used by tests and library callers without a
/// terminal.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _: u64) {}
    fn inc(&self, _: u64) {}
    fn set_message(&self, _: String) {}
    fn finish(&self, _: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, counties: u64) {
            self.events.lock().unwrap().push(format!("total {counties}"));
        }
        fn inc(&self, counties: u64) {
            self.events.lock().unwrap().push(format!("inc {counties}"));
        }
        fn set_message(&self, msg: String) {
            self.events.lock().unwrap().push(msg);
        }
        fn finish(&self, msg: String) {
            self.events.lock().unwrap().push(format!("finish {msg}"));
        }
    }

    #[tokio::test]
    async fn join_reports_one_step_per_county() {
        use crate::join::{ZoneLayer, join_counties};
        use crate::paths::DataPaths;
        use crate::plans::{PlanLayer, PlanTable};
        use badata_plan_models::RegionConfig;

        let recorder = Arc::new(Recorder::default());
        let progress: Arc<dyn ProgressCallback> = recorder.clone();

        let zones = ZoneLayer::from_features(Vec::new(), "tazs.json").unwrap();
        let plans = PlanLayer::new(PlanTable::default());

        let rows = join_counties(
            &RegionConfig::default(),
            &DataPaths::new("/nonexistent/badata"),
            Arc::new(zones),
            Arc::new(plans),
            progress,
        )
        .await
        .unwrap();

        assert!(rows.is_empty());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            ["total 0", "finish joined 0 parcels"]
        );
    }
}
