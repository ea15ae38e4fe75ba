//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to be told
//! when each stage of a run starts and finishes. The remote model call
//! dominates wall-clock time, so a front end typically shows a spinner while
//! [`Stage::Extract`] is running.
//!
//! # Example
//!
//! ```rust
//! use edgequake_order2xml::{ExtractionConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{} done in {elapsed_ms}ms", stage.label());
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of the order pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Rasterise pages to PNG.
    Render,
    /// Pull the embedded text layer.
    ExtractText,
    /// Assemble the request segments.
    Compose,
    /// Remote model call.
    Extract,
    /// Well-formedness check.
    Validate,
}

impl Stage {
    /// Short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Render => "Rendering pages",
            Stage::ExtractText => "Extracting text",
            Stage::Compose => "Composing request",
            Stage::Extract => "Extracting order",
            Stage::Validate => "Validating XML",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. [`Stage::Render`] and [`Stage::ExtractText`] run
/// concurrently, so their events may interleave.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once at the end of a successful run.
    ///
    /// `well_formed` is the validator verdict on the returned XML.
    fn on_pipeline_complete(&self, well_formed: bool) {
        let _ = well_formed;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage:?}"));
        }

        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("done:{stage:?}"));
        }

        fn on_pipeline_complete(&self, well_formed: bool) {
            self.events.lock().unwrap().push(format!("complete:{well_formed}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Render);
        cb.on_stage_complete(Stage::Render, 12);
        cb.on_pipeline_complete(false);
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Extract);
        rec.on_stage_complete(Stage::Extract, 900);
        rec.on_pipeline_complete(true);

        let events = rec.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start:Extract", "done:Extract", "complete:true"]);
    }

    #[test]
    fn stage_labels_are_distinct() {
        let labels = [
            Stage::Render,
            Stage::ExtractText,
            Stage::Compose,
            Stage::Extract,
            Stage::Validate,
        ]
        .map(|s| s.label());
        let mut dedup = labels.to_vec();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), labels.len());
    }
}
