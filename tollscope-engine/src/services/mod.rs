//! Core analysis services

pub mod avi_evaluation;
pub mod confidence_dictionary;
pub mod mismatch_detector;
pub mod plate_expander;
pub mod related_resolver;
pub mod trip_builder;
pub mod trip_segmenter;

pub use avi_evaluation::{AviEvaluator, CapSummary, TrialResult};
pub use confidence_dictionary::{ConfidenceDictionary, DictionaryEntry, DictionaryMode};
pub use mismatch_detector::{AnnotatedRecord, MismatchDetector, MismatchFlag, MismatchReport};
pub use related_resolver::{ClosureSet, IdentityIndex, RelatedTransactionResolver};
pub use trip_builder::{summarize_trips, ResidualPool, TripBuildOutput, TripBuilder, TripSummary};
pub use trip_segmenter::{SegmentedRecord, TripSegmenter, TripSequence, UNKNOWN_ZONE};
