pub mod annotation;
pub mod color_utils;
pub mod config;
pub mod detection_obj;
pub mod error;
pub mod export;
pub mod geometry;
pub mod image_input;
pub mod lesion_analysis;
pub mod lesion_processing;
pub mod mask;
pub mod metadata;
pub mod output_manager;
pub mod severity;

pub use detection_obj::Detection;
pub use error::AnalysisError;
pub use lesion_analysis::{analyze, LeafLesionReport, LesionAnalysis, LesionAnalyzer};
pub use severity::{classify, SeverityTier};
