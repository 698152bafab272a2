//! glyphmatch proposes bounding boxes for recurring symbols in an image.
//!
//! Templates are prepared once into a [`TemplateSet`]. A [`Matcher`] then
//! searches around a clicked point with multi-scale normalized correlation
//! over edge maps (falling back to binary maps), or with a two-stage
//! line-art reranker. Results can be quality-scored, suppressed, filtered
//! against confirmed annotations and exported as YOLO or COCO payloads.
//! Whole-image detection lives in [`detect`].
//!
//! Parallel evaluation is available behind the `rayon` feature and
//! structured logging behind the `tracing` feature.

mod trace;

pub mod bank;
pub mod candidate;
pub mod detect;
pub mod export;
pub mod geometry;
pub mod image;
pub mod kernel;
pub mod search;
pub mod template;
pub mod util;

pub use bank::PreparedTemplates;
pub use candidate::exclude::{
    exclude_confirmed, filter_by_size, BoxWithScore, ConfirmedBox, ExcludeMode, ExclusionConfig,
    ToBoxWithScore,
};
pub use candidate::nms::{nms, nms_indices};
pub use candidate::score::{score_candidates, Candidate, QualityScores, ScoringWeights};
pub use candidate::topk::{Peak, TopK};
pub use detect::{
    detect_exhaustive, detect_tiled, Detection, DetectionReport, ExhaustiveConfig, TiledConfig,
};
pub use export::{export_annotations, ExportFormat, ExportPayload};
pub use geometry::{clip_roi, iou, BBox, Roi};
pub use image::ImageView;
pub use kernel::{Kernel, ScanParams};
pub use search::{
    match_templates, LineArtConfig, MatchConfig, MatchMode, MatchResult, Matcher, PointQuery,
};
pub use template::{
    prepare_template, PrepareConfig, TemplateId, TemplateImage, TemplateSet, TemplateSetBuilder,
};
pub use util::{GlyphError, GlyphResult};
