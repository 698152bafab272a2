//! Candidate ranking, suppression and filtering.
//!
//! Includes Top-K peak collection, the multi-factor quality scorer, greedy
//! IoU suppression and the confirmed-annotation exclusion filter.

pub mod exclude;
pub mod nms;
pub mod score;
pub(crate) mod topk;
