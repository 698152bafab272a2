//! YOLO and COCO annotation payloads for confirmed candidates.
//!
//! Class indices are assigned alphabetically over the class names present
//! in the exported candidates.

use crate::candidate::score::Candidate;
use crate::util::{GlyphError, GlyphResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Supported export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Yolo,
    Coco,
}

impl FromStr for ExportFormat {
    type Err = GlyphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yolo" => Ok(Self::Yolo),
            "coco" => Ok(Self::Coco),
            other => Err(GlyphError::UnsupportedFormat {
                format: other.to_owned(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u32,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: usize,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: usize,
    pub image_id: u32,
    pub category_id: usize,
    pub bbox: [f32; 4],
    pub score: f32,
    pub iscrowd: u8,
}

/// Export payload, tagged by `format` when serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ExportPayload {
    Yolo {
        image: String,
        classes: BTreeMap<String, usize>,
        /// `class cx cy w h score`, normalized, six decimals.
        lines: Vec<String>,
    },
    Coco {
        images: Vec<CocoImage>,
        categories: Vec<CocoCategory>,
        annotations: Vec<CocoAnnotation>,
    },
}

/// Alphabetical class-name -> index map.
pub fn class_map(candidates: &[Candidate]) -> BTreeMap<String, usize> {
    let mut names: Vec<&str> = candidates.iter().map(|c| c.class_name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.to_owned(), idx))
        .collect()
}

fn yolo_line(class_id: usize, c: &Candidate, width: f64, height: f64) -> String {
    let b = c.bbox;
    let cx = (f64::from(b.x) + f64::from(b.w) / 2.0) / width;
    let cy = (f64::from(b.y) + f64::from(b.h) / 2.0) / height;
    let w = f64::from(b.w) / width;
    let h = f64::from(b.h) / height;
    format!(
        "{class_id} {cx:.6} {cy:.6} {w:.6} {h:.6} {:.6}",
        c.final_score()
    )
}

/// Builds the export payload for `candidates` found in an image of
/// `(width, height)` pixels.
pub fn export_annotations(
    image: &str,
    (width, height): (u32, u32),
    candidates: &[Candidate],
    format: ExportFormat,
) -> GlyphResult<ExportPayload> {
    if width == 0 || height == 0 {
        return Err(GlyphError::InvalidDimensions {
            width: width as usize,
            height: height as usize,
        });
    }
    let classes = class_map(candidates);
    let class_id = |c: &Candidate| classes.get(&c.class_name).copied().unwrap_or_default();

    match format {
        ExportFormat::Yolo => {
            let lines = candidates
                .iter()
                .map(|c| yolo_line(class_id(c), c, f64::from(width), f64::from(height)))
                .collect();
            Ok(ExportPayload::Yolo {
                image: image.to_owned(),
                classes,
                lines,
            })
        }
        ExportFormat::Coco => {
            let annotations = candidates
                .iter()
                .enumerate()
                .map(|(idx, c)| CocoAnnotation {
                    id: idx + 1,
                    image_id: 1,
                    category_id: class_id(c),
                    bbox: [c.bbox.x as f32, c.bbox.y as f32, c.bbox.w as f32, c.bbox.h as f32],
                    score: c.final_score(),
                    iscrowd: 0,
                })
                .collect();
            let file_name = Path::new(image)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| image.to_owned());
            let categories = classes
                .iter()
                .map(|(name, &id)| CocoCategory {
                    id,
                    name: name.clone(),
                })
                .collect();
            Ok(ExportPayload::Coco {
                images: vec![CocoImage {
                    id: 1,
                    file_name,
                    width,
                    height,
                }],
                categories,
                annotations,
            })
        }
    }
}
