//! Greedy IoU non-maximum suppression.

use crate::candidate::exclude::{BoxWithScore, ToBoxWithScore};

/// Default IoU above which a lower-scoring box is suppressed.
pub const DEFAULT_NMS_IOU: f32 = 0.3;

/// Indices of the boxes kept by greedy suppression, best first.
///
/// Boxes are visited by descending score (equal scores keep their input
/// order) and kept if their IoU with every previously kept box is below
/// `iou_threshold`.
pub fn nms_indices(boxes: &[BoxWithScore], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| boxes[b].score.total_cmp(&boxes[a].score));

    let mut kept: Vec<usize> = Vec::new();
    'outer: for idx in order {
        for &kept_idx in kept.iter() {
            if boxes[idx].bbox.iou(&boxes[kept_idx].bbox) >= iou_threshold {
                continue 'outer;
            }
        }
        kept.push(idx);
    }
    kept
}

/// Greedy suppression over any box-with-score items, best first.
pub fn nms<T: ToBoxWithScore + Clone>(items: &[T], iou_threshold: f32) -> Vec<T> {
    let boxes: Vec<BoxWithScore> = items.iter().map(ToBoxWithScore::box_with_score).collect();
    nms_indices(&boxes, iou_threshold)
        .into_iter()
        .map(|idx| items[idx].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn b(x: i32, y: i32, w: i32, h: i32, score: f32) -> BoxWithScore {
        BoxWithScore::new(BBox::new(x, y, w, h), score)
    }

    #[test]
    fn overlapping_lower_score_is_dropped() {
        let boxes = [b(1, 1, 10, 10, 0.8), b(0, 0, 10, 10, 0.9)];
        assert_eq!(nms_indices(&boxes, 0.3), vec![1]);
    }

    #[test]
    fn disjoint_boxes_survive_in_score_order() {
        let boxes = [b(0, 0, 5, 5, 0.2), b(20, 20, 5, 5, 0.7), b(40, 0, 5, 5, 0.5)];
        assert_eq!(nms_indices(&boxes, 0.3), vec![1, 2, 0]);
    }

    #[test]
    fn ties_keep_input_order() {
        let boxes = [b(0, 0, 10, 10, 0.5), b(0, 0, 10, 10, 0.5)];
        assert_eq!(nms_indices(&boxes, 0.3), vec![0]);
    }

    #[test]
    fn empty_input() {
        assert!(nms_indices(&[], 0.3).is_empty());
    }
}
