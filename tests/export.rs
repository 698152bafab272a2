use glyphmatch::export::class_map;
use glyphmatch::{export_annotations, BBox, Candidate, ExportFormat, ExportPayload};

fn cand(class: &str, bbox: BBox, score: f32) -> Candidate {
    Candidate::with_raw_score(class, "t", bbox, score, score)
}

#[test]
fn yolo_line_is_normalized() {
    let cands = [cand("bolt", BBox::new(10, 20, 30, 40), 0.75)];
    let payload = export_annotations("page.png", (100, 200), &cands, ExportFormat::Yolo).unwrap();
    let ExportPayload::Yolo {
        image,
        classes,
        lines,
    } = payload
    else {
        panic!("expected a yolo payload");
    };
    assert_eq!(image, "page.png");
    assert_eq!(classes.get("bolt"), Some(&0));
    assert_eq!(lines, vec!["0 0.250000 0.200000 0.300000 0.200000 0.750000"]);
}

#[test]
fn class_indices_follow_name_order() {
    let cands = [
        cand("washer", BBox::new(0, 0, 10, 10), 0.9),
        cand("bolt", BBox::new(20, 0, 10, 10), 0.8),
        cand("nut", BBox::new(40, 0, 10, 10), 0.7),
    ];
    let map = class_map(&cands);
    assert_eq!(
        map.into_iter().collect::<Vec<_>>(),
        vec![
            ("bolt".to_owned(), 0),
            ("nut".to_owned(), 1),
            ("washer".to_owned(), 2)
        ]
    );

    let payload = export_annotations("a.png", (100, 100), &cands, ExportFormat::Yolo).unwrap();
    let ExportPayload::Yolo { lines, .. } = payload else {
        panic!("expected a yolo payload");
    };
    let ids: Vec<&str> = lines.iter().map(|l| l.split(' ').next().unwrap()).collect();
    assert_eq!(ids, vec!["2", "0", "1"]);
}

#[test]
fn coco_payload_is_one_based() {
    let cands = [
        cand("nut", BBox::new(1, 2, 3, 4), 0.6),
        cand("bolt", BBox::new(5, 6, 7, 8), 0.9),
    ];
    let payload =
        export_annotations("/data/scans/sheet.jpg", (640, 480), &cands, ExportFormat::Coco)
            .unwrap();
    let ExportPayload::Coco {
        images,
        categories,
        annotations,
    } = &payload
    else {
        panic!("expected a coco payload");
    };
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].file_name, "sheet.jpg");
    assert_eq!((images[0].width, images[0].height), (640, 480));
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].name, "bolt");
    let ids: Vec<usize> = annotations.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(annotations[0].category_id, 1);
    assert_eq!(annotations[1].bbox, [5.0, 6.0, 7.0, 8.0]);
    assert!(annotations.iter().all(|a| a.iscrowd == 0 && a.image_id == 1));

    let json = serde_json::to_string(&payload).unwrap();
    let back: ExportPayload = serde_json::from_str(&json).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn empty_candidate_list_exports_empty_payload() {
    let payload = export_annotations("a.png", (10, 10), &[], ExportFormat::Yolo).unwrap();
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["format"], "yolo");
    assert_eq!(value["lines"].as_array().unwrap().len(), 0);
    assert!(value["classes"].as_object().unwrap().is_empty());
}

#[test]
fn unknown_format_is_an_error() {
    assert!("pascal".parse::<ExportFormat>().is_err());
    assert_eq!("coco".parse::<ExportFormat>().unwrap(), ExportFormat::Coco);
}
