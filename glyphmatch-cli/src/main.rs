use clap::Parser;
use glyphmatch::image::io::decode_image;
use glyphmatch::image::ops::to_gray;
use glyphmatch::search::{apply_vertical_padding, refine_match_bboxes, PaddingConfig, REFINE_PAD};
use glyphmatch::{
    detect_exhaustive, detect_tiled, BBox, ConfirmedBox, DetectionReport, ExcludeMode,
    ExclusionConfig, ExhaustiveConfig, ExportFormat, LineArtConfig, MatchConfig, MatchResult,
    Matcher, PointQuery, TemplateSet, TemplateSetBuilder, TiledConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

const TEMPLATE_EXTS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Parser, Debug)]
#[command(author, version, about = "glyphmatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeConfig {
    #[default]
    Point,
    Tiled,
    Exhaustive,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PointConfigJson {
    x: f32,
    y: f32,
    score_threshold: f32,
    iou_threshold: f32,
    top_k: usize,
    line_art: bool,
    refine: bool,
    padding: bool,
}

impl Default for PointConfigJson {
    fn default() -> Self {
        let query = PointQuery::default();
        Self {
            x: query.x,
            y: query.y,
            score_threshold: query.score_threshold,
            iou_threshold: query.iou_threshold,
            top_k: query.top_k,
            line_art: query.line_art,
            refine: false,
            padding: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchConfigJson {
    roi_size: usize,
    scale_min: f32,
    scale_max: f32,
    scale_steps: usize,
    parallel: bool,
}

impl Default for MatchConfigJson {
    fn default() -> Self {
        let cfg = MatchConfig::default();
        Self {
            roi_size: cfg.roi_size,
            scale_min: cfg.scale_min,
            scale_max: cfg.scale_max,
            scale_steps: cfg.scale_steps,
            parallel: cfg.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LineArtConfigJson {
    rerank_top_k: usize,
    tie_score_eps: f32,
    tie_iou: f32,
}

impl Default for LineArtConfigJson {
    fn default() -> Self {
        let cfg = LineArtConfig::default();
        Self {
            rerank_top_k: cfg.rerank_top_k,
            tie_score_eps: cfg.tie_score_eps,
            tie_iou: cfg.tie_iou,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExclusionConfigJson {
    mode: ExcludeMode,
    center_check: bool,
    any_overlap: bool,
    iou_threshold: f32,
}

impl Default for ExclusionConfigJson {
    fn default() -> Self {
        let cfg = ExclusionConfig::default();
        Self {
            mode: cfg.mode,
            center_check: cfg.center_check,
            any_overlap: cfg.any_overlap,
            iou_threshold: cfg.iou_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TiledConfigJson {
    tile_size: usize,
    stride: Option<usize>,
    max_per_tile: usize,
    score_threshold: f32,
}

impl Default for TiledConfigJson {
    fn default() -> Self {
        let cfg = TiledConfig::default();
        Self {
            tile_size: cfg.tile_size,
            stride: cfg.stride,
            max_per_tile: cfg.max_per_tile,
            score_threshold: cfg.score_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExhaustiveConfigJson {
    match_threshold: f32,
    overlap_min: f32,
    nms_iou: f32,
}

impl Default for ExhaustiveConfigJson {
    fn default() -> Self {
        let cfg = ExhaustiveConfig::default();
        Self {
            match_threshold: cfg.match_threshold,
            overlap_min: cfg.overlap_min,
            nms_iou: cfg.nms_iou,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmedJson {
    bbox: BBox,
    #[serde(default)]
    class_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    image_path: String,
    templates_root: String,
    project: String,
    output_path: Option<String>,
    mode: ModeConfig,
    point: PointConfigJson,
    confirmed: Vec<ConfirmedJson>,
    #[serde(rename = "match")]
    match_cfg: MatchConfigJson,
    line_art: LineArtConfigJson,
    exclusion: ExclusionConfigJson,
    padding: PaddingConfig,
    tiled: TiledConfigJson,
    exhaustive: ExhaustiveConfigJson,
    export_format: ExportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_path: String::new(),
            templates_root: String::new(),
            project: "default".to_string(),
            output_path: None,
            mode: ModeConfig::default(),
            point: PointConfigJson::default(),
            confirmed: Vec::new(),
            match_cfg: MatchConfigJson::default(),
            line_art: LineArtConfigJson::default(),
            exclusion: ExclusionConfigJson::default(),
            padding: PaddingConfig::default(),
            tiled: TiledConfigJson::default(),
            exhaustive: ExhaustiveConfigJson::default(),
            export_format: ExportFormat::Yolo,
        }
    }
}

#[derive(Debug, Serialize)]
struct PointOutput {
    results: Vec<MatchResult>,
}

/// Subdirectories of `dir`, sorted by name.
fn sub_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_class_dir(
    project: &str,
    class_dir: &Path,
    builder: &mut TemplateSetBuilder,
) -> std::io::Result<()> {
    let class_name = file_name(class_dir);
    let mut files = Vec::new();
    for entry in fs::read_dir(class_dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| TEMPLATE_EXTS.contains(&ext.as_str()));
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    for path in files {
        let bytes = fs::read(&path)?;
        builder.add_encoded(project, &class_name, &file_name(&path), &bytes);
    }
    Ok(())
}

/// Loads `root/<class>/<file>` or, when class directories themselves hold
/// directories, `root/<project>/<class>/<file>`. The flat layout goes into
/// the `default` project.
fn scan_templates(root: &Path) -> std::io::Result<TemplateSet> {
    let mut builder = TemplateSetBuilder::new();
    let top = sub_dirs(root)?;
    let mut nested = false;
    for dir in &top {
        if !sub_dirs(dir)?.is_empty() {
            nested = true;
            break;
        }
    }
    for dir in &top {
        if nested {
            let project = file_name(dir);
            for class_dir in sub_dirs(dir)? {
                load_class_dir(&project, &class_dir, &mut builder)?;
            }
        } else {
            load_class_dir("default", dir, &mut builder)?;
        }
    }
    if builder.skipped() > 0 {
        tracing::warn!(skipped = builder.skipped(), "some templates could not be prepared");
    }
    Ok(builder.build())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("glyphmatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.image_path.is_empty() || config.templates_root.is_empty() {
        return Err("image_path and templates_root must be set in the config".into());
    }
    if config.point.top_k == 0 {
        return Err("point.top_k must be at least 1".into());
    }

    let image = decode_image(&fs::read(&config.image_path)?)?;
    let gray = to_gray(&image);
    let templates = scan_templates(Path::new(&config.templates_root))?;
    let classes = templates
        .project(&config.project)
        .ok_or_else(|| format!("unknown project: {}", config.project))?;

    let match_cfg = MatchConfig {
        roi_size: config.match_cfg.roi_size,
        scale_min: config.match_cfg.scale_min,
        scale_max: config.match_cfg.scale_max,
        scale_steps: config.match_cfg.scale_steps,
        parallel: config.match_cfg.parallel,
    };
    let matcher = Matcher::for_project(&templates, &config.project)?
        .with_config(match_cfg)
        .with_line_art(LineArtConfig {
            rerank_top_k: config.line_art.rerank_top_k,
            tie_score_eps: config.line_art.tie_score_eps,
            tie_iou: config.line_art.tie_iou,
        })
        .with_exclusion(ExclusionConfig {
            mode: config.exclusion.mode,
            center_check: config.exclusion.center_check,
            any_overlap: config.exclusion.any_overlap,
            iou_threshold: config.exclusion.iou_threshold,
        });

    let json = match config.mode {
        ModeConfig::Point => {
            let point = &config.point;
            let query = PointQuery {
                x: point.x,
                y: point.y,
                score_threshold: point.score_threshold,
                iou_threshold: point.iou_threshold,
                top_k: point.top_k,
                line_art: point.line_art,
            };
            let confirmed: Vec<ConfirmedBox> = config
                .confirmed
                .iter()
                .map(|c| ConfirmedBox::new(c.bbox, c.class_name.as_deref()))
                .collect();
            let mut results = matcher.detect_point(&gray, &query, &confirmed);
            if point.refine {
                results = refine_match_bboxes(&gray, &results, Some((point.x, point.y)), REFINE_PAD);
            }
            if point.padding {
                results = apply_vertical_padding(&results, gray.height() as i32, &config.padding);
            }
            serde_json::to_string_pretty(&PointOutput { results })?
        }
        ModeConfig::Tiled => {
            let tiled = TiledConfig {
                tile_size: config.tiled.tile_size,
                stride: config.tiled.stride,
                max_per_tile: config.tiled.max_per_tile,
                score_threshold: config.tiled.score_threshold,
                parallel: match_cfg.parallel,
                ..TiledConfig::default()
            };
            let detection = detect_tiled(&gray, &matcher, &tiled);
            let report = DetectionReport::new(
                &config.image_path,
                gray.dimensions(),
                tiled.score_threshold,
                detection,
                config.export_format,
            )?;
            serde_json::to_string_pretty(&report)?
        }
        ModeConfig::Exhaustive => {
            let exhaustive = ExhaustiveConfig {
                match_threshold: config.exhaustive.match_threshold,
                scale_min: match_cfg.scale_min,
                scale_max: match_cfg.scale_max,
                scale_steps: match_cfg.scale_steps,
                overlap_min: config.exhaustive.overlap_min,
                nms_iou: config.exhaustive.nms_iou,
                parallel: match_cfg.parallel,
            };
            let detection = detect_exhaustive(&gray, classes.values().flatten(), &exhaustive);
            let report = DetectionReport::new(
                &config.image_path,
                gray.dimensions(),
                exhaustive.match_threshold,
                detection,
                config.export_format,
            )?;
            serde_json::to_string_pretty(&report)?
        }
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
