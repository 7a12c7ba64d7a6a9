//! Test attachments: normalization, classification, timestamp selection

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use xcauto_common::{CommandRunner, CommandSpec, Error, Result};

use crate::bundle::ResultBundle;
use crate::hierarchy::UiHierarchy;

/// Timestamps above this are absolute epoch seconds rather than test-relative
const ABSOLUTE_TIMESTAMP_FLOOR: f64 = 1.0e9;

/// Canonical attachment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAttachment {
    pub name: String,
    pub filename: String,
    pub type_identifier: Option<String>,
    pub payload_id: String,
    /// Seconds since test start
    pub timestamp: Option<f64>,
    pub size: Option<u64>,
}

impl TestAttachment {
    /// Recursively scan an activities dump and normalize every attachment.
    ///
    /// Absolute timestamps are rebased on the earliest activity start time.
    pub fn collect(activities: &Value) -> Vec<TestAttachment> {
        let mut raw = Vec::new();
        let mut earliest: Option<f64> = None;
        scan(activities, &mut raw, &mut earliest);

        raw.into_iter()
            .filter_map(|obj| normalize(obj, earliest))
            .collect()
    }

    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::classify(self.type_identifier.as_deref(), &self.filename)
    }
}

fn scan<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>, earliest: &mut Option<f64>) {
    match value {
        Value::Object(obj) => {
            if let Some(start) = obj.get("startTime").and_then(Value::as_f64) {
                *earliest = Some(earliest.map_or(start, |e| e.min(start)));
            }
            for (key, child) in obj {
                if key == "attachments" {
                    if let Value::Array(items) = child {
                        out.extend(items.iter().filter_map(Value::as_object));
                    }
                } else {
                    scan(child, out, earliest);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                scan(item, out, earliest);
            }
        }
        _ => {}
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn first_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_f64))
}

fn normalize(obj: &Map<String, Value>, earliest: Option<f64>) -> Option<TestAttachment> {
    let Some(payload_id) = first_str(obj, &["payloadId", "payload_uuid", "payloadUUID", "uuid"])
    else {
        debug!("Skipping attachment without payload id: {:?}", obj.keys().collect::<Vec<_>>());
        return None;
    };
    let name = first_str(obj, &["name", "suggestedHumanReadableName", "filename"])
        .unwrap_or_else(|| payload_id.clone());
    let filename = first_str(obj, &["filename", "suggestedHumanReadableName", "name"])
        .unwrap_or_else(|| name.clone());

    let timestamp = first_f64(obj, &["timestamp", "startTime"]).map(|ts| match earliest {
        Some(base) if ts > ABSOLUTE_TIMESTAMP_FLOOR && base <= ts => ts - base,
        _ => ts,
    });

    Some(TestAttachment {
        name,
        filename,
        type_identifier: first_str(obj, &["uniformTypeIdentifier", "typeIdentifier", "uti"]),
        payload_id,
        timestamp,
        size: ["payloadSize", "size"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_u64)),
    })
}

/// Broad attachment category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Text,
    Other,
}

impl AttachmentKind {
    pub fn classify(type_identifier: Option<&str>, filename: &str) -> Self {
        if let Some(uti) = type_identifier.map(str::to_lowercase) {
            if ["png", "jpeg", "image", "heic", "tiff"].iter().any(|t| uti.contains(t)) {
                return Self::Image;
            }
            if ["movie", "mpeg-4", "video", "quicktime"].iter().any(|t| uti.contains(t)) {
                return Self::Video;
            }
            if ["text", "json", "log"].iter().any(|t| uti.contains(t)) {
                return Self::Text;
            }
        }
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "heic" | "gif" | "tiff" => Self::Image,
            "mp4" | "mov" | "m4v" => Self::Video,
            "txt" | "json" | "log" => Self::Text,
            _ => Self::Other,
        }
    }
}

/// How to choose a screenshot when no attachment has a timestamp.
///
/// The default mirrors long-standing behavior: requests past the threshold
/// take the last image, earlier ones the first. It is a guess, not a
/// guarantee, and results picked this way are flagged `heuristic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackPolicy {
    FirstLastThreshold { threshold_secs: f64 },
    First,
    Last,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::FirstLastThreshold {
            threshold_secs: 60.0,
        }
    }
}

impl FallbackPolicy {
    fn pick<'a>(&self, candidates: &[&'a TestAttachment], target: f64) -> Option<&'a TestAttachment> {
        match self {
            Self::First => candidates.first().copied(),
            Self::Last => candidates.last().copied(),
            Self::FirstLastThreshold { threshold_secs } => {
                if target > *threshold_secs {
                    candidates.last().copied()
                } else {
                    candidates.first().copied()
                }
            }
        }
    }
}

/// Chosen attachment with its signed distance from the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub attachment: TestAttachment,
    /// `attachment.timestamp - target`
    pub delta: Option<f64>,
    pub heuristic: bool,
}

/// Closest still image to `target`; first candidate wins ties
pub fn select_closest(
    attachments: &[TestAttachment],
    target: f64,
    policy: &FallbackPolicy,
) -> Option<Selection> {
    let images: Vec<&TestAttachment> = attachments
        .iter()
        .filter(|a| a.kind() == AttachmentKind::Image)
        .collect();

    let mut best: Option<(&TestAttachment, f64)> = None;
    for image in &images {
        let Some(ts) = image.timestamp else { continue };
        let distance = (ts - target).abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((image, distance));
        }
    }

    if let Some((attachment, _)) = best {
        return Some(Selection {
            attachment: attachment.clone(),
            delta: attachment.timestamp.map(|ts| ts - target),
            heuristic: false,
        });
    }

    policy.pick(&images, target).map(|attachment| Selection {
        attachment: attachment.clone(),
        delta: None,
        heuristic: true,
    })
}

/// Single-frame extraction through ffmpeg
#[derive(Clone)]
pub struct FrameExtractor {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl FrameExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: "ffmpeg".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pull one frame at `offset` seconds into `output`
    pub async fn extract(&self, video: &Path, offset: f64, output: &Path) -> Result<()> {
        let spec = CommandSpec::new(&self.program, self.timeout)
            .arg("-y")
            .arg("-ss")
            .arg(format!("{:.3}", offset.max(0.0)))
            .arg("-i")
            .arg(video.to_string_lossy())
            .arg("-frames:v")
            .arg("1")
            .arg(output.to_string_lossy());
        let result = self.runner.run(&spec).await?;

        if !output.exists() {
            let stderr = result.stderr.trim();
            let detail = stderr.lines().last().unwrap_or("no output file produced");
            return Err(Error::external("ffmpeg", format!("frame extraction failed: {}", detail)));
        }
        Ok(())
    }
}

/// Where a screenshot came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScreenshotSource {
    Image,
    VideoFrame { offset: f64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotResult {
    pub path: PathBuf,
    pub source: ScreenshotSource,
    pub attachment: TestAttachment,
    pub delta: Option<f64>,
    pub heuristic: bool,
    pub notes: Vec<String>,
}

impl ScreenshotResult {
    pub fn to_text(&self) -> String {
        let mut out = match &self.source {
            ScreenshotSource::VideoFrame { offset } => format!(
                "Frame at {:.2}s of '{}' saved to {}",
                offset,
                self.attachment.name,
                self.path.display()
            ),
            ScreenshotSource::Image => format!(
                "Screenshot '{}' saved to {}",
                self.attachment.name,
                self.path.display()
            ),
        };
        if let Some(delta) = self.delta {
            out.push_str(&format!(" (delta {:+.2}s)", delta));
        }
        if self.heuristic {
            out.push_str("\nNote: no attachment carries a timestamp; picked by fallback policy.");
        }
        for note in &self.notes {
            out.push_str(&format!("\nNote: {}", note));
        }
        out
    }
}

/// A hierarchy attachment parsed into a navigable tree
#[derive(Debug, Clone)]
pub struct HierarchySnapshot {
    pub attachment: TestAttachment,
    pub path: PathBuf,
    pub hierarchy: UiHierarchy,
}

/// Attachment operations scoped to one opened bundle
pub struct AttachmentResolver<'a> {
    bundle: &'a ResultBundle,
    frames: FrameExtractor,
    policy: FallbackPolicy,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(bundle: &'a ResultBundle, frames: FrameExtractor) -> Self {
        Self {
            bundle,
            frames,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Screenshot of a test closest to `timestamp` seconds after its start
    pub async fn screenshot(&self, query: &str, timestamp: f64) -> Result<ScreenshotResult> {
        let attachments = self.bundle.attachments(query).await?;
        let mut notes = Vec::new();

        if let Some(video) = attachments.iter().find(|a| a.kind() == AttachmentKind::Video) {
            match self.frame_from_video(video, timestamp).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("Video frame extraction failed: {}", e);
                    notes.push(format!("video frame unavailable ({}); using still images", e));
                }
            }
        }

        let selection = select_closest(&attachments, timestamp, &self.policy).ok_or_else(|| {
            Error::NotFound {
                kind: "Screenshot".to_string(),
                id: query.to_string(),
                suggestion: Some("the test recorded no image or video attachments".to_string()),
            }
        })?;

        let path = self
            .bundle
            .export_attachment(&selection.attachment.payload_id, &selection.attachment.filename)
            .await?;

        Ok(ScreenshotResult {
            path,
            source: ScreenshotSource::Image,
            attachment: selection.attachment,
            delta: selection.delta,
            heuristic: selection.heuristic,
            notes,
        })
    }

    async fn frame_from_video(&self, video: &TestAttachment, timestamp: f64) -> Result<ScreenshotResult> {
        let offset = match video.timestamp {
            Some(start) => (timestamp - start).max(0.0),
            None => timestamp.max(0.0),
        };
        let video_path = self
            .bundle
            .export_attachment(&video.payload_id, &video.filename)
            .await?;
        let output = video_path.with_file_name(format!(
            "{}-frame-{:.2}s.png",
            uuid::Uuid::new_v4(),
            offset
        ));
        self.frames.extract(&video_path, offset, &output).await?;

        Ok(ScreenshotResult {
            path: output,
            source: ScreenshotSource::VideoFrame { offset },
            attachment: video.clone(),
            delta: Some(0.0),
            heuristic: false,
            notes: Vec::new(),
        })
    }

    /// Hierarchy dump attached to a test, closest to `timestamp` when given
    pub async fn ui_hierarchy(&self, query: &str, timestamp: Option<f64>) -> Result<HierarchySnapshot> {
        let attachments = self.bundle.attachments(query).await?;
        let dumps: Vec<&TestAttachment> = attachments
            .iter()
            .filter(|a| {
                let name = a.name.to_lowercase();
                a.kind() != AttachmentKind::Image
                    && a.kind() != AttachmentKind::Video
                    && (name.contains("hierarchy") || name.contains("debugdescription"))
            })
            .collect();

        let chosen = match timestamp {
            Some(t) => dumps
                .iter()
                .filter(|a| a.timestamp.is_some())
                .min_by(|a, b| {
                    let da = (a.timestamp.unwrap_or(f64::MAX) - t).abs();
                    let db = (b.timestamp.unwrap_or(f64::MAX) - t).abs();
                    da.total_cmp(&db)
                })
                .or(dumps.first())
                .copied(),
            None => dumps.first().copied(),
        }
        .ok_or_else(|| Error::NotFound {
            kind: "UI hierarchy attachment".to_string(),
            id: query.to_string(),
            suggestion: Some("attach app.debugDescription as a text attachment named 'UI Hierarchy'".to_string()),
        })?;

        let path = self
            .bundle
            .export_attachment(&chosen.payload_id, &chosen.filename)
            .await?;
        let text = tokio::fs::read_to_string(&path).await?;
        Ok(HierarchySnapshot {
            attachment: chosen.clone(),
            path,
            hierarchy: UiHierarchy::parse(&text),
        })
    }
}
