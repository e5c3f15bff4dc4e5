//! Session schema definitions
//!
//! Records exchanged through the document store. Field names are camelCase on
//! the wire so any client of the store can read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Collection holding one document per live session
pub const SESSIONS: &str = "liveSessions";

pub fn comments_collection(session_id: &str) -> String {
    format!("{}/{}/comments", SESSIONS, session_id)
}

pub fn reactions_collection(session_id: &str) -> String {
    format!("{}/{}/reactions", SESSIONS, session_id)
}

pub fn signals_collection(session_id: &str) -> String {
    format!("{}/{}/signals", SESSIONS, session_id)
}

// =============================================================================
// Geometry
// =============================================================================

/// A point in normalized slide space (0-100 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 100.0),
            y: self.y.clamp(0.0, 100.0),
        }
    }
}

// =============================================================================
// Drawing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Marker,
    Highlighter,
    Eraser,
}

/// How a stroke is composited over the slide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeMode {
    SourceOver,
    /// Removes previously drawn ink instead of painting over it
    Subtract,
}

impl Tool {
    pub fn composite_mode(self) -> CompositeMode {
        match self {
            Tool::Eraser => CompositeMode::Subtract,
            _ => CompositeMode::SourceOver,
        }
    }
}

/// One freehand annotation stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    pub tool: Tool,
    pub color: String,
    pub stroke_width: f64,
    pub opacity: f64,
    pub points: Vec<Point>,
}

impl Path {
    pub fn new(tool: Tool, color: impl Into<String>, stroke_width: f64, opacity: f64) -> Self {
        Self {
            tool,
            color: color.into(),
            stroke_width,
            opacity: opacity.clamp(0.0, 1.0),
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point.clamped());
    }

    pub fn composite_mode(&self) -> CompositeMode {
        self.tool.composite_mode()
    }
}

/// Committed strokes keyed by slide id
pub type Drawings = BTreeMap<String, Vec<Path>>;

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Canonical unspaced code
    pub code: String,
    pub host_id: String,
    pub host_name: String,
    pub design_ref: String,
    pub is_active: bool,
    #[serde(default)]
    pub active_slide_index: u32,
    #[serde(default)]
    pub viewer_count: i64,
    #[serde(default)]
    pub drawings: Drawings,
    #[serde(default)]
    pub current_path: Option<Path>,
    #[serde(default)]
    pub pointer_position: Option<Point>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Viewer count as shown to users.
    ///
    /// Leaves are only written for joins this client made, so the stored
    /// count stays at or above zero; a negative value written by some other
    /// client still reads as zero.
    pub fn visible_viewer_count(&self) -> u64 {
        self.viewer_count.max(0) as u64
    }

    pub fn slide_drawings(&self, slide_id: &str) -> &[Path] {
        self.drawings
            .get(slide_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

// =============================================================================
// Feedback
// =============================================================================

/// Who is posting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_photo: Option<String>,
}

impl Author {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            user_photo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_photo: Option<String>,
    pub text: String,
    #[serde(default)]
    pub likes: BTreeSet<String>,
    #[serde(default)]
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.contains(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Heart,
    Clap,
    Celebrate,
    Like,
}

impl ReactionType {
    pub fn emoji(self) -> &'static str {
        match self {
            ReactionType::Heart => "\u{2764}\u{fe0f}",
            ReactionType::Clap => "\u{1f44f}",
            ReactionType::Celebrate => "\u{1f389}",
            ReactionType::Like => "\u{1f44d}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub created_at: DateTime<Utc>,
}
