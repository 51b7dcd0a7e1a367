pub mod forward;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Error;

/// Where a video or voice clip lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum MediaRef {
    Url(String),
    File(PathBuf),
    Raw(Vec<u8>),
}

/// One typed piece of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageSegment {
    Text(String),
    Image(Vec<u8>),
    Video(MediaRef),
    Voice(MediaRef),
    Mention(String),
    MentionAll,
}

impl MessageSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn mention(user_id: impl ToString) -> Self {
        Self::Mention(user_id.to_string())
    }

    /// Short lowercase name of the segment kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Voice(_) => "voice",
            Self::Mention(_) => "mention",
            Self::MentionAll => "mention_all",
        }
    }
}

/// An ordered sequence of segments. Order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnifiedMessage {
    segments: Vec<MessageSegment>,
}

impl UnifiedMessage {
    pub fn new(segments: Vec<MessageSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[MessageSegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<MessageSegment> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: MessageSegment) {
        self.segments.push(segment);
    }

    /// Concatenated text of every `Text` segment.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                MessageSegment::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<MessageSegment>> for UnifiedMessage {
    fn from(segments: Vec<MessageSegment>) -> Self {
        Self::new(segments)
    }
}

impl FromIterator<MessageSegment> for UnifiedMessage {
    fn from_iter<I: IntoIterator<Item = MessageSegment>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A loosely-shaped content item accepted by [`build_message`].
///
/// Each variant is produced by a `From` conversion from the matching source
/// type and is resolved to segments exactly once.
#[derive(Debug, Clone)]
pub enum ContentItem {
    Text(String),
    Integer(i64),
    Float(f64),
    Segment(MessageSegment),
    /// Image file on disk.
    Path(PathBuf),
    /// Raw image bytes.
    Bytes(Vec<u8>),
    /// Decoded image, re-encoded as PNG.
    Picture(DynamicImage),
    /// Untyped input; only strings, numbers and arrays are understood.
    Json(Value),
    /// One level of nesting, flattened in order.
    List(Vec<ContentItem>),
}

impl From<&str> for ContentItem {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ContentItem {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

macro_rules! integer_content {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ContentItem {
                fn from(value: $t) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

integer_content!(i8, i16, i32, i64, u8, u16, u32);

/// Integers wider than `i64` go straight to their decimal text.
macro_rules! wide_integer_content {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ContentItem {
                fn from(value: $t) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

wide_integer_content!(u64, usize, isize, i128, u128);

/// Formatted at `f32` precision so `0.1f32` stays `"0.1"`.
impl From<f32> for ContentItem {
    fn from(value: f32) -> Self {
        Self::Text(format!("{value:?}"))
    }
}

impl From<f64> for ContentItem {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<MessageSegment> for ContentItem {
    fn from(value: MessageSegment) -> Self {
        Self::Segment(value)
    }
}

impl From<PathBuf> for ContentItem {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for ContentItem {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for ContentItem {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<DynamicImage> for ContentItem {
    fn from(value: DynamicImage) -> Self {
        Self::Picture(value)
    }
}

impl From<Value> for ContentItem {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<ContentItem>> for ContentItem {
    fn from(value: Vec<ContentItem>) -> Self {
        Self::List(value)
    }
}

/// Why an item produced no segment.
#[derive(Debug)]
pub enum DropReason {
    /// Path did not exist or could not be read.
    Missing(Error),
    /// Picture could not be encoded.
    Encode(Error),
    /// A list nested inside a list.
    TooDeep,
    /// Loosely-typed value with no text or image meaning.
    Unrecognized,
}

#[derive(Debug)]
pub struct DroppedItem {
    /// Position in the flattened input.
    pub index: usize,
    pub reason: DropReason,
}

/// Items skipped while normalizing.
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub dropped: Vec<DroppedItem>,
}

impl NormalizeReport {
    /// Number of drops that were logged at warning level.
    pub fn warnings(&self) -> usize {
        self.dropped
            .iter()
            .filter(|d| matches!(d.reason, DropReason::Missing(_) | DropReason::Encode(_)))
            .count()
    }
}

/// Normalize content items into a [`UnifiedMessage`].
///
/// Lists are flattened one level. A list found inside a list is dropped, not
/// recursed into.
pub fn build_message<I, T>(items: I) -> UnifiedMessage
where
    I: IntoIterator<Item = T>,
    T: Into<ContentItem>,
{
    build_message_with_report(items).0
}

/// Same as [`build_message`], also returning what was dropped.
pub fn build_message_with_report<I, T>(items: I) -> (UnifiedMessage, NormalizeReport)
where
    I: IntoIterator<Item = T>,
    T: Into<ContentItem>,
{
    let mut flat = Vec::new();
    for item in items {
        match item.into() {
            ContentItem::List(inner) => flat.extend(inner),
            ContentItem::Json(Value::Array(inner)) => {
                flat.extend(inner.into_iter().map(ContentItem::Json))
            }
            other => flat.push(other),
        }
    }

    let mut message = UnifiedMessage::default();
    let mut report = NormalizeReport::default();
    for (index, item) in flat.into_iter().enumerate() {
        match resolve_item(item) {
            Ok(segment) => message.push(segment),
            Err(reason) => {
                match &reason {
                    DropReason::Missing(e) | DropReason::Encode(e) => {
                        warn!(index, "Skipping message item: {}", e)
                    }
                    DropReason::TooDeep => {
                        debug!(index, "Skipping list nested more than one level deep")
                    }
                    DropReason::Unrecognized => {}
                }
                report.dropped.push(DroppedItem { index, reason });
            }
        }
    }

    (message, report)
}

fn resolve_item(item: ContentItem) -> Result<MessageSegment, DropReason> {
    let segment = match item {
        ContentItem::Text(text) => MessageSegment::Text(text),
        ContentItem::Integer(n) => MessageSegment::Text(n.to_string()),
        ContentItem::Float(f) => MessageSegment::Text(format_float(f)),
        ContentItem::Segment(segment) => segment,
        ContentItem::Path(path) => image_from_path(&path).map_err(DropReason::Missing)?,
        ContentItem::Bytes(bytes) => MessageSegment::Image(bytes),
        ContentItem::Picture(picture) => image_from_picture(&picture).map_err(DropReason::Encode)?,
        ContentItem::Json(value) => json_segment(value)?,
        ContentItem::List(_) => return Err(DropReason::TooDeep),
    };
    Ok(segment)
}

fn json_segment(value: Value) -> Result<MessageSegment, DropReason> {
    match value {
        Value::String(s) => Ok(MessageSegment::Text(s)),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => Ok(MessageSegment::Text(format_float(f))),
            None => Ok(MessageSegment::Text(n.to_string())),
        },
        Value::Number(n) => Ok(MessageSegment::Text(n.to_string())),
        Value::Array(_) => Err(DropReason::TooDeep),
        _ => Err(DropReason::Unrecognized),
    }
}

/// Floats always carry a decimal point (`1.0`, not `1`).
fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// Load an image file into an `Image` segment.
pub fn image_from_path(path: &Path) -> crate::error::Result<MessageSegment> {
    if !path.exists() {
        return Err(Error::MissingContentSource {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path)?;
    Ok(MessageSegment::Image(bytes))
}

/// Encode a decoded picture as PNG.
pub fn image_from_picture(picture: &DynamicImage) -> crate::error::Result<MessageSegment> {
    let mut buf = Cursor::new(Vec::new());
    picture.write_to(&mut buf, ImageFormat::Png)?;
    Ok(MessageSegment::Image(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(message: &UnifiedMessage) -> Vec<&'static str> {
        message.segments().iter().map(MessageSegment::kind).collect()
    }

    #[test]
    fn test_text_number_and_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let message = build_message(vec![
            ContentItem::from("x"),
            ContentItem::from(1),
            ContentItem::from(path),
        ]);

        assert_eq!(kinds(&message), vec!["text", "text", "image"]);
        assert_eq!(message.segments()[1], MessageSegment::text("1"));
        assert_eq!(
            message.segments()[2],
            MessageSegment::Image(b"\x89PNG fake".to_vec())
        );
    }

    #[test]
    fn test_missing_path_is_dropped_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");

        let (message, report) = build_message_with_report([missing]);

        assert!(message.is_empty());
        assert_eq!(report.warnings(), 1);
        assert!(matches!(
            report.dropped[0].reason,
            DropReason::Missing(Error::MissingContentSource { .. })
        ));
    }

    #[test]
    fn test_missing_path_does_not_abort_batch() {
        let message = build_message(vec![
            ContentItem::from("before"),
            ContentItem::from(PathBuf::from("/definitely/not/here.png")),
            ContentItem::from("after"),
        ]);
        assert_eq!(message.plain_text(), "beforeafter");
    }

    #[test]
    fn test_float_keeps_decimal_point() {
        let message = build_message([1.0f64, 2.5]);
        assert_eq!(message.plain_text(), "1.02.5");
    }

    #[test]
    fn test_f32_keeps_its_own_precision() {
        let message = build_message([0.1f32, 2.0]);
        assert_eq!(message.plain_text(), "0.12.0");
    }

    #[test]
    fn test_wide_integers_keep_every_digit() {
        let message = build_message(vec![
            ContentItem::from(u64::MAX),
            ContentItem::from(" "),
            ContentItem::from(7usize),
            ContentItem::from(" "),
            ContentItem::from(json!(18446744073709551615u64)),
            ContentItem::from(" "),
            ContentItem::from(json!(-5)),
        ]);
        assert_eq!(
            message.plain_text(),
            "18446744073709551615 7 18446744073709551615 -5"
        );
    }

    #[test]
    fn test_one_level_of_nesting_is_flattened_in_order() {
        let message = build_message(vec![
            ContentItem::from("a"),
            ContentItem::List(vec!["b".into(), "c".into()]),
            ContentItem::from("d"),
        ]);
        assert_eq!(message.plain_text(), "abcd");
    }

    #[test]
    fn test_deeper_nesting_is_dropped() {
        let (message, report) = build_message_with_report(vec![ContentItem::List(vec![
            "a".into(),
            ContentItem::List(vec!["hidden".into()]),
        ])]);
        assert_eq!(message.plain_text(), "a");
        assert!(matches!(report.dropped[0].reason, DropReason::TooDeep));
        assert_eq!(report.warnings(), 0);
    }

    #[test]
    fn test_segments_pass_through_unchanged() {
        let message = build_message(vec![
            MessageSegment::MentionAll,
            MessageSegment::mention(42),
            MessageSegment::Video(MediaRef::Url("https://example.com/v.mp4".into())),
        ]);
        assert_eq!(kinds(&message), vec!["mention_all", "mention", "video"]);
        assert_eq!(message.segments()[1], MessageSegment::Mention("42".into()));
    }

    #[test]
    fn test_raw_bytes_and_picture_become_images() {
        let picture = DynamicImage::new_rgb8(2, 2);
        let message = build_message(vec![
            ContentItem::from(vec![1u8, 2, 3]),
            ContentItem::from(picture),
        ]);
        assert_eq!(kinds(&message), vec!["image", "image"]);
        match &message.segments()[1] {
            MessageSegment::Image(bytes) => assert!(bytes.starts_with(b"\x89PNG")),
            other => panic!("unexpected segment: {:?}", other),
        }
    }

    #[test]
    fn test_json_values_are_lenient() {
        let (message, report) = build_message_with_report([
            json!("hi"),
            json!(3),
            json!({"unknown": true}),
            json!(null),
            json!(["x", 0.5]),
        ]);
        assert_eq!(message.plain_text(), "hi3x0.5");
        assert_eq!(report.dropped.len(), 2);
        assert_eq!(report.warnings(), 0);
    }

    #[test]
    fn test_single_item_is_accepted() {
        let message = build_message(["only"]);
        assert_eq!(message.len(), 1);
    }
}
