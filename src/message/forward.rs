use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{build_message, ContentItem, MediaRef, MessageSegment, UnifiedMessage};

/// One attributed sub-message of a forward envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardNode {
    pub sender_id: String,
    pub sender_name: String,
    pub content: UnifiedMessage,
}

/// A merged message made of independently attributed nodes, delivered as one
/// unit. Transports receive it opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    pub nodes: Vec<ForwardNode>,
}

impl ForwardEnvelope {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render as OneBot v11 `node` objects for `send_group_forward_msg`.
    pub fn to_onebot_nodes(&self) -> Vec<Value> {
        self.nodes
            .iter()
            .map(|node| {
                onebot_node(
                    &node.sender_id,
                    &node.sender_name,
                    Value::Array(
                        node.content
                            .segments()
                            .iter()
                            .map(onebot_segment)
                            .collect(),
                    ),
                )
            })
            .collect()
    }
}

/// Build a forward envelope where every node is attributed to the same
/// sender. Each entry of `node_contents` is normalized on its own; order is
/// kept and identical nodes are not merged.
pub fn build_forward_batch<N, I, T>(
    node_contents: N,
    sender_id: impl ToString,
    sender_name: impl Into<String>,
) -> ForwardEnvelope
where
    N: IntoIterator<Item = I>,
    I: IntoIterator<Item = T>,
    T: Into<ContentItem>,
{
    let sender_id = sender_id.to_string();
    let sender_name = sender_name.into();
    let nodes = node_contents
        .into_iter()
        .map(|content| ForwardNode {
            sender_id: sender_id.clone(),
            sender_name: sender_name.clone(),
            content: build_message(content),
        })
        .collect();
    ForwardEnvelope { nodes }
}

/// Wrap already-serialized node contents as OneBot `node` objects, without
/// normalizing them.
pub fn custom_forward_nodes<I>(contents: I, uin: impl ToString, name: &str) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let uin = uin.to_string();
    contents
        .into_iter()
        .map(|content| onebot_node(&uin, name, content))
        .collect()
}

fn onebot_node(uin: &str, name: &str, content: Value) -> Value {
    json!({
        "type": "node",
        "data": {
            "name": name,
            "uin": uin,
            "content": content,
        },
    })
}

fn onebot_segment(segment: &MessageSegment) -> Value {
    match segment {
        MessageSegment::Text(text) => json!({"type": "text", "data": {"text": text}}),
        MessageSegment::Image(bytes) => json!({"type": "image", "data": {"file": base64_file(bytes)}}),
        MessageSegment::Video(media) => json!({"type": "video", "data": {"file": onebot_file(media)}}),
        MessageSegment::Voice(media) => json!({"type": "record", "data": {"file": onebot_file(media)}}),
        MessageSegment::Mention(user_id) => json!({"type": "at", "data": {"qq": user_id}}),
        MessageSegment::MentionAll => json!({"type": "at", "data": {"qq": "all"}}),
    }
}

fn onebot_file(media: &MediaRef) -> String {
    match media {
        MediaRef::Url(url) => url.clone(),
        MediaRef::File(path) => format!("file://{}", path.display()),
        MediaRef::Raw(bytes) => base64_file(bytes),
    }
}

fn base64_file(bytes: &[u8]) -> String {
    format!(
        "base64://{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_nodes_keep_order_and_duplicates() {
        let envelope = build_forward_batch(
            vec![vec!["same"], vec!["same"], vec!["last"]],
            10001,
            "Helper",
        );

        assert_eq!(envelope.nodes.len(), 3);
        assert_eq!(envelope.nodes[0], envelope.nodes[1]);
        assert_eq!(envelope.nodes[2].content.plain_text(), "last");
        for node in &envelope.nodes {
            assert_eq!(node.sender_id, "10001");
            assert_eq!(node.sender_name, "Helper");
        }
    }

    #[test]
    fn test_node_paths_resolve_to_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let envelope = build_forward_batch(
            vec![
                vec![ContentItem::from("caption"), ContentItem::from(path)],
                vec![ContentItem::from(PathBuf::from("/missing/b.jpg"))],
            ],
            "1",
            "bot",
        );

        let first = envelope.nodes[0].content.segments();
        assert_eq!(first[1], MessageSegment::Image(b"jpeg".to_vec()));
        assert!(envelope.nodes[1].content.is_empty());
    }

    #[test]
    fn test_onebot_rendering() {
        let envelope = build_forward_batch(
            vec![vec![
                ContentItem::from("hi"),
                ContentItem::from(MessageSegment::MentionAll),
                ContentItem::from(vec![0u8, 1]),
            ]],
            "42",
            "bot",
        );

        let nodes = envelope.to_onebot_nodes();
        assert_eq!(nodes[0]["type"], "node");
        assert_eq!(nodes[0]["data"]["uin"], "42");
        let content = &nodes[0]["data"]["content"];
        assert_eq!(content[0]["data"]["text"], "hi");
        assert_eq!(content[1]["data"]["qq"], "all");
        assert_eq!(content[2]["data"]["file"], "base64://AAE=");
    }

    #[test]
    fn test_custom_forward_nodes_wrap_raw_content() {
        let nodes = custom_forward_nodes(vec![json!("plain"), json!([{"type": "face"}])], 7, "n");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["data"]["content"], "plain");
        assert_eq!(nodes[1]["data"]["uin"], "7");
        assert_eq!(nodes[1]["data"]["name"], "n");
    }
}
