use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, info};

use crate::address::Address;
use crate::config::{TelegramChatConfig, TelegramConfig};
use crate::message::forward::ForwardEnvelope;
use crate::message::{MediaRef, MessageSegment};
use crate::session::{Outbound, Receipt, Scene, SceneFilter, Session, UserData};

/// Telegram caps a text message at 4096 chars.
const MAX_TEXT_LEN: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// One Telegram API call worth of content.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Photo(Vec<u8>),
    Video(MediaRef),
    Voice(MediaRef),
}

/// Collapse segments into API calls: adjacent text and mentions are merged,
/// media goes out one item per call. Forward nodes are prefixed with their
/// sender name since Telegram has no merged-forward message.
fn render_parts(message: &Outbound) -> Vec<Part> {
    let segments: Vec<MessageSegment> = match message {
        Outbound::Message(message) => message.segments().to_vec(),
        Outbound::Forward(envelope) => forward_segments(envelope),
    };

    let mut parts = Vec::new();
    let mut text = String::new();
    let flush = |text: &mut String, parts: &mut Vec<Part>| {
        if !text.trim().is_empty() {
            parts.extend(split_message(text, MAX_TEXT_LEN).into_iter().map(Part::Text));
        }
        text.clear();
    };

    for segment in segments {
        match segment {
            MessageSegment::Text(t) => text.push_str(&t),
            MessageSegment::Mention(user_id) => text.push_str(&format!("@{} ", user_id)),
            MessageSegment::MentionAll => text.push_str("@all "),
            MessageSegment::Image(bytes) => {
                flush(&mut text, &mut parts);
                parts.push(Part::Photo(bytes));
            }
            MessageSegment::Video(media) => {
                flush(&mut text, &mut parts);
                parts.push(Part::Video(media));
            }
            MessageSegment::Voice(media) => {
                flush(&mut text, &mut parts);
                parts.push(Part::Voice(media));
            }
        }
    }
    flush(&mut text, &mut parts);
    parts
}

fn forward_segments(envelope: &ForwardEnvelope) -> Vec<MessageSegment> {
    let mut segments = Vec::new();
    for node in &envelope.nodes {
        segments.push(MessageSegment::Text(format!("{}:\n", node.sender_name)));
        segments.extend(node.content.segments().iter().cloned());
        segments.push(MessageSegment::Text("\n\n".to_string()));
    }
    segments
}

fn input_file(media: MediaRef) -> Result<InputFile> {
    Ok(match media {
        MediaRef::Url(url) => InputFile::url(
            reqwest::Url::parse(&url).with_context(|| format!("Invalid media URL: {}", url))?,
        ),
        MediaRef::File(path) => InputFile::file(path),
        MediaRef::Raw(bytes) => InputFile::memory(bytes),
    })
}

/// The numeric bot id is the part of the token before the colon.
fn self_id_from_token(token: &str) -> String {
    token.split(':').next().unwrap_or_default().to_string()
}

fn chat_scene(chat: &TelegramChatConfig) -> Scene {
    Scene {
        id: chat.id.to_string(),
        kind: chat.kind,
        name: chat.title.clone(),
        parent: None,
    }
}

fn parse_chat_id(id: &str) -> Result<ChatId> {
    let id = id
        .parse::<i64>()
        .with_context(|| format!("Not a Telegram chat id: {}", id))?;
    Ok(ChatId(id))
}

/// A Telegram bot exposed as a broadcast [`Session`].
pub struct TelegramSession {
    self_id: String,
    bot: Bot,
    chats: Vec<TelegramChatConfig>,
}

impl TelegramSession {
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_bot(
            Bot::new(&config.bot_token),
            self_id_from_token(&config.bot_token),
            config.chats.clone(),
        )
    }

    pub fn with_bot(bot: Bot, self_id: String, chats: Vec<TelegramChatConfig>) -> Self {
        info!(
            "Telegram session {} with {} configured chat(s)",
            self_id,
            chats.len()
        );
        Self {
            self_id,
            bot,
            chats,
        }
    }

    async fn send_part(&self, chat_id: ChatId, part: Part) -> Result<Message> {
        let sent = match part {
            Part::Text(text) => self.bot.send_message(chat_id, text).await?,
            Part::Photo(bytes) => {
                self.bot
                    .send_photo(chat_id, InputFile::memory(bytes))
                    .await?
            }
            Part::Video(media) => self.bot.send_video(chat_id, input_file(media)?).await?,
            Part::Voice(media) => self.bot.send_voice(chat_id, input_file(media)?).await?,
        };
        Ok(sent)
    }
}

/// Names the parts already in the chat, since a failed part does not
/// retract them.
fn send_failure_context(chat_id: ChatId, delivered: &Receipt, total: usize) -> String {
    if delivered.message_ids.is_empty() {
        format!("Telegram send to {} failed", chat_id)
    } else {
        format!(
            "Telegram send to {} failed after {} of {} part(s) were delivered (message ids: {})",
            chat_id,
            delivered.message_ids.len(),
            total,
            delivered.message_ids.join(", ")
        )
    }
}

#[async_trait]
impl Session for TelegramSession {
    fn self_id(&self) -> &str {
        &self.self_id
    }

    fn scope(&self) -> Option<String> {
        Some("Telegram".to_string())
    }

    async fn scenes(&self, filter: &SceneFilter) -> Result<Vec<Scene>> {
        Ok(self
            .chats
            .iter()
            .map(chat_scene)
            .filter(|scene| filter.matches(scene))
            .collect())
    }

    async fn members(&self, group_id: &str) -> Result<Vec<UserData>> {
        let chat_id = parse_chat_id(group_id)?;
        // Bots can only list administrators.
        let admins = self
            .bot
            .get_chat_administrators(chat_id)
            .await
            .with_context(|| format!("Failed to list administrators of {}", group_id))?;

        Ok(admins
            .into_iter()
            .map(|member| UserData {
                name: member.user.full_name(),
                card: None,
                user_id: member.user.id.0.to_string(),
                group_id: Some(group_id.to_string()),
                role: Some(if member.kind.is_owner() { "owner" } else { "admin" }.to_string()),
                avatar_url: None,
                join_time: None,
            })
            .collect())
    }

    async fn send(&self, address: &Address, message: &Outbound) -> Result<Receipt> {
        // Telegram chat ids are globally unique; the parent of a channel is
        // not needed to reach it.
        let chat_id = parse_chat_id(address.target_id())?;

        let parts = render_parts(message);
        let total = parts.len();
        let mut receipt = Receipt::default();
        for part in parts {
            let sent = self
                .send_part(chat_id, part)
                .await
                .with_context(|| send_failure_context(chat_id, &receipt, total))?;
            receipt.message_ids.push(sent.id.0.to_string());
        }
        debug!("Telegram delivered {} part(s) to {}", receipt.message_ids.len(), chat_id);
        Ok(receipt)
    }
}
