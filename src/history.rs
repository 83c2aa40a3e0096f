//! Backward history walk over an inclusive time window.
//!
//! Telegram returns history newest first. [`collect_range`] pages backward
//! with an offset cursor, keeps messages inside the window and stops as soon
//! as the walk passes the window start, the history is exhausted or the
//! cursor stops moving.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use grammers_client::Client;
use grammers_tl_types as tl;
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics;
use crate::range::TimeRange;

/// What kind of attachment a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    /// Document with an `image/*` mime type
    ImageDocument,
    Other,
}

impl MediaKind {
    pub fn is_image(&self) -> bool {
        matches!(self, MediaKind::Photo | MediaKind::ImageDocument)
    }
}

/// A history entry reduced to what the collector writes out.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub sender: Option<String>,
    pub text: String,
    pub media: Option<MediaKind>,
    /// Downloadable location of an image attachment.
    pub attachment: Option<tl::enums::InputFileLocation>,
    /// Service messages (joins, pins, title changes) are never written.
    pub service: bool,
}

impl HistoryMessage {
    pub fn new(id: i32, date: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id,
            date,
            sender: None,
            text: text.into(),
            media: None,
            attachment: None,
            service: false,
        }
    }

    pub fn has_image(&self) -> bool {
        self.media.map(|m| m.is_image()).unwrap_or(false)
    }
}

/// A source of history pages.
#[allow(async_fn_in_trait)]
pub trait HistorySource {
    /// Up to `limit` messages with ids below `offset_id`, newest first.
    /// `offset_id == 0` starts from the newest message.
    async fn fetch_page(&mut self, offset_id: i32, limit: usize) -> Result<Vec<HistoryMessage>>;

    /// Bytes of an attachment from [`HistoryMessage::attachment`].
    async fn download(&mut self, _location: &tl::enums::InputFileLocation) -> Result<Vec<u8>> {
        Err(Error::TelegramError(
            "this history source cannot download attachments".to_string(),
        ))
    }
}

/// Running totals reported after every page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageProgress {
    pub pages: usize,
    pub scanned: usize,
    pub collected: usize,
}

/// Walk history backward and return every message inside `range`,
/// sorted by `(date, id)`.
pub async fn collect_range<S, F>(
    source: &mut S,
    range: &TimeRange,
    page_size: usize,
    mut on_page: F,
) -> Result<Vec<HistoryMessage>>
where
    S: HistorySource,
    F: FnMut(&PageProgress),
{
    let page_size = page_size.max(1);
    let mut offset_id = 0;
    let mut progress = PageProgress::default();
    let mut collected = Vec::new();
    let mut seen = HashSet::new();

    loop {
        let page = source.fetch_page(offset_id, page_size).await?;
        let Some(last_id) = page.last().map(|m| m.id) else {
            debug!(offset_id, "history exhausted");
            break;
        };
        if offset_id != 0 && last_id >= offset_id {
            debug!(offset_id, last_id, "history cursor did not advance");
            break;
        }

        progress.pages += 1;
        metrics::record_history_page();

        let mut reached_start = false;
        for message in &page {
            progress.scanned += 1;
            if range.is_before_start(message.date) {
                reached_start = true;
                break;
            }
            if message.service || !range.contains(message.date) || !seen.insert(message.id) {
                continue;
            }
            collected.push(message.clone());
        }
        progress.collected = collected.len();
        on_page(&progress);

        if reached_start {
            debug!(offset_id, "reached range start");
            break;
        }

        offset_id = last_id;
    }

    collected.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    Ok(collected)
}

/// [`HistorySource`] backed by `messages.getHistory`.
pub struct TelegramHistory<'a> {
    client: &'a Client,
    peer: tl::enums::InputPeer,
}

impl<'a> TelegramHistory<'a> {
    pub fn new(client: &'a Client, peer: tl::enums::InputPeer) -> Self {
        Self { client, peer }
    }

    /// Fetch a single message by id.
    pub async fn fetch_one(&mut self, id: i32) -> Result<Option<HistoryMessage>> {
        let page = self.fetch_page(id.saturating_add(1), 1).await?;
        Ok(page.into_iter().find(|m| m.id == id))
    }
}

impl HistorySource for TelegramHistory<'_> {
    async fn fetch_page(&mut self, offset_id: i32, limit: usize) -> Result<Vec<HistoryMessage>> {
        let request = tl::functions::messages::GetHistory {
            peer: self.peer.clone(),
            offset_id,
            offset_date: 0,
            add_offset: 0,
            limit: limit as i32,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };

        let (messages, chats, users) = match self.client.invoke(&request).await? {
            tl::enums::messages::Messages::Messages(m) => (m.messages, m.chats, m.users),
            tl::enums::messages::Messages::Slice(m) => (m.messages, m.chats, m.users),
            tl::enums::messages::Messages::ChannelMessages(m) => (m.messages, m.chats, m.users),
            tl::enums::messages::Messages::NotModified(_) => return Ok(Vec::new()),
        };

        let names = SenderNames::new(&users, &chats);
        Ok(messages
            .iter()
            .filter_map(|raw| convert_message(raw, &names))
            .collect())
    }

    async fn download(&mut self, location: &tl::enums::InputFileLocation) -> Result<Vec<u8>> {
        download_attachment(self.client, location).await
    }
}

/// Display names of the users and chats attached to a history response.
struct SenderNames {
    users: HashMap<i64, String>,
    chats: HashMap<i64, String>,
}

impl SenderNames {
    fn new(users: &[tl::enums::User], chats: &[tl::enums::Chat]) -> Self {
        let users = users
            .iter()
            .filter_map(|user| match user {
                tl::enums::User::User(u) => Some((u.id, user_display_name(u))),
                tl::enums::User::Empty(_) => None,
            })
            .collect();

        let chats = chats
            .iter()
            .filter_map(|chat| match chat {
                tl::enums::Chat::Chat(c) => Some((c.id, c.title.clone())),
                tl::enums::Chat::Forbidden(c) => Some((c.id, c.title.clone())),
                tl::enums::Chat::Channel(c) => Some((c.id, c.title.clone())),
                tl::enums::Chat::ChannelForbidden(c) => Some((c.id, c.title.clone())),
                tl::enums::Chat::Empty(_) => None,
            })
            .collect();

        Self { users, chats }
    }

    fn lookup(&self, peer: &tl::enums::Peer) -> Option<String> {
        match peer {
            tl::enums::Peer::User(p) => self.users.get(&p.user_id).cloned(),
            tl::enums::Peer::Chat(p) => self.chats.get(&p.chat_id).cloned(),
            tl::enums::Peer::Channel(p) => self.chats.get(&p.channel_id).cloned(),
        }
    }
}

fn user_display_name(user: &tl::types::User) -> String {
    let full = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if !full.is_empty() {
        return full;
    }
    user.username
        .as_ref()
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| user.id.to_string())
}

fn timestamp(date: i32) -> DateTime<Utc> {
    DateTime::from_timestamp(date as i64, 0).unwrap_or_default()
}

fn convert_message(raw: &tl::enums::Message, names: &SenderNames) -> Option<HistoryMessage> {
    match raw {
        tl::enums::Message::Message(m) => {
            let sender = m
                .from_id
                .as_ref()
                .and_then(|from| names.lookup(from))
                .or_else(|| m.post_author.clone())
                .or_else(|| names.lookup(&m.peer_id));
            let (media, attachment) = m.media.as_ref().map(classify_media).unzip();

            Some(HistoryMessage {
                id: m.id,
                date: timestamp(m.date),
                sender,
                text: m.message.clone(),
                media,
                attachment: attachment.flatten(),
                service: false,
            })
        }
        tl::enums::Message::Service(s) => Some(HistoryMessage {
            id: s.id,
            date: timestamp(s.date),
            sender: None,
            text: String::new(),
            media: None,
            attachment: None,
            service: true,
        }),
        tl::enums::Message::Empty(_) => None,
    }
}

fn classify_media(
    media: &tl::enums::MessageMedia,
) -> (MediaKind, Option<tl::enums::InputFileLocation>) {
    match media {
        tl::enums::MessageMedia::Photo(p) => match &p.photo {
            Some(tl::enums::Photo::Photo(photo)) => (MediaKind::Photo, photo_location(photo)),
            _ => (MediaKind::Photo, None),
        },
        tl::enums::MessageMedia::Document(d) => match &d.document {
            Some(tl::enums::Document::Document(doc)) if doc.mime_type.starts_with("image/") => {
                let location =
                    tl::enums::InputFileLocation::InputDocumentFileLocation(
                        tl::types::InputDocumentFileLocation {
                            id: doc.id,
                            access_hash: doc.access_hash,
                            file_reference: doc.file_reference.clone(),
                            thumb_size: String::new(),
                        },
                    );
                (MediaKind::ImageDocument, Some(location))
            }
            _ => (MediaKind::Other, None),
        },
        _ => (MediaKind::Other, None),
    }
}

/// Location of the largest stored size of a photo.
fn photo_location(photo: &tl::types::Photo) -> Option<tl::enums::InputFileLocation> {
    let thumb_size = photo
        .sizes
        .iter()
        .filter_map(|size| match size {
            tl::enums::PhotoSize::Size(s) => Some((s.size as i64, s.r#type.clone())),
            tl::enums::PhotoSize::Progressive(s) => s
                .sizes
                .iter()
                .max()
                .map(|largest| (*largest as i64, s.r#type.clone())),
            _ => None,
        })
        .max_by_key(|(bytes, _)| *bytes)
        .map(|(_, kind)| kind)?;

    Some(tl::enums::InputFileLocation::InputPhotoFileLocation(
        tl::types::InputPhotoFileLocation {
            id: photo.id,
            access_hash: photo.access_hash,
            file_reference: photo.file_reference.clone(),
            thumb_size,
        },
    ))
}

/// Chunk size for `upload.getFile`; must divide 1 MiB.
const DOWNLOAD_CHUNK: i32 = 512 * 1024;

/// Download an attachment located by [`HistoryMessage::attachment`].
pub async fn download_attachment(
    client: &Client,
    location: &tl::enums::InputFileLocation,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut offset: i64 = 0;

    loop {
        let request = tl::functions::upload::GetFile {
            precise: false,
            cdn_supported: false,
            location: location.clone(),
            offset,
            limit: DOWNLOAD_CHUNK,
        };

        let chunk = match client.invoke(&request).await? {
            tl::enums::upload::File::File(file) => file.bytes,
            tl::enums::upload::File::CdnRedirect(_) => {
                return Err(Error::TelegramError(
                    "CDN redirects are not supported for attachments".to_string(),
                ))
            }
        };

        let received = chunk.len();
        bytes.extend_from_slice(&chunk);
        if received < DOWNLOAD_CHUNK as usize {
            break;
        }
        offset += received as i64;
    }

    Ok(bytes)
}
