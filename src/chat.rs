//! Chat input parsing and entity resolution

use grammers_client::types::peer::Peer;
use grammers_client::Client;
use grammers_tl_types as tl;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ChatEntity, Config};
use crate::error::{Error, Result};

/// Human readable list of accepted chat input formats.
pub const CHAT_INPUT_HELP: &str = "Доступные форматы:
- ID группы/канала (начинается с -100, например -1001234567890)
- invite-ссылка (например https://t.me/joinchat/ABCDEF12345 или https://t.me/+ABCDEF12345)
- @username или https://t.me/username (для публичных чатов)
- имя чата из config.yml";

static INVITE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:t\.me|telegram\.me)/(?:joinchat/|\+)([A-Za-z0-9_\-]+)/?$")
        .unwrap_or_else(|e| panic!("invalid invite regex: {}", e))
});

static PUBLIC_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:t\.me|telegram\.me)/([A-Za-z][A-Za-z0-9_]{3,})/?$")
        .unwrap_or_else(|e| panic!("invalid link regex: {}", e))
});

/// Extract the hash from a private invite link.
pub fn invite_hash(link: &str) -> Option<String> {
    INVITE_LINK
        .captures(link.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve chat input into a ChatEntity and optional fallback.
/// - Config name wins
/// - `-100…` is a channel/supergroup id, other negative ids are basic groups
/// - Bare numbers are tried as channel ids first, then as group ids
/// - Invite links and t.me links are recognised
/// - Otherwise treated as username
pub fn parse_chat_input(input: &str, config: &Config) -> Result<(ChatEntity, Option<ChatEntity>)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "chat is empty\n{}",
            CHAT_INPUT_HELP
        )));
    }

    if let Some(entity) = config.get_chat(input) {
        return Ok((entity.clone(), None));
    }

    if let Some(rest) = input.strip_prefix("-100") {
        if let Ok(id) = rest.parse::<i64>() {
            return Ok((ChatEntity::Channel(id), None));
        }
    }

    if let Ok(id) = input.parse::<i64>() {
        if id < 0 {
            return Ok((ChatEntity::Chat(-id), None));
        }
        return Ok((ChatEntity::Channel(id), Some(ChatEntity::Chat(id))));
    }

    if let Some(hash) = invite_hash(input) {
        return Ok((ChatEntity::Invite(hash), None));
    }

    if let Some(caps) = PUBLIC_LINK.captures(input) {
        if let Some(name) = caps.get(1) {
            return Ok((ChatEntity::username(name.as_str()), None));
        }
    }

    if input.contains('/') || input.contains(' ') {
        return Err(Error::InvalidArgument(format!(
            "unrecognised chat '{}'\n{}",
            input, CHAT_INPUT_HELP
        )));
    }

    Ok((ChatEntity::username(input), None))
}

fn raw_chat_id(chat: &tl::enums::Chat) -> i64 {
    match chat {
        tl::enums::Chat::Empty(c) => c.id,
        tl::enums::Chat::Chat(c) => c.id,
        tl::enums::Chat::Forbidden(c) => c.id,
        tl::enums::Chat::Channel(c) => c.id,
        tl::enums::Chat::ChannelForbidden(c) => c.id,
    }
}

const CHANNEL_ID_BASE: i64 = 1_000_000_000_000;

/// How the Bot API marks a chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    User,
    /// Basic group
    Group,
    /// Channel or supergroup
    Channel,
}

/// Bot API form of a raw MTProto id: users unchanged, basic groups
/// negated, channels and supergroups prefixed with `-100`.
pub fn bot_api_id(kind: ChatKind, raw_id: i64) -> i64 {
    match kind {
        ChatKind::User => raw_id,
        ChatKind::Group => -raw_id,
        ChatKind::Channel => -(CHANNEL_ID_BASE + raw_id),
    }
}

/// Bot API id of any peer, as used in output directory names. The bot
/// names directories after the same id, so both modes share one log.
pub fn peer_id(peer: &Peer) -> i64 {
    match peer {
        Peer::User(user) => bot_api_id(ChatKind::User, user.raw.id()),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(_) | tl::enums::Chat::ChannelForbidden(_) => {
                bot_api_id(ChatKind::Channel, raw_chat_id(&group.raw))
            }
            raw => bot_api_id(ChatKind::Group, raw_chat_id(raw)),
        },
        Peer::Channel(channel) => bot_api_id(ChatKind::Channel, channel.raw.id),
    }
}

/// Walk the account's dialogs until `matches` accepts a peer.
async fn find_in_dialogs<F>(client: &Client, what: &str, matches: F) -> Result<Peer>
where
    F: Fn(&Peer) -> bool,
{
    let mut dialogs = client.iter_dialogs();

    while let Some(dialog) = dialogs
        .next()
        .await
        .map_err(|e| Error::TelegramError(e.to_string()))?
    {
        if matches(&dialog.peer) {
            return Ok(dialog.peer.clone());
        }
    }

    Err(Error::ChatNotFound(format!("{} not found in dialogs", what)))
}

/// Resolve a ChatEntity to an actual Peer
pub async fn resolve_chat(client: &Client, entity: &ChatEntity) -> Result<Peer> {
    match entity {
        ChatEntity::Channel(target_id) => {
            let target_id = *target_id;
            find_in_dialogs(client, &format!("Channel {}", target_id), |peer| match peer {
                Peer::Channel(channel) => channel.raw.id == target_id,
                // Megagroups are listed as groups backed by a channel
                Peer::Group(group) => matches!(&group.raw, tl::enums::Chat::Channel(c) if c.id == target_id),
                Peer::User(_) => false,
            })
            .await
        }
        ChatEntity::Chat(target_id) => {
            let target_id = *target_id;
            find_in_dialogs(client, &format!("Chat {}", target_id), |peer| {
                matches!(peer, Peer::Group(group) if raw_chat_id(&group.raw) == target_id)
            })
            .await
        }
        ChatEntity::UserId(target_id) => {
            let target_id = *target_id;
            find_in_dialogs(client, &format!("User {}", target_id), |peer| {
                matches!(peer, Peer::User(user) if user.raw.id() == target_id)
            })
            .await
        }
        ChatEntity::Username(username) => client
            .resolve_username(username)
            .await
            .map_err(|e| Error::TelegramError(e.to_string()))?
            .ok_or_else(|| Error::ChatNotFound(format!("Username @{} not found", username))),
        ChatEntity::Invite(hash) => {
            let request = tl::functions::messages::CheckChatInvite { hash: hash.clone() };
            let invite = client.invoke(&request).await?;
            let chat = match invite {
                tl::enums::ChatInvite::Already(already) => already.chat,
                tl::enums::ChatInvite::Peek(peek) => peek.chat,
                tl::enums::ChatInvite::Invite(_) => {
                    return Err(Error::ChatNotFound(format!(
                        "invite {} points to a chat this account has not joined",
                        hash
                    )))
                }
            };
            let target_id = raw_chat_id(&chat);
            find_in_dialogs(client, &format!("Invite {}", hash), |peer| {
                matches!(peer, Peer::Group(_) | Peer::Channel(_)) && peer_id(peer) == target_id
            })
            .await
        }
    }
}

/// Resolve free-form chat input, trying the fallback entity on failure.
pub async fn find_chat(client: &Client, input: &str, config: &Config) -> Result<Peer> {
    let (primary, fallback) = parse_chat_input(input, config)?;

    match resolve_chat(client, &primary).await {
        Ok(peer) => Ok(peer),
        Err(err) => match fallback {
            Some(fallback) => resolve_chat(client, &fallback).await,
            None => Err(err),
        },
    }
}

/// Get the display name for a peer
pub fn peer_name(peer: &Peer) -> String {
    peer.name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Convert a Peer to InputPeer for raw API calls.
pub fn peer_to_input(peer: &Peer) -> tl::enums::InputPeer {
    match peer {
        Peer::User(user) => {
            let (user_id, access_hash) = match &user.raw {
                tl::enums::User::User(u) => (u.id, u.access_hash.unwrap_or(0)),
                tl::enums::User::Empty(u) => (u.id, 0),
            };
            tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id,
                access_hash,
            })
        }
        Peer::Channel(channel) => tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
            channel_id: channel.raw.id,
            access_hash: channel.raw.access_hash.unwrap_or(0),
        }),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => {
                tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: c.id })
            }
            tl::enums::Chat::Channel(c) => {
                tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id: c.id,
                    access_hash: c.access_hash.unwrap_or(0),
                })
            }
            _ => tl::enums::InputPeer::Empty,
        },
    }
}
