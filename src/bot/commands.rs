//! Bot command parsing

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Collect,
    Stop,
    Status,
}

pub const HELP_TEXT: &str = "🤖 Бот для сбора сообщений группы

Команды:
/collect - начать сбор сообщений в этом чате
/stop - остановить сбор
/status - состояние сбора
/help - эта справка

Сообщения сохраняются в отдельный файл за каждый день или месяц.";

/// Parse the leading `/command` of a message.
///
/// `/cmd@name` is accepted only when `name` matches `bot_username`
/// (case-insensitive). Unknown commands yield `None`.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<BotCommand> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;

    let (name, target) = match command.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (command, None),
    };

    if let (Some(target), Some(me)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(me.trim_start_matches('@')) {
            return None;
        }
    }

    match name.to_ascii_lowercase().as_str() {
        "start" => Some(BotCommand::Start),
        "help" => Some(BotCommand::Help),
        "collect" => Some(BotCommand::Collect),
        "stop" => Some(BotCommand::Stop),
        "status" => Some(BotCommand::Status),
        _ => None,
    }
}

/// Commands that change collection state.
pub fn requires_permission(command: BotCommand) -> bool {
    matches!(command, BotCommand::Collect | BotCommand::Stop)
}
