//! Interactive creation of the Telegram session file

use grammers_client::SignInError;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::Prompter;
use crate::session::{get_client_for_init, SessionLock};

const CONFIRMATION: &str = "YES";

fn confirmed(answer: &str) -> bool {
    answer.trim() == CONFIRMATION
}

pub async fn run(config: &Config) -> Result<()> {
    config.require_api_credentials()?;
    let mut prompter = Prompter::stdio();

    prompter.say(&format!(
        r#"
╔═══════════════════════════════════════════════════════════════╗
║  ИНИЦИАЛИЗАЦИЯ TELEGRAM СЕССИИ                                ║
╚═══════════════════════════════════════════════════════════════╝

⚠️  Будет создан файл сессии {} для номера {}.
   Telegram может завершить другие активные сессии этого аккаунта.
"#,
        config.session_file(),
        config.phone
    ))?;

    let answer = prompter.ask_line("   Введите 'YES' (заглавными) для подтверждения: ")?;
    if !confirmed(&answer) {
        prompter.say("\n❌ Отменено. Session файл не создан.")?;
        return Ok(());
    }

    let _lock = SessionLock::for_config(config)?;
    let client = get_client_for_init(config).await?;

    if client.is_authorized().await? {
        prompter.say(&format!(
            "✅ Сессия {} уже авторизована.",
            config.session_file()
        ))?;
        return Ok(());
    }

    prompter.say(&format!("\n🔄 Запрашиваю код для {}...", config.phone))?;
    let token = client
        .request_login_code(&config.phone, &config.api_hash)
        .await
        .map_err(|e| Error::TelegramError(format!("Failed to request code: {}", e)))?;

    let code = prompter.login_code()?;
    let user = match client.sign_in(&token, &code).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            if let Some(hint) = password_token.hint() {
                prompter.say(&format!("🔐 Подсказка пароля: {}", hint))?;
            }
            let password = prompter.password()?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::TelegramError(format!("Failed to check password: {}", e)))?
        }
        Err(SignInError::InvalidCode) => {
            return Err(Error::TelegramError("Неверный код подтверждения".to_string()))
        }
        Err(SignInError::SignUpRequired { .. }) => {
            return Err(Error::TelegramError(
                "Номер не зарегистрирован в Telegram".to_string(),
            ))
        }
        Err(e) => return Err(Error::TelegramError(format!("Failed to sign in: {}", e))),
    };

    info!(session = %config.session_file(), "Session created");
    prompter.say(&format!(
        r#"
╔═══════════════════════════════════════════════════════════════╗
║  ✅ СЕССИЯ УСПЕШНО СОЗДАНА                                    ║
╚═══════════════════════════════════════════════════════════════╝

Профиль:
  Имя: {}
  Username: @{}

Файл сессии: {}
"#,
        user.full_name(),
        user.username().unwrap_or("не указан"),
        config.session_file()
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_uppercase_yes_confirms() {
        assert!(confirmed("YES"));
        assert!(confirmed("  YES\n"));
        assert!(!confirmed("yes"));
        assert!(!confirmed(""));
        assert!(!confirmed("Y"));
    }
}
