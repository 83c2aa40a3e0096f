//! Interactive console input
//!
//! Generic over the reader and writer so that the CLI uses stdin/stdout
//! while tests feed scripted answers.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Datelike};

use crate::calendar::{local_datetime, month_label, Zone};
use crate::chat::CHAT_INPUT_HELP;
use crate::error::{Error, Result};
use crate::range::TimeRange;

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

/// One field of a date form failed to parse.
struct FieldError(String);

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    /// Print `question` and read one trimmed line. Closed input is an error.
    pub fn ask_line(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::InvalidArgument("input closed".to_string()));
        }
        Ok(line.trim().to_string())
    }

    /// Empty answer means yes, anything else means no.
    pub fn confirm_default_yes(&mut self, question: &str) -> Result<bool> {
        Ok(self.ask_line(question)?.is_empty())
    }

    fn ask_number(
        &mut self,
        question: &str,
        default: Option<u32>,
    ) -> Result<std::result::Result<u32, FieldError>> {
        let answer = self.ask_line(question)?;
        if answer.is_empty() {
            return Ok(default.ok_or_else(|| FieldError("значение обязательно".to_string())));
        }
        Ok(answer
            .parse::<u32>()
            .map_err(|_| FieldError(format!("'{}' не является числом", answer))))
    }

    fn current_month_fields(
        &mut self,
        today: u32,
    ) -> Result<std::result::Result<(u32, u32, u32), FieldError>> {
        let day = match self.ask_number(&format!("День (1-31, Enter - {}): ", today), Some(today))? {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };
        let hour = match self.ask_number("Час (0-23, Enter - 00): ", Some(0))? {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };
        let minute = match self.ask_number("Минуты (0-59, Enter - 00): ", Some(0))? {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };
        Ok(Ok((day, hour, minute)))
    }

    fn full_fields(&mut self) -> Result<std::result::Result<[u32; 5], FieldError>> {
        let questions = [
            ("Год (например, 2024): ", None),
            ("Месяц (1-12): ", None),
            ("День (1-31): ", None),
            ("Час (0-23, Enter - 00): ", Some(0)),
            ("Минуты (0-59, Enter - 00): ", Some(0)),
        ];
        let mut values = [0u32; 5];
        for (slot, (question, default)) in values.iter_mut().zip(questions) {
            match self.ask_number(question, default)? {
                Ok(v) => *slot = v,
                Err(e) => return Ok(Err(e)),
            }
        }
        Ok(Ok(values))
    }

    fn accept(
        &mut self,
        candidate: Result<DateTime<Zone>>,
        now: DateTime<Zone>,
    ) -> Result<Option<DateTime<Zone>>> {
        match candidate {
            Ok(dt) if dt > now => {
                self.say("⚠️ Дата не может быть в будущем!")?;
                Ok(None)
            }
            Ok(dt) => Ok(Some(dt)),
            Err(err) => {
                self.say(&format!("❌ Ошибка: {}", err))?;
                Ok(None)
            }
        }
    }

    /// Day and time within the month of `now`.
    /// Day defaults to today, hour and minute to zero.
    pub fn current_month_time(
        &mut self,
        prefix: &str,
        now: DateTime<Zone>,
    ) -> Result<DateTime<Zone>> {
        self.say(&format!("\n=== {} дата (текущий месяц {}) ===", prefix, month_label(&now)))?;

        loop {
            let fields = self.current_month_fields(now.day())?;

            let candidate = match fields {
                Ok((day, hour, minute)) => {
                    local_datetime(&now.timezone(), now.year(), now.month(), day, hour, minute)
                }
                Err(FieldError(msg)) => Err(Error::InvalidArgument(msg)),
            };

            if let Some(dt) = self.accept(candidate, now)? {
                return Ok(dt);
            }
        }
    }

    /// Year, month, day and time. Hour and minute default to zero.
    pub fn full_datetime(
        &mut self,
        prefix: &str,
        now: DateTime<Zone>,
    ) -> Result<DateTime<Zone>> {
        self.say(&format!("\n=== {} дата ===", prefix))?;

        loop {
            let fields = self.full_fields()?;

            let candidate = match fields {
                Ok([year, month, day, hour, minute]) => {
                    local_datetime(&now.timezone(), year as i32, month, day, hour, minute)
                }
                Err(FieldError(msg)) => Err(Error::InvalidArgument(msg)),
            };

            if let Some(dt) = self.accept(candidate, now)? {
                return Ok(dt);
            }
        }
    }

    /// Ask which window to collect.
    pub fn select_range(&mut self, now: DateTime<Zone>) -> Result<TimeRange> {
        let use_current = self.confirm_default_yes(&format!(
            "\nСобираем за {}? (Enter - да / любой символ - нет): ",
            month_label(&now)
        ))?;

        let (start, end) = if use_current {
            let start = self.current_month_time("Начальная", now)?;
            let end_now = self.confirm_default_yes(
                "\nИспользовать текущее время для конечной даты? (Enter - да / любой символ - нет): ",
            )?;
            let end = if end_now {
                now
            } else {
                self.current_month_time("Конечная", now)?
            };
            (start, end)
        } else {
            let start = self.full_datetime("Начальная", now)?;
            let end = self.full_datetime("Конечная", now)?;
            (start, end)
        };

        if start > end {
            self.say("❌ Начальная дата позже конечной!")?;
        }
        TimeRange::new(start, end)
    }

    /// Ask for a chat until something non-empty is entered.
    pub fn chat_input(&mut self) -> Result<String> {
        loop {
            let answer = self.ask_line("Введите ID группы/канала, invite-ссылку или @username: ")?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            self.say(CHAT_INPUT_HELP)?;
        }
    }

    pub fn login_code(&mut self) -> Result<String> {
        self.ask_line("Введите код из Telegram: ")
    }

    pub fn password(&mut self) -> Result<String> {
        self.ask_line("Введите пароль двухфакторной аутентификации: ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::default_zone;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn now() -> DateTime<Zone> {
        default_zone()
            .with_ymd_and_hms(2024, 5, 15, 12, 0, 0)
            .single()
            .unwrap()
    }

    fn prompter(script: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    fn output(p: Prompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(p.into_output()).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Zone> {
        local_datetime(&default_zone(), y, m, d, h, min).unwrap()
    }

    #[test]
    fn current_month_defaults_to_today_midnight() {
        let mut p = prompter("\n\n\n");
        let dt = p.current_month_time("Начальная", now()).unwrap();
        assert_eq!(dt, local(2024, 5, 15, 0, 0));
        assert!(output(p).contains("текущий месяц Май 2024"));
    }

    #[test]
    fn current_month_rejects_future_and_reprompts() {
        let mut p = prompter("20\n\n\n10\n9\n30\n");
        let dt = p.current_month_time("Начальная", now()).unwrap();
        assert_eq!(dt, local(2024, 5, 10, 9, 30));
        assert!(output(p).contains("не может быть в будущем"));
    }

    #[test]
    fn current_month_reprompts_on_garbage() {
        let mut p = prompter("abc\n32\n\n\n3\n\n\n");
        let dt = p.current_month_time("Начальная", now()).unwrap();
        assert_eq!(dt, local(2024, 5, 3, 0, 0));
        let text = output(p);
        assert_eq!(text.matches("❌ Ошибка").count(), 2);
    }

    #[test]
    fn full_datetime_reads_every_field() {
        let mut p = prompter("2023\n12\n31\n23\n59\n");
        let dt = p.full_datetime("Начальная", now()).unwrap();
        assert_eq!(dt, local(2023, 12, 31, 23, 59));
    }

    #[test]
    fn full_datetime_requires_year() {
        let mut p = prompter("\n2024\n2\n29\n\n\n");
        let dt = p.full_datetime("Начальная", now()).unwrap();
        assert_eq!(dt, local(2024, 2, 29, 0, 0));
        assert!(output(p).contains("значение обязательно"));
    }

    #[test]
    fn select_current_month_until_now() {
        let mut p = prompter("\n1\n\n\n\n");
        let range = p.select_range(now()).unwrap();
        assert_eq!(range.start(), local(2024, 5, 1, 0, 0).with_timezone(&chrono::Utc));
        assert_eq!(range.end(), now().with_timezone(&chrono::Utc));
    }

    #[test]
    fn select_current_month_with_explicit_end() {
        let mut p = prompter("\n1\n\n\nn\n2\n18\n\n");
        let range = p.select_range(now()).unwrap();
        assert_eq!(range.end(), local(2024, 5, 2, 18, 0).with_timezone(&chrono::Utc));
    }

    #[test]
    fn select_full_range() {
        let mut p = prompter("n\n2023\n1\n1\n\n\n2023\n1\n31\n23\n59\n");
        let range = p.select_range(now()).unwrap();
        assert_eq!(range.start(), local(2023, 1, 1, 0, 0).with_timezone(&chrono::Utc));
        assert_eq!(range.end(), local(2023, 1, 31, 23, 59).with_timezone(&chrono::Utc));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let mut p = prompter("n\n2024\n5\n10\n\n\n2024\n5\n1\n\n\n");
        let err = p.select_range(now()).unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
        assert!(output(p).contains("позже конечной"));
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut p = prompter("");
        assert!(p.current_month_time("Начальная", now()).is_err());
    }

    #[test]
    fn chat_input_skips_blank_answers() {
        let mut p = prompter("\n  @rust_ru \n");
        assert_eq!(p.chat_input().unwrap(), "@rust_ru");
        assert!(output(p).contains("Доступные форматы"));
    }

    #[test]
    fn confirm_treats_empty_as_yes() {
        let mut p = prompter("\nn\n");
        assert!(p.confirm_default_yes("? ").unwrap());
        assert!(!p.confirm_default_yes("? ").unwrap());
    }
}
