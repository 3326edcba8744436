use chanmirror_core::config::AppSettings;
use chanmirror_transport_telegram::config::{BotSettings, TelegramSettings};
use chanmirror_transport_telegram::runner::run_bots;
use dotenvy::dotenv;
use regex::Regex;
use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const TOKEN_MASK: &str = "[TELEGRAM_TOKEN]";
const MASK: &str = "[MASKED]";

/// Configured secrets shorter than this are left alone.
const MIN_SECRET_LEN: usize = 6;

/// One pattern and what its matches become.
struct Rule {
    pattern: Regex,
    replacement: String,
}

impl Rule {
    fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    fn literal(secret: &str) -> Result<Self, regex::Error> {
        Self::new(&regex::escape(secret), MASK)
    }
}

/// Masks bot tokens and storage credentials in log output.
///
/// Known secret values from the configuration are masked verbatim, before
/// the generic shape-based rules run.
struct Redactor {
    rules: Vec<Rule>,
}

impl Redactor {
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    fn new<'a>(secrets: impl IntoIterator<Item = &'a str>) -> Result<Self, regex::Error> {
        let mut known: Vec<&str> = secrets
            .into_iter()
            .map(str::trim)
            .filter(|s| s.len() >= MIN_SECRET_LEN)
            .collect();
        // a secret containing another must be masked first
        known.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        known.dedup();

        let mut rules = known
            .into_iter()
            .map(Rule::literal)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend([
            Rule::new(
                r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)",
                &format!("$1{TOKEN_MASK}$3"),
            )?,
            Rule::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})", TOKEN_MASK)?,
            Rule::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+", &format!("$1{TOKEN_MASK}"))?,
            Rule::new(r#"(?i)(x-access-key"?\s*[:=]\s*"?)[^\s",}]+"#, &format!("${{1}}{MASK}"))?,
            Rule::new(
                r"(JSONBIN_KEY|R2_ACCESS_KEY_ID|R2_SECRET_ACCESS_KEY)=[^\s&]+",
                &format!("$1={MASK}"),
            )?,
        ]);
        Ok(Self { rules })
    }

    /// Secrets found in the loaded configuration.
    fn secrets_of<'a>(app: &'a AppSettings, telegram: &'a TelegramSettings) -> Vec<&'a str> {
        [
            app.jsonbin_key.as_deref(),
            app.r2_access_key_id.as_deref(),
            app.r2_secret_access_key.as_deref(),
            telegram.admin_bot_token.as_deref(),
            telegram.attach_bot_token.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn redact<'t>(&self, input: &'t str) -> Cow<'t, str> {
        let mut output = Cow::Borrowed(input);
        for rule in &self.rules {
            if rule.pattern.is_match(&output) {
                let replaced = rule
                    .pattern
                    .replace_all(&output, rule.replacement.as_str())
                    .into_owned();
                output = Cow::Owned(replaced);
            }
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.redactor.redact(&text).as_bytes())?;
        // callers track the bytes they handed over
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<Redactor>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            redactor: Arc::clone(&self.redactor),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let app = AppSettings::new();
    let telegram = TelegramSettings::new();
    let secrets = match (&app, &telegram) {
        (Ok(app), Ok(telegram)) => Redactor::secrets_of(app, telegram),
        _ => Vec::new(),
    };

    // Built before logging starts so nothing is written unredacted
    let redactor = Arc::new(Redactor::new(secrets).map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(redactor);

    let settings = match (app, telegram) {
        (Ok(app), Ok(telegram)) => Arc::new(BotSettings::new(app, telegram)),
        (Err(e), _) => {
            error!("Failed to load core configuration: {e}");
            std::process::exit(1);
        }
        (_, Err(e)) => {
            error!("Failed to load telegram configuration: {e}");
            std::process::exit(1);
        }
    };
    info!("Configuration loaded, starting chanmirror bots...");

    if let Err(e) = run_bots(settings).await {
        error!("Fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(redactor: Arc<Redactor>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        redactor,
    };

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(
                "chanmirror_core=info,chanmirror_transport_telegram=info,chanmirror_bot=info,teloxide=warn,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,aws_config=warn,aws_smithy_runtime=warn",
            )
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(secrets: &[&str]) -> Redactor {
        Redactor::new(secrets.iter().copied()).expect("redaction patterns compile")
    }

    #[test]
    fn test_redacts_telegram_tokens() {
        let r = redactor(&[]);
        let url = "https://api.telegram.org/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawq/sendMessage";
        let out = r.redact(url);
        assert!(!out.contains("AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawq"));
        assert!(out.contains(TOKEN_MASK));

        assert_eq!(
            r.redact("token 123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsawq loaded"),
            "token [TELEGRAM_TOKEN] loaded"
        );
    }

    #[test]
    fn test_redacts_store_credentials() {
        let r = redactor(&[]);
        assert_eq!(
            r.redact(r#"headers: {"x-access-key": "$2a$10$secret"}"#),
            r#"headers: {"x-access-key": "[MASKED]"}"#
        );
        assert_eq!(r.redact("JSONBIN_KEY=abc123 next"), "JSONBIN_KEY=[MASKED] next");
        assert_eq!(
            r.redact("R2_ACCESS_KEY_ID=AKIA&R2_SECRET_ACCESS_KEY=shh"),
            "R2_ACCESS_KEY_ID=[MASKED]&R2_SECRET_ACCESS_KEY=[MASKED]"
        );
    }

    #[test]
    fn test_masks_configured_secret_anywhere() {
        let r = redactor(&["$2a$10$abc.def", "r2-secret-value", "abc"]);
        assert_eq!(
            r.redact("loading bin with $2a$10$abc.def from store"),
            "loading bin with [MASKED] from store"
        );
        assert_eq!(
            r.redact("signing with r2-secret-value/extra"),
            "signing with [MASKED]/extra"
        );
        // too short to mask safely
        assert_eq!(r.redact("abc"), "abc");
    }

    #[test]
    fn test_longer_secret_masked_whole() {
        let r = redactor(&["shortkey", "shortkey-and-more"]);
        assert_eq!(r.redact("x shortkey-and-more y"), "x [MASKED] y");
    }

    #[test]
    fn test_untouched_text_is_borrowed() {
        let r = redactor(&["configured-secret"]);
        assert!(matches!(r.redact("nothing to hide"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_secrets_come_from_settings() {
        let app = AppSettings {
            jsonbin_key: Some("bin-key-123".to_string()),
            r2_secret_access_key: Some("r2-secret".to_string()),
            ..AppSettings::default()
        };
        let telegram = TelegramSettings {
            attach_bot_token: Some("111:attach".to_string()),
            ..TelegramSettings::default()
        };
        assert_eq!(
            Redactor::secrets_of(&app, &telegram),
            vec!["bin-key-123", "r2-secret", "111:attach"]
        );
    }

    #[test]
    fn test_writer_reports_original_length() {
        let mut writer = RedactingWriter {
            inner: Vec::new(),
            redactor: Arc::new(redactor(&[])),
        };
        let line = b"JSONBIN_KEY=abcdef\n";
        assert_eq!(writer.write(line).expect("vec write succeeds"), line.len());
        assert_eq!(
            String::from_utf8(writer.inner).expect("output is utf-8"),
            "JSONBIN_KEY=[MASKED]\n"
        );
    }
}
