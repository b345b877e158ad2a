//! Secret masking for everything written to logs, errors and notifications

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static BEARER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bbearer\s+[^\s"',]+"#).expect("Bearer regex should compile - this is a static pattern")
});

static BOT_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"bot\d+:[A-Za-z0-9_-]+").expect("Bot token regex should compile - this is a static pattern")
});

static URL_USERINFO_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://)[^/\s:@]+:[^/\s@]+@")
        .expect("URL userinfo regex should compile - this is a static pattern")
});

static CREDENTIAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(api_token|bot_token|access_token|api_key|token|password|secret)(["']?\s*[:=]\s*["']?)([^\s"',&}]+)"#,
    )
    .expect("Credential regex should compile - this is a static pattern")
});

static LONG_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9]{20,}\b").expect("Long token regex should compile - this is a static pattern")
});

/// Mask a credential for display: first and last six characters for long
/// values, `***` for anything of twelve characters or fewer.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Mask recognisable secret patterns in `text`
pub fn sanitize(text: &str) -> String {
    sanitize_with::<&str>(text, &[])
}

/// Mask only `secrets` verbatim. For user-written text, where the
/// pattern rules would mangle literal values.
pub fn mask_secrets<S: AsRef<str>>(text: &str, secrets: &[S]) -> String {
    let mut output = text.to_string();

    for secret in secrets {
        let secret = secret.as_ref();
        // very short values would mask unrelated text
        if secret.len() >= 4 && output.contains(secret) {
            output = output.replace(secret, "***");
        }
    }

    output
}

/// Mask `secrets` verbatim, then every recognisable secret pattern
pub fn sanitize_with<S: AsRef<str>>(text: &str, secrets: &[S]) -> String {
    let output = mask_secrets(text, secrets);

    let output = BEARER_REGEX.replace_all(&output, "Bearer ***");
    let output = BOT_TOKEN_REGEX.replace_all(&output, "bot***");
    let output = URL_USERINFO_REGEX.replace_all(&output, "${1}***:***@");
    let output = CREDENTIAL_REGEX.replace_all(&output, "${1}${2}***");
    let output = LONG_TOKEN_REGEX.replace_all(&output, |caps: &Captures| mask_token(&caps[0]));

    output.into_owned()
}
