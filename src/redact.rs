use std::borrow::Cow;

const TOKEN_FIELDS: [&str; 6] = [
    "\"access\"",
    "\"refresh\"",
    "\"id_token\"",
    "\"accessToken\"",
    "\"refreshToken\"",
    "\"password\"",
];

/// Replaces the string value of well-known credential fields in a JSON-ish
/// text (`"access": "..."`) with `REDACTED`.
pub fn redact_token_fields(input: &str) -> Cow<'_, str> {
    let mut redacted = input.to_string();

    for field in TOKEN_FIELDS {
        if !redacted.contains(field) {
            continue;
        }
        let mut out = String::with_capacity(redacted.len());
        let mut rest = redacted.as_str();
        while let Some(idx) = rest.find(field) {
            out.push_str(&rest[..idx + field.len()]);
            rest = &rest[idx + field.len()..];

            // Keep `: "` as written, then swallow the quoted value.
            let trimmed = rest.trim_start();
            let Some(after_colon) = trimmed.strip_prefix(':') else {
                continue;
            };
            let after_colon = after_colon.trim_start();
            let Some(value) = after_colon.strip_prefix('"') else {
                continue;
            };
            out.push_str(&rest[..rest.len() - value.len()]);

            let mut consumed = 0;
            let mut escaped = false;
            for ch in value.chars() {
                if ch == '"' && !escaped {
                    break;
                }
                escaped = ch == '\\' && !escaped;
                consumed += ch.len_utf8();
            }
            out.push_str("REDACTED");
            rest = &value[consumed..];
        }
        out.push_str(rest);
        redacted = out;
    }

    if redacted == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(redacted)
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| {
        hay[i..i + nee.len()]
            .iter()
            .zip(nee)
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    })
}

/// Prose after "Bearer" ("Bearer token missing") has no digits and is short;
/// issued tokens have one or the other.
fn looks_like_credential(word: &str) -> bool {
    const MIN_DIGITLESS_LEN: usize = 20;
    let word = word.trim_end_matches('.');
    !word.is_empty()
        && (word.bytes().any(|b| b.is_ascii_digit()) || word.len() >= MIN_DIGITLESS_LEN)
}

fn redact_after_marker(text: String, marker: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    loop {
        let Some(idx) = find_ascii_case_insensitive(rest, marker) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..idx + marker.len()]);
        rest = &rest[idx + marker.len()..];

        if let Some(stripped) = rest.strip_prefix(' ') {
            out.push(' ');
            rest = stripped;
        }

        // Bearer tokens are URL-safe base64 / JWT segments.
        let mut consumed = 0;
        for ch in rest.chars() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~' | '+' | '/' | '=') {
                consumed += ch.len_utf8();
            } else {
                break;
            }
        }
        let word = &rest[..consumed];
        if looks_like_credential(word) {
            out.push_str("REDACTED");
        } else {
            out.push_str(word);
        }
        rest = &rest[consumed..];
    }
    out
}

/// Scrubs bearer tokens and credential fields from text that is about to be
/// logged or shown to the user.
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let after_fields = redact_token_fields(input);
    let mut value = match after_fields {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    };

    value = redact_after_marker(value, "Bearer");

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}
