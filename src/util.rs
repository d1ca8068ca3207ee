//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (char-boundary aware).
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

/// Strip a `data:<mime>;base64,` prefix if present (what a browser FileReader produces).
pub fn strip_data_url(payload: &str) -> &str {
  let trimmed = payload.trim();
  if trimmed.starts_with("data:") {
    match trimmed.split_once(',') {
      Some((_, data)) => data,
      None => trimmed,
    }
  } else {
    trimmed
  }
}

/// Short, non-reversible hint of a secret for status displays: "AIza…2jK".
pub fn mask_secret(secret: &str) -> String {
  let chars: Vec<char> = secret.chars().collect();
  if chars.len() <= 8 {
    return "…".into();
  }
  let head: String = chars[..4].iter().collect();
  let tail: String = chars[chars.len() - 3..].iter().collect();
  format!("{head}…{tail}")
}
