use std::path::PathBuf;

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references.
///
/// Unknown variables expand to nothing.
pub fn expand_path(path: &str) -> PathBuf {
    let mut expanded = String::with_capacity(path.len());
    let mut rest = path;

    if rest == "~" || rest.starts_with("~/") {
        if let Some(home) = home_dir() {
            expanded.push_str(&home.to_string_lossy());
            rest = &rest[1..];
        }
    }

    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            expanded.push(c);
            continue;
        }
        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }
        if name.is_empty() {
            expanded.push('$');
        } else if let Ok(value) = std::env::var(&name) {
            expanded.push_str(&value);
        }
    }

    PathBuf::from(expanded)
}

/// `~/.relaycraft`, or `./.relaycraft` without a home directory
pub fn default_config_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relaycraft")
}

pub fn default_keystore_dir() -> PathBuf {
    default_config_dir().join("keys")
}
