/// Canonical form of a Message-ID style identifier.
///
/// Trims whitespace and one layer of surrounding angle brackets, so `<a@b>`,
/// ` a@b ` and `a@b` all compare equal. Returns `None` for blank input.
pub fn normalize_message_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_message_id)
}

/// Split a raw `References:` header into individual ids, in header order.
///
/// Ids are separated by whitespace and/or commas; brackets are optional.
pub fn parse_references(header: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut current = String::new();

    for ch in header.chars() {
        if ch == '<' || ch == '>' || ch == ',' || ch.is_whitespace() {
            if let Some(id) = normalize_message_id(&current) {
                ids.push(id);
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if let Some(id) = normalize_message_id(&current) {
        ids.push(id);
    }
    ids
}
