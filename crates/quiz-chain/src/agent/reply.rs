//! Reply parsing: find the JSON object embedded in free-form service output.

use crate::types::{truncate, AgentReply, ChainError, ChainResult};

/// The first balanced `{...}` span of `text`.
///
/// Candidate spans start at each `{` in order. Braces inside JSON string
/// literals of a candidate do not count toward its balance. Returns `None`
/// when no opening brace is ever balanced.
pub fn first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..start + offset + 1]);
                    }
                }
                _ => {}
            }
        }
    }

    None
}

/// Decode an `AgentReply` from raw service output.
///
/// Fails when no balanced object exists, when it is not valid JSON, or when
/// either field is missing or blank.
pub fn parse_reply(raw: &str) -> ChainResult<AgentReply> {
    let json = first_json_object(raw).ok_or_else(|| {
        ChainError::AgentProtocol(format!(
            "no JSON object in reply: {}",
            truncate(raw, 300)
        ))
    })?;

    let reply: AgentReply = serde_json::from_str(json).map_err(|e| {
        ChainError::AgentProtocol(format!("invalid JSON ({e}): {}", truncate(json, 300)))
    })?;

    if reply.submission_url.trim().is_empty() {
        return Err(ChainError::AgentProtocol(
            "reply has no submission_url".to_string(),
        ));
    }
    if reply.script.trim().is_empty() {
        return Err(ChainError::AgentProtocol("reply has no script".to_string()));
    }

    Ok(reply)
}
