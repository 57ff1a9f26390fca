//! Outbound message formatting: size-limited splitting and Slack mrkdwn.

/// Split a reply into chunks of at most `limit` characters.
///
/// Prefers newline boundaries, then spaces, and only cuts mid-word when a
/// single word exceeds the limit. Chunks are trimmed of the whitespace
/// they were split on.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    assert!(limit > 0, "split limit must be positive");
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let chars: Vec<char> = rest.chars().collect();
        if chars.len() <= limit {
            chunks.push(rest.to_string());
            break;
        }

        let window: String = chars[..limit].iter().collect();
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&idx| idx > 0)
            .unwrap_or(window.len());

        chunks.push(window[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Convert common markdown to Slack mrkdwn.
///
/// Covers what replies actually contain: bold, links, and headings.
/// Everything else passes through (mrkdwn shares `_italic_`, `` `code` ``,
/// and fenced blocks with markdown).
pub fn markdown_to_mrkdwn(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        let line = if let Some(heading) = trimmed
            .strip_prefix("### ")
            .or_else(|| trimmed.strip_prefix("## "))
            .or_else(|| trimmed.strip_prefix("# "))
        {
            format!("*{}*", heading.trim())
        } else {
            line.replace("**", "*")
        };
        out.push_str(&convert_links(&line));
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// `[text](url)` → `<url|text>`.
fn convert_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find("](") else {
            break;
        };
        let close = open + close;
        let Some(end) = rest[close..].find(')') else {
            break;
        };
        let end = close + end;

        out.push_str(&rest[..open]);
        let text = &rest[open + 1..close];
        let url = &rest[close + 2..end];
        out.push_str(&format!("<{url}|{text}>"));
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_one_chunk() {
        assert_eq!(split_message("hello", 4000), vec!["hello"]);
    }

    #[test]
    fn splits_at_newlines_first() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(30));
        assert_eq!(chunks[1], "b".repeat(30));
    }

    #[test]
    fn splits_at_spaces_when_no_newline() {
        let text = format!("{} {}", "a".repeat(30), "b".repeat(30));
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn hard_cut_for_one_giant_word() {
        let text = "x".repeat(100);
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 40);
    }

    #[test]
    fn every_chunk_within_limit() {
        let text = "word ".repeat(2000);
        for chunk in split_message(&text, 4000) {
            assert!(chunk.chars().count() <= 4000);
        }
    }

    #[test]
    fn mrkdwn_bold_and_heading() {
        let out = markdown_to_mrkdwn("## Result\n\nIt **worked**.");
        assert_eq!(out, "*Result*\n\nIt *worked*.");
    }

    #[test]
    fn mrkdwn_links() {
        let out = markdown_to_mrkdwn("see [the docs](https://example.com/a)");
        assert_eq!(out, "see <https://example.com/a|the docs>");
    }
}
