//! The handoff transcript: an XML-like record appended to a file after
//! every run, single-call or fan-out. Writing to this file is a broker
//! concern and is permitted regardless of `Permission` — the agent process
//! itself never touches it.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Escapes an XML attribute value. Order matters: `&` must go first or it
/// would double-escape the entities produced by the later replacements.
/// This implementation uses `&#39;` for `'`, not the `&apos;` some XML
/// producers emit — both are valid XML, this one is simply this broker's
/// choice.
pub fn xml_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Builds one `<agent-output>` record. `prompt` and `response` are element
/// text, not attributes, so they are not escaped the same way — they are
/// written as-is, matching the format's intent of carrying the agent's raw
/// markdown/text output verbatim.
pub fn build_wrapper(agent: &str, continuation_id: &str, task_note: &str, task_index: usize, status: &str, prompt: &str, response: &str) -> String {
    format!(
        "<agent-output agent=\"{}\" continuation_id=\"{}\" task_note=\"{}\" task_index=\"{}\" status=\"{}\">\n  <prompt>\n{}\n  </prompt>\n  <response>\n{}\n  </response>\n</agent-output>",
        xml_escape_attr(agent),
        xml_escape_attr(continuation_id),
        xml_escape_attr(task_note),
        task_index,
        xml_escape_attr(status),
        prompt,
        response,
    )
}

/// Resolves `raw` against `workspace` (expanding `~` and making relative
/// paths absolute) the way every path-valued dispatcher argument is
/// normalised.
pub fn resolve_path(workspace: &Path, raw: &str) -> PathBuf {
    let expanded = if let Some(stripped) = raw.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(stripped)).unwrap_or_else(|| PathBuf::from(raw))
    } else if raw == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw))
    } else {
        PathBuf::from(raw)
    };

    if expanded.is_absolute() {
        expanded
    } else {
        workspace.join(expanded)
    }
}

/// Appends `block` to `path`, creating the file if it doesn't exist yet.
/// On an existing file a leading newline separates this record from the
/// previous one so records never run together.
pub async fn append_block(path: &Path, block: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let existed = tokio::fs::metadata(path).await.is_ok();
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;

    if existed {
        file.write_all(b"\n").await?;
    }
    file.write_all(block.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_order_handles_ampersand_first() {
        assert_eq!(xml_escape_attr("a & b < c > d \" e ' f"), "a &amp; b &lt; c &gt; d &quot; e &#39; f");
    }

    #[test]
    fn build_wrapper_produces_expected_shape() {
        let xml = build_wrapper("claude", "sess-1", "note", 0, "success", "hi", "hello back");
        assert!(xml.starts_with("<agent-output agent=\"claude\" continuation_id=\"sess-1\" task_note=\"note\" task_index=\"0\" status=\"success\">"));
        assert!(xml.contains("<prompt>\nhi\n  </prompt>"));
        assert!(xml.ends_with("</agent-output>"));
    }

    #[test]
    fn resolve_path_keeps_absolute_paths_unchanged() {
        let ws = PathBuf::from("/workspace");
        assert_eq!(resolve_path(&ws, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn resolve_path_joins_relative_against_workspace() {
        let ws = PathBuf::from("/workspace");
        assert_eq!(resolve_path(&ws, "notes.md"), PathBuf::from("/workspace/notes.md"));
    }

    #[tokio::test]
    async fn append_block_creates_then_prepends_newline_on_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.txt");

        append_block(&path, "first").await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "first");

        append_block(&path, "second").await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "first\nsecond");
    }
}
