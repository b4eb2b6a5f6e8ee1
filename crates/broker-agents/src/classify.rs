//! Tool-name -> [`OperationType`] classification, shared by every parser.
//!
//! Each dialect calls the same name-pattern rule rather than keeping its
//! own copy, so a new tool naming convention only needs updating here.

use broker_model::OperationType;

/// Classifies a tool/function name by pattern, per the fixed precedence:
/// shell/bash names are commands, edit/write names are file operations,
/// web-search names are search, names under the reserved `mcp__` prefix are
/// mcp calls, anything mentioning "todo" is a todo operation, and
/// everything else falls back to a generic tool.
pub fn classify_operation(tool_name: &str) -> OperationType {
    let lower = tool_name.to_ascii_lowercase();

    if lower.starts_with("mcp__") {
        OperationType::Mcp
    } else if lower == "bash" || lower == "shell" || lower.contains("command") {
        OperationType::Command
    } else if lower == "edit" || lower == "write" || lower.contains("file") {
        OperationType::File
    } else if lower.contains("search") {
        OperationType::Search
    } else if lower.contains("todo") {
        OperationType::Todo
    } else {
        OperationType::Tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_is_command() {
        assert_eq!(classify_operation("Bash"), OperationType::Command);
    }

    #[test]
    fn edit_and_write_are_file() {
        assert_eq!(classify_operation("Edit"), OperationType::File);
        assert_eq!(classify_operation("Write"), OperationType::File);
    }

    #[test]
    fn mcp_prefix_wins_over_other_hints() {
        assert_eq!(classify_operation("mcp__search__web"), OperationType::Mcp);
    }

    #[test]
    fn web_search_is_search() {
        assert_eq!(classify_operation("WebSearch"), OperationType::Search);
    }

    #[test]
    fn todo_write_is_todo() {
        assert_eq!(classify_operation("TodoWrite"), OperationType::Todo);
    }

    #[test]
    fn unknown_name_is_generic_tool() {
        assert_eq!(classify_operation("Read"), OperationType::Tool);
    }
}
