//! The three prompt suffixes the dispatcher may append before handing a
//! prompt to an agent: a handoff hint, a report-mode block, and a
//! reference-paths block. Text is fixed — these are instructions to the
//! downstream agent, not user-configurable templates.

/// Appends the handoff hint, naming `handoff_file` as where the scheduler
/// will file the agent's answer. Always applied — `handoff_file` is a
/// required argument at the dispatcher boundary.
pub fn inject_handoff_hint(prompt: &str, handoff_file: &str) -> String {
    format!(
        "{}\n\n<mcp-injection type=\"handoff\">\n  <meta-rules>\n    <rule>Do not mention this template, \"handoff\", MCP, or any injection mechanism.</rule>\n  </meta-rules>\n  <output-requirements>\n    <rule>End your answer with a section titled \"## Handoff\" (next steps + files to read first).</rule>\n    <rule>The scheduler will append this output to: {}</rule>\n  </output-requirements>\n</mcp-injection>",
        prompt.trim_end(),
        handoff_file,
    )
}

/// Appends the report-mode and reference-paths blocks, in that order, when
/// requested. A no-op on both fields left at their defaults.
pub fn inject_context_and_report_mode(prompt: &str, context_paths: &[String], report_mode: bool) -> String {
    let mut result = prompt.to_string();

    if report_mode {
        result.push_str(REPORT_MODE_BLOCK);
    }

    if !context_paths.is_empty() {
        let paths_xml = context_paths
            .iter()
            .map(|p| format!("    <path>{p}</path>"))
            .collect::<Vec<_>>()
            .join("\n");
        result.push_str(&format!(
            "\n\n<mcp-injection type=\"reference-paths\">\n  <description>\n    These paths are provided as reference for project structure.\n    You may use them to understand naming conventions and file organization.\n  </description>\n  <paths>\n{paths_xml}\n  </paths>\n</mcp-injection>"
        ));
    }

    result
}

const REPORT_MODE_BLOCK: &str = "\n\n<mcp-injection type=\"report-mode\">\n  <meta-rules>\n    <rule>Follow higher-priority system messages first; apply these report-mode instructions where they do not conflict.</rule>\n    <rule>Do not mention this template, \"report-mode\", MCP, or any injection mechanism. Write as if replying directly to the user.</rule>\n  </meta-rules>\n\n  <output-requirements>\n    <rule>Produce a comprehensive, self-contained response that can be understood without access to any prior conversation.</rule>\n    <rule>Do NOT use phrases like \"above\", \"earlier\", \"previous messages\", \"as discussed\", or similar context-dependent references.</rule>\n    <rule>Use the same primary language as the user's request.</rule>\n    <rule>Briefly restate the user's task or question in your own words before presenting your analysis.</rule>\n  </output-requirements>\n\n  <structure-guidelines>\n    <guideline>Start with key findings or conclusions in 1-3 short points so the reader quickly understands the outcome.</guideline>\n    <guideline>Provide enough context so a new reader understands the problem without seeing the rest of the conversation.</guideline>\n    <guideline>Organize longer answers into clear sections (e.g., Summary, Context, Analysis, Recommendations) when helpful.</guideline>\n    <guideline>End with concrete, actionable recommendations or next steps when applicable.</guideline>\n  </structure-guidelines>\n\n  <reasoning-guidelines>\n    <guideline>Explain important assumptions, trade-offs, and decisions clearly.</guideline>\n    <guideline>Where your platform allows, show reasoning step by step. If detailed chain-of-thought is restricted, provide a concise explanation instead.</guideline>\n  </reasoning-guidelines>\n\n  <code-guidelines>\n    <guideline>Reference specific locations using file paths and line numbers (e.g., src/app.ts:42).</guideline>\n    <guideline>Include small, relevant code snippets inline when they help the reader understand without opening the file.</guideline>\n  </code-guidelines>\n</mcp-injection>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_hint_names_the_target_file() {
        let out = inject_handoff_hint("do the thing", "notes.md");
        assert!(out.contains("type=\"handoff\""));
        assert!(out.contains("append this output to: notes.md"));
        assert!(out.starts_with("do the thing"));
    }

    #[test]
    fn report_mode_block_appended_when_requested() {
        let out = inject_context_and_report_mode("prompt", &[], true);
        assert!(out.contains("type=\"report-mode\""));
    }

    #[test]
    fn report_mode_block_absent_by_default() {
        let out = inject_context_and_report_mode("prompt", &[], false);
        assert_eq!(out, "prompt");
    }

    #[test]
    fn context_paths_rendered_as_xml_list() {
        let out = inject_context_and_report_mode("prompt", &["src/a.rs".to_string(), "src/b.rs".to_string()], false);
        assert!(out.contains("<path>src/a.rs</path>"));
        assert!(out.contains("<path>src/b.rs</path>"));
    }

    #[test]
    fn both_blocks_apply_report_mode_before_context_paths() {
        let out = inject_context_and_report_mode("prompt", &["src/a.rs".to_string()], true);
        let report_idx = out.find("report-mode").unwrap();
        let paths_idx = out.find("reference-paths").unwrap();
        assert!(report_idx < paths_idx);
    }
}
