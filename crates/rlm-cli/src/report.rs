//! Human-readable reports for loads, runs and session status.

use rlm_core::execute::group_thousands;
use rlm_core::{ExecutionResult, LoadedContent, ResetReceipt, SessionInfo, Value};

use crate::colors;

/// Characters of content shown after a single-file load.
const PREVIEW_CHARS: usize = 500;

/// Remaining executions at which runs start nagging to wrap up.
const LOW_BUDGET: u32 = 3;

fn size_display(chars: usize) -> String {
    let mb = chars as f64 / (1024.0 * 1024.0);
    if mb >= 1.0 {
        format!("{mb:.1}MB")
    } else {
        format!("{}KB", chars / 1000)
    }
}

/// Report for a completed load.
pub fn load_report(content: &LoadedContent, session: &str, max_executions: u32) -> String {
    let mut out = String::new();
    let size = size_display(content.total_chars);

    match (content.files.as_slice(), content.preview(PREVIEW_CHARS)) {
        ([file], Some(preview)) => {
            out.push_str(&colors::paint(
                &format!(
                    "✓ File loaded [{size}, {} lines]",
                    group_thousands(file.lines)
                ),
                colors::GREEN,
            ));
            out.push('\n');
            if content.is_small() {
                out.push_str(&small_note(content.total_chars));
            }
            out.push_str(&format!("\nPath: {}\n", file.path.display()));
            out.push_str(&format!(
                "Size: {} chars (~{} tokens)\n",
                group_thousands(file.chars),
                group_thousands(content.approx_tokens())
            ));
            out.push_str(&format!("Lines: {}\n", group_thousands(file.lines)));
            out.push_str(&format!("\nPreview (first {PREVIEW_CHARS} chars):\n{preview}"));
            if file.chars > PREVIEW_CHARS {
                out.push_str("...");
            }
            out.push('\n');
        }
        _ => {
            out.push_str(&colors::paint(
                &format!(
                    "✓ {} files loaded [{size}, ~{} tokens]",
                    content.files.len(),
                    group_thousands(content.approx_tokens())
                ),
                colors::GREEN,
            ));
            out.push('\n');
            if content.is_small() {
                out.push_str(&small_note(content.total_chars));
            }
            out.push('\n');
            for file in &content.files {
                out.push_str(&format!(
                    "  {}: {} chars\n",
                    file.name,
                    group_thousands(file.chars)
                ));
            }
            for path in &content.missing {
                out.push_str(&format!("  {}: NOT FOUND\n", path.display()));
            }
            out.push_str("\nAccess: context['filename.txt']\n");
        }
    }

    out.push_str(&format!(
        "\nSession: {session} | Executions: 0/{max_executions}\n\n\
         Ready. Run 2-5 targeted queries, then summarize findings."
    ));
    out
}

fn small_note(chars: usize) -> String {
    colors::paint(
        &format!(
            "NOTE: Content is only {}KB. Reading small files directly is faster.\n",
            chars / 1000
        ),
        colors::YELLOW,
    )
}

/// Report for one run.
pub fn result_report(result: &ExecutionResult, execution_count: u32, max_executions: u32) -> String {
    let progress = format!("[{execution_count}/{max_executions}]");
    let remaining = max_executions.saturating_sub(execution_count);

    let (status, body) = if result.success {
        let mut status = colors::paint(
            &format!(
                "✓ {progress} OK ({:.1}s)",
                result.execution_time.as_secs_f64()
            ),
            colors::GREEN,
        );
        if remaining <= LOW_BUDGET {
            status.push_str(&colors::paint(
                &format!(" - {remaining} left, wrap up your analysis"),
                colors::YELLOW,
            ));
        }
        let body = if result.output.is_empty() {
            "(no output - use print())".to_string()
        } else {
            result.output.clone()
        };
        (status, body)
    } else {
        let mut status = colors::paint(&format!("✗ {progress} Error"), colors::RED);
        if remaining <= LOW_BUDGET && !result.is_quota_exceeded() {
            status.push_str(&colors::paint(
                &format!(" - {remaining} left, consider summarizing what you have"),
                colors::YELLOW,
            ));
        }
        let error = result.error.clone().unwrap_or_default();
        let body = if result.output.is_empty() {
            error
        } else {
            format!("{}\n{}", result.output.trim_end(), error)
        };
        (status, body)
    };

    format!("{status}\n\n{body}")
}

/// Report for session status.
pub fn info_report(info: &SessionInfo) -> String {
    let variables = if info.variables.is_empty() {
        "(none)".to_string()
    } else {
        info.variables.join(", ")
    };
    format!(
        "{}\n\
         Context: {} chars\n\
         Executions: {}/{} used\n\
         Remaining: {}\n\
         Resets: {}/{}\n\
         Age: {}s\n\
         Variables: {}",
        colors::paint(&format!("Session: {}", info.id), colors::BOLD),
        group_thousands(info.context_length),
        info.execution_count,
        info.max_executions,
        info.remaining,
        info.reset_count,
        info.max_resets,
        info.age.as_secs(),
        variables
    )
}

/// Report for an accepted reset.
pub fn reset_report(session: &str, receipt: &ResetReceipt) -> String {
    colors::paint(
        &format!(
            "✓ Session '{session}' reset ({}/{} resets used). Load a file to continue.",
            receipt.used, receipt.limit
        ),
        colors::GREEN,
    )
}

/// Report for a variable lookup.
pub fn variable_report(name: &str, value: Option<&Value>, max_chars: usize) -> String {
    match value {
        Some(value) => value.render(max_chars),
        None => colors::paint(&format!("Variable '{name}' not found"), colors::DIM),
    }
}
