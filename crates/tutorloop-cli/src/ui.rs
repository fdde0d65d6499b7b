//! Terminal helpers: markdown rendering, prompts and the spinner.

use std::io;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};
use dialoguer::console::{measure_text_width, style, Term};
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner tick interval.
const TICK_MS: u64 = 100;

/// Width used when the terminal size cannot be read.
const FALLBACK_WIDTH: usize = 80;

/// Columns kept free on the right edge.
const RIGHT_MARGIN: usize = 5;

/// Narrowest wrap width, so tiny terminals still get readable lines.
const MIN_WIDTH: usize = 20;

/// Returns the width lesson text is wrapped to.
pub fn wrap_width() -> usize {
    let columns = terminal::size().map_or(FALLBACK_WIDTH, |(cols, _)| usize::from(cols));
    columns.saturating_sub(RIGHT_MARGIN).max(MIN_WIDTH)
}

/// Renders markdown wrapped to the current terminal width.
pub fn render(markdown: &str) -> String {
    render_markdown(markdown, wrap_width())
}

/// Renders lesson markdown for a plain terminal, wrapping prose at `width`.
///
/// Headings become bold, block quotes get a bar and fenced code is indented
/// and dimmed. Code is never wrapped.
pub fn render_markdown(markdown: &str, width: usize) -> String {
    let mut out = String::with_capacity(markdown.len() + 64);
    let mut in_code = false;

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            push_line(&mut out, &format!("    {}", style(line).dim()));
            continue;
        }

        if let Some(heading) = heading_text(trimmed) {
            for part in wrap(heading.trim_end(), width) {
                push_line(&mut out, &style(part).bold().to_string());
            }
        } else if let Some(quote) = trimmed.strip_prefix('>') {
            for part in wrap(quote.trim_start(), width.saturating_sub(4).max(1)) {
                push_line(&mut out, &format!("  │ {part}"));
            }
        } else {
            for part in wrap(line, width) {
                push_line(&mut out, &part);
            }
        }
    }
    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn heading_text(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    line[level..].strip_prefix(' ')
}

/// Word-wraps one line to `width` columns, keeping its indentation on every
/// continuation. Words longer than `width` stay whole.
fn wrap(line: &str, width: usize) -> Vec<String> {
    if measure_text_width(line) <= width {
        return vec![line.to_string()];
    }
    let indent = &line[..line.len() - line.trim_start().len()];

    let mut lines = Vec::new();
    let mut current = indent.to_string();
    let mut has_words = false;
    for word in line.split_whitespace() {
        if has_words && measure_text_width(&current) + 1 + measure_text_width(word) > width {
            lines.push(std::mem::replace(&mut current, indent.to_string()));
            has_words = false;
        }
        if has_words {
            current.push(' ');
        }
        current.push_str(word);
        has_words = true;
    }
    lines.push(current);
    lines
}

/// Clears the terminal and moves the cursor home.
pub fn clear_screen() -> io::Result<()> {
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
}

/// Prints `prompt` and waits for the learner to hit Enter.
pub fn wait_for_enter(prompt: &str) -> io::Result<()> {
    let term = Term::stdout();
    term.write_str(prompt)?;
    term.read_line()?;
    Ok(())
}

/// Starts a spinner with `message`.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(TICK_MS));
    bar
}

/// Shortens `text` to `max` characters, ending in `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
