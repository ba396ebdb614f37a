//! Console formatting helpers for colorful output

use console::Style;

/// Turns colors on or off for every helper below.
pub fn set_color(enabled: bool) {
    console::set_colors_enabled(enabled);
}

fn paint(text: &str, style: Style) -> String {
    style.apply_to(text).to_string()
}

/// Formats a header with bold green
pub fn header(text: &str) -> String {
    paint(&format!("=== {} ===", text), Style::new().green().bold())
}

/// Formats a sub-header with bold cyan
pub fn sub_header(text: &str) -> String {
    paint(text, Style::new().cyan().bold())
}

/// Formats an entity name (variable, motor, file) with cyan
pub fn entity(text: &str) -> String {
    paint(text, Style::new().cyan())
}

pub fn warning(text: &str) -> String {
    paint(text, Style::new().yellow())
}

pub fn error(text: &str) -> String {
    paint(text, Style::new().red())
}

/// Secondary information, in gray
pub fn secondary(text: &str) -> String {
    paint(text, Style::new().color256(8))
}

pub fn success(text: &str) -> String {
    paint(text, Style::new().green())
}

/// Formats a field label with bold
pub fn label(text: &str) -> String {
    paint(text, Style::new().bold())
}

pub fn info(text: &str) -> String {
    paint(text, Style::new().blue())
}
