use chrono::{DateTime, Local, Utc};
use console::{Color, Style};

use super::traits::ChatRenderer;
use crate::agent::personas::SYSTEM_AGENT;
use crate::routing::PersonaSet;
use crate::sessions::{Message, Role, SessionSnapshot};

const UPDATED_FORMAT: &str = "%b %d %H:%M";

const BOLD_ON: &str = "\x1b[1m";
const BOLD_OFF: &str = "\x1b[22m";
const ITALIC_ON: &str = "\x1b[3m";
const ITALIC_OFF: &str = "\x1b[23m";

/// Renders sessions as plain or ANSI-styled terminal text.
pub struct TerminalRenderer {
    colors: bool,
    recent_agents_limit: usize,
}

impl TerminalRenderer {
    pub fn new(colors: bool, recent_agents_limit: usize) -> Self {
        Self {
            colors,
            recent_agents_limit,
        }
    }

    /// Styled when stdout is a color-capable terminal.
    pub fn for_stdout(recent_agents_limit: usize) -> Self {
        Self::new(console::colors_enabled(), recent_agents_limit)
    }

    fn paint(&self, text: &str, style: &Style) -> String {
        if self.colors {
            style.apply_to(text).force_styling(true).to_string()
        } else {
            text.to_string()
        }
    }

    /// Replace the `<strong>`/`<em>` markup produced by text cleanup.
    fn format_content(&self, content: &str) -> String {
        let (bold_on, bold_off, italic_on, italic_off) = if self.colors {
            (BOLD_ON, BOLD_OFF, ITALIC_ON, ITALIC_OFF)
        } else {
            ("", "", "", "")
        };
        content
            .replace("<strong>", bold_on)
            .replace("</strong>", bold_off)
            .replace("<em>", italic_on)
            .replace("</em>", italic_off)
    }

    fn persona_label(&self, name: &str, personas: &PersonaSet) -> String {
        match personas.get(name) {
            Some(persona) => {
                let style = Style::new().bold().fg(hex_to_color(&persona.color));
                let label = if persona.icon.is_empty() {
                    persona.name.clone()
                } else {
                    format!("{} {}", persona.icon, persona.name)
                };
                self.paint(&label, &style)
            }
            None => self.paint(name, &Style::new().bold()),
        }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new(false, 3)
    }
}

impl ChatRenderer for TerminalRenderer {
    fn render_sidebar(&self, snapshot: &SessionSnapshot, personas: &PersonaSet) -> String {
        let heading = Style::new().bold().underlined();
        let dim = Style::new().dim();
        let mut lines = Vec::new();

        lines.push(self.paint("Recent conversations", &heading));
        if snapshot.recent_conversations.is_empty() {
            lines.push(self.paint("  (none yet)", &dim));
        }
        for summary in &snapshot.recent_conversations {
            let marker = if summary.is_current { "▸" } else { " " };
            let short_id: String = summary.id.chars().take(8).collect();
            lines.push(format!(
                " {marker} {} {}",
                summary.title,
                self.paint(
                    &format!(
                        "[{short_id}, {} msgs, {}]",
                        summary.message_count,
                        format_updated(summary.last_updated)
                    ),
                    &dim
                )
            ));
        }

        let recent: Vec<&String> = snapshot
            .used_agents
            .iter()
            .take(self.recent_agents_limit)
            .collect();
        if !recent.is_empty() {
            lines.push(String::new());
            lines.push(self.paint("Recent personas", &heading));
            for name in recent {
                lines.push(format!("   {}", self.persona_label(name, personas)));
            }
        }

        lines.push(String::new());
        match snapshot.active_agent.as_deref() {
            Some(name) => lines.push(format!("Pinned: {}", self.persona_label(name, personas))),
            None => lines.push(self.paint("Routing: automatic", &dim)),
        }

        lines.join("\n")
    }

    fn render_chat(&self, messages: &[Message], personas: &PersonaSet) -> String {
        let mut blocks = Vec::with_capacity(messages.len());
        for message in messages {
            let header = match (message.role, message.agent_name.as_deref()) {
                (Role::User, _) => self.paint("You", &Style::new().bold().cyan()),
                (Role::Assistant, Some(SYSTEM_AGENT)) => {
                    self.paint(SYSTEM_AGENT, &Style::new().bold().red())
                }
                (Role::Assistant, Some(name)) => self.persona_label(name, personas),
                (Role::Assistant, None) => self.paint("Assistant", &Style::new().bold()),
            };
            let body = match message.agent_name.as_deref() {
                Some(SYSTEM_AGENT) => self.paint(&message.content, &Style::new().red()),
                _ => self.format_content(&message.content),
            };
            blocks.push(format!("{header}\n{body}"));
        }
        blocks.join("\n\n")
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

/// Conversation timestamps in the viewer's local time.
fn format_updated(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(UPDATED_FORMAT).to_string()
}

/// Map a `#RRGGBB` string to the nearest xterm-256 color cube entry.
/// Anything unparsable renders white.
pub fn hex_to_color(hex: &str) -> Color {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Color::White;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => {
            let level = |c: u8| (u16::from(c) * 5 + 127) / 255;
            let index = 16 + 36 * level(r) + 6 * level(g) + level(b);
            Color::Color256(u8::try_from(index).unwrap_or(15))
        }
        _ => Color::White,
    }
}
