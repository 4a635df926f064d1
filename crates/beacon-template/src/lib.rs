// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Template renderer for outbound messages.
//!
//! Templates contain `{name}` placeholders. A placeholder may address nested
//! data with dots (`{order.total}`). Rendering is a pure function of the
//! template and the data: no I/O, no clock, no randomness, so identical
//! inputs always produce byte-identical output.
//!
//! Placeholders with no matching value are left in place verbatim so a
//! missing variable is visible in previews instead of silently vanishing.

use std::sync::LazyLock;

use beacon_core::{ContentButton, RenderedContent, Template, TemplateData};
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}").unwrap());

/// Render `template` with `data`.
///
/// Returns `None` when there is no template or it is inactive: nothing to
/// send, which callers decide how to treat.
pub fn render(template: Option<&Template>, data: &TemplateData) -> Option<RenderedContent> {
    let template = template.filter(|t| t.active)?;
    Some(render_template(template, data))
}

/// Render a template regardless of its `active` flag.
///
/// Used when a caller pins a specific template id.
pub fn render_template(template: &Template, data: &TemplateData) -> RenderedContent {
    RenderedContent {
        subject: template.subject.as_deref().map(|s| render_text(s, data)),
        body_text: render_text(&template.body_text, data),
        body_html: template.body_html.as_deref().map(|h| render_html(h, data)),
        buttons: template
            .buttons
            .iter()
            .map(|button| ContentButton {
                label: render_text(&button.label, data),
                url: button.url.as_deref().map(|u| render_text(u, data)),
                payload: button.payload.as_deref().map(|p| render_text(p, data)),
            })
            .collect(),
    }
}

/// Substitute placeholders in plain text.
pub fn render_text(text: &str, data: &TemplateData) -> String {
    substitute(text, data, |value| value)
}

/// Substitute placeholders in HTML, escaping substituted values.
///
/// The template markup itself is trusted and left untouched.
pub fn render_html(html: &str, data: &TemplateData) -> String {
    substitute(html, data, |value| html_escape(&value))
}

/// Placeholder names in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Placeholders in rendered content that had no value.
pub fn unresolved(content: &RenderedContent) -> Vec<String> {
    let mut names = Vec::new();
    let texts = content
        .subject
        .iter()
        .chain(std::iter::once(&content.body_text))
        .chain(content.body_html.iter())
        .chain(content.buttons.iter().flat_map(|b| {
            std::iter::once(&b.label)
                .chain(b.url.iter())
                .chain(b.payload.iter())
        }));
    for text in texts {
        for name in placeholders(text) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn substitute(text: &str, data: &TemplateData, escape: impl Fn(String) -> String) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match lookup(data, &caps[1]) {
            Some(value) => escape(format_value(value)),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn lookup<'a>(data: &'a TemplateData, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Textual form of a bound value. Strings are inserted raw, `null` as the
/// empty string, composite values as compact JSON.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
