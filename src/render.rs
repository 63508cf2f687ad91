// Template loading and Markdown rendering for the web UI.

use std::path::{Path, PathBuf};

use minijinja::{path_loader, Environment, Value};
use minijinja_autoreload::AutoReloader;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

// Link and image targets with any other scheme are replaced by "#".
const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Loads templates from `dir`, reloading them when files change.
pub fn create_minijinja_env(dir: impl AsRef<Path>) -> AutoReloader {
    let dir: PathBuf = dir.as_ref().to_path_buf();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

pub fn render_template(
    templates: &AutoReloader,
    name: &str,
    context: Value,
) -> Result<String, minijinja::Error> {
    let env = templates.acquire_env()?;
    let template = env.get_template(name)?;
    let rendered = template.render(context)?;
    Ok(rendered)
}

/// Markdown to HTML. Raw HTML in the source is escaped, not passed through,
/// and link or image targets outside http, https and mailto are neutralized.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Link {
                link_type,
                dest_url: safe_destination(dest_url),
                title,
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Image {
                link_type,
                dest_url: safe_destination(dest_url),
                title,
                id,
            }),
            other => other,
        });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

// Relative targets have no scheme and pass. Browsers drop whitespace and
// control characters inside a scheme, so those are ignored while looking.
fn safe_destination(dest: CowStr<'_>) -> CowStr<'_> {
    let cleaned: String = dest
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();
    match cleaned.find(|c: char| matches!(c, ':' | '/' | '?' | '#')) {
        Some(end) if cleaned[end..].starts_with(':') => {
            let scheme = cleaned[..end].to_ascii_lowercase();
            if SAFE_SCHEMES.contains(&scheme.as_str()) {
                dest
            } else {
                CowStr::Borrowed("#")
            }
        }
        _ => dest,
    }
}

/// Same as [`markdown_to_html`], wrapped so templates do not escape it again.
pub fn markdown_value(markdown: &str) -> Value {
    Value::from_safe_string(markdown_to_html(markdown))
}
