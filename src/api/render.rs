//! HTML rendering from embedded templates.
//!
//! Templates use `{{key}}` placeholders. Values passed through [`Page::with`]
//! are HTML-escaped; only fragments rendered by this module are inserted
//! verbatim.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;
use std::fmt::Write as _;
use thiserror::Error;

use super::ApiError;
use super::session::{Flash, SessionContext};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

const BASE_TEMPLATE: &str = "base.html";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    Missing(String),

    #[error("Template {0} is not valid UTF-8")]
    Encoding(String),
}

fn load(name: &str) -> Result<String, RenderError> {
    let file = Templates::get(name).ok_or_else(|| RenderError::Missing(name.to_string()))?;
    String::from_utf8(file.data.into_owned()).map_err(|_| RenderError::Encoding(name.to_string()))
}

/// Replaces every `{{key}}` with `lookup(key)`; unknown keys render empty.
fn fill<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        if let Some(value) = lookup(after[..end].trim()) {
            out.push_str(value);
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Renders a partial template. Every value is escaped.
pub fn render_fragment(name: &str, values: &[(&str, &str)]) -> Result<String, RenderError> {
    let template = load(name)?;
    let escaped: Vec<(&str, String)> = values
        .iter()
        .map(|(k, v)| (*k, html_escape::encode_text(v).into_owned()))
        .collect();

    Ok(fill(&template, |key| {
        escaped
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }))
}

fn nav(authenticated: bool) -> String {
    let mut links = vec![
        ("/", "Home"),
        ("/Howitworks", "How it works"),
        ("/faq", "FAQ"),
    ];
    if authenticated {
        links.push(("/uploadmri", "Upload"));
        links.push(("/logout", "Log out"));
    } else {
        links.push(("/login", "Log in"));
        links.push(("/register", "Register"));
    }

    let mut html = String::from("<nav><ul>");
    for (href, label) in links {
        let _ = write!(html, r#"<li><a href="{href}">{label}</a></li>"#);
    }
    html.push_str("</ul></nav>");
    html
}

fn flash_list(flashes: &[Flash]) -> String {
    if flashes.is_empty() {
        return String::new();
    }

    let mut html = String::from(r#"<ul class="flashes">"#);
    for flash in flashes {
        let _ = write!(
            html,
            r#"<li class="flash {}">{}</li>"#,
            flash.level.css_class(),
            html_escape::encode_text(&flash.message)
        );
    }
    html.push_str("</ul>");
    html
}

/// A full page: content template wrapped in the base layout.
#[derive(Debug)]
pub struct Page {
    template: &'static str,
    title: String,
    status: StatusCode,
    values: Vec<(&'static str, String)>,
}

impl Page {
    #[must_use]
    pub fn new(template: &'static str, title: impl Into<String>) -> Self {
        Self {
            template,
            title: title.into(),
            status: StatusCode::OK,
            values: Vec::new(),
        }
    }

    /// Text value, escaped for element content.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl AsRef<str>) -> Self {
        self.values
            .push((key, html_escape::encode_text(value.as_ref()).into_owned()));
        self
    }

    /// Value placed inside a double-quoted attribute.
    #[must_use]
    pub fn with_attr(mut self, key: &'static str, value: impl AsRef<str>) -> Self {
        self.values.push((
            key,
            html_escape::encode_double_quoted_attribute(value.as_ref()).into_owned(),
        ));
        self
    }

    /// Pre-rendered markup from [`render_fragment`].
    #[must_use]
    pub fn with_html(mut self, key: &'static str, html: String) -> Self {
        self.values.push((key, html));
        self
    }

    #[must_use]
    pub const fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_html(&self, authenticated: bool, flashes: &[Flash]) -> Result<String, RenderError> {
        let content = fill(&load(self.template)?, |key| self.lookup(key));
        let title = html_escape::encode_text(&self.title);
        let nav = nav(authenticated);
        let flashes = flash_list(flashes);

        Ok(fill(&load(BASE_TEMPLATE)?, |key| match key {
            "title" => Some(title.as_ref()),
            "nav" => Some(nav.as_str()),
            "flashes" => Some(flashes.as_str()),
            "content" => Some(content.as_str()),
            _ => None,
        }))
    }

    /// Renders the page, consuming any pending flash messages.
    pub async fn render(self, session: &SessionContext) -> Result<Response, ApiError> {
        let flashes = session.take_flashes().await?;
        let authenticated = session.is_authenticated().await?;
        let body = self
            .to_html(authenticated, &flashes)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok((self.status, Html(body)).into_response())
    }
}

/// Error page rendered without session access.
pub fn error_page(status: StatusCode, message: &str) -> Result<String, RenderError> {
    let title = status.canonical_reason().unwrap_or("Error");
    Page::new("error.html", title)
        .status(status)
        .with("status", status.as_str())
        .with("message", message)
        .to_html(false, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::session::FlashLevel;

    #[test]
    fn test_fill() {
        let out = fill("<p>{{ a }}-{{b}}-{{missing}}</p>{{", |k| match k {
            "a" => Some("1"),
            "b" => Some("2"),
            _ => None,
        });
        assert_eq!(out, "<p>1-2-</p>{{");
    }

    #[test]
    fn values_are_escaped() {
        let page = Page::new("uploadmri.html", "Upload")
            .with("filename", "<script>x</script>.png")
            .with_attr("accept", r#"".png"#);
        assert_eq!(page.lookup("filename"), Some("&lt;script&gt;x&lt;/script&gt;.png"));
        assert_eq!(page.lookup("accept"), Some("&quot;.png"));
    }

    #[test]
    fn page_wraps_content_in_base_layout() {
        let flashes = vec![Flash {
            level: FlashLevel::Error,
            message: "No selected file.".to_string(),
        }];
        let html = Page::new("login.html", "Log in")
            .to_html(false, &flashes)
            .unwrap();

        assert!(html.contains("<title>Log in"));
        assert!(html.contains(r#"name="email""#));
        assert!(html.contains("No selected file."));
        assert!(html.contains(r#"href="/register""#));
        assert!(!html.contains(r#"href="/logout""#));
    }

    #[test]
    fn error_page_shows_status_and_message() {
        let html = error_page(StatusCode::NOT_FOUND, "Segmentation not found").unwrap();
        assert!(html.contains("404"));
        assert!(html.contains("Segmentation not found"));
    }

    #[test]
    fn fragments_escape_values() {
        let html = render_fragment(
            "partials/result.html",
            &[("label", "<b>Cat</b>"), ("confidence", "90.0%"), ("filename", "a.png")],
        )
        .unwrap();
        assert!(html.contains("&lt;b&gt;Cat&lt;/b&gt;"));
        assert!(html.contains("90.0%"));
    }
}
