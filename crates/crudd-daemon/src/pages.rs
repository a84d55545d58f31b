// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedded HTML templates and their rendering.
//!
//! Templates use `{{key}}` placeholders. Values are inserted verbatim, so
//! anything derived from user or command data must be escaped first.

use crudd_catalog::{Catalog, CommandSpec};
use crudd_exec::escape_html;
use std::fmt::Write as _;

/// Rendering failure for an embedded template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A placeholder has no value.
    #[error("template {template}: no value for '{key}'")]
    MissingValue {
        /// Template name.
        template: &'static str,
        /// Placeholder key.
        key: String,
    },

    /// A `{{` without a matching `}}`.
    #[error("template {template}: unterminated placeholder at byte {offset}")]
    Unterminated {
        /// Template name.
        template: &'static str,
        /// Byte offset of the opening braces.
        offset: usize,
    },
}

/// A named template compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    name: &'static str,
    source: &'static str,
}

/// Landing page listing the catalog.
pub const INDEX: Template = Template::new("index.html", include_str!("../templates/index.html"));

/// Markup preceding command output; ends inside `<pre>`.
pub const COMMAND_HEADER: Template = Template::new(
    "command_header.html",
    include_str!("../templates/command_header.html"),
);

/// Markup following the exit status line.
pub const COMMAND_FOOTER: Template = Template::new(
    "command_footer.html",
    include_str!("../templates/command_footer.html"),
);

impl Template {
    /// Wrap a template source.
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }

    /// Template name, as used in errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Substitute every `{{key}}` from `vars`.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source;
        let mut consumed = 0usize;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or(TemplateError::Unterminated {
                template: self.name,
                offset: consumed + open,
            })?;
            let key = after[..close].trim();
            let value = vars
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| TemplateError::MissingValue {
                    template: self.name,
                    key: key.to_owned(),
                })?;
            out.push_str(value);

            let advance = open + 2 + close + 2;
            consumed += advance;
            rest = &rest[advance..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Inline replacement for a page whose template failed.
pub fn template_failure(err: &TemplateError) -> String {
    format!("failed to execute template: {}", escape_html(&err.to_string()))
}

/// Render the landing page for a probed catalog.
pub fn index(catalog: &Catalog) -> Result<String, TemplateError> {
    let existing = list_items(catalog.existing(), true);
    let missing = list_items(catalog.missing(), false);
    let missing_count = catalog.missing().count().to_string();
    INDEX.render(&[
        ("existing_commands", &existing),
        ("missing_commands", &missing),
        ("missing_count", &missing_count),
    ])
}

/// Render the header for one command page.
pub fn command_header(command: &CommandSpec) -> Result<String, TemplateError> {
    COMMAND_HEADER.render(&[("title", &escape_html(&command.title()))])
}

/// Render the footer for one command page.
pub fn command_footer() -> Result<String, TemplateError> {
    COMMAND_FOOTER.render(&[])
}

fn list_items<'a>(commands: impl Iterator<Item = &'a CommandSpec>, linked: bool) -> String {
    let mut html = String::new();
    for command in commands {
        let name = escape_html(&command.name);
        let title = command.title();
        let title = escape_html(&title);
        if linked {
            let _ = writeln!(html, r#"        <li><a href="/{name}" title="{title}">{name}</a></li>"#);
        } else {
            let _ = writeln!(html, r#"        <li><span title="{title}">{name}</span></li>"#);
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let mut uptime = CommandSpec::new("uptime", "/usr/bin/uptime", "");
        uptime.exists = true;
        let pingv6 = CommandSpec::new("pingv6", "/bin/ping", "-6 -c 4 ::1");
        Catalog::new([uptime, pingv6]).unwrap()
    }

    #[test]
    fn renders_placeholders() {
        let t = Template::new("t", "a {{x}} b {{ y }} c");
        assert_eq!(t.render(&[("x", "1"), ("y", "2")]).unwrap(), "a 1 b 2 c");
    }

    #[test]
    fn missing_value_is_an_error() {
        let t = Template::new("t", "{{nope}}");
        assert_eq!(
            t.render(&[]).unwrap_err(),
            TemplateError::MissingValue { template: "t", key: "nope".into() }
        );
    }

    #[test]
    fn unterminated_placeholder_reports_offset() {
        let t = Template::new("t", "ab{{x}}cd{{y");
        assert_eq!(
            t.render(&[("x", "")]).unwrap_err(),
            TemplateError::Unterminated { template: "t", offset: 9 }
        );
    }

    #[test]
    fn failure_text_is_escaped() {
        let err = TemplateError::MissingValue { template: "t", key: "<k>".into() };
        let text = template_failure(&err);
        assert!(text.starts_with("failed to execute template: "));
        assert!(text.contains("&lt;k&gt;"));
    }

    #[test]
    fn embedded_templates_render() {
        let page = index(&catalog()).unwrap();
        assert!(page.contains("<title>CRUDD</title>"));
        assert!(page.contains(r#"<a href="/uptime""#));
        assert!(page.contains(r#"<span title="/bin/ping -6 -c 4 ::1">pingv6</span>"#));
        assert!(page.contains("Unavailable commands (1)"));
        assert!(page.contains(r#"<div class="copyright">"#));
    }

    #[test]
    fn header_ends_inside_pre() {
        let spec = CommandSpec::new("echo", "/bin/echo", "<hi>");
        let header = command_header(&spec).unwrap();
        assert!(header.ends_with("<pre>"));
        assert!(header.contains("/bin/echo &lt;hi&gt;"));
        assert!(command_footer().unwrap().starts_with("</pre>"));
    }
}
