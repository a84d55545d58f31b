// SPDX-License-Identifier: MIT OR Apache-2.0

use std::borrow::Cow;

/// Escape `& < > " '` so a line can be embedded in an HTML document.
///
/// Borrows when nothing needs escaping.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    let Some(first) = input.find(['&', '<', '>', '"', '\'']) else {
        return Cow::Borrowed(input);
    };
    let mut out = String::with_capacity(input.len() + 16);
    out.push_str(&input[..first]);
    for ch in input[first..].chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(escape_html("load average: 0.10"), Cow::Borrowed(_)));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&#34;x&#34;) &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn keeps_unicode() {
        assert_eq!(escape_html("ü <ß>"), "ü &lt;ß&gt;");
    }

    proptest! {
        #[test]
        fn output_has_no_raw_markup(s in ".{0,64}") {
            let escaped = escape_html(&s);
            prop_assert!(!escaped.contains(['<', '>', '"', '\'']));
        }
    }
}
