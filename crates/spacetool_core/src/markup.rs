//! Small helpers for building storage-format (XHTML) fragments.

pub fn escape_html(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }
    output
}

/// Keep at most `max_chars` Unicode scalar values.
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

pub fn heading(level: u8, text: &str) -> String {
    format!("<h{level}>{}</h{level}>", escape_html(text))
}

pub fn paragraph(text: &str) -> String {
    format!("<p>{}</p>", escape_html(text))
}

pub fn preformatted(text: &str) -> String {
    format!("<pre>{}</pre>", escape_html(text))
}

pub fn link_paragraph(href: &str, label: &str) -> String {
    format!(
        "<p><a href=\"{}\">{}</a></p>",
        escape_html(href),
        escape_html(label)
    )
}

/// Render rows as a table; the first row becomes the header.
pub fn table(rows: &[Vec<String>]) -> String {
    let mut output = String::from("<table>");
    let mut iter = rows.iter();
    if let Some(header) = iter.next() {
        output.push_str("<thead><tr>");
        for cell in header {
            output.push_str("<th>");
            output.push_str(&escape_html(cell));
            output.push_str("</th>");
        }
        output.push_str("</tr></thead>");
    }
    output.push_str("<tbody>");
    for row in iter {
        output.push_str("<tr>");
        for cell in row {
            output.push_str("<td>");
            output.push_str(&escape_html(cell));
            output.push_str("</td>");
        }
        output.push_str("</tr>");
    }
    output.push_str("</tbody></table>");
    output
}
