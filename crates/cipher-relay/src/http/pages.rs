//! HTML pages served by the relay.

use crate::domain::types::MessageRecord;
use std::fmt::Write;

/// Seconds between client-side reloads of the message page.
pub const REFRESH_INTERVAL_SECS: u64 = 10;

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; background-color: #f0f2f5; }
        .container { background-color: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        h1 { color: #1a73e8; text-align: center; }
        .message { padding: 10px; margin: 10px 0; background-color: #f8f9fa; border-left: 4px solid #1a73e8; border-radius: 4px; }
        .encrypted, .decrypted { margin: 5px 0; }
        .label { font-weight: bold; color: #1a73e8; }
        .timestamp { color: #666; font-size: 0.8em; }
        .refresh-button { background-color: #1a73e8; color: white; border: none; padding: 10px 20px; border-radius: 4px; cursor: pointer; margin-bottom: 20px; }
        .refresh-button:hover { background-color: #1557b0; }
"#;

/// Escape text for use inside HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Message log page, oldest record first.
pub fn render_messages(messages: &[MessageRecord]) -> String {
    let mut body = String::new();
    for message in messages {
        let _ = write!(
            body,
            r#"
        <div class="message">
            <div class="encrypted"><span class="label">Encrypted:</span> {}</div>"#,
            escape_html(&message.encrypted_text)
        );
        if let Some(decrypted) = &message.decrypted_text {
            let _ = write!(
                body,
                r#"
            <div class="decrypted"><span class="label">Decrypted:</span> {}</div>"#,
                escape_html(decrypted)
            );
        }
        let _ = write!(
            body,
            r#"
            <div class="timestamp">Received: {}</div>
        </div>"#,
            escape_html(&message.timestamp)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Encrypted Messages</title>
    <style>{style}</style>
    <script>
        function refreshPage() {{
            location.reload();
        }}
        setInterval(refreshPage, {interval_ms});
    </script>
</head>
<body>
    <div class="container">
        <h1>Encrypted Messages</h1>
        <button class="refresh-button" onclick="refreshPage()">Refresh Messages</button>{body}
    </div>
</body>
</html>
"#,
        style = STYLE,
        interval_ms = REFRESH_INTERVAL_SECS * 1000,
        body = body,
    )
}

/// Operator form for changing the response option.
///
/// `pending_id` and `return_url` are carried through as hidden fields.
pub fn render_option_form(
    current_option: &str,
    pending: Option<&(String, String)>,
    pending_id: Option<&str>,
    return_url: Option<&str>,
) -> String {
    let mut hidden = String::new();
    if let Some(id) = pending_id {
        let _ = write!(
            hidden,
            r#"
        <input type="hidden" name="pending_id" value="{}">"#,
            escape_html(id)
        );
    }
    if let Some(url) = return_url {
        let _ = write!(
            hidden,
            r#"
        <input type="hidden" name="return_url" value="{}">"#,
            escape_html(url)
        );
    }

    let waiting = match pending {
        Some((encrypted, decrypted)) => format!(
            r#"
    <p class="waiting">Waiting submission: <b>{}</b> ({})</p>"#,
            escape_html(decrypted),
            escape_html(encrypted)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Set Custom Response Option</title>
</head>
<body>
    <h1>Set Custom Response Option</h1>
    <p>Current response option: {current}</p>{waiting}
    <form method="POST" action="/set_response">
        <label for="new_response">Enter new response option:</label>
        <input type="text" id="new_response" name="new_response" placeholder="Type your custom response here">{hidden}
        <button type="submit">Update Response</button>
    </form>
</body>
</html>
"#,
        current = escape_html(current_option),
        waiting = waiting,
        hidden = hidden,
    )
}

/// Confirmation shown after a plain option update.
pub fn render_option_updated() -> String {
    r#"<p>Response option updated successfully!</p>
<a href="/set_response">Go back</a>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#x27;y&#x27;&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_messages_page_lists_records_in_order() {
        let records = vec![
            MessageRecord {
                encrypted_text: "Khoor".into(),
                decrypted_text: Some("Hello".into()),
                timestamp: "2024-05-01 10:00:00".into(),
            },
            MessageRecord {
                encrypted_text: "<b>".into(),
                decrypted_text: None,
                timestamp: "2024-05-01 10:00:01".into(),
            },
        ];
        let page = render_messages(&records);

        let first = page.find("Khoor").unwrap();
        let second = page.find("&lt;b&gt;").unwrap();
        assert!(first < second);
        assert!(page.contains("Hello"));
        assert!(page.contains("setInterval(refreshPage, 10000)"));
        assert_eq!(page.matches("class=\"decrypted\"").count(), 1);
    }

    #[test]
    fn test_form_carries_hidden_fields() {
        let page = render_option_form("Now", None, Some("abc"), Some("/"));
        assert!(page.contains(r#"name="pending_id" value="abc""#));
        assert!(page.contains(r#"name="return_url" value="/""#));
        assert!(page.contains("Current response option: Now"));

        let plain = render_option_form("Now", None, None, None);
        assert!(!plain.contains("type=\"hidden\""));
    }

    #[test]
    fn test_form_shows_waiting_submission() {
        let pending = ("Khoor".to_string(), "Hello".to_string());
        let page = render_option_form("Now", Some(&pending), Some("abc"), None);
        assert!(page.contains("Waiting submission: <b>Hello</b> (Khoor)"));
    }
}
