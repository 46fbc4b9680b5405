//! Message content rendering.
//!
//! Builds the HTML + plain-text pair once per event via Handlebars string
//! templates. Role-assignment mail omits the unsubscribe footer; the
//! consolidated mention/watcher mail includes it.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::NotificationResult;

const NOTIFICATION_HTML_TEMPLATE: &str = r#"<div>
  <p>{{summary}}</p>
  {{#if body}}<div>{{{body}}}</div>
  {{/if}}<p><a href="{{url}}">View in tracker</a></p>
{{#if unsubscribe_address}}  <p style="color:#888;font-size:12px">Stop receiving these messages: email <a href="mailto:{{unsubscribe_address}}">{{unsubscribe_address}}</a></p>
{{/if}}</div>"#;

// Triple-stache throughout: the text body must not be HTML-escaped.
const NOTIFICATION_TEXT_TEMPLATE: &str = r#"{{{summary}}}

{{#if body}}{{{body}}}

{{/if}}View in tracker: {{{url}}}
{{#if unsubscribe_address}}
Stop receiving these messages: email {{{unsubscribe_address}}}
{{/if}}"#;

/// Rendered message pair shared by every recipient of one dispatch.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub html: String,
    pub text: String,
}

#[derive(Serialize)]
struct MessageData<'a> {
    summary: &'a str,
    body: Option<&'a str>,
    url: &'a str,
    unsubscribe_address: Option<&'a str>,
}

/// Template engine for notification bodies.
pub struct MessageComposer {
    handlebars: Handlebars<'static>,
}

impl MessageComposer {
    /// Create a composer with the notification templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_template_string("notification_html", NOTIFICATION_HTML_TEMPLATE)?;
        handlebars.register_template_string("notification_text", NOTIFICATION_TEXT_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// Render the HTML/text pair for one dispatch.
    ///
    /// `body` is the already-rendered event text, if the event carries any;
    /// `unsubscribe_address` adds the footer for carbon/mention recipients.
    pub fn compose(
        &self,
        summary: &str,
        body: Option<&str>,
        url: &str,
        unsubscribe_address: Option<&str>,
    ) -> NotificationResult<RenderedMessage> {
        let data = MessageData { summary, body, url, unsubscribe_address };
        let html = self.handlebars.render("notification_html", &data)?;
        let text = self.handlebars.render("notification_text", &data)?;
        Ok(RenderedMessage { html, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_body_and_link() {
        let composer = MessageComposer::new().unwrap();
        let message = composer
            .compose(
                "Alice commented on issue #3 - Crash",
                Some("<p>fixed in trunk</p>"),
                "https://tracker.example.com/backend/issues/3",
                None,
            )
            .unwrap();

        assert!(message.html.contains("<p>fixed in trunk</p>"));
        assert!(message.html.contains("https://tracker.example.com/backend/issues/3"));
        assert!(message.text.contains("fixed in trunk"));
        assert!(!message.html.contains("Stop receiving"));
        assert!(!message.text.contains("Stop receiving"));
    }

    #[test]
    fn unsubscribe_footer_is_opt_in() {
        let composer = MessageComposer::new().unwrap();
        let message = composer
            .compose(
                "Alice commented on issue #3 - Crash",
                None,
                "https://tracker.example.com/backend/issues/3",
                Some("unsubscribe+3@tracker.example.com"),
            )
            .unwrap();

        assert!(message.html.contains("unsubscribe+3@tracker.example.com"));
        assert!(message.text.contains("unsubscribe+3@tracker.example.com"));
    }
}
