//! The embeddable widget script served to customer sites.

use tera::{Context, Tera};

use crate::db::entities::widget;

const EMBED_TEMPLATE: &str = include_str!("../../templates/embed.js.tera");

pub fn render_embed_script(widget: &widget::Model, public_url: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("widget_key", &js_string(&widget.public_key));
    context.insert("api_base", &js_string(public_url));
    context.insert("theme_color", &js_string(&widget.theme_color));
    context.insert("position", &js_string(&widget.position));
    context.insert(
        "greeting",
        &js_string(widget.greeting.as_deref().unwrap_or_default()),
    );
    Tera::one_off(EMBED_TEMPLATE, &context, false)
}

/// A JavaScript string literal that is also safe inside an inline `<script>`.
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn widget() -> widget::Model {
        widget::Model {
            id: 1,
            tenant_id: 1,
            bot_id: 1,
            name: "Site".to_string(),
            public_key: "abc123".to_string(),
            allowed_domains: String::new(),
            theme_color: "#2563eb".to_string(),
            position: "bottom-right".to_string(),
            greeting: Some("Hello \"friend\" </script>".to_string()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn script_embeds_widget_settings() {
        let js = render_embed_script(&widget(), "https://chatdesk.test").unwrap();
        assert!(js.contains(r#""abc123""#));
        assert!(js.contains(r#""https://chatdesk.test""#));
        assert!(js.contains("bottom-right"));
    }

    #[test]
    fn greeting_is_escaped_as_a_js_string() {
        let js = render_embed_script(&widget(), "https://chatdesk.test").unwrap();
        assert!(js.contains(r#"Hello \"friend\""#));
        assert!(!js.contains("</script>"));
    }
}
