//! Embedded preview resources.
//!
//! - `serve::PREVIEW_JS`: live-reload client served at `/quire-preview.js`
//! - `serve::CLIENT_HTML`: per-page bootstrap injected into HTML responses
//! - `serve::RENDER_ERROR_HTML`: page shown when a preview render fails
//!
//! ```ignore
//! use embed::serve::{RENDER_ERROR_HTML, RenderErrorVars};
//!
//! let html = RENDER_ERROR_HTML.render(&RenderErrorVars { title: "index.qmd", message: &msg });
//! ```

mod template;

pub use template::{Template, TemplateVars};

pub mod serve {
    use super::{Template, TemplateVars};
    use crate::utils::html::{escape, escape_script_text};

    /// URL path of the live-reload client.
    pub const PREVIEW_JS_PATH: &str = "/quire-preview.js";

    /// Live-reload client script.
    pub const PREVIEW_JS: &str = include_str!("serve/quire-preview.js");

    /// Id of the element carrying a render error message.
    pub const RENDER_ERROR_ID: &str = "quire-render-error";

    /// Variables for the injected client bootstrap.
    pub struct ClientVars<'a> {
        /// Project-relative input behind the served page.
        pub input_file: Option<&'a str>,
        pub is_presentation: bool,
    }

    impl TemplateVars for ClientVars<'_> {
        fn apply(&self, content: &str) -> String {
            let input = serde_json::to_string(&self.input_file).unwrap_or_else(|_| "null".into());
            content
                .replace("__QUIRE_INPUT_FILE__", &escape_script_text(&input))
                .replace("__QUIRE_IS_PRESENTATION__", if self.is_presentation { "true" } else { "false" })
                .replace("__QUIRE_PREVIEW_JS__", PREVIEW_JS_PATH)
        }
    }

    /// Bootstrap injected before `</body>` of every served HTML page.
    pub const CLIENT_HTML: Template<ClientVars<'static>> =
        Template::new(include_str!("serve/client.html"));

    /// Variables for the render error page.
    pub struct RenderErrorVars<'a> {
        pub title: &'a str,
        pub message: &'a str,
    }

    impl TemplateVars for RenderErrorVars<'_> {
        fn apply(&self, content: &str) -> String {
            content
                .replace("__QUIRE_ERROR_ID__", RENDER_ERROR_ID)
                .replace("__QUIRE_TITLE__", &escape(self.title))
                .replace("__QUIRE_MESSAGE__", &escape_script_text(self.message))
        }
    }

    /// Error page; the message sits in a `text/plain` script element the
    /// client script (and tooling) can detect by id.
    pub const RENDER_ERROR_HTML: Template<RenderErrorVars<'static>> =
        Template::new(include_str!("serve/render-error.html"));
}

#[cfg(test)]
mod tests {
    use super::serve::*;

    #[test]
    fn test_client_vars() {
        let html = CLIENT_HTML.render(&ClientVars {
            input_file: Some("posts/a.qmd"),
            is_presentation: true,
        });
        assert!(html.contains(r#"inputFile: "posts/a.qmd""#));
        assert!(html.contains("isPresentation: true"));
        assert!(html.contains(r#"src="/quire-preview.js""#));

        let html = CLIENT_HTML.render(&ClientVars {
            input_file: None,
            is_presentation: false,
        });
        assert!(html.contains("inputFile: null"));
    }

    #[test]
    fn test_render_error_page() {
        let html = RENDER_ERROR_HTML.render(&RenderErrorVars {
            title: "a<b>.qmd",
            message: "engine failed: </script> broke",
        });
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains(r#"<script id="quire-render-error" type="text/plain">"#));
        assert!(html.contains("<title>a&lt;b&gt;.qmd Render Error</title>"));
        assert!(html.contains("engine failed: <\\/script> broke"));
    }
}
