use pulldown_cmark::{html, Options, Parser};
use std::collections::{HashMap, HashSet};
use tera::{Tera, Value};

/// Renders post markdown to HTML and cleans the result, so raw HTML or
/// script embedded in a post never reaches the page.
pub fn render_markdown(markdown_input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown_input, options);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);

    ammonia::Builder::default()
        .add_tags(&["input"])
        .add_tag_attributes("input", &["type", "checked", "disabled"])
        .add_tag_attributes("code", &["class"])
        .link_rel(Some("noopener noreferrer"))
        .clean(&unsafe_html)
        .to_string()
}

/// Strips all HTML tags from input (for titles/summaries)
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

fn markdown_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = tera::try_get_value!("markdown", "value", String, value);
    Ok(Value::String(render_markdown(&input)))
}

fn plaintext_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let input = tera::try_get_value!("plaintext", "value", String, value);
    Ok(Value::String(strip_all_html(&render_markdown(&input))))
}

/// Loads every template under `templates_dir` and registers the content filters.
pub fn build_tera(templates_dir: &str) -> tera::Result<Tera> {
    let mut tera = Tera::new(&format!("{}/**/*", templates_dir.trim_end_matches('/')))?;
    register_filters(&mut tera);
    Ok(tera)
}

pub fn register_filters(tera: &mut Tera) {
    tera.register_filter("markdown", markdown_filter);
    tera.register_filter("plaintext", plaintext_filter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tera::Context;

    #[test]
    fn markdown_renders_extensions() {
        let html = render_markdown("# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>old</del>"));
    }

    #[test]
    fn markdown_drops_scripts_and_handlers() {
        let html = render_markdown("hello <script>alert(1)</script>\n\n<img src=\"x.png\" onerror=\"alert(1)\">");
        assert!(!html.contains("<script"));
        assert!(!html.contains("onerror"));
        assert!(html.contains("hello"));
    }

    #[test]
    fn links_get_safe_rel() {
        let html = render_markdown("[lab](https://lab.example.org)");
        assert!(html.contains(r#"href="https://lab.example.org""#));
        assert!(html.contains("noopener noreferrer"));
    }

    #[test]
    fn strip_all_html_keeps_text() {
        assert_eq!(strip_all_html("<b>bold</b> move"), "bold move");
    }

    #[test]
    fn filters_are_available_to_templates() {
        let mut tera = Tera::default();
        register_filters(&mut tera);
        tera.add_raw_template("t", "{{ body | markdown | safe }}|{{ body | plaintext }}").unwrap();
        let mut ctx = Context::new();
        ctx.insert("body", "**k8s** notes");
        let out = tera.render("t", &ctx).unwrap();
        let (html, text) = out.split_once('|').unwrap();
        assert!(html.contains("<strong>k8s</strong>"));
        assert_eq!(text.trim(), "k8s notes");
    }
}
