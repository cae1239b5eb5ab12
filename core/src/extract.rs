use crate::index::StructuralTag;
use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Node, Selector};

/// Text of one page split by structural importance.
///
/// `sections` follows [`StructuralTag::ORDERED`]; text claimed by a section is
/// absent from every later section and from `body`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub sections: Vec<(StructuralTag, String)>,
    pub body: String,
}

impl ExtractedPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    /// A page with a title and plain body text, the title also counted as the
    /// `title` section.
    pub fn plain(title: &str, body: &str) -> Self {
        Self::new(title)
            .with_section(StructuralTag::Title, &title.to_lowercase())
            .with_body(&body.to_lowercase())
    }

    pub fn with_section(mut self, tag: StructuralTag, text: &str) -> Self {
        self.sections.push((tag, text.to_string()));
        self
    }

    pub fn with_body(mut self, text: &str) -> Self {
        self.body = text.to_string();
        self
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e:?}"))
}

/// Elements that end a word; inline markup (`<i>`, `<span>`, ...) does not.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section",
    "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "ul",
];

fn is_block(node: &Node) -> bool {
    node.as_element().map_or(false, |e| BLOCK_ELEMENTS.contains(&e.name()))
}

/// Text under `el`, with a space only where a block element opens or closes.
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => {
                if node.prev_sibling().map_or(false, |s| is_block(s.value())) {
                    out.push(' ');
                }
                out.push_str(text);
            }
            other if is_block(other) => out.push(' '),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drain structural categories out of an HTML document, then read what is left
/// as body text. Everything returned except the title is lowercase.
pub fn extract_html(source: &str) -> Result<ExtractedPage> {
    let mut html = Html::parse_document(source);

    let title = {
        let sel = selector(StructuralTag::Title.selector())?;
        html.root_element()
            .select(&sel)
            .next()
            .map(|n| collapse_whitespace(&element_text(n)))
            .unwrap_or_default()
    };

    detach_all(&mut html, &selector("script, style, noscript, template")?);

    let mut page = ExtractedPage::new(title);
    for tag in StructuralTag::ORDERED {
        let sel = selector(tag.selector())?;
        let mut chunks = Vec::new();
        // only the attached tree; detached subtrees stay in the arena
        for node in html.root_element().select(&sel) {
            chunks.push(element_text(node));
        }
        detach_all(&mut html, &sel);
        let text = collapse_whitespace(&chunks.join(" ")).to_lowercase();
        page.sections.push((tag, text));
    }

    let residual = element_text(html.root_element());
    page.body = collapse_whitespace(&residual).to_lowercase();
    Ok(page)
}

fn detach_all(html: &mut Html, sel: &Selector) {
    let ids: Vec<_> = html.root_element().select(sel).map(|n| n.id()).collect();
    for id in ids {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Rust Book</title><style>p { color: red }</style></head>
        <body><h1>Ownership <b>rules</b></h1><h2>Borrowing</h2><p>Values have an <b>owner</b>.</p>
        <script>var x = 1;</script></body></html>"#;

    #[test]
    fn categories_are_drained_in_order() {
        let page = extract_html(PAGE).unwrap();
        assert_eq!(page.title, "Rust Book");
        let section = |t: StructuralTag| page.sections.iter().find(|(tag, _)| *tag == t).map(|(_, s)| s.as_str());
        assert_eq!(section(StructuralTag::Title), Some("rust book"));
        // nested <b> inside <h1> belongs to the heading, not to the bold category
        assert_eq!(section(StructuralTag::H1), Some("ownership rules"));
        assert_eq!(section(StructuralTag::H2), Some("borrowing"));
        assert_eq!(section(StructuralTag::H3), Some(""));
        assert_eq!(section(StructuralTag::Bold), Some("owner"));
        assert_eq!(page.body, "values have an .");
    }

    #[test]
    fn nested_categories_count_once() {
        let page = extract_html("<h1>Alpha <b>zebra</b></h1><noscript><b>hidden</b></noscript><p>body</p>").unwrap();
        let bold = page.sections.iter().find(|(tag, _)| *tag == StructuralTag::Bold).map(|(_, s)| s.as_str());
        assert_eq!(bold, Some(""));
        assert_eq!(page.body, "body");
    }

    #[test]
    fn inline_markup_does_not_split_words() {
        let page = extract_html("<p>un<i>believ</i>able</p><ul><li>one</li><li>two</li></ul><div>three</div>four").unwrap();
        assert_eq!(page.body, "unbelievable one two three four");
    }

    #[test]
    fn missing_title_is_empty() {
        let page = extract_html("<p>Just text</p>").unwrap();
        assert_eq!(page.title, "");
        assert_eq!(page.body, "just text");
    }
}
