use engine::tokenizer::{Extractor, StructuralText};
use scraper::{Html, Selector};

/// Pulls the four weighted text streams out of parsed markup with CSS
/// selectors: body text, h1-h3 headings, bold runs, and the page title.
pub struct HtmlExtractor {
    body: Selector,
    headings: Selector,
    bold: Selector,
    title: Selector,
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            body: Selector::parse("body").expect("valid selector"),
            headings: Selector::parse("h1, h2, h3").expect("valid selector"),
            bold: Selector::parse("b").expect("valid selector"),
            title: Selector::parse("title").expect("valid selector"),
        }
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    fn title_text(&self, doc: &Html) -> Option<String> {
        doc.select(&self.title)
            .next()
            .map(|n| n.text().collect::<String>().replace('\n', " ").trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, raw: &str) -> StructuralText {
        let doc = Html::parse_document(raw);
        let collect = |sel: &Selector| {
            doc.select(sel)
                .flat_map(|n| n.text())
                .collect::<Vec<_>>()
                .join(" ")
        };
        StructuralText {
            body: collect(&self.body),
            headings: collect(&self.headings),
            bold: collect(&self.bold),
            title: self.title_text(&doc),
        }
    }

    /// Single selector pass; skips collecting the body, heading, and bold
    /// streams.
    fn extract_title(&self, raw: &str) -> Option<String> {
        self.title_text(&Html::parse_document(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_streams_by_markup() {
        let html = "<html><head><title>My Page</title></head>\
                    <body><h1>Top</h1><p>plain <b>strong</b> words</p></body></html>";
        let text = HtmlExtractor::new().extract(html);
        assert_eq!(text.title.as_deref(), Some("My Page"));
        assert!(text.headings.contains("Top"));
        assert!(text.bold.contains("strong"));
        assert!(text.body.contains("plain"));
    }

    #[test]
    fn missing_title_is_none() {
        let text = HtmlExtractor::new().extract("<html><body>no title here</body></html>");
        assert!(text.title.is_none());
    }

    #[test]
    fn title_only_pass_agrees_with_full_extraction() {
        let ex = HtmlExtractor::new();
        let titled = "<html><head><title> My\nPage </title></head><body>x</body></html>";
        let untitled = "<html><body>x</body></html>";
        assert_eq!(ex.extract_title(titled), ex.extract(titled).title);
        assert_eq!(ex.extract_title(titled).as_deref(), Some("My Page"));
        assert_eq!(ex.extract_title(untitled), None);
    }
}
