use super::*;

fn texts(content: &ExtractedContent) -> Vec<&str> {
    content.blocks.iter().map(|block| block.text.as_str()).collect()
}

#[test]
fn extract_simple_content() {
    let html = r#"
            <html>
                <head><title>Test Page</title></head>
                <body>
                    <h1>Main Heading</h1>
                    <p>This is a paragraph of text.</p>
                    <h2>Sub Heading</h2>
                    <p>Another paragraph with more content.</p>
                </body>
            </html>
        "#;

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(result.title, "Test Page");
    assert_eq!(
        result.blocks,
        vec![
            TextBlock::new("h1", "Main Heading"),
            TextBlock::new("p", "This is a paragraph of text."),
            TextBlock::new("h2", "Sub Heading"),
            TextBlock::new("p", "Another paragraph with more content."),
        ]
    );
    assert_eq!(
        result.raw_markdown,
        "# Main Heading\n\nThis is a paragraph of text.\n\n## Sub Heading\n\nAnother paragraph with more content."
    );
}

#[test]
fn structural_elements_are_removed() {
    let html = r#"
        <html><body>
            <header><p>Site header</p></header>
            <nav><ul><li>Home</li><li>About</li></ul></nav>
            <main>
                <p>Real content lives here.</p>
                <form><p>Sign up today</p></form>
                <p>See <a href="/more">this link</a> for details.</p>
            </main>
            <footer><p>Copyright</p></footer>
            <script>var tracking = "Real content";</script>
            <style>p { color: red; }</style>
        </body></html>
    "#;

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(
        texts(&result),
        vec!["Real content lives here.", "See for details."]
    );
    assert!(!result.raw_markdown.contains("Copyright"));
    assert!(!result.raw_markdown.contains("tracking"));
}

#[test]
fn anchors_survive_when_not_excluded() {
    let html = r#"
        <body>
            <p>Read <a href="https://docs.test/guide">the guide</a> first.</p>
            <p><a href="https://twitter.com/someone">Follow us</a></p>
            <p><a href="https://www.facebook.com/page">Like us</a></p>
        </body>
    "#;
    let config = ExtractionConfig {
        excluded_tags: vec!["nav".to_string()],
        ..ExtractionConfig::default()
    };

    let result = extract_content(html, &config).expect("extract_content should succeed");

    assert_eq!(texts(&result), vec!["Read the guide first."]);
}

#[test]
fn social_links_kept_when_filter_disabled() {
    let html = r#"<body><p><a href="https://twitter.com/someone">Follow us</a></p></body>"#;
    let config = ExtractionConfig {
        excluded_tags: Vec::new(),
        exclude_social_media_links: false,
        remove_overlay_elements: true,
    };

    let result = extract_content(html, &config).expect("extract_content should succeed");

    assert_eq!(texts(&result), vec!["Follow us"]);
}

#[test]
fn overlays_are_removed() {
    let html = r#"
        <html><body class="modal-open">
            <div class="cookie-banner"><p>We use cookies.</p></div>
            <div id="newsletter"><p>Subscribe now!</p></div>
            <div role="dialog"><p>Are you sure?</p></div>
            <div style="position: fixed; bottom: 0"><p>Chat with us</p></div>
            <article class="popupMenu-free">
                <p>Article body.</p>
            </article>
        </body></html>
    "#;

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(texts(&result), vec!["Article body."]);
}

#[test]
fn overlays_kept_when_filter_disabled() {
    let html = r#"<body><div class="cookie-banner"><p>We use cookies.</p></div></body>"#;
    let config = ExtractionConfig {
        remove_overlay_elements: false,
        ..ExtractionConfig::default()
    };

    let result = extract_content(html, &config).expect("extract_content should succeed");

    assert_eq!(texts(&result), vec!["We use cookies."]);
}

#[test]
fn loose_text_becomes_div_blocks() {
    let html = r#"
        <body>
            <div>First loose <span>sentence</span> here.</div>
            <div>Second
                loose text.</div>
            <ul><li>An item</li></ul>
        </body>
    "#;

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(
        result.blocks,
        vec![
            TextBlock::new("div", "First loose sentence here."),
            TextBlock::new("div", "Second loose text."),
            TextBlock::new("li", "An item"),
        ]
    );
}

#[test]
fn emphasised_paragraph_takes_emphasis_tag() {
    let html = r#"
        <body>
            <p><strong>Key point.</strong></p>
            <p>Normal <strong>with emphasis</strong>.</p>
        </body>
    "#;

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(result.blocks[0].tag, "strong");
    assert_eq!(result.blocks[1].tag, "p");
}

#[test]
fn code_blocks_keep_their_layout() {
    let html = "<body><pre>fn main() {\n    println!(\"hi\");\n}</pre></body>";

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(result.blocks[0].tag, "pre");
    assert_eq!(
        result.raw_markdown,
        "```\nfn main() {\n    println!(\"hi\");\n}\n```"
    );
}

#[test]
fn title_falls_back_to_heading() {
    let html = "<body><h2>Only Heading</h2><p>Text.</p></body>";

    let result = extract_content(html, &ExtractionConfig::default())
        .expect("extract_content should succeed");

    assert_eq!(result.title, "Only Heading");

    let empty = extract_content("<body></body>", &ExtractionConfig::default())
        .expect("extract_content should succeed");
    assert_eq!(empty.title, "Untitled Document");
    assert!(empty.blocks.is_empty());
    assert!(empty.raw_markdown.is_empty());
}

#[test]
fn invalid_excluded_tag_is_an_error() {
    let config = ExtractionConfig {
        excluded_tags: vec!["[[[".to_string()],
        ..ExtractionConfig::default()
    };

    assert!(extract_content("<p>x</p>", &config).is_err());
}

#[test]
fn social_media_detection() {
    let social = [
        "https://twitter.com/a",
        "https://www.facebook.com/b",
        "https://uk.linkedin.com/in/c",
        "https://x.com/d",
    ];
    let other = [
        "https://example.com/twitter.com",
        "https://notx.com/",
        "https://docs.rs/",
    ];

    for url in social {
        assert!(
            is_social_media_url(&Url::parse(url).expect("url should parse")),
            "{url} should be social"
        );
    }
    for url in other {
        assert!(
            !is_social_media_url(&Url::parse(url).expect("url should parse")),
            "{url} should not be social"
        );
    }
}

#[test]
fn render_markdown_prefixes() {
    let blocks = vec![
        TextBlock::new("h3", "Heading"),
        TextBlock::new("li", "Item"),
        TextBlock::new("blockquote", "Quote"),
        TextBlock::new("td", "Cell"),
        TextBlock::new("p", "   "),
    ];

    assert_eq!(
        render_markdown(&blocks),
        "### Heading\n\n- Item\n\n> Quote\n\nCell"
    );
}
