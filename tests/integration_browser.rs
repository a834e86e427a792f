#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require Chrome to be available.
// Each test is skipped when the browser cannot be launched.

use seekify::crawler::browser::{BrowserConfig, PageRenderer};
use seekify::crawler::{ContentAcquirer, CrawlerConfig};
use std::time::Duration;
use tempfile::NamedTempFile;
use url::Url;

/// A page whose only relevant text is written by a script
fn scripted_page() -> (NamedTempFile, Url) {
    let html_content = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Ocean life</title></head>
    <body>
        <div id="app">Loading...</div>
        <script>
            document.getElementById('app').innerHTML =
                '<p>Whales are mammals that live in the ocean.</p>';
        </script>
    </body>
    </html>
    "#;

    let temp_file = NamedTempFile::with_suffix(".html").expect("Failed to create temp file");
    std::fs::write(temp_file.path(), html_content).expect("Failed to write HTML");
    let url = Url::from_file_path(temp_file.path()).expect("Failed to build file URL");
    (temp_file, url)
}

fn renderer() -> PageRenderer {
    PageRenderer::new(BrowserConfig {
        page_timeout: Duration::from_secs(10),
        ..BrowserConfig::default()
    })
}

#[test]
fn rendered_html_contains_script_output() {
    let (_file, url) = scripted_page();
    let renderer = renderer();

    match renderer.render(&url) {
        Ok(content) => {
            assert!(content.contains("Whales are mammals"));
            assert!(!content.contains("Loading..."));
        }
        Err(e) if !renderer.is_launched() => {
            println!("Skipping test - Chrome not available: {:#}", e);
        }
        Err(e) => panic!("Unexpected error: {:#}", e),
    }
}

#[tokio::test]
async fn acquirer_keeps_script_generated_text() {
    let (_file, url) = scripted_page();

    let probe = renderer();
    let probe_url = url.clone();
    let available = tokio::task::spawn_blocking(move || probe.render(&probe_url).is_ok())
        .await
        .expect("probe task should not panic");
    if !available {
        println!("Skipping test - Chrome not available");
        return;
    }

    let acquirer = ContentAcquirer::new(CrawlerConfig {
        page_timeout_seconds: 15,
        ..CrawlerConfig::default()
    });
    let pages = acquirer.acquire(&[url], "are whales mammals").await;

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].title, "Ocean life");
    assert!(pages[0].fit_markdown.contains("Whales are mammals"));
    assert!(!pages[0].fit_markdown.contains("Loading"));
}
