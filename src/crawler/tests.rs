use super::*;

const MAMMALS_PAGE: &str = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Animals</title></head>
    <body>
        <nav><a href="/">Home</a></nav>
        <p>Cats are mammals. Dogs are mammals too. The sky is blue.</p>
        <footer>Contact us</footer>
    </body>
    </html>
"#;

const WEATHER_PAGE: &str = r#"
    <html><head><title>Weather</title></head>
    <body><p>Rain is expected tomorrow. Bring an umbrella.</p></body></html>
"#;

fn filter() -> RelevanceFilter {
    RelevanceFilter::new("what are mammals", relevance::DEFAULT_THRESHOLD)
}

#[test]
fn default_config() {
    let config = CrawlerConfig::default();

    assert_eq!(config.user_agent, BROWSER_USER_AGENT);
    assert_eq!(config.page_timeout(), Duration::from_secs(20));
    assert_eq!(config.max_concurrent_fetches, 5);
    assert_eq!(
        config.excluded_tags,
        vec!["nav", "footer", "header", "form", "img", "a"]
    );
    assert!(config.exclude_social_media_links);
    assert!(config.remove_overlay_elements);
}

#[test]
fn reduce_page_keeps_relevant_sentences() {
    let url = Url::parse("https://a.test/page").expect("url should parse");

    let page = reduce_page(url.clone(), MAMMALS_PAGE, &ExtractionConfig::default(), &filter())
        .expect("reduce_page should succeed")
        .expect("page should have relevant text");

    assert_eq!(page.url, url);
    assert_eq!(page.title, "Animals");
    assert_eq!(page.fit_markdown, "Cats are mammals. Dogs are mammals too.");
    assert_eq!(
        page.raw_markdown,
        "Cats are mammals. Dogs are mammals too. The sky is blue."
    );
}

#[test]
fn reduce_page_drops_irrelevant_documents() {
    let url = Url::parse("https://a.test/weather").expect("url should parse");

    let page = reduce_page(url, WEATHER_PAGE, &ExtractionConfig::default(), &filter())
        .expect("reduce_page should succeed");

    assert!(page.is_none());
}

mod integration_tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    fn http_only_config() -> CrawlerConfig {
        CrawlerConfig {
            enable_js_rendering: false,
            page_timeout_seconds: 2,
            ..CrawlerConfig::default()
        }
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(server)
            .await;
    }

    fn url(server: &MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), route)).expect("url should parse")
    }

    #[tokio::test]
    async fn acquire_keeps_relevant_pages_in_order() {
        let server = MockServer::start().await;
        mount_html(&server, "/cats", MAMMALS_PAGE).await;
        mount_html(&server, "/weather", WEATHER_PAGE).await;
        mount_html(
            &server,
            "/whales",
            "<html><body><h2>Whales are mammals</h2><p>They live in the sea.</p></body></html>",
        )
        .await;

        let acquirer = ContentAcquirer::new(http_only_config());
        let urls = vec![
            url(&server, "/whales"),
            url(&server, "/weather"),
            url(&server, "/cats"),
        ];

        let pages = acquirer.acquire(&urls, "what are mammals").await;

        let fetched: Vec<_> = pages.iter().map(|page| page.url.clone()).collect();
        assert_eq!(fetched, vec![urls[0].clone(), urls[2].clone()]);
        assert_eq!(pages[0].fit_markdown, "## Whales are mammals");
        assert_eq!(pages[1].fit_markdown, "Cats are mammals. Dogs are mammals too.");
    }

    #[tokio::test]
    async fn failed_pages_do_not_abort_the_batch() {
        let server = MockServer::start().await;
        mount_html(&server, "/cats", MAMMALS_PAGE).await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"%PDF-1.7 mammals".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let acquirer = ContentAcquirer::new(http_only_config());
        let urls = vec![
            url(&server, "/missing"),
            url(&server, "/broken"),
            url(&server, "/paper.pdf"),
            Url::parse("http://127.0.0.1:9/unreachable").expect("url should parse"),
            url(&server, "/cats"),
        ];

        let pages = acquirer.acquire(&urls, "what are mammals").await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, url(&server, "/cats"));
    }

    #[tokio::test]
    async fn slow_pages_are_abandoned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(MAMMALS_PAGE, "text/html")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        mount_html(&server, "/cats", MAMMALS_PAGE).await;

        let acquirer = ContentAcquirer::new(CrawlerConfig {
            page_timeout_seconds: 1,
            ..http_only_config()
        });
        let urls = vec![url(&server, "/slow"), url(&server, "/cats")];

        let pages = acquirer.acquire(&urls, "what are mammals").await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, urls[1]);
    }

    #[tokio::test]
    async fn concurrency_of_one_still_fetches_everything() {
        let server = MockServer::start().await;
        mount_html(&server, "/a", MAMMALS_PAGE).await;
        mount_html(&server, "/b", MAMMALS_PAGE).await;
        mount_html(&server, "/c", MAMMALS_PAGE).await;

        let acquirer = ContentAcquirer::new(CrawlerConfig {
            max_concurrent_fetches: 1,
            ..http_only_config()
        });
        let urls = vec![url(&server, "/a"), url(&server, "/b"), url(&server, "/c")];

        let pages = acquirer.acquire(&urls, "mammals").await;

        assert_eq!(pages.len(), 3);
        let received = server
            .received_requests()
            .await
            .expect("request recording is enabled");
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn acquire_with_no_urls() {
        let acquirer = ContentAcquirer::new(http_only_config());

        assert!(acquirer.acquire(&[], "anything").await.is_empty());
    }

    #[tokio::test]
    async fn http_client_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(wiremock::matchers::header("user-agent", "seekify-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = HttpClient::new("seekify-test", Duration::from_secs(5));

        let body = client
            .fetch(&url(&server, "/ua"))
            .await
            .expect("fetch should succeed");
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn http_client_reports_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = HttpClient::new(BROWSER_USER_AGENT, Duration::from_secs(5));

        let error = client
            .fetch(&url(&server, "/gone"))
            .await
            .expect_err("410 should be an error");
        assert!(error.to_string().contains("410"));
    }

    #[tokio::test]
    async fn get_html_rejects_binary_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0_u8, 1, 2], "image/png"))
            .mount(&server)
            .await;

        let client = HttpClient::new(BROWSER_USER_AGENT, Duration::from_secs(5));
        let target = url(&server, "/image.png");

        let result = tokio::task::spawn_blocking(move || client.get_html(target.as_str()))
            .await
            .expect("task should not panic");
        assert!(result.is_err());
    }
}
