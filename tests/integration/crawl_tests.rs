//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run full crawls
//! end-to-end through the HTTP driver.

mod common;

use common::{test_config, RECIPE_HTML};
use ladle::browser::HttpDriverFactory;
use ladle::crawler::{
    combine_targets, crawl_recipes, discover_links, harvest_categories, load_targets, LINKS_FILE,
};
use ladle::storage::load_url_file;
use ladle::url::{site_slug, Target};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: impl Into<String>, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_recipe_crawl_commits_records_and_resumes() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/", mock_server.uri());

    // Each recipe page must be fetched exactly once across both runs
    mount_page(&mock_server, "/chicken-alfredo/", RECIPE_HTML, 1).await;
    mount_page(&mock_server, "/tomato-soup/", RECIPE_HTML, 1).await;
    mount_page(
        &mock_server,
        "/about/",
        "<html><body><h1>About us</h1></body></html>",
        2,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &base_url);
    std::fs::write(
        &config.site.targets_file,
        format!(
            "{base}chicken-alfredo/\n{base}tomato-soup/\n# comment\n{base}about/\n",
            base = base_url
        ),
    )
    .unwrap();

    let targets = load_targets(&config.site.targets_file, &config).unwrap();
    assert_eq!(targets.len(), 3);

    let summary = crawl_recipes(&config, Arc::new(HttpDriverFactory), targets)
        .await
        .unwrap();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);

    let records = config.output.records_dir();
    let record: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(records.join("chicken-alfredo_.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(record["URL"], format!("{}chicken-alfredo/", base_url));
    assert_eq!(record["Summary"], "A quick weeknight soup.");
    assert_eq!(record["Ingredients"][0], "1 onion");
    assert!(records.join("tomato-soup_.json").exists());
    assert!(!records.join("about_.json").exists());
    assert!(config.output.output_dir.join("run-summary.json").exists());

    // Second run: committed records are skipped, the failed page is retried
    let targets = load_targets(&config.site.targets_file, &config).unwrap();
    let summary = crawl_recipes(&config, Arc::new(HttpDriverFactory), targets)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 0);
}

#[tokio::test]
async fn test_blacklisted_targets_are_dropped() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), "https://site.com/");
    let blacklist = dir.path().join("blacklist.txt");
    std::fs::write(&blacklist, "https://site.com/weekly-meal-plan/\n").unwrap();
    config.site.blacklist_file = Some(blacklist);

    std::fs::write(
        &config.site.targets_file,
        "https://site.com/lasagna/\nhttps://site.com/weekly-meal-plan/\nnot a url\n",
    )
    .unwrap();

    let targets = load_targets(&config.site.targets_file, &config).unwrap();
    assert_eq!(
        targets,
        vec![Target::parse("https://site.com/lasagna/").unwrap()]
    );
}

#[tokio::test]
async fn test_paginated_discovery_and_combine() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/", mock_server.uri());
    let category = format!("{}category/soup/", base_url);

    mount_page(
        &mock_server,
        "/category/soup/page/1/",
        format!(
            r#"<html><body>
            <a href="{b}tomato-soup/">Tomato</a>
            <a href="/lentil-soup/">Lentil</a>
            <a href="{b}category/soup/page/2/">Next</a>
            <a href="mailto:hi@site.com">Mail</a>
            </body></html>"#,
            b = base_url
        ),
        1,
    )
    .await;
    mount_page(
        &mock_server,
        "/category/soup/page/2/",
        r#"<html><body>
        <a href="/minestrone/">Minestrone</a>
        <a href="/weekly-meal-plan-12/">Plan</a>
        <a href="/tomato-soup/#comments">Comments</a>
        </body></html>"#,
        1,
    )
    .await;
    mount_page(
        &mock_server,
        "/category/soup/page/3/",
        "<html><body><h1>Nothing Found</h1></body></html>",
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &base_url);
    config.crawler.workers = 1;
    config.discovery.exclude_substrings = vec!["weekly-meal-".to_string(), "#".to_string()];
    std::fs::write(&config.site.targets_file, format!("{}\n", category)).unwrap();

    let targets = load_targets(&config.site.targets_file, &config).unwrap();
    let summary = discover_links(&config, Arc::new(HttpDriverFactory), targets)
        .await
        .unwrap();
    assert_eq!(summary.success, 1);
    assert_eq!(summary.failed, 0);

    let shards = config.output.output_dir.join(site_slug(&category));
    assert!(shards.join("file1.txt").exists());
    assert!(shards.join("file2.txt").exists());
    assert!(!shards.join("file3.txt").exists());

    let links = load_url_file(&shards.join(LINKS_FILE)).unwrap();
    assert!(links.contains(&format!("{}lentil-soup/", base_url)));
    assert!(links.contains(&format!("{}minestrone/", base_url)));
    assert!(!links.iter().any(|l| l.starts_with("mailto:")));

    let count = combine_targets(&config).unwrap();
    let combined = load_url_file(&config.output.combined_file).unwrap();
    assert_eq!(count, combined.len());
    assert_eq!(
        combined,
        vec![
            format!("{}lentil-soup/", base_url),
            format!("{}minestrone/", base_url),
            format!("{}tomato-soup/", base_url),
        ]
    );
}

#[tokio::test]
async fn test_discovery_skips_finished_categories() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/", mock_server.uri());
    let category = format!("{}category/salad/", base_url);

    // No mocks mounted: a finished category must not be requested at all
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &base_url);
    let shards = config.output.output_dir.join(site_slug(&category));
    std::fs::create_dir_all(&shards).unwrap();
    std::fs::write(shards.join(LINKS_FILE), format!("{}caesar/\n", base_url)).unwrap();

    let summary = discover_links(
        &config,
        Arc::new(HttpDriverFactory),
        vec![Target::parse(&category).unwrap()],
    )
    .await
    .unwrap();
    assert_eq!(summary.skipped, 1);
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_category_is_retried_on_rerun() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/", mock_server.uri());
    let category = format!("{}category/holiday/", base_url);

    // Requested once per run: an empty category must not be marked finished
    mount_page(
        &mock_server,
        "/category/holiday/page/1/",
        "<html><body><h1>Nothing Found</h1></body></html>",
        2,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &base_url);
    config.crawler.workers = 1;
    let shards = config.output.output_dir.join(site_slug(&category));

    for _ in 0..2 {
        let summary = discover_links(
            &config,
            Arc::new(HttpDriverFactory),
            vec![Target::parse(&category).unwrap()],
        )
        .await
        .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert!(!shards.join(LINKS_FILE).exists());
    }
}

#[tokio::test]
async fn test_category_harvest_writes_targets_file() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/", mock_server.uri());

    mount_page(
        &mock_server,
        "/recipes/",
        r#"<html><body>
        <a href="/category/soup/">Soup</a>
        <a href="/category/salad/">Salad</a>
        <a href="/category/holiday/">Holiday</a>
        <a href="https://pinterest.com/site">Pinterest</a>
        </body></html>"#,
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &base_url);
    let blacklist = dir.path().join("blacklist.txt");
    std::fs::write(&blacklist, format!("{}category/holiday/\n", base_url)).unwrap();
    config.site.blacklist_file = Some(blacklist);

    let count = harvest_categories(
        &config,
        Arc::new(HttpDriverFactory),
        &format!("{}recipes/", base_url),
    )
    .await
    .unwrap();
    assert_eq!(count, 2);

    let written = load_url_file(&config.site.targets_file).unwrap();
    assert_eq!(
        written,
        vec![
            format!("{}category/salad/", base_url),
            format!("{}category/soup/", base_url),
        ]
    );
}
