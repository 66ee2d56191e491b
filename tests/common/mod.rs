//! Shared fixture: a small hosted-git site staged into the mock driver
#![allow(dead_code)]

use std::sync::Arc;

use wayfinder::driver::{MockDom, MockDriver, MockNode};
use wayfinder::{
    Config, ElementDescriptor, ElementKind, NoopReplay, PageDescriptor, PageRegistry, Selector,
    Session,
};

pub const BASE: &str = "https://git.example.com";
pub const LOGIN_URL: &str = "https://git.example.com/login";
pub const DASHBOARD_URL: &str = "https://git.example.com/dashboard";
pub const REPO_URL: &str = "https://git.example.com/acme/widgets";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polling budgets tuned so failures surface in milliseconds
pub fn test_config() -> Config {
    Config {
        base_url: Some(BASE.to_string()),
        validator_wait_ms: 0,
        transition_attempts: 5,
        transition_interval_ms: 0,
        revalidate_attempts: 3,
        revalidate_interval_ms: 0,
        set_wait_ms: 0,
        element_poll_ms: 1,
        ..Config::default()
    }
}

fn login_dom() -> MockDom {
    MockDom::new("Sign in")
        .node(
            MockNode::new(ElementKind::Form)
                .id("signin_form")
                .child(MockNode::new(ElementKind::TextField).id("username"))
                .child(MockNode::new(ElementKind::TextField).id("password")),
        )
        .node(
            MockNode::new(ElementKind::Button)
                .id("sign_in")
                .text("Sign in")
                .navigates_to(DASHBOARD_URL),
        )
}

fn dashboard_dom() -> MockDom {
    MockDom::new("Dashboard")
        .node(
            MockNode::new(ElementKind::Div)
                .id("user_greeting")
                .text("Welcome, octocat"),
        )
        .node(
            MockNode::new(ElementKind::List)
                .id("repo_list")
                .child(
                    MockNode::new(ElementKind::Link)
                        .attr("class", "repo-link")
                        .text("widgets")
                        .navigates_to(REPO_URL),
                )
                .child(
                    MockNode::new(ElementKind::Link)
                        .attr("class", "repo-link")
                        .text("gadgets"),
                ),
        )
}

fn repo_dom() -> MockDom {
    MockDom::new("acme/widgets")
        .node(
            MockNode::new(ElementKind::Div)
                .id("repo_header")
                .text("acme/widgets"),
        )
        .node(
            MockNode::new(ElementKind::Table)
                .id("file_table")
                .child(
                    MockNode::new(ElementKind::Div)
                        .attr("class", "file-row")
                        .text("src"),
                )
                .child(
                    MockNode::new(ElementKind::Div)
                        .attr("class", "file-row")
                        .text("Cargo.toml"),
                )
                .child(
                    MockNode::new(ElementKind::Div)
                        .attr("class", "file-row")
                        .text("README.md"),
                ),
        )
        .node(
            MockNode::new(ElementKind::Link)
                .id("back_to_dashboard")
                .text("Dashboard")
                .navigates_to(DASHBOARD_URL),
        )
}

pub fn stage_site(driver: &MockDriver) {
    driver.stage(LOGIN_URL, login_dom());
    driver.stage(DASHBOARD_URL, dashboard_dom());
    driver.stage(REPO_URL, repo_dom());
}

/// Stage a search-results page for `query` and return its URL
pub fn stage_search(driver: &MockDriver, query: &str) -> String {
    let url = format!("{}/search?q={}", BASE, urlencoding::encode(query));
    driver.stage(
        url.clone(),
        MockDom::new("Search results").node(
            MockNode::new(ElementKind::Div)
                .id("search_results")
                .text("2 repositories"),
        ),
    );
    url
}

pub fn site_registry() -> PageRegistry {
    let mut registry = PageRegistry::new();
    registry
        .register(
            PageDescriptor::builder("login_page")
                .url("{base_url}/login")
                .entry_url("{base_url}/login")
                .element(
                    ElementDescriptor::builder("signin_form", ElementKind::Form)
                        .validator()
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("username_field", ElementKind::TextField)
                        .selector(Selector::id("username"))
                        .parent("signin_form")
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("password_field", ElementKind::TextField)
                        .selector(Selector::id("password"))
                        .parent("signin_form")
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("sign_in_button", ElementKind::Button)
                        .selector(Selector::id("sign_in"))
                        .click_destination("dashboard_page")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            PageDescriptor::builder("dashboard_page")
                .url("{base_url}/dashboard")
                .element(
                    ElementDescriptor::builder("user_greeting", ElementKind::Div)
                        .validator()
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("repo_list", ElementKind::List)
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("repo_links", ElementKind::Link)
                        .selector(Selector::css_class("repo-link"))
                        .parent("repo_list")
                        .collection()
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("widgets_repo_link", ElementKind::Link)
                        .selector(Selector::text("widgets"))
                        .parent("repo_list")
                        .click_destination("repo_page")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            PageDescriptor::builder("repo_page")
                .url_matching(r"{base_url}/[-\w]+/[-\w]+$")
                .element(
                    ElementDescriptor::builder("repo_header", ElementKind::Div)
                        .validator()
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("file_table", ElementKind::Table)
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("file_rows", ElementKind::Div)
                        .selector(Selector::css_class("file-row"))
                        .parent("file_table")
                        .collection()
                        .build()
                        .unwrap(),
                )
                .element(
                    ElementDescriptor::builder("back_to_dashboard", ElementKind::Link)
                        .click_destination("dashboard_page")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            PageDescriptor::builder("search_page")
                .url("{base_url}/search?")
                .element(
                    ElementDescriptor::builder("search_results", ElementKind::Div)
                        .validator()
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
}

pub fn new_session(driver: Arc<MockDriver>) -> Session {
    Session::new(
        driver,
        site_registry(),
        test_config(),
        Arc::new(NoopReplay),
    )
    .unwrap()
}
