//! Failure-injection tests: the session should absorb the flakiness a real
//! remote UI produces

mod common;

use std::sync::Arc;

use wayfinder::driver::{Driver, MockDriver};
use wayfinder::{DriverAction, Error, TransitionFailure, Trigger};

#[tokio::test]
async fn test_rerendered_widget_is_recovered_transparently() -> anyhow::Result<()> {
    common::init_tracing();
    let driver = Arc::new(MockDriver::new());
    common::stage_site(&driver);
    let mut session = common::new_session(driver.clone());

    session.enter("login_page").await?;
    assert!(session.present("username_field").await?);

    // A client-side re-render kills the cached handle
    driver.replace_node("username");
    session.set("username_field", "octocat").await?;
    assert_eq!(session.value("username_field").await?, "octocat");
    Ok(())
}

#[tokio::test]
async fn test_slow_validator_still_confirms_arrival() -> anyhow::Result<()> {
    common::init_tracing();
    let driver = Arc::new(MockDriver::new());
    common::stage_site(&driver);
    driver.defer("signin_form", 2);
    let mut session = common::new_session(driver.clone());

    session.enter("login_page").await?;
    assert_eq!(session.current_page_name(), Some("login_page"));
    Ok(())
}

#[tokio::test]
async fn test_dropped_keystrokes_converge() -> anyhow::Result<()> {
    common::init_tracing();
    let driver = Arc::new(MockDriver::new());
    common::stage_site(&driver);
    let mut session = common::new_session(driver.clone());

    session.enter("login_page").await?;
    driver.swallow_writes("username", 2);
    session.set("username_field", "octocat").await?;
    assert_eq!(session.value("username_field").await?, "octocat");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_destination_reports_without_moving() -> anyhow::Result<()> {
    common::init_tracing();
    let driver = Arc::new(MockDriver::new());
    common::stage_site(&driver);
    let mut session = common::new_session(driver.clone());

    session.enter("login_page").await?;
    let action: DriverAction =
        Box::new(|_driver: &dyn Driver| Box::pin(async move { Ok(()) }));
    let report = session
        .change_pages(Trigger::Action(action), "repo_page")
        .await?;

    assert!(!report.success);
    assert!(matches!(
        report.failure,
        Some(TransitionFailure::UrlMismatch { .. })
    ));
    assert_eq!(session.current_page_name(), Some("login_page"));
    Ok(())
}

#[tokio::test]
async fn test_permanently_broken_click_target_surfaces_the_failure() -> anyhow::Result<()> {
    common::init_tracing();
    let driver = Arc::new(MockDriver::new());
    common::stage_site(&driver);
    let mut session = common::new_session(driver.clone());

    session.enter("login_page").await?;
    driver.always_stale("sign_in");

    let err = session.click("sign_in_button").await.unwrap_err();
    assert!(matches!(err, Error::TransitionTimeout(_)));
    assert_eq!(session.current_page_name(), Some("login_page"));
    Ok(())
}
