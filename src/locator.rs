//! Resilient element lookup.
//!
//! Every lookup polls the driver at a fixed interval until its condition
//! holds or the budget runs out. Absence comes back as
//! [`LocateOutcome::NotFound`]; only faults of the session itself are errors,
//! and those are never retried here. Nothing in this module logs.

use crate::core::BrowserDriver;
use crate::errors::Result;
use crate::types::{
    Condition, ElementHandle, LocateOutcome, Locator, PollOutcome, TraversalContext,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Fixed delay between two attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait up to `timeout` for an element matching `locator` in `context` that
/// satisfies `condition`.
pub async fn locate<D: BrowserDriver + ?Sized>(
    driver: &D,
    context: &TraversalContext,
    locator: &Locator,
    timeout: Duration,
    condition: Condition,
) -> Result<LocateOutcome> {
    poll_until(Instant::now() + timeout, move || {
        attempt(driver, context, locator, condition)
    })
    .await
}

/// Wait up to `timeout` for `selector` to match inside the shadow root of
/// `host`.
pub async fn locate_in_shadow<D: BrowserDriver + ?Sized>(
    driver: &D,
    host: &ElementHandle,
    selector: &str,
    timeout: Duration,
) -> Result<LocateOutcome> {
    poll_until(Instant::now() + timeout, move || {
        attempt_shadow(driver, host, selector)
    })
    .await
}

/// Find the shadow host, then `inner_selector` inside its shadow root. Both
/// lookups share the single `host_timeout` budget, and both kinds of absence
/// collapse into `NotFound`.
pub async fn descend_through_shadow<D: BrowserDriver + ?Sized>(
    driver: &D,
    context: &TraversalContext,
    host_locator: &Locator,
    inner_selector: &str,
    host_timeout: Duration,
) -> Result<LocateOutcome> {
    let deadline = Instant::now() + host_timeout;

    let host = match poll_until(deadline, move || {
        attempt(driver, context, host_locator, Condition::Presence)
    })
    .await?
    {
        LocateOutcome::Found(host) => host,
        _ => return Ok(LocateOutcome::NotFound),
    };

    let host = &host;
    match poll_until(deadline, move || attempt_shadow(driver, host, inner_selector)).await? {
        LocateOutcome::Found(inner) => Ok(LocateOutcome::Found(inner)),
        _ => Ok(LocateOutcome::NotFound),
    }
}

/// Context of the document inside `frame`. Stale frames surface as driver
/// faults.
pub async fn enter_frame<D: BrowserDriver + ?Sized>(
    driver: &D,
    frame: &ElementHandle,
) -> Result<TraversalContext> {
    driver.switch_context(frame).await
}

async fn poll_until<F, Fut>(deadline: Instant, mut attempt: F) -> Result<LocateOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome>>,
{
    let mut matched = false;

    loop {
        match attempt().await? {
            PollOutcome::Found(element) => return Ok(LocateOutcome::Found(element)),
            PollOutcome::NotFound { matched: seen } => matched |= seen,
            PollOutcome::TransientError(_) => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(if matched {
                LocateOutcome::ConditionTimeout
            } else {
                LocateOutcome::NotFound
            });
        }

        tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
    }
}

async fn attempt<D: BrowserDriver + ?Sized>(
    driver: &D,
    context: &TraversalContext,
    locator: &Locator,
    condition: Condition,
) -> Result<PollOutcome> {
    match driver.query(context, locator).await {
        Ok(Some(element)) => check_condition(driver, element, condition).await,
        Ok(None) => Ok(PollOutcome::NotFound { matched: false }),
        Err(err) if err.is_transient() => Ok(PollOutcome::TransientError(err)),
        Err(err) => Err(err),
    }
}

async fn attempt_shadow<D: BrowserDriver + ?Sized>(
    driver: &D,
    host: &ElementHandle,
    selector: &str,
) -> Result<PollOutcome> {
    match driver.query_shadow(host, selector).await {
        Ok(Some(element)) => Ok(PollOutcome::Found(element)),
        Ok(None) => Ok(PollOutcome::NotFound { matched: false }),
        Err(err) if err.is_transient() => Ok(PollOutcome::TransientError(err)),
        Err(err) => Err(err),
    }
}

async fn check_condition<D: BrowserDriver + ?Sized>(
    driver: &D,
    element: ElementHandle,
    condition: Condition,
) -> Result<PollOutcome> {
    match condition {
        Condition::Presence => Ok(PollOutcome::Found(element)),
        Condition::Interactable => match driver.is_interactable(&element).await {
            Ok(true) => Ok(PollOutcome::Found(element)),
            Ok(false) => Ok(PollOutcome::NotFound { matched: true }),
            Err(err) if err.is_transient() => Ok(PollOutcome::TransientError(err)),
            Err(err) => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BrowserError;
    use crate::testing::{FakeDriver, FakePage, TestHelper};
    use std::sync::Arc;

    fn page(html: &str) -> FakePage {
        FakePage::new(html)
    }

    async fn loaded(page: FakePage) -> Arc<FakeDriver> {
        let driver = Arc::new(FakeDriver::new());
        driver.add_page("https://acme.test/list", page);
        driver.navigate("https://acme.test/list").await.unwrap();
        driver
    }

    #[tokio::test(start_paused = true)]
    async fn present_element_is_found_without_waiting() {
        let driver = loaded(page(r#"<a class="linked formlink">INC0010001</a>"#)).await;
        let started = Instant::now();

        let outcome = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("a.linked.formlink"),
            Duration::from_secs(10),
            Condition::Presence,
        )
        .await
        .unwrap();

        assert!(outcome.is_found());
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(driver.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_finds_present_element() {
        let driver = loaded(page(r#"<button id="sysverb_update">Update</button>"#)).await;

        let outcome = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::id("sysverb_update"),
            Duration::ZERO,
            Condition::Interactable,
        )
        .await
        .unwrap();

        assert!(outcome.is_found());
    }

    #[tokio::test(start_paused = true)]
    async fn absent_element_times_out_as_not_found() {
        let driver = loaded(page("<table></table>")).await;
        let started = Instant::now();
        let timeout = Duration::from_millis(1_200);

        let outcome = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("tr[id^='row_incident_']"),
            timeout,
            Condition::Presence,
        )
        .await;

        tokio_test::assert_ok!(&outcome);
        assert_eq!(outcome.unwrap(), LocateOutcome::NotFound);
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + POLL_INTERVAL);
        // t = 0, 500, 1000 and the clamped final attempt at 1200
        assert_eq!(driver.query_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn element_appearing_later_is_picked_up_by_polling() {
        let driver = loaded(page("<div id='list'></div>")).await;
        driver.schedule_page(
            Duration::from_millis(1_600),
            page(r#"<div id='list'><a class="linked formlink">INC1</a></div>"#),
        );
        let started = Instant::now();

        let outcome = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("a.linked.formlink"),
            Duration::from_secs(5),
            Condition::Presence,
        )
        .await
        .unwrap();

        assert!(outcome.is_found());
        assert_eq!(started.elapsed(), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_element_reports_condition_timeout() {
        let driver = loaded(page(r#"<button id="sysverb_update" disabled>Update</button>"#)).await;

        let presence = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::id("sysverb_update"),
            Duration::from_secs(1),
            Condition::Presence,
        )
        .await
        .unwrap();
        let interactable = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::id("sysverb_update"),
            Duration::from_secs(1),
            Condition::Interactable,
        )
        .await
        .unwrap();

        assert!(presence.is_found());
        assert_eq!(interactable, LocateOutcome::ConditionTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn text_filter_narrows_candidates() {
        let driver = loaded(page(
            r#"<span class="tab_header"><span class="tabs2_tab">Notes</span></span>
               <span class="tab_header"><span class="tabs2_tab">Resolution Information</span></span>"#,
        ))
        .await;

        let tab = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("span.tab_header span.tabs2_tab").with_text("Resolution"),
            Duration::ZERO,
            Condition::Presence,
        )
        .await
        .unwrap()
        .found()
        .unwrap();

        assert_eq!(driver.text(&tab).await.unwrap(), "Resolution Information");
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_is_a_fault_not_absence() {
        let driver = loaded(page("<div></div>")).await;
        driver.close_after(Duration::from_millis(700));

        let err = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("a.linked.formlink"),
            Duration::from_secs(10),
            Condition::Presence,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrowserError::SessionClosed));
        // the fault is not retried: t = 0, 500, then 1000 fails
        assert_eq!(driver.query_count(), 3);
        tokio_test::assert_ok!(driver.close().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reference_during_condition_check_is_retried() {
        let driver = loaded(page(r#"<input id="incident.close_notes">"#)).await;
        driver.fail_next_interactable_check(BrowserError::StaleElement("np-1".into()));
        let started = Instant::now();

        let outcome = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::id("incident.close_notes"),
            Duration::from_secs(3),
            Condition::Interactable,
        )
        .await
        .unwrap();

        assert!(outcome.is_found());
        assert_eq!(started.elapsed(), POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn descend_reaches_the_iframe_behind_the_shadow_host() {
        let driver = loaded(TestHelper::list_page(&["INC0010001"])).await;

        let frame = descend_through_shadow(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::tag_prefix("macroponent"),
            "iframe",
            Duration::from_secs(5),
        )
        .await
        .unwrap()
        .found()
        .unwrap();

        let context = enter_frame(driver.as_ref(), &frame).await.unwrap();
        assert_eq!(context.depth(), 1);

        let link = locate(
            driver.as_ref(),
            &context,
            &Locator::css("a.linked.formlink"),
            Duration::ZERO,
            Condition::Presence,
        )
        .await
        .unwrap()
        .found()
        .unwrap();
        assert_eq!(link.context, context);
        assert_eq!(driver.text(&link).await.unwrap(), "INC0010001");

        // the frame document is not visible from the top context
        let from_top = locate(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::css("a.linked.formlink"),
            Duration::ZERO,
            Condition::Presence,
        )
        .await
        .unwrap();
        assert_eq!(from_top, LocateOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_inner_element_stays_within_host_budget() {
        let driver = loaded(
            FakePage::new("<macroponent-f51912f4></macroponent-f51912f4>")
                .with_shadow("macroponent-f51912f4", "<div class='shell'></div>"),
        )
        .await;
        let started = Instant::now();
        let host_timeout = Duration::from_secs(2);

        let outcome = descend_through_shadow(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::tag_prefix("macroponent"),
            "iframe",
            host_timeout,
        )
        .await
        .unwrap();

        assert_eq!(outcome, LocateOutcome::NotFound);
        assert!(started.elapsed() <= host_timeout + POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_host_is_not_found() {
        let driver = loaded(page("<div class='classic-ui'></div>")).await;

        let outcome = descend_through_shadow(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::tag_prefix("macroponent"),
            "iframe",
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(outcome, LocateOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn entering_the_same_frame_path_twice_is_idempotent() {
        let driver = loaded(TestHelper::list_page(&["INC1", "INC2"])).await;
        let host = Locator::tag_prefix("macroponent");
        let rows = Locator::css("tr[id^='row_incident_'] > *:nth-child(10)");

        let mut seen = Vec::new();
        for _ in 0..2 {
            let frame = descend_through_shadow(
                driver.as_ref(),
                &TraversalContext::top(),
                &host,
                "iframe",
                Duration::from_secs(5),
            )
            .await
            .unwrap()
            .found()
            .unwrap();
            let context = enter_frame(driver.as_ref(), &frame).await.unwrap();
            let cell = locate(driver.as_ref(), &context, &rows, Duration::ZERO, Condition::Presence)
                .await
                .unwrap();
            seen.push((context, cell));
        }

        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_frame_cannot_be_entered() {
        let driver = loaded(TestHelper::list_page(&["INC1"])).await;
        let frame = descend_through_shadow(
            driver.as_ref(),
            &TraversalContext::top(),
            &Locator::tag_prefix("macroponent"),
            "iframe",
            Duration::from_secs(5),
        )
        .await
        .unwrap()
        .found()
        .unwrap();

        driver.navigate("https://acme.test/list").await.unwrap();

        let err = enter_frame(driver.as_ref(), &frame).await.unwrap_err();
        assert!(matches!(err, BrowserError::ContextInvalid(_)));
        assert!(err.is_driver_fault());
    }
}
