mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::{class, drain, engine, raw, unnumbered, FakePage};
use frs_auto_taker::error::AppError;
use frs_auto_taker::infrastructure::{Event, EventSink, Store};
use frs_auto_taker::models::{BaselineEntry, CachedClasses, ClassOption, RunMode, UserOptions};
use frs_auto_taker::workflow::{
    AttemptOutcome, CycleOutcome, HuntingEngine, QuotaWatcher, SelectOutcome,
};
use tokio_test::{assert_err, assert_ok};

struct Fixture {
    store: Store,
    page: Arc<FakePage>,
    events: EventSink,
    engine: HuntingEngine<FakePage>,
    watcher: QuotaWatcher<FakePage>,
}

async fn fixture(priority: Vec<ClassOption>, on_page: Vec<ClassOption>) -> Fixture {
    let store = Store::in_memory();
    assert_ok!(store.set_priority(priority).await);
    let page = Arc::new(FakePage::with_classes(on_page));
    let events = EventSink::new(32);
    let engine = engine(&store, &page, &events);
    let watcher = QuotaWatcher::new(
        store.clone(),
        page.clone(),
        events.clone(),
        &UserOptions::default(),
    );
    Fixture {
        store,
        page,
        events,
        engine,
        watcher,
    }
}

/// 模拟一次页面加载后缓存的班级
async fn reload_with(fx: &Fixture, classes: Vec<ClassOption>, updated_at: i64) {
    fx.page.set_classes(classes.clone());
    assert_ok!(
        fx.store
            .set_cached_classes(CachedClasses {
                updated_at,
                items: classes,
            })
            .await
    );
}

#[tokio::test]
async fn quota_increase_hands_off_to_hunting() {
    let a = class("IF1001", "A", 30, 30);
    let mut fx = fixture(vec![a.clone()], vec![a.clone()]).await;
    let mut rx = fx.events.subscribe();

    let first = assert_ok!(fx.watcher.enable(true, &fx.engine).await);
    assert_eq!(
        first,
        CycleOutcome::Scheduled {
            after: Duration::from_secs(30),
            extended: Vec::new(),
        }
    );
    assert!(fx.watcher.timer().is_armed());
    assert_eq!(fx.store.watch_baseline().await[&a.raw_value].quota, Some(30));

    reload_with(&fx, vec![class("IF1001", "A", 30, 35)], 2).await;
    let outcome = assert_ok!(fx.watcher.check_cycle(&fx.engine).await);

    let CycleOutcome::HandedOff {
        items,
        queue,
        selection,
    } = outcome
    else {
        panic!("increase should hand off");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].old_quota, 30);
    assert_eq!(items[0].new_quota, 35);
    assert_eq!(items[0].delta, 5);
    assert_eq!(queue, vec![raw("IF1001", "A")]);
    assert_eq!(
        selection,
        SelectOutcome::Attempted(AttemptOutcome::AwaitingCaptcha {
            raw_value: raw("IF1001", "A"),
            attempt: 1,
        })
    );

    let state = fx.store.snapshot().await;
    assert!(!state.watch_enabled);
    assert_eq!(state.run_mode, RunMode::Hunting);
    assert_eq!(state.watch_queue, VecDeque::from(vec![raw("IF1001", "A")]));
    assert_eq!(state.pending.map(|p| p.attempt_count), Some(1));
    assert!(state.watch_last_check.is_some());
    assert!(!fx.watcher.timer().is_armed());
    assert_eq!(fx.page.with(|s| s.overlays.len()), 1);

    let received = drain(&mut rx);
    assert!(received
        .iter()
        .any(|e| matches!(e, Event::WatchFoundIncrease(items) if items.len() == 1)));
}

#[tokio::test]
async fn enabling_while_hunting_is_rejected() {
    let a = class("IF1001", "A", 30, 30);
    let mut fx = fixture(vec![a.clone()], vec![a]).await;
    assert_ok!(fx.store.set_run_mode(RunMode::Hunting).await);

    let err = assert_err!(fx.watcher.enable(true, &fx.engine).await);
    assert!(matches!(
        err,
        AppError::WatchRejected {
            run_mode: RunMode::Hunting
        }
    ));
    assert!(!fx.store.watch_enabled().await);
    assert!(fx.store.watch_baseline().await.is_empty());
    assert!(!fx.watcher.timer().is_armed());
}

#[tokio::test]
async fn cycle_is_inactive_while_hunting() {
    let a = class("IF1001", "A", 30, 30);
    let mut fx = fixture(vec![a.clone()], vec![a]).await;
    assert_ok!(
        fx.store
            .update(|s| {
                s.watch_enabled = true;
                s.run_mode = RunMode::Hunting;
            })
            .await
    );

    let outcome = assert_ok!(fx.watcher.check_cycle(&fx.engine).await);
    assert_eq!(outcome, CycleOutcome::Inactive);
    assert!(!fx.watcher.timer().is_armed());
}

#[tokio::test]
async fn rebuilding_from_same_cache_is_idempotent() {
    let a = class("IF1001", "A", 12, 30);
    let b = class("IF1002", "B", 3, 25);
    let other = class("IF2001", "A", 1, 10);
    let fx = fixture(vec![a.clone(), b.clone()], Vec::new()).await;
    reload_with(&fx, vec![a.clone(), b.clone(), other], 5).await;

    let first = assert_ok!(fx.watcher.rebuild_baseline().await);
    let second = assert_ok!(fx.watcher.rebuild_baseline().await);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(
        first[&a.raw_value],
        BaselineEntry {
            quota: Some(30),
            filled: Some(12),
            observed_at: 5,
        }
    );
}

#[tokio::test]
async fn first_numeric_quota_is_not_an_increase() {
    let a = unnumbered("IF1001", "A");
    let mut fx = fixture(vec![a.clone()], vec![a.clone()]).await;

    assert_ok!(fx.watcher.enable(true, &fx.engine).await);
    assert_eq!(fx.store.watch_baseline().await[&a.raw_value].quota, None);

    reload_with(&fx, vec![class("IF1001", "A", 3, 40)], 2).await;
    let outcome = assert_ok!(fx.watcher.check_cycle(&fx.engine).await);

    assert!(matches!(outcome, CycleOutcome::Scheduled { ref extended, .. } if extended.is_empty()));
    assert_eq!(fx.store.watch_baseline().await[&a.raw_value].quota, Some(40));
    assert!(fx.store.watch_enabled().await);
    assert_eq!(fx.store.run_mode().await, RunMode::Idle);
}

#[tokio::test]
async fn increase_outside_priority_keeps_watching() {
    let a = class("IF1001", "A", 30, 30);
    let x = class("IF2001", "A", 10, 10);
    let mut fx = fixture(vec![a.clone()], vec![a.clone(), x.clone()]).await;

    assert_ok!(fx.watcher.enable(true, &fx.engine).await);
    // 基线里残留一个已从优先级列表移除的班级
    assert_ok!(
        fx.store
            .update(|s| {
                s.watch_baseline.insert(
                    x.raw_value.clone(),
                    BaselineEntry {
                        quota: Some(10),
                        filled: Some(10),
                        observed_at: 1,
                    },
                );
            })
            .await
    );

    reload_with(&fx, vec![a.clone(), class("IF2001", "A", 10, 15)], 3).await;
    let outcome = assert_ok!(fx.watcher.check_cycle(&fx.engine).await);

    let CycleOutcome::Scheduled { extended, .. } = outcome else {
        panic!("non-priority increase should keep watching");
    };
    assert_eq!(extended.len(), 1);
    assert_eq!(extended[0].raw_value, x.raw_value);

    let state = fx.store.snapshot().await;
    assert!(state.watch_enabled);
    assert_eq!(state.run_mode, RunMode::Idle);
    assert!(state.watch_queue.is_empty());
    // 刷新后的基线只包含优先级列表中的班级
    assert!(!state.watch_baseline.contains_key(&x.raw_value));
    assert!(fx.watcher.timer().is_armed());
    assert_eq!(fx.page.with(|s| s.overlays.len()), 1);
}

#[tokio::test]
async fn disabling_cancels_timer_and_removes_overlay() {
    let a = class("IF1001", "A", 30, 30);
    let mut fx = fixture(vec![a.clone()], vec![a]).await;

    assert_ok!(fx.watcher.enable(true, &fx.engine).await);
    assert!(fx.watcher.timer().is_armed());

    let outcome = assert_ok!(fx.watcher.enable(false, &fx.engine).await);
    assert_eq!(outcome, CycleOutcome::Inactive);
    assert!(!fx.watcher.timer().is_armed());
    assert!(!fx.store.watch_enabled().await);
    assert_eq!(fx.page.with(|s| s.overlay_removed), 1);
}

#[tokio::test(start_paused = true)]
async fn reload_is_due_after_interval() {
    let a = class("IF1001", "A", 30, 30);
    let mut fx = fixture(vec![a.clone()], vec![a]).await;
    fx.watcher.apply_options(&UserOptions {
        max_captcha_attempts: 8,
        watch_interval_secs: 10,
    });

    assert_ok!(fx.watcher.enable(true, &fx.engine).await);
    assert!(!fx.watcher.take_due_reload());

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(fx.watcher.take_due_reload());
    assert!(!fx.watcher.timer().is_armed());
}
