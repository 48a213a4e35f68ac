use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use checkout_engine::{
    db_types::{Cents, OrderStatusType},
    events::{EventHandlers, EventHooks},
    helpers::MockClock,
    CheckoutFlowApi,
    CheckoutRequest,
    MemoryDatabase,
};
use chrono::Duration;
use futures_util::FutureExt;
use log::*;

mod support;
use support::*;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn lifecycle_hooks_fire_once_per_transition() {
    let _ = env_logger::try_init();
    let created = HookCalled::default();
    let completed = HookCalled::default();
    let expired = HookCalled::default();
    let cancelled = HookCalled::default();

    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_order_created(move |ev| {
        info!("🪝️ Created {}", ev.order.id);
        c.called();
        async {}.boxed()
    });
    let c = completed.clone();
    hooks.on_order_completed(move |ev| {
        assert_eq!(ev.order.status, OrderStatusType::Completed);
        c.called();
        async {}.boxed()
    });
    let (e, x) = (expired.clone(), cancelled.clone());
    hooks.on_order_annulled(move |ev| {
        match ev.status {
            OrderStatusType::Expired => e.called(),
            OrderStatusType::Cancelled => x.called(),
            s => panic!("Unexpected annulled status {s}"),
        }
        async {}.boxed()
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    let db = MemoryDatabase::new();
    seed_event(&db, 30).await;
    seed_ticket(&db, "ga", 20, Cents::from_dollars(50)).await;
    let clock = MockClock::new(checkout_time());
    let api = CheckoutFlowApi::new(db, producers).with_clock(Arc::new(clock.clone()));
    let runner = tokio::spawn(handlers.start_handlers());

    let ids = futures_util::future::join_all(
        (0..4).map(|_| api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 1))),
    )
    .await
    .into_iter()
    .map(|r| r.unwrap().order_id)
    .collect::<Vec<_>>();
    api.complete(&ids[0]).await.unwrap();
    // Duplicate confirmations do not fire again
    api.complete(&ids[0]).await.unwrap();
    api.cancel(&ids[1], None).await.unwrap();
    api.cancel(&ids[1], None).await.unwrap();
    clock.advance(Duration::minutes(16));
    assert_eq!(api.expire_stale_orders().await.unwrap().expired_count(), 2);

    // Dropping the last producer lets the handlers drain and stop
    drop(api);
    runner.await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(created.count(), 4);
    assert_eq!(completed.count(), 1);
    assert_eq!(cancelled.count(), 1);
    assert_eq!(expired.count(), 2);
}
