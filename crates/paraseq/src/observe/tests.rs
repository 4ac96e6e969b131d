use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    EngineState, Error, Event, FnDriver, Hook, HookRegistry, ObservableEnumerator,
    ParallelEnumerator, SequenceDriver, Token, enumerator::tests::OccupiedStore,
};

type Meta = &'static str;
type Log = Arc<Mutex<Vec<(Hook, Option<char>)>>>;

const ALL_HOOKS: [Hook; 5] = [
    Hook::BeforeStart,
    Hook::AfterStart,
    Hook::ItemEncountered,
    Hook::BeforeEnd,
    Hook::AfterEnd,
];

/// Yields `items` in order. A `'!'` item fails to fetch. The termination
/// callback rewinds the sequence and fails when `fail_end` is set.
fn letters(
    items: &'static [char],
    fail_end: bool,
) -> impl SequenceDriver<Item = char, Handshake = char, Err = &'static str> + Send + Sync + 'static
{
    let cursor = Arc::new(AtomicUsize::new(0));
    let rewind = Arc::clone(&cursor);
    FnDriver::new(
        move || items.get(cursor.fetch_add(1, Ordering::SeqCst)).copied(),
        |item, _cancel| async move {
            if item == '!' {
                Err("bad item")
            } else {
                Ok(item)
            }
        },
    )
    .on_ended(move |_abrupt, _cancel| {
        rewind.store(0, Ordering::SeqCst);
        async move {
            if fail_end {
                Err("end failed")
            } else {
                Ok(())
            }
        }
    })
}

fn record(registry: &HookRegistry<char, Meta>) -> Log {
    let log = Log::default();
    for hook in ALL_HOOKS {
        let log = Arc::clone(&log);
        registry.subscribe(hook, move |event| {
            log.lock()
                .unwrap()
                .push((event.hook(), event.item().copied()));
        });
    }
    log
}

fn hooks(log: &Log) -> Vec<Hook> {
    log.lock().unwrap().iter().map(|(hook, _)| *hook).collect()
}

#[tokio::test]
async fn single_item_pass_raises_events_in_order() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A'], false), "letters");
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    let token = enumerator.advance(&cancel).await.unwrap().unwrap();
    assert_eq!(enumerator.redeem(token), Some('A'));
    assert_eq!(enumerator.advance(&cancel).await, Ok(None));
    assert_eq!(enumerator.terminate(&cancel).await, Ok(true));

    assert_eq!(
        *log.lock().unwrap(),
        [
            (Hook::BeforeStart, None),
            (Hook::AfterStart, None),
            (Hook::ItemEncountered, Some('A')),
            (Hook::BeforeEnd, None),
            (Hook::AfterEnd, None),
        ]
    );
}

#[tokio::test]
async fn start_events_are_raised_once_per_pass() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A', 'B', 'C'], false), "abc");
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        while let Some(token) = enumerator.advance(&cancel).await.unwrap() {
            enumerator.redeem(token);
        }
        enumerator.terminate(&cancel).await.unwrap();
    }

    let pass = [
        Hook::BeforeStart,
        Hook::AfterStart,
        Hook::ItemEncountered,
        Hook::ItemEncountered,
        Hook::ItemEncountered,
        Hook::BeforeEnd,
        Hook::AfterEnd,
    ];
    assert_eq!(hooks(&log), [pass, pass].concat());
    let items: Vec<_> = log.lock().unwrap().iter().filter_map(|(_, item)| *item).collect();
    assert_eq!(items, ['A', 'B', 'C', 'A', 'B', 'C']);
}

#[tokio::test]
async fn panicking_subscribers_are_ignored() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A', 'B'], false), "noisy");
    for hook in ALL_HOOKS {
        enumerator.subscribe(hook, |_| panic!("subscriber blew up"));
    }
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    let token = enumerator.advance(&cancel).await.unwrap().unwrap();
    assert_eq!(enumerator.redeem(token), Some('A'));
    assert_eq!(enumerator.terminate(&cancel).await, Ok(true));
    assert_eq!(enumerator.state(), EngineState::Idle);

    assert_eq!(
        hooks(&log),
        [
            Hook::BeforeStart,
            Hook::AfterStart,
            Hook::ItemEncountered,
            Hook::BeforeEnd,
            Hook::AfterEnd,
        ]
    );
}

#[tokio::test]
async fn shared_registry_sees_late_subscribers_after_local_ones() {
    let shared = Arc::new(HookRegistry::<char, Meta>::new());
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A'], false), "shared")
        .with_registry(Arc::clone(&shared));

    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        shared.subscribe(Hook::ItemEncountered, move |_| {
            order.lock().unwrap().push("shared")
        });
    }
    {
        let order = Arc::clone(&order);
        enumerator.subscribe(Hook::ItemEncountered, move |_| {
            order.lock().unwrap().push("local")
        });
    }

    let cancel = CancellationToken::new();
    enumerator.advance(&cancel).await.unwrap();
    assert_eq!(*order.lock().unwrap(), ["local", "shared"]);
    assert!(enumerator.registry().is_some());
}

#[tokio::test]
async fn metadata_travels_with_every_event() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A'], false), "catalog");
    let seen = Arc::new(AtomicUsize::new(0));
    for hook in ALL_HOOKS {
        let seen = Arc::clone(&seen);
        enumerator.subscribe(hook, move |event| {
            assert_eq!(*event.metadata(), "catalog");
            seen.fetch_add(1, Ordering::SeqCst);
        });
    }
    let cancel = CancellationToken::new();

    enumerator.advance(&cancel).await.unwrap();
    enumerator.terminate(&cancel).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(*enumerator.metadata(), "catalog");
}

#[tokio::test]
async fn after_start_fires_when_the_first_advance_fails() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['!', 'B'], false), "broken");
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    assert_eq!(
        enumerator.advance(&cancel).await,
        Err(Error::Driver("bad item"))
    );
    assert_eq!(hooks(&log), [Hook::BeforeStart, Hook::AfterStart]);

    // the pass already started; later advances raise only item events
    assert_eq!(enumerator.advance(&cancel).await, Ok(Some(Token::from_raw(2))));
    assert_eq!(
        hooks(&log),
        [Hook::BeforeStart, Hook::AfterStart, Hook::ItemEncountered]
    );
}

#[tokio::test]
async fn after_end_fires_when_terminate_fails() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A'], true), "stubborn");
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    enumerator.advance(&cancel).await.unwrap();
    assert_eq!(
        enumerator.terminate(&cancel).await,
        Err(Error::Driver("end failed"))
    );
    assert_eq!(enumerator.state(), EngineState::Idle);

    // start events are re-armed regardless
    enumerator.advance(&cancel).await.unwrap();
    assert_eq!(
        hooks(&log),
        [
            Hook::BeforeStart,
            Hook::AfterStart,
            Hook::ItemEncountered,
            Hook::BeforeEnd,
            Hook::AfterEnd,
            Hook::BeforeStart,
            Hook::AfterStart,
            Hook::ItemEncountered,
        ]
    );
}

#[tokio::test]
async fn terminating_an_idle_enumerator_still_raises_end_events() {
    let enumerator = ObservableEnumerator::with_metadata(letters(&['A'], false), "idle");
    let log = record(enumerator.hooks());

    assert_eq!(
        enumerator.terminate(&CancellationToken::new()).await,
        Ok(false)
    );
    assert_eq!(hooks(&log), [Hook::BeforeEnd, Hook::AfterEnd]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_first_advances_raise_start_once() {
    const ITEMS: &[char] = &['a', 'b', 'c', 'd', 'e', 'f'];
    let enumerator = Arc::new(ObservableEnumerator::with_metadata(letters(ITEMS, false), "race"));
    let counts: Arc<[AtomicUsize; 5]> = Arc::new(Default::default());
    for (index, hook) in ALL_HOOKS.into_iter().enumerate() {
        let counts = Arc::clone(&counts);
        enumerator.subscribe(hook, move |_| {
            counts[index].fetch_add(1, Ordering::SeqCst);
        });
    }

    let cancel = CancellationToken::new();
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let enumerator = Arc::clone(&enumerator);
            let cancel = cancel.clone();
            tokio::spawn(async move { enumerator.advance(&cancel).await })
        })
        .collect();
    let tokens: Vec<Token> = try_join_all(tasks)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|advanced| match advanced {
            Ok(token) => token,
            Err(Error::AdvanceAfterEnd) => None,
            Err(err) => panic!("unexpected advance error {err:?}"),
        })
        .collect();

    assert_eq!(tokens.len(), ITEMS.len());
    assert_eq!(counts[0].load(Ordering::SeqCst), 1);
    assert_eq!(counts[1].load(Ordering::SeqCst), 1);
    assert_eq!(counts[2].load(Ordering::SeqCst), ITEMS.len());
    assert_eq!(enumerator.outstanding(), ITEMS.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_pass_started_right_after_reset_still_raises_start() {
    const PASSES: usize = 200;
    let enumerator = Arc::new(ObservableEnumerator::with_metadata(
        letters(&['A', 'B'], false),
        "eager",
    ));
    let starts = Arc::new(AtomicUsize::new(0));
    {
        let starts = Arc::clone(&starts);
        enumerator.subscribe(Hook::BeforeStart, move |_| {
            starts.fetch_add(1, Ordering::SeqCst);
        });
    }
    let cancel = CancellationToken::new();

    for _ in 0..PASSES {
        assert!(enumerator.advance(&cancel).await.unwrap().is_some());
        // starts the next pass as soon as the engine reports idle, racing
        // the tail of the terminate below
        let eager = tokio::spawn({
            let enumerator = Arc::clone(&enumerator);
            let cancel = cancel.clone();
            async move {
                while enumerator.state() != EngineState::Idle {
                    tokio::task::yield_now().await;
                }
                enumerator.advance(&cancel).await
            }
        });
        enumerator.terminate(&cancel).await.unwrap();
        assert!(eager.await.unwrap().unwrap().is_some());
        enumerator.terminate(&cancel).await.unwrap();
    }

    assert_eq!(starts.load(Ordering::SeqCst), 2 * PASSES);
}

#[tokio::test]
async fn failed_claims_raise_no_item_event_and_propagate() {
    let inner = ParallelEnumerator::with_store(letters(&['A'], false), OccupiedStore);
    let enumerator = ObservableEnumerator::from_enumerator(inner, "occupied");
    let log = record(enumerator.hooks());
    let cancel = CancellationToken::new();

    assert_eq!(
        enumerator.advance(&cancel).await,
        Err(Error::DuplicateToken(Token::from_raw(1)))
    );
    assert_eq!(hooks(&log), [Hook::BeforeStart, Hook::AfterStart]);
}

#[test]
fn unsubscribed_callbacks_stop_firing() {
    let registry = HookRegistry::<char, Meta>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = {
        let hits = Arc::clone(&hits);
        registry.subscribe(Hook::ItemEncountered, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };
    let event = Event::ItemEncountered {
        item: &'x',
        metadata: &"unsubscribe",
    };

    registry.dispatch(&event);
    assert_eq!(registry.subscriber_count(Hook::ItemEncountered), 1);
    assert!(registry.unsubscribe(id));
    assert!(!registry.unsubscribe(id));
    registry.dispatch(&event);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(registry.subscriber_count(Hook::ItemEncountered), 0);
}

#[test]
fn subscribers_may_subscribe_from_inside_a_callback() {
    let registry = Arc::new(HookRegistry::<char, Meta>::new());
    {
        let inner = Arc::clone(&registry);
        registry.subscribe(Hook::BeforeStart, move |_| {
            inner.subscribe(Hook::BeforeStart, |_| {});
        });
    }

    registry.dispatch(&Event::BeforeStart { metadata: &"reentrant" });
    assert_eq!(registry.subscriber_count(Hook::BeforeStart), 2);
}
