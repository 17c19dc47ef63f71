//! Session lifecycle and dispatch tests over an in-memory transport.
//!
//! The fake transport hands every established stream's emitter back to the
//! test, which then plays the role of the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use sselink::{
    ClosedHandler, ConnectionParameters, FrameEmitter, Handler, ListenerId, Message,
    MessageHandler, OpenHandler, RawStatus, ResponsePayload, RetryErrorHandler, SessionManager,
    SessionState, StreamHandle, StreamRequest, StreamTransport, Subscription,
};
use sselink_transport_traits::TransportResult;

#[derive(Debug, Default)]
struct InMemoryTransport {
    streams: Mutex<Vec<(StreamRequest, FrameEmitter)>>,
}

impl InMemoryTransport {
    fn emitter(&self, index: usize) -> FrameEmitter {
        self.streams.lock().unwrap()[index].1.clone()
    }

    fn request(&self, index: usize) -> StreamRequest {
        self.streams.lock().unwrap()[index].0.clone()
    }

    fn established(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

impl StreamTransport for InMemoryTransport {
    fn establish(&self, request: StreamRequest) -> TransportResult<StreamHandle> {
        let (emitter, handle) = StreamHandle::channel(64);
        self.streams.lock().unwrap().push((request, emitter));
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

fn setup() -> (Arc<InMemoryTransport>, SessionManager) {
    let transport = Arc::new(InMemoryTransport::default());
    let manager = SessionManager::new(transport.clone());
    (transport, manager)
}

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// Helper to wait for asynchronous delivery with timeout
async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_open_message_retry_error_then_close() {
    let (transport, manager) = setup();
    let params = ConnectionParameters::new("https://e.example/stream").query("topic", "t1");
    let session = manager.open(&params).unwrap();

    assert_eq!(transport.request(0).url, "https://e.example/stream?topic=t1");
    assert_eq!(session.state(), SessionState::Idle);

    let events = log();
    let sink = Arc::clone(&events);
    session.on_open(OpenHandler::signal(move || sink.lock().unwrap().push("open".into())));
    let sink = Arc::clone(&events);
    session.add_event_listener(
        "LOCATION_FEED",
        MessageHandler::new(move |message: &Message| {
            sink.lock().unwrap().push(format!("location {}", message.data));
        }),
    );
    let sink = Arc::clone(&events);
    session.on_retry_error(RetryErrorHandler::new(move |error| {
        sink.lock().unwrap().push(format!("retry-error {:?}", error.status()));
    }));
    let sink = Arc::clone(&events);
    session.on_closed(ClosedHandler::signal(move || sink.lock().unwrap().push("closed".into())));

    let emitter = transport.emitter(0);
    assert!(emitter.emit_open().await);
    assert!(emitter.emit_message("7", "LOCATION_FEED", "{\"lat\":1}").await);
    assert!(
        emitter
            .emit_retry_error(
                None,
                Some(ResponsePayload {
                    status: Some(RawStatus::from("500")),
                    ..ResponsePayload::default()
                }),
            )
            .await
    );

    wait_for(|| events.lock().unwrap().len() == 3).await;
    assert_eq!(session.state(), SessionState::Retrying);

    assert!(session.close());
    assert_eq!(
        entries(&events),
        vec!["open", "location {\"lat\":1}", "retry-error Some(500)", "closed"]
    );

    // The receive side is gone; late frames reach nobody
    let _ = emitter.emit_message("8", "LOCATION_FEED", "late").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(entries(&events).len(), 4);
    assert_eq!(session.listener_count(), 0);
    assert!(!manager.is_active());
}

#[tokio::test]
async fn test_frames_are_delivered_in_emission_order() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/ordered"))
        .unwrap();

    let seen = log();
    let sink = Arc::clone(&seen);
    session.on_message(MessageHandler::new(move |message: &Message| {
        sink.lock().unwrap().push(message.data.clone());
    }));

    let emitter = transport.emitter(0);
    for n in 0..200 {
        assert!(emitter.emit_message(n.to_string(), "message", n.to_string()).await);
    }

    wait_for(|| seen.lock().unwrap().len() == 200).await;
    let expected: Vec<String> = (0..200).map(|n: i32| n.to_string()).collect();
    assert_eq!(entries(&seen), expected);
}

#[tokio::test]
async fn test_typed_listeners_only_receive_their_event() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/typed"))
        .unwrap();

    let seen = log();
    for tag in ["A", "B"] {
        let sink = Arc::clone(&seen);
        session.add_event_listener(
            tag,
            MessageHandler::new(move |message: &Message| {
                sink.lock().unwrap().push(format!("{tag}:{}", message.data));
            }),
        );
    }

    let emitter = transport.emitter(0);
    emitter.emit_message("", "B", "1").await;
    emitter.emit_message("", "C", "2").await;
    emitter.emit_message("", "A", "3").await;

    wait_for(|| seen.lock().unwrap().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(entries(&seen), vec!["B:1", "A:3"]);
}

#[tokio::test]
async fn test_equal_parameters_share_one_stream() {
    let (transport, manager) = setup();
    let a = ConnectionParameters::new("https://e.example/stream")
        .header("Authorization", "Bearer t")
        .query("x", "1")
        .query("y", "2");
    let b = ConnectionParameters::new("https://e.example/stream")
        .query("y", "2")
        .query("x", "1")
        .header("Authorization", "Bearer t");

    let first = manager.open(&a).unwrap();
    let second = manager.open(&b).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(transport.established(), 1);

    let other = manager.open(&a.clone().query("x", "3")).unwrap();
    assert!(!first.ptr_eq(&other));
    assert_eq!(transport.established(), 2);
    assert_eq!(manager.session_count(), 2);
}

#[tokio::test]
async fn test_double_close_is_noop() {
    let (_transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/close"))
        .unwrap();

    let closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closed);
    session.on_closed(ClosedHandler::signal(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(session.close());
    assert!(!session.close());
    assert!(!manager.close(&session));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_remove_many_matches_sequential_remove() {
    let (_transport, manager) = setup();
    let batch = manager
        .open(&ConnectionParameters::new("https://e.example/batch"))
        .unwrap();
    let sequential = manager
        .open(&ConnectionParameters::new("https://e.example/sequential"))
        .unwrap();

    let register = |session: &sselink::SessionHandle| -> Vec<ListenerId> {
        vec![
            session.add_event_listener("A", MessageHandler::new(|_| {})),
            session.add_event_listener("B", MessageHandler::new(|_| {})),
            session.on_open(OpenHandler::signal(|| {})),
            session.subscribe(Subscription::Comment(Handler::new(|_: &str| {}))),
        ]
    };

    let ids = register(&batch);
    let removed = batch.remove_many([ids[2], ids[0], ids[0]]);

    let ids_seq = register(&sequential);
    let mut removed_seq = 0;
    for id in [ids_seq[2], ids_seq[0], ids_seq[0]] {
        if sequential.remove(id) {
            removed_seq += 1;
        }
    }

    assert_eq!(removed, removed_seq);
    assert_eq!(batch.listener_count(), sequential.listener_count());
    assert_eq!(batch.listener_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_delivery_after_remove_returns() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/race"))
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = session.add_event_listener(
        "tick",
        MessageHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let emitter = transport.emitter(0);
    let producer = tokio::spawn(async move {
        let mut n = 0u64;
        while emitter.emit_message(n.to_string(), "tick", "x").await {
            n += 1;
            tokio::task::yield_now().await;
        }
    });

    // Direct deliveries from plain threads race the receive task
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    session.deliver_frame(sselink::RawFrame::message("", "tick", "y"));
                }
            })
        })
        .collect();

    wait_for(|| calls.load(Ordering::SeqCst) > 100).await;
    assert!(session.remove(id));
    let after_remove = calls.load(Ordering::SeqCst);

    for thread in threads {
        thread.join().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_remove);

    session.close();
    tokio::time::timeout(Duration::from_secs(5), producer)
        .await
        .expect("producer did not stop after close")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_delivery_after_close_returns() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/close-race"))
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    session.add_event_listener(
        "tick",
        MessageHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let counter = Arc::clone(&calls);
    session.on_message(MessageHandler::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let closed = Arc::new(AtomicUsize::new(0));
    let closed_counter = Arc::clone(&closed);
    session.on_closed(ClosedHandler::signal(move || {
        closed_counter.fetch_add(1, Ordering::SeqCst);
    }));

    let emitter = transport.emitter(0);
    let producer = tokio::spawn(async move {
        let mut n = 0u64;
        while emitter.emit_message(n.to_string(), "tick", "x").await {
            n += 1;
            tokio::task::yield_now().await;
        }
    });

    // Each thread keeps delivering until the session refuses a frame
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            std::thread::spawn(move || {
                while session.deliver_frame(sselink::RawFrame::message("", "tick", "y")) {}
            })
        })
        .collect();

    wait_for(|| calls.load(Ordering::SeqCst) > 200).await;
    assert!(session.close());
    let after_close = calls.load(Ordering::SeqCst);

    for thread in threads {
        thread.join().unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), producer)
        .await
        .expect("producer did not stop after close")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), after_close);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(session.listener_count(), 0);
}

#[tokio::test]
async fn test_closing_stops_transport() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/stop"))
        .unwrap();
    let emitter = transport.emitter(0);
    assert!(!emitter.is_terminated());

    session.close();
    assert!(emitter.is_terminated());
}

#[tokio::test]
async fn test_reopen_after_close_creates_new_session() {
    let (transport, manager) = setup();
    let params = ConnectionParameters::new("https://e.example/again");

    let first = manager.open(&params).unwrap();
    first.close();
    let second = manager.open(&params).unwrap();

    assert!(!first.ptr_eq(&second));
    assert_eq!(second.state(), SessionState::Idle);
    assert_eq!(transport.established(), 2);

    transport.emitter(1).emit_open().await;
    wait_for(|| second.state() == SessionState::Open).await;
    assert_eq!(first.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_reconnect_cycle_returns_to_open() {
    let (transport, manager) = setup();
    let session = manager
        .open(&ConnectionParameters::new("https://e.example/cycle"))
        .unwrap();
    let emitter = transport.emitter(0);

    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    session.on_open(OpenHandler::signal(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    emitter.emit_open().await;
    emitter.emit_retry_error(None, None).await;
    emitter.emit_pre_retry().await;
    wait_for(|| session.state() == SessionState::Retrying).await;

    emitter.emit_open().await;
    wait_for(|| opens.load(Ordering::SeqCst) == 2).await;
    assert_eq!(session.state(), SessionState::Open);
}
