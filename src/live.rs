//! Live page sessions.
//!
//! A served page opens a websocket back to the server. The page's events go
//! through a [`Dispatcher`](crate::controller::Dispatcher) into its own
//! [`Controller`], and every frame the controller publishes goes back down the
//! socket. The page rendered over plain HTTP leaves its settled view in the
//! [`SessionStore`], so connecting doesn't fetch the feed a second time.

use std::collections::{HashMap, VecDeque};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::controller::{Controller, Event};
use crate::dice::{Dice, SplitMix64};
use crate::state::ViewState;

/// A message from the page script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Navigate { fragment: String },
    Resize { width: u32 },
    Submit { username: String },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Ignoring malformed page message: {}", e);
                None
            }
        }
    }

    /// The controller event this message stands for. A zero width is dropped.
    pub fn into_event(self) -> Option<Event> {
        match self {
            ClientMessage::Navigate { fragment } => Some(Event::Navigate(fragment)),
            ClientMessage::Resize { width: 0 } => None,
            ClientMessage::Resize { width } => Some(Event::Resize(width)),
            ClientMessage::Submit { username } => Some(Event::Submit(username)),
        }
    }
}

/// Settled views waiting for their page to connect.
///
/// Holds at most `capacity` views; the oldest is evicted first. A view can be
/// claimed once.
pub struct SessionStore {
    capacity: usize,
    inner: Mutex<Sessions>,
}

struct Sessions {
    dice: SplitMix64,
    issued: u64,
    views: HashMap<String, ViewState>,
    order: VecDeque<String>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Sessions {
                dice: SplitMix64::from_clock(),
                issued: 0,
                views: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// A token no other page has been given.
    pub async fn issue(&self) -> String {
        let mut guard = self.inner.lock().await;
        let sessions = &mut *guard;
        sessions.issued += 1;
        format!("{:x}-{:016x}", sessions.issued, sessions.dice.next_u64())
    }

    pub async fn put(&self, token: String, view: ViewState) {
        if self.capacity == 0 {
            return;
        }

        let mut sessions = self.inner.lock().await;
        while sessions.order.len() >= self.capacity {
            let Some(oldest) = sessions.order.pop_front() else {
                break;
            };
            sessions.views.remove(&oldest);
            debug!("Evicted unclaimed session {}", oldest);
        }
        sessions.order.push_back(token.clone());
        sessions.views.insert(token, view);
    }

    pub async fn take(&self, token: &str) -> Option<ViewState> {
        let mut sessions = self.inner.lock().await;
        let view = sessions.views.remove(token)?;
        sessions.order.retain(|t| t != token);
        Some(view)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.views.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drive `controller` from a page until either side goes away.
///
/// A frame the controller already published is sent first, so a freshly
/// started controller shows its loading state. A resumed one sends nothing
/// until its first event.
pub async fn serve_session<I, O>(mut controller: Controller, incoming: I, outgoing: O)
where
    I: Stream<Item = Event> + Send,
    O: Sink<String> + Send,
{
    futures::pin_mut!(incoming);
    futures::pin_mut!(outgoing);

    let dispatcher = controller.subscribe();
    let mut frames = controller.frames();
    let current = frames.borrow_and_update().clone();
    if current.seq > 0 && outgoing.send(current.html).await.is_err() {
        return;
    }

    let run = controller.run();
    futures::pin_mut!(run);

    loop {
        // Frames are drained before the controller moves on.
        tokio::select! {
            biased;
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let html = frames.borrow_and_update().html.clone();
                if outgoing.send(html).await.is_err() {
                    break;
                }
            }
            event = incoming.next() => match event {
                Some(event) => {
                    if dispatcher.send(event).is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut run => break,
        }
    }

    debug!("Live session closed");
}

/// Serve a session over a websocket. Frames go out as text messages; text
/// messages coming in are parsed as [`ClientMessage`]s.
pub async fn attach(controller: Controller, socket: WebSocket) {
    let (sink, stream) = socket.split();

    let incoming = stream.filter_map(|message| async move {
        match message {
            Ok(Message::Text(text)) => ClientMessage::parse(&text).and_then(ClientMessage::into_event),
            Ok(_) => None,
            Err(e) => {
                debug!("Socket error: {}", e);
                None
            }
        }
    });
    let outgoing = sink.with(|html: String| async move { Ok::<_, axum::Error>(Message::Text(html)) });

    serve_session(controller, incoming, outgoing).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerOptions;
    use crate::feed::{FeedFetchError, FeedSource, Newsletter, Publication, Story};
    use crate::render::{FixedClock, Renderer};
    use crate::router::Route;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch_feed(&self, username: &str) -> Result<Newsletter, FeedFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(newsletter(&format!("The {} Times", username)))
        }
    }

    fn newsletter(title: &str) -> Newsletter {
        Newsletter {
            publication: Publication {
                title: Some(title.to_string()),
                ..Publication::default()
            },
            stories: vec![Story {
                id: "s1".to_string(),
                title: "Headline".to_string(),
                content: Some("<p>Body</p>".to_string()),
                ..Story::default()
            }],
        }
    }

    fn controller(source: Arc<CountingSource>) -> Controller {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let renderer = Renderer::new(Box::new(SplitMix64::seeded(3)), Box::new(FixedClock(now)));
        Controller::new(source, renderer, ControllerOptions::default())
    }

    fn settled_view() -> ViewState {
        let letter = newsletter("The example Times");
        let mut view = ViewState::new(Route::Feed {
            username: "example".to_string(),
        });
        view.publication = Some(letter.publication);
        view.stories = letter.stories;
        view
    }

    struct Page {
        events: mpsc::UnboundedSender<Event>,
        frames: mpsc::UnboundedReceiver<String>,
        session: tokio::task::JoinHandle<()>,
    }

    impl Page {
        fn open(controller: Controller) -> Self {
            let (events, incoming) = mpsc::unbounded();
            let (outgoing, frames) = mpsc::unbounded();
            let session = tokio::spawn(serve_session(controller, incoming, outgoing));
            Self {
                events,
                frames,
                session,
            }
        }

        fn send(&self, event: Event) {
            self.events.unbounded_send(event).unwrap();
        }

        async fn next_frame(&mut self) -> String {
            tokio::time::timeout(Duration::from_secs(5), self.frames.next())
                .await
                .expect("frame within timeout")
                .expect("session still open")
        }

        async fn close(self) {
            drop(self.events);
            self.session.await.unwrap();
        }
    }

    mod client_message_tests {
        use super::*;

        #[test]
        fn test_parse_messages() {
            assert_eq!(
                ClientMessage::parse(r#"{"type":"navigate","fragment":"/@example"}"#),
                Some(ClientMessage::Navigate {
                    fragment: "/@example".to_string()
                })
            );
            assert_eq!(
                ClientMessage::parse(r#"{"type":"resize","width":800}"#),
                Some(ClientMessage::Resize { width: 800 })
            );
            assert_eq!(
                ClientMessage::parse(r#"{"type":"submit","username":" example "}"#),
                Some(ClientMessage::Submit {
                    username: " example ".to_string()
                })
            );
        }

        #[test]
        fn test_malformed_messages_ignored() {
            assert_eq!(ClientMessage::parse("resize"), None);
            assert_eq!(ClientMessage::parse(r#"{"type":"scroll"}"#), None);
        }

        #[test]
        fn test_zero_width_dropped() {
            assert_eq!(ClientMessage::Resize { width: 0 }.into_event(), None);
            assert_eq!(
                ClientMessage::Resize { width: 640 }.into_event(),
                Some(Event::Resize(640))
            );
        }
    }

    mod session_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_tokens_are_unique() {
            let store = SessionStore::new(4);
            let a = store.issue().await;
            let b = store.issue().await;
            assert_ne!(a, b);
        }

        #[tokio::test]
        async fn test_view_claimed_once() {
            let store = SessionStore::new(4);
            let token = store.issue().await;
            store.put(token.clone(), settled_view()).await;

            assert_eq!(store.take(&token).await, Some(settled_view()));
            assert_eq!(store.take(&token).await, None);
            assert!(store.is_empty().await);
        }

        #[tokio::test]
        async fn test_oldest_view_evicted() {
            let store = SessionStore::new(2);
            for token in ["a", "b", "c"] {
                store.put(token.to_string(), settled_view()).await;
            }

            assert_eq!(store.len().await, 2);
            assert!(store.take("a").await.is_none());
            assert!(store.take("c").await.is_some());
        }

        #[tokio::test]
        async fn test_zero_capacity_stores_nothing() {
            let store = SessionStore::new(0);
            store.put("a".to_string(), settled_view()).await;
            assert!(store.is_empty().await);
        }
    }

    mod serve_session_tests {
        use super::*;

        #[tokio::test]
        async fn test_resize_rerenders_without_fetching() {
            let source = Arc::new(CountingSource::default());
            let mut c = controller(source.clone());
            c.resume(settled_view());
            let mut page = Page::open(c);

            page.send(Event::Resize(600));
            let html = page.next_frame().await;

            assert!(html.contains("scale(0.48)"));
            assert!(html.contains("The example Times"));
            page.close().await;
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_resize_burst_is_debounced() {
            let source = Arc::new(CountingSource::default());
            let mut c = controller(source.clone());
            c.resume(settled_view());
            let mut page = Page::open(c);

            page.send(Event::Resize(800));
            page.send(Event::Resize(900));
            page.send(Event::Resize(1000));

            assert!(page.next_frame().await.contains("scale(0.64)"));
            assert!(page.next_frame().await.contains("scale(0.8)"));
            page.close().await;
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_navigation_fetches_and_streams_frames() {
            let source = Arc::new(CountingSource::default());
            let mut c = controller(source.clone());
            c.resume(settled_view());
            let mut page = Page::open(c);

            page.send(Event::Navigate("/@other".to_string()));

            assert!(page.next_frame().await.contains("Loading stories..."));
            assert!(page.next_frame().await.contains("The other Times"));
            page.close().await;
            assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_started_controller_sends_current_frame_first() {
            let source = Arc::new(CountingSource::default());
            let mut c = controller(source.clone());
            c.start("");
            let mut page = Page::open(c);

            assert!(page.next_frame().await.contains("landing-form"));

            page.send(Event::Submit("example".to_string()));
            assert!(page.next_frame().await.contains("Loading stories..."));
            assert!(page.next_frame().await.contains("The example Times"));
            page.close().await;
        }

        #[tokio::test]
        async fn test_session_ends_when_page_closes() {
            let source = Arc::new(CountingSource::default());
            let page = Page::open(controller(source));
            tokio::time::timeout(Duration::from_secs(5), page.close())
                .await
                .expect("session ends");
        }
    }
}
