//! The app controller: owns the view state and drives every transition.
//!
//! Navigation, resize and landing-form events arrive through a [`Dispatcher`]
//! handed out by [`Controller::subscribe`]. Feed fetches run as tasks; their
//! results are applied by the controller itself, so state is only ever
//! touched from the task that owns the controller. Every transition ends in a
//! render, published as a numbered [`Frame`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::debounce::{Debouncer, DEFAULT_DELAY};
use crate::feed::{FeedFetchError, FeedSource, Newsletter, DEFAULT_FETCH_ERROR};
use crate::render::Renderer;
use crate::router::{landing_submission, parse_route, Route};
use crate::state::{ViewState, Viewport};

/// Something that happened in the window the controller is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The fragment changed.
    Navigate(String),
    /// The viewport width changed.
    Resize(u32),
    /// The landing form was submitted with this input.
    Submit(String),
}

/// One rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Bumped on every render; zero means nothing has been rendered yet.
    pub seq: u64,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub resize_debounce: Duration,
    /// Drop fetch results that belong to a navigation the user already left.
    pub discard_stale_fetches: bool,
    pub viewport: Viewport,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            resize_debounce: DEFAULT_DELAY,
            discard_stale_fetches: false,
            viewport: Viewport::default(),
        }
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            resize_debounce: config.resize_debounce(),
            discard_stale_fetches: config.discard_stale_fetches,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Error)]
#[error("controller is no longer listening for events")]
pub struct Unsubscribed;

/// Sending half of a controller subscription.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Event>,
}

impl Dispatcher {
    pub fn send(&self, event: Event) -> Result<(), Unsubscribed> {
        self.tx.send(event).map_err(|_| Unsubscribed)
    }

    pub fn navigate(&self, fragment: impl Into<String>) -> Result<(), Unsubscribed> {
        self.send(Event::Navigate(fragment.into()))
    }

    pub fn resize(&self, width: u32) -> Result<(), Unsubscribed> {
        self.send(Event::Resize(width))
    }

    pub fn submit(&self, input: impl Into<String>) -> Result<(), Unsubscribed> {
        self.send(Event::Submit(input.into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// Outcome of one fetch task.
struct Settled {
    generation: u64,
    username: String,
    result: Result<Newsletter, FeedFetchError>,
}

enum Step {
    Event(Event),
    Settled(Result<Settled, JoinError>),
    ResizeDue,
    Closed,
}

pub struct Controller {
    feeds: Arc<dyn FeedSource>,
    renderer: Renderer,
    state: ViewState,
    viewport: Viewport,
    resize: Debouncer,
    discard_stale: bool,
    // Bumped on every navigation; fetches remember the value they started under.
    generation: u64,
    in_flight: JoinSet<Settled>,
    frames: watch::Sender<Frame>,
    events: Option<mpsc::UnboundedReceiver<Event>>,
}

impl Controller {
    pub fn new(feeds: Arc<dyn FeedSource>, renderer: Renderer, options: ControllerOptions) -> Self {
        let (frames, _) = watch::channel(Frame::default());
        Self {
            feeds,
            renderer,
            state: ViewState::default(),
            viewport: options.viewport,
            resize: Debouncer::new(options.resize_debounce),
            discard_stale: options.discard_stale_fetches,
            generation: 0,
            in_flight: JoinSet::new(),
            frames,
            events: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Number of fetches that have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Watch rendered frames as they are published.
    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    /// The most recently published frame.
    pub fn frame(&self) -> Frame {
        self.frames.borrow().clone()
    }

    /// Start listening for events. Replaces any earlier subscription.
    pub fn subscribe(&mut self) -> Dispatcher {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        Dispatcher { tx }
    }

    /// Stop listening for events. Pending resize renders are dropped;
    /// in-flight fetches are not.
    pub fn unsubscribe(&mut self) {
        self.events = None;
        self.resize.cancel();
    }

    /// Take over a view that was already fetched and shown. Nothing is
    /// fetched and nothing is rendered until the next event.
    pub fn resume(&mut self, state: ViewState) {
        self.generation += 1;
        debug!("Resuming {:?}", state.route);
        self.state = state;
    }

    /// Initial navigation when the page loads.
    pub fn start(&mut self, fragment: &str) {
        self.generation += 1;
        self.state.route = parse_route(fragment);
        debug!("Starting on {:?}", self.state.route);

        if self.state.route.is_landing() {
            self.publish();
        } else {
            self.begin_fetch();
        }
    }

    /// The fragment changed. Everything fetched so far is thrown away, even
    /// when the route is the same as before.
    pub fn navigate(&mut self, fragment: &str) {
        self.generation += 1;
        self.state.route = parse_route(fragment);
        self.state.stories.clear();
        self.state.publication = None;
        self.state.error = None;
        debug!("Navigated to {:?}", self.state.route);

        if self.state.route.is_landing() {
            self.publish();
        } else {
            self.begin_fetch();
        }
    }

    /// Landing-form submission. Blank input is ignored.
    pub fn submit(&mut self, input: &str) -> Option<Route> {
        let route = landing_submission(input)?;
        self.navigate(&route.fragment());
        Some(route)
    }

    /// The viewport changed size. Renders are debounced.
    pub fn resize(&mut self, width: u32) {
        self.viewport = Viewport::new(width);
        if self.resize.trigger(Instant::now()) {
            self.publish();
        } else {
            debug!("Deferring resize render to width {}", width);
        }
    }

    /// Render the current state and publish it.
    pub fn render(&mut self) -> Result<Frame, askama::Error> {
        let html = self.renderer.render(&self.state, self.viewport)?;
        self.frames.send_modify(|frame| {
            frame.seq += 1;
            frame.html = html;
        });
        Ok(self.frame())
    }

    /// Wait for the next in-flight fetch and apply it. Returns `false` when
    /// nothing was in flight.
    pub async fn settle_one(&mut self) -> bool {
        match self.in_flight.join_next().await {
            Some(joined) => {
                self.on_settled(joined);
                true
            }
            None => false,
        }
    }

    /// Wait for every in-flight fetch and apply the results in completion order.
    pub async fn settle(&mut self) {
        while self.settle_one().await {}
    }

    /// Process events, fetch results and deferred resizes until the
    /// subscription is closed or dropped.
    pub async fn run(&mut self) {
        loop {
            let deadline = self.resize.deadline();
            let step = tokio::select! {
                event = next_event(&mut self.events) => match event {
                    Some(event) => Step::Event(event),
                    None => Step::Closed,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    Step::Settled(joined)
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Step::ResizeDue
                }
            };

            match step {
                Step::Event(Event::Navigate(fragment)) => self.navigate(&fragment),
                Step::Event(Event::Resize(width)) => self.resize(width),
                Step::Event(Event::Submit(input)) => {
                    self.submit(&input);
                }
                Step::Settled(joined) => self.on_settled(joined),
                Step::ResizeDue => {
                    if self.resize.poll(Instant::now()) {
                        self.publish();
                    }
                }
                Step::Closed => {
                    self.unsubscribe();
                    break;
                }
            }
        }
    }

    fn begin_fetch(&mut self) {
        let Some(username) = self.state.route.username().map(str::to_string) else {
            return;
        };

        self.state.loading = true;
        self.state.error = None;
        self.publish();

        let feeds = Arc::clone(&self.feeds);
        let generation = self.generation;
        self.in_flight.spawn(async move {
            let result = feeds.fetch_feed(&username).await;
            Settled {
                generation,
                username,
                result,
            }
        });
    }

    fn on_settled(&mut self, joined: Result<Settled, JoinError>) {
        let settled = match joined {
            Ok(settled) => settled,
            Err(e) => {
                error!("Feed task failed: {}", e);
                self.state.error = Some(DEFAULT_FETCH_ERROR.to_string());
                self.state.loading = false;
                self.publish();
                return;
            }
        };

        if settled.generation != self.generation {
            if self.discard_stale {
                debug!("Discarding stale feed for @{}", settled.username);
                return;
            }
            // Last fetch to finish wins, even if the reader has moved on.
            warn!(
                "Applying feed for @{} fetched for an earlier navigation",
                settled.username
            );
        }

        match settled.result {
            Ok(newsletter) => {
                self.state.publication = Some(newsletter.publication);
                self.state.stories = newsletter.stories;
            }
            Err(e) => {
                warn!("Failed to load feed for @{}: {:?}", settled.username, e);
                self.state.error = Some(e.message());
            }
        }

        self.state.loading = false;
        self.publish();
    }

    fn publish(&mut self) {
        if let Err(e) = self.render() {
            error!("Failed to render {:?}: {}", self.state.route, e);
        }
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<Event>>) -> Option<Event> {
    match events {
        Some(rx) => rx.recv().await,
        None => None,
    }
}
