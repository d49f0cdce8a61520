//! HTML views for the landing page, the front page and a single story.
//!
//! Rendering is a function of [`ViewState`]: the views never fetch or mutate
//! anything. Wall-clock time and the cosmetic dice are injected so output can
//! be pinned down in tests.

use askama::Template;
use chrono::{DateTime, Local, Utc};

use crate::dice::{Dice, SplitMix64};
use crate::feed::{Publication, Story};
use crate::format::{
    drop_active_content, excerpt, format_date, format_relative_date, format_writers, plain_text,
};
use crate::layout::Layout;
use crate::router::Route;
use crate::state::{ViewState, Viewport};

const SITE_NAME: &str = "Substack Classic";

/// Pages a "Continued on Page A.." line can point at.
const CONTINUED_PAGES: u32 = 30;

const PLACEHOLDER_EXCERPT: &str =
    "Lorem ipsum dolor sit amet, ei mel cibo meliore instructior, eam te etiam clita.";

const CONTENT_UNAVAILABLE: &str = "<p>Content not available.</p>";

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// Template structs

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingPage {
    page_title: String,
    session: String,
}

#[derive(Template)]
#[template(path = "feed.html")]
struct FeedPage {
    page_title: String,
    session: String,
    scale: String,
    masthead: Masthead,
    loading: bool,
    error: String,
    sections: Vec<Section>,
}

#[derive(Template)]
#[template(path = "story.html")]
struct StoryPage {
    page_title: String,
    session: String,
    scale: String,
    masthead: Masthead,
    loading: bool,
    error: String,
    story: Option<FullStory>,
}

struct Masthead {
    home: String,
    title: String,
    edition_title: String,
    edition_link: String,
    volume: &'static str,
    date: String,
    control_href: String,
    control_label: &'static str,
}

struct Section {
    class: &'static str,
    cards: Vec<StoryCard>,
}

struct StoryCard {
    href: String,
    title: String,
    byline: String,
    image: String,
    lede: String,
    continued: String,
}

struct FullStory {
    title: String,
    link: String,
    byline: String,
    image: String,
    dateline: String,
    body: String,
}

/// Turns view state into HTML.
pub struct Renderer {
    dice: Box<dyn Dice>,
    clock: Box<dyn Clock>,
    // Live-session token stamped on full pages.
    session: Option<String>,
}

impl Renderer {
    pub fn new(dice: Box<dyn Dice>, clock: Box<dyn Clock>) -> Self {
        Self {
            dice,
            clock,
            session: None,
        }
    }

    /// Stamp pages with the token a page script uses to pick up its live session.
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session = Some(token.into());
        self
    }

    fn session(&self) -> String {
        self.session.clone().unwrap_or_default()
    }

    /// Renderer on the system clock with clock-seeded dice.
    pub fn system() -> Self {
        Self::new(Box::new(SplitMix64::from_clock()), Box::new(SystemClock))
    }

    pub fn render(&mut self, state: &ViewState, viewport: Viewport) -> Result<String, askama::Error> {
        match &state.route {
            Route::Landing => LandingPage {
                page_title: SITE_NAME.to_string(),
                session: self.session(),
            }
            .render(),
            Route::Feed { username } => self.feed_page(state, username, viewport).render(),
            Route::Story { username, .. } => self.story_page(state, username, viewport).render(),
        }
    }

    fn feed_page(&mut self, state: &ViewState, username: &str, viewport: Viewport) -> FeedPage {
        let now = self.clock.now();
        let masthead = self.masthead(
            state.publication.as_ref(),
            username,
            "/".to_string(),
            "Try another Substack",
        );

        let sections = Layout::partition(&state.stories)
            .buckets()
            .iter()
            .map(|bucket| Section {
                class: bucket.zone.class(),
                cards: bucket
                    .stories
                    .iter()
                    .map(|story| self.story_card(story, username, now))
                    .collect(),
            })
            .collect();

        FeedPage {
            page_title: page_title(&masthead),
            session: self.session(),
            scale: viewport.scale().to_string(),
            masthead,
            loading: state.loading,
            error: state.error.clone().unwrap_or_default(),
            sections,
        }
    }

    fn story_page(&mut self, state: &ViewState, username: &str, viewport: Viewport) -> StoryPage {
        let now = self.clock.now();
        let masthead = self.masthead(
            state.publication.as_ref(),
            username,
            feed_href(username),
            "Back to feed",
        );

        let story = state.current_story().map(|story| FullStory {
            title: plain_text(&story.title).trim().to_string(),
            link: story.link.as_deref().and_then(http_url).unwrap_or("#").to_string(),
            byline: byline(story),
            image: image_url(story),
            dateline: format!("{}\u{2013}", format_relative_date(story.date, now)),
            body: story
                .content
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(drop_active_content)
                .unwrap_or_else(|| CONTENT_UNAVAILABLE.to_string()),
        });

        StoryPage {
            page_title: page_title(&masthead),
            session: self.session(),
            scale: viewport.scale().to_string(),
            masthead,
            loading: state.loading,
            error: state.error.clone().unwrap_or_default(),
            story,
        }
    }

    fn masthead(
        &mut self,
        publication: Option<&Publication>,
        username: &str,
        control_href: String,
        control_label: &'static str,
    ) -> Masthead {
        let title = publication
            .and_then(|p| p.title.as_deref())
            .map(|t| plain_text(t).trim().to_string())
            .filter(|t| !t.is_empty());

        Masthead {
            home: feed_href(username),
            title: title.clone().unwrap_or_else(|| "Loading...".to_string()),
            edition_title: title.unwrap_or_else(|| "a Substack".to_string()),
            edition_link: publication
                .and_then(|p| p.link.as_deref())
                .and_then(http_url)
                .unwrap_or("#")
                .to_string(),
            volume: if self.dice.coin() { "3.14159" } else { "4.2069" },
            date: format_date(&self.clock.now().with_timezone(&Local)),
            control_href,
            control_label,
        }
    }

    fn story_card(&mut self, story: &Story, username: &str, now: DateTime<Utc>) -> StoryCard {
        let source = [story.content.as_deref(), story.excerpt.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or(PLACEHOLDER_EXCERPT);

        let excerpt = excerpt(source);
        let when = format_relative_date(story.date, now);

        let (lede, continued) = if excerpt.truncated {
            (
                format!("{}\u{2013}{} ...", when, excerpt.text),
                format!("Continued on Page A{}", self.dice.below(CONTINUED_PAGES)),
            )
        } else {
            (format!("{}\u{2013}{}", when, excerpt.text), String::new())
        };

        StoryCard {
            href: format!("#/@{}/story/{}", username, story.id),
            title: plain_text(&story.title).trim().to_string(),
            byline: byline(story),
            image: image_url(story),
            lede,
            continued,
        }
    }
}

fn feed_href(username: &str) -> String {
    format!("#/@{}", username)
}

fn page_title(masthead: &Masthead) -> String {
    format!("{} | {}", masthead.edition_title, SITE_NAME)
}

fn byline(story: &Story) -> String {
    let author = story.author.as_deref().filter(|a| !a.trim().is_empty());
    format_writers(author.as_slice())
}

fn image_url(story: &Story) -> String {
    story
        .image
        .as_deref()
        .and_then(http_url)
        .unwrap_or_default()
        .to_string()
}

// Only plain web links make it into href/src attributes.
fn http_url(url: &str) -> Option<&str> {
    let lower = url.trim_start().to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn renderer() -> Renderer {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        Renderer::new(Box::new(SplitMix64::seeded(7)), Box::new(FixedClock(now)))
    }

    fn feed_route() -> Route {
        Route::Feed {
            username: "example".to_string(),
        }
    }

    fn story_route(id: &str) -> Route {
        Route::Story {
            username: "example".to_string(),
            story_id: id.to_string(),
        }
    }

    fn publication() -> Publication {
        Publication {
            title: Some("The Example Times".to_string()),
            description: None,
            image: None,
            link: Some("https://example.substack.com".to_string()),
        }
    }

    fn story(id: &str, content: &str) -> Story {
        Story {
            id: id.to_string(),
            title: format!("Headline {}", id),
            author: Some("Ann".to_string()),
            date: Some(Utc.with_ymd_and_hms(2024, 3, 7, 10, 0, 0).unwrap()),
            content: Some(content.to_string()),
            link: Some(format!("https://example.substack.com/p/{}", id)),
            ..Story::default()
        }
    }

    fn words(n: usize) -> String {
        (1..=n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn loaded(route: Route, stories: Vec<Story>) -> ViewState {
        ViewState {
            route,
            stories,
            publication: Some(publication()),
            loading: false,
            error: None,
        }
    }

    fn render(state: &ViewState) -> String {
        renderer().render(state, Viewport::default()).unwrap()
    }

    mod landing_tests {
        use super::*;

        #[test]
        fn test_landing_has_form() {
            let html = render(&ViewState::new(Route::Landing));
            assert!(html.contains("Substack Classic"));
            assert!(html.contains("<form"));
            assert!(html.contains("name=\"username\""));
            assert!(!html.contains("masthead-link"));
        }

        #[test]
        fn test_session_token_stamped_on_page() {
            let mut stamped = renderer().with_session("abc123");
            let html = stamped
                .render(&loaded(feed_route(), vec![]), Viewport::default())
                .unwrap();
            assert!(html.contains("<body data-session=\"abc123\">"));
            assert!(html.contains("<div id=\"page\">"));

            let html = render(&ViewState::new(Route::Landing));
            assert!(html.contains("<body>"));
        }
    }

    mod feed_tests {
        use super::*;

        #[test]
        fn test_loading_placeholder_replaces_stories() {
            let mut state = loaded(feed_route(), vec![story("a", "hello")]);
            state.publication = None;
            state.loading = true;

            let html = render(&state);
            assert!(html.contains("Loading stories..."));
            assert!(html.contains("Loading..."));
            assert!(!html.contains("Headline a"));
        }

        #[test]
        fn test_loading_takes_precedence_over_error() {
            let mut state = ViewState::new(feed_route());
            state.loading = true;
            state.error = Some("boom".to_string());

            let html = render(&state);
            assert!(html.contains("Loading stories..."));
            assert!(!html.contains("boom"));
        }

        #[test]
        fn test_error_replaces_stories() {
            let mut state = loaded(feed_route(), vec![story("a", "hello")]);
            state.error = Some("boom".to_string());

            let html = render(&state);
            assert!(html.contains("<div class=\"error\">boom</div>"));
            assert!(!html.contains("Headline a"));
        }

        #[test]
        fn test_masthead_shows_publication_title() {
            let html = render(&loaded(feed_route(), vec![story("a", "hello")]));
            assert!(html.contains("The Example Times"));
            assert!(!html.contains("Loading..."));
            assert!(html.contains("Try another Substack"));
        }

        #[test]
        fn test_masthead_title_entities_decoded() {
            let mut state = loaded(feed_route(), vec![]);
            state.publication = Some(Publication {
                title: Some("Caf&eacute; Notes".to_string()),
                ..Publication::default()
            });

            let html = render(&state);
            assert!(html.contains("Caf\u{e9} Notes"));
            assert!(!html.contains("&amp;eacute;"));
        }

        #[test]
        fn test_date_banner() {
            let html = render(&loaded(feed_route(), vec![]));
            let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
            assert!(html.contains(&format_date(&now.with_timezone(&Local))));
        }

        #[test]
        fn test_volume_label() {
            let html = render(&loaded(feed_route(), vec![]));
            assert!(html.contains("No. 3.14159") || html.contains("No. 4.2069"));
        }

        #[test]
        fn test_only_filled_zones_rendered() {
            let stories = (0..5).map(|i| story(&i.to_string(), "hello")).collect();
            let html = render(&loaded(feed_route(), stories));

            assert_eq!(html.matches("class=\"zone ").count(), 2);
            assert!(html.contains("zone center-spread"));
            assert!(html.contains("zone left-sidebar"));
            assert!(!html.contains("zone bottom"));
            assert!(!html.contains("mini-1"));
        }

        #[test]
        fn test_stories_past_capacity_not_rendered() {
            let stories = (0..30).map(|i| story(&format!("s{}", i), "hello")).collect();
            let html = render(&loaded(feed_route(), stories));

            assert!(html.contains("Headline s24<"));
            assert!(!html.contains("Headline s25<"));
            assert_eq!(html.matches("class=\"story\"").count(), 25);
        }

        #[test]
        fn test_story_card_fields() {
            let html = render(&loaded(feed_route(), vec![story("a1", "<p>Short <b>text</b></p>")]));

            assert!(html.contains("Headline a1"));
            assert!(html.contains("<span class=\"story-author\">Ann</span>"));
            assert!(html.contains("2 hrs ago\u{2013}Short text"));
            assert!(!html.contains("Continued on Page"));
        }

        #[test]
        fn test_missing_author_is_unknown() {
            let mut s = story("a", "hello");
            s.author = None;
            let html = render(&loaded(feed_route(), vec![s]));
            assert!(html.contains("<span class=\"story-author\">Unknown</span>"));
        }

        #[test]
        fn test_missing_date_is_some_time_ago() {
            let mut s = story("a", "hello");
            s.date = None;
            let html = render(&loaded(feed_route(), vec![s]));
            assert!(html.contains("some time ago\u{2013}hello"));
        }

        #[test]
        fn test_long_excerpt_truncated_with_continuation() {
            let html = render(&loaded(feed_route(), vec![story("a", &words(150))]));

            assert!(html.contains(&format!("{} ...", words(100))));
            assert!(!html.contains("w101"));

            let marker = "Continued on Page A";
            let start = html.find(marker).expect("continuation marker") + marker.len();
            let page: u32 = html[start..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap();
            assert!(page < 30);
        }

        #[test]
        fn test_short_excerpt_kept_whole() {
            let html = render(&loaded(feed_route(), vec![story("a", &words(50))]));
            assert!(html.contains(&words(50)));
            assert!(!html.contains("Continued on Page"));
        }

        #[test]
        fn test_excerpt_falls_back_to_description_then_placeholder() {
            let mut described = story("a", "");
            described.excerpt = Some("From the description".to_string());
            let mut empty = story("b", "");
            empty.content = None;

            let html = render(&loaded(feed_route(), vec![described, empty]));
            assert!(html.contains("From the description"));
            assert!(html.contains("Lorem ipsum dolor sit amet"));
        }

        #[test]
        fn test_scale_follows_viewport() {
            let state = loaded(feed_route(), vec![]);
            let html = renderer().render(&state, Viewport::new(625)).unwrap();
            assert!(html.contains("scale(0.5)"));
        }

        #[test]
        fn test_non_web_image_dropped() {
            let mut s = story("a", "hello");
            s.image = Some("javascript:alert(1)".to_string());
            let html = render(&loaded(feed_route(), vec![s]));
            assert!(!html.contains("story-image"));
        }

        #[test]
        fn test_seeded_renders_repeat() {
            let state = loaded(feed_route(), vec![story("a", &words(150))]);
            let first = renderer().render(&state, Viewport::default()).unwrap();
            let second = renderer().render(&state, Viewport::default()).unwrap();
            assert_eq!(first, second);
        }
    }

    mod story_tests {
        use super::*;

        #[test]
        fn test_full_story_keeps_markup() {
            let content = format!("<p>Full <em>text</em></p><p>{}</p>", words(150));
            let html = render(&loaded(story_route("a"), vec![story("a", &content)]));

            assert!(html.contains("<p>Full <em>text</em></p>"));
            assert!(html.contains("w150"));
            assert!(!html.contains("Continued on Page"));
            assert!(html.contains("Back to feed"));
            assert!(html.contains("2 hrs ago\u{2013}"));
        }

        #[test]
        fn test_full_story_drops_scripts() {
            let content = "<p>Body</p><script>alert(1)</script>";
            let html = render(&loaded(story_route("a"), vec![story("a", content)]));
            assert!(html.contains("<p>Body</p>"));
            assert!(!html.contains("alert(1)"));
        }

        #[test]
        fn test_story_matched_by_id() {
            let stories = vec![story("a", "first body"), story("b", "second body")];
            let html = render(&loaded(story_route("b"), stories));
            assert!(html.contains("Headline b"));
            assert!(html.contains("second body"));
            assert!(!html.contains("first body"));
        }

        #[test]
        fn test_unknown_story() {
            let html = render(&loaded(story_route("zzz"), vec![story("a", "body")]));
            assert!(html.contains("not-found"));
            assert!(!html.contains("Headline a"));
        }

        #[test]
        fn test_missing_content() {
            let mut s = story("a", "");
            s.content = None;
            let html = render(&loaded(story_route("a"), vec![s]));
            assert!(html.contains("Content not available."));
        }

        #[test]
        fn test_story_loading_and_error() {
            let mut state = ViewState::new(story_route("a"));
            state.loading = true;
            assert!(render(&state).contains("Loading story..."));

            state.loading = false;
            state.error = Some("boom".to_string());
            let html = render(&state);
            assert!(html.contains("<div class=\"error\">boom</div>"));
            assert!(!html.contains("not-found"));
        }
    }
}
