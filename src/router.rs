//! Fragment routing.
//!
//! The fragment (the part of the URL after `#`) is the only routing signal.
//! Anything that doesn't match a known shape falls back to the landing page.

/// The view selected by a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    Landing,
    Feed { username: String },
    Story { username: String, story_id: String },
}

impl Route {
    /// The newsletter this route belongs to, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            Route::Landing => None,
            Route::Feed { username } | Route::Story { username, .. } => Some(username),
        }
    }

    pub fn is_landing(&self) -> bool {
        matches!(self, Route::Landing)
    }

    /// The fragment that parses back into this route.
    pub fn fragment(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Feed { username } => format!("/@{}", username),
            Route::Story {
                username,
                story_id,
            } => format!("/@{}/story/{}", username, story_id),
        }
    }
}

/// Parse a URL fragment into a route.
///
/// A leading `#` is ignored, so both `#/@name` and `/@name` work.
pub fn parse_route(fragment: &str) -> Route {
    let path = fragment.strip_prefix('#').unwrap_or(fragment);
    if path.is_empty() || path == "/" {
        return Route::Landing;
    }

    let Some(rest) = path.strip_prefix("/@") else {
        return Route::Landing;
    };

    match rest.split_once('/') {
        None if !rest.is_empty() => Route::Feed {
            username: rest.to_string(),
        },
        Some((username, tail)) if !username.is_empty() => match tail.strip_prefix("story/") {
            Some(story_id) if is_story_id(story_id) => Route::Story {
                username: username.to_string(),
                story_id: story_id.to_string(),
            },
            _ => Route::Landing,
        },
        _ => Route::Landing,
    }
}

// Story ids are greedy but stop at line terminators.
fn is_story_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
}

/// Turn landing-form input into the feed route it names.
///
/// Blank input is ignored rather than treated as an error.
pub fn landing_submission(input: &str) -> Option<Route> {
    let username = input.trim();
    if username.is_empty() {
        return None;
    }
    Some(Route::Feed {
        username: username.to_string(),
    })
}
