use crate::feed::{Publication, Story};
use crate::router::Route;

/// Width the page is designed for; wider viewports are not scaled up.
pub const DESIGN_WIDTH: u32 = 1200;

/// Everything the views are rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub route: Route,
    pub stories: Vec<Story>,
    pub publication: Option<Publication>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ViewState {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            ..Self::default()
        }
    }

    /// The story the current route points at, if it has been fetched.
    pub fn current_story(&self) -> Option<&Story> {
        match &self.route {
            Route::Story { story_id, .. } => self.stories.iter().find(|s| &s.id == story_id),
            _ => None,
        }
    }
}

/// The surface the page is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
}

impl Viewport {
    pub fn new(width: u32) -> Self {
        Self { width }
    }

    /// Shrink factor that fits the fixed-width page into the viewport.
    pub fn scale(&self) -> f64 {
        (f64::from(self.width) * 0.96 / f64::from(DESIGN_WIDTH)).min(1.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DESIGN_WIDTH)
    }
}
