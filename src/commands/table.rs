//! Phrase table mapping spoken commands to routes
//!
//! Matching is by substring, in declaration order: the first phrase found
//! anywhere in the normalized transcript wins. A phrase that contains an
//! earlier phrase can therefore never match; [`CommandTable::shadowed`]
//! reports such entries.

use serde::{Deserialize, Serialize};

/// Where a command leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    Home,
    DocumentUpload,
    Braille,
    Quiz,
    History,
    /// Opens the help overlay instead of navigating
    Help,
}

impl Route {
    /// Stable route token
    pub fn token(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::DocumentUpload => "document-upload",
            Route::Braille => "braille",
            Route::Quiz => "quiz",
            Route::History => "history",
            Route::Help => "help",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Canonical form of a transcript for matching
pub fn normalize(transcript: &str) -> String {
    transcript.trim().to_lowercase()
}

/// Ordered phrase -> route table
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: Vec<(String, Route)>,
}

/// An entry that can never match because an earlier phrase is inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub phrase: String,
    pub route: Route,
    pub by_phrase: String,
    pub by_route: Route,
}

impl Shadowed {
    /// Whether the masking sends the user somewhere else
    pub fn changes_route(&self) -> bool {
        self.route != self.by_route
    }
}

impl CommandTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Route)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(phrase, route)| (normalize(&phrase.into()), route))
                .collect(),
        }
    }

    /// The navigation and help phrases understood by the app
    pub fn standard() -> Self {
        Self::new([
            ("go to document upload", Route::DocumentUpload),
            ("document upload", Route::DocumentUpload),
            ("upload document", Route::DocumentUpload),
            ("go to braille", Route::Braille),
            ("braille evaluation", Route::Braille),
            ("braille sheet", Route::Braille),
            ("go to quiz", Route::Quiz),
            ("take quiz", Route::Quiz),
            ("quiz system", Route::Quiz),
            ("go to history", Route::History),
            ("history lessons", Route::History),
            ("audio lessons", Route::History),
            ("go home", Route::Home),
            ("home page", Route::Home),
            ("main menu", Route::Home),
            ("help", Route::Help),
            ("show help", Route::Help),
            ("what can i say", Route::Help),
            ("voice commands", Route::Help),
        ])
    }

    /// First entry whose phrase occurs in `normalized`
    pub fn find(&self, normalized: &str) -> Option<(&str, Route)> {
        self.entries
            .iter()
            .find(|(phrase, _)| normalized.contains(phrase.as_str()))
            .map(|(phrase, route)| (phrase.as_str(), *route))
    }

    /// Route for `normalized`, if any phrase matches
    pub fn route_for(&self, normalized: &str) -> Option<Route> {
        self.find(normalized).map(|(_, route)| route)
    }

    /// Entries masked by an earlier, shorter phrase
    pub fn shadowed(&self) -> Vec<Shadowed> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, (phrase, route))| {
                self.entries[..index]
                    .iter()
                    .find(|(earlier, _)| phrase.contains(earlier.as_str()))
                    .map(|(earlier, by_route)| Shadowed {
                        phrase: phrase.clone(),
                        route: *route,
                        by_phrase: earlier.clone(),
                        by_route: *by_route,
                    })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One entry of the manual command picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickCommand {
    pub label: &'static str,
    pub phrase: &'static str,
}

/// Commands offered when voice input is unavailable
pub const QUICK_COMMANDS: [QuickCommand; 6] = [
    QuickCommand {
        label: "Go to Document Upload",
        phrase: "go to document upload",
    },
    QuickCommand {
        label: "Go to Braille Evaluation",
        phrase: "go to braille",
    },
    QuickCommand {
        label: "Take Quiz",
        phrase: "take quiz",
    },
    QuickCommand {
        label: "Go to History Lessons",
        phrase: "go to history",
    },
    QuickCommand {
        label: "Go Home",
        phrase: "go home",
    },
    QuickCommand {
        label: "Show Help",
        phrase: "help",
    },
];
