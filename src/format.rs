//! Text and date formatting helpers used by the views.

use std::collections::HashSet;

use chrono::{DateTime, Local, TimeZone, Utc};

/// Number of words shown in a feed excerpt before it is cut off.
pub const EXCERPT_WORDS: usize = 100;

const DAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Named entities understood by [`decode_html_entities`].
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("ensp", '\u{2002}'),
    ("emsp", '\u{2003}'),
    ("thinsp", '\u{2009}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("sbquo", '\u{201a}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("bdquo", '\u{201e}'),
    ("laquo", '\u{ab}'),
    ("raquo", '\u{bb}'),
    ("hellip", '\u{2026}'),
    ("bull", '\u{2022}'),
    ("middot", '\u{b7}'),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("trade", '\u{2122}'),
    ("deg", '\u{b0}'),
    ("euro", '\u{20ac}'),
    ("pound", '\u{a3}'),
    ("yen", '\u{a5}'),
    ("cent", '\u{a2}'),
    ("sect", '\u{a7}'),
    ("para", '\u{b6}'),
    ("times", '\u{d7}'),
    ("divide", '\u{f7}'),
    ("iexcl", '\u{a1}'),
    ("iquest", '\u{bf}'),
    ("aacute", '\u{e1}'),
    ("eacute", '\u{e9}'),
    ("iacute", '\u{ed}'),
    ("oacute", '\u{f3}'),
    ("uacute", '\u{fa}'),
    ("agrave", '\u{e0}'),
    ("egrave", '\u{e8}'),
    ("auml", '\u{e4}'),
    ("ouml", '\u{f6}'),
    ("uuml", '\u{fc}'),
    ("szlig", '\u{df}'),
    ("ntilde", '\u{f1}'),
    ("ccedil", '\u{e7}'),
    ("Eacute", '\u{c9}'),
];

// Longest entity body we bother scanning for, e.g. "#x10FFFF".
const MAX_ENTITY_LEN: usize = 10;

/// Decode named and numeric HTML entities into plain text.
///
/// Unknown or malformed entities are left as written.
pub fn decode_html_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest[1..]
            .char_indices()
            .take(MAX_ENTITY_LEN + 1)
            .find(|&(_, c)| c == ';')
            .and_then(|(end, _)| decode_entity(&rest[1..1 + end]).map(|c| (c, end + 2)));

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        // Browsers show NUL and invalid code points as U+FFFD.
        return Some(match code {
            0 => char::REPLACEMENT_CHARACTER,
            _ => char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
        });
    }

    NAMED_ENTITIES
        .iter()
        .find(|(name, _)| *name == body)
        .map(|&(_, c)| c)
}

// Tags whose content is never visible text.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "template", "noscript"];

// Tags that separate words when markup is flattened.
const BLOCK_ELEMENTS: [&str; 20] = [
    "p", "br", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "figure", "figcaption", "section", "article", "hr", "tr",
];

/// Strip markup and decode entities, producing the text a reader would see.
pub fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        if !after.starts_with(|c: char| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
        {
            text.push('<');
            rest = after;
            continue;
        }

        let Some(end) = tag_end(after) else {
            // An unterminated tag swallows the rest of the input.
            rest = "";
            break;
        };

        let tag = &after[..end];
        let name = tag_name(tag);
        rest = &after[end + 1..];

        if BLOCK_ELEMENTS.contains(&name.as_str()) {
            text.push(' ');
        }

        if !tag.starts_with('/') && HIDDEN_ELEMENTS.contains(&name.as_str()) {
            let closing = format!("</{}", name);
            rest = match rest.to_ascii_lowercase().find(&closing) {
                Some(pos) => rest[pos..].find('>').map_or("", |gt| &rest[pos + gt + 1..]),
                None => "",
            };
        }
    }

    text.push_str(rest);
    decode_html_entities(&text)
}

// Index of the `>` closing a tag, skipping quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Reduce story markup to an allow-listed subset of HTML. Links and images
/// keep only web and mail URLs.
pub fn drop_active_content(html: &str) -> String {
    ammonia::Builder::default()
        .url_schemes(HashSet::from(["http", "https", "mailto"]))
        .clean(html)
        .to_string()
}

/// A feed excerpt cut down to at most [`EXCERPT_WORDS`] words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    pub truncated: bool,
}

/// Flatten markup and keep the first [`EXCERPT_WORDS`] words.
pub fn excerpt(html: &str) -> Excerpt {
    let text = plain_text(html);
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.len() > EXCERPT_WORDS {
        Excerpt {
            text: words[..EXCERPT_WORDS].join(" "),
            truncated: true,
        }
    } else {
        Excerpt {
            text: words.join(" "),
            truncated: false,
        }
    }
}

/// Describe how long ago `date` was, relative to `now`.
pub fn format_relative_date(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(date) = date else {
        return "some time ago".to_string();
    };

    let delta = (now - date).num_milliseconds() as f64 / 1000.0;
    if delta < 60.0 {
        "< 1 min ago".to_string()
    } else if delta < 3600.0 {
        format!("{} min ago", (delta / 60.0) as i64)
    } else if delta < 86400.0 {
        match (delta / 3600.0) as i64 {
            1 => "1 hr ago".to_string(),
            hours => format!("{} hrs ago", hours),
        }
    } else if delta < 86400.0 * 2.0 {
        "yesterday".to_string()
    } else if delta < 86400.0 * 3.0 {
        "2 days ago".to_string()
    } else {
        format_calendar_date(&date.with_timezone(&Local))
    }
}

/// Short numeric calendar date, e.g. `3/7/2024`.
pub fn format_calendar_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%-m/%-d/%Y").to_string()
}

/// Long banner date, e.g. `Thursday, March 7, 2024`.
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    use chrono::Datelike;

    let weekday = DAYS[date.weekday().num_days_from_sunday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{}, {} {}, {}", weekday, month, date.day(), date.year())
}

/// Join writer names as `A, B and C`, or `Unknown` when there are none.
pub fn format_writers<S: AsRef<str>>(writers: &[S]) -> String {
    let decoded: Vec<String> = writers
        .iter()
        .map(|w| decode_html_entities(w.as_ref()))
        .collect();

    match decoded.split_last() {
        None => "Unknown".to_string(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}
