//! Pattern-based entity extraction.
//!
//! Every extractor takes lower-cased text and returns `Option`: a pattern
//! that does not match, or matches an impossible value (`25:61`, month 13,
//! party of 0), simply leaves the field empty.
//!
//! `\b` only knows ASCII word characters, so Cyrillic cues are guarded with
//! explicit `[^а-яё]` classes instead.

use maitre_core::{Entities, IntentKind};
use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern compiles")
}

static DATE_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:^|[^а-яёa-z])(послезавтра|завтра|сегодня)(?:$|[^а-яёa-z])")
});

static DATE_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?:^|[^\d])(\d{1,2})\s+(января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря)",
    )
});

static DATE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^\d.:])(\d{1,2})\.(\d{1,2})(?:\.(\d{4}|\d{2}))?(?:$|[^\d])"));

static DATE_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?:^|[^а-яё])((?:в|во|на)\s+(?:понедельник|вторник|среду|четверг|пятницу|субботу|воскресенье))",
    )
});

static TIME_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:^|[^\d])(\d{1,2})(?::(\d{2}))?\s*(?:час(?:а|ов)?\s+)?(утра|дня|вечера|ночи)")
});

static TIME_AMPM: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^\d])(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)"));

static TIME_CLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^\d])(\d{1,2}):(\d{2})(?:$|[^\d])"));

static TIME_DOTTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^а-яё])в\s+(\d{1,2})\.(\d{2})(?:$|[^\d])"));

static TIME_HOURS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^а-яё])(?:в|к)\s+(\d{1,2})\s*(?:час|ч(?:$|[^а-яё]))"));

static PEOPLE_DIGITS: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:^|[^\d:.])(\d{1,3})\s*(?:человек|чел|персон|гост|people|persons|guests|pax)")
});

static PEOPLE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?:^|[^а-яё])(одного|один|двух|два|две|трёх|трех|три|четырёх|четырех|четыре|пяти|пять|шести|шесть|семи|семь|восьми|восемь|девяти|девять|десяти|десять)\s+(?:человек|персон|гост)",
    )
});

static PEOPLE_COLLECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?:^|[^а-яё])(вдвоём|вдвоем|втроём|втроем|вчетвером|впятером|вшестером|всемером|на двоих|на троих|на четверых|на пятерых|на шестерых|на семерых|двое|трое|четверо|пятеро|шестеро|семеро)(?:$|[^а-яё])",
    )
});

const MAX_PARTY: u32 = 100;

/// Built-in location tags and their aliases (lower-case substrings).
const BUILTIN_LOCATIONS: &[(&str, &[&str])] = &[
    ("bar", &["барной стойк", "у бара", "за баром"]),
    (
        "main_hall",
        &["основной зал", "основном зале", "большой зал", "большом зале"],
    ),
    (
        "private_room",
        &["вип", "vip", "отдельный кабинет", "отдельном кабинете", "кабинк"],
    ),
    ("terrace", &["террас", "веранд", "на улице"]),
    ("window", &["у окна", "возле окна"]),
];

/// Extracts entities relevant to a classified intent.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    /// Sorted by tag.
    locations: Vec<(String, Vec<String>)>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        let locations = BUILTIN_LOCATIONS
            .iter()
            .map(|(tag, aliases)| {
                (
                    (*tag).to_string(),
                    aliases.iter().map(|a| (*a).to_string()).collect(),
                )
            })
            .collect();
        Self { locations }
    }
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge extra aliases over the built-in table. New tags are added,
    /// existing tags gain the extra aliases.
    pub fn with_locations<I, A>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, A)>,
        A: IntoIterator<Item = String>,
    {
        for (tag, aliases) in extra {
            let aliases = aliases.into_iter().map(|a| a.trim().to_lowercase());
            match self.locations.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, existing)) => {
                    for alias in aliases {
                        if !alias.is_empty() && !existing.contains(&alias) {
                            existing.push(alias);
                        }
                    }
                }
                None => {
                    let aliases: Vec<String> = aliases.filter(|a| !a.is_empty()).collect();
                    if !aliases.is_empty() {
                        self.locations.push((tag, aliases));
                    }
                }
            }
        }
        self.locations.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    pub fn location_tags(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(|(tag, _)| tag.as_str())
    }

    /// Entities for `intent` from lower-cased `text`.
    pub fn extract(&self, text: &str, intent: IntentKind) -> Entities {
        match intent {
            IntentKind::Booking => Entities {
                date: date(text),
                time: time(text),
                people_count: people_count(text),
                location: self.location(text),
            },
            IntentKind::CancelBooking => Entities {
                date: date(text),
                time: time(text),
                ..Entities::default()
            },
            IntentKind::Menu | IntentKind::Promotions | IntentKind::VenueInfo => Entities {
                location: self.location(text),
                ..Entities::default()
            },
            IntentKind::Complaint
            | IntentKind::Greeting
            | IntentKind::Thanks
            | IntentKind::General => Entities::default(),
        }
    }

    /// The tag whose alias appears earliest in the text.
    pub fn location(&self, text: &str) -> Option<String> {
        self.locations
            .iter()
            .filter_map(|(tag, aliases)| {
                aliases
                    .iter()
                    .filter_map(|alias| text.find(alias.as_str()))
                    .min()
                    .map(|pos| (pos, tag))
            })
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, tag)| tag.clone())
    }
}

/// Relative, month-name, numeric or weekday date, as written.
pub fn date(text: &str) -> Option<String> {
    if let Some(caps) = DATE_RELATIVE.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = DATE_MONTH.captures(text) {
        let day = parse_u32(&caps, 1)?;
        if (1..=31).contains(&day) {
            return Some(format!("{day} {}", &caps[2]));
        }
    }
    for caps in DATE_NUMERIC.captures_iter(text) {
        let (Some(day), Some(month)) = (parse_u32(&caps, 1), parse_u32(&caps, 2)) else {
            continue;
        };
        if (1..=31).contains(&day) && (1..=12).contains(&month) {
            let start = caps.get(1).map_or(0, |m| m.start());
            let end = caps.get(3).or_else(|| caps.get(2)).map_or(start, |m| m.end());
            return Some(text[start..end].to_string());
        }
    }
    DATE_WEEKDAY
        .captures(text)
        .map(|caps| caps[1].split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Time normalized to `HH:MM`.
pub fn time(text: &str) -> Option<String> {
    if let Some(caps) = TIME_PERIOD.captures(text) {
        let hour = parse_u32(&caps, 1)?;
        let minute = parse_u32(&caps, 2).unwrap_or(0);
        let hour = match &caps[3] {
            "утра" | "ночи" if hour == 12 => 0,
            "дня" if (1..=6).contains(&hour) => hour + 12,
            "вечера" if (1..=11).contains(&hour) => hour + 12,
            _ => hour,
        };
        return hhmm(hour, minute);
    }
    if let Some(caps) = TIME_AMPM.captures(text) {
        let hour = parse_u32(&caps, 1)?;
        let minute = parse_u32(&caps, 2).unwrap_or(0);
        if hour > 12 {
            return None;
        }
        let hour = match (caps[3].starts_with('p'), hour) {
            (false, 12) => 0,
            (true, h) if h < 12 => h + 12,
            (_, h) => h,
        };
        return hhmm(hour, minute);
    }
    for re in [&*TIME_CLOCK, &*TIME_DOTTED] {
        for caps in re.captures_iter(text) {
            if let (Some(h), Some(m)) = (parse_u32(&caps, 1), parse_u32(&caps, 2))
                && let Some(t) = hhmm(h, m)
            {
                return Some(t);
            }
        }
    }
    if let Some(caps) = TIME_HOURS.captures(text) {
        return hhmm(parse_u32(&caps, 1)?, 0);
    }
    if text.contains("полдень") {
        return Some("12:00".into());
    }
    if text.contains("полночь") {
        return Some("00:00".into());
    }
    None
}

/// Party size in `1..=100`.
pub fn people_count(text: &str) -> Option<u32> {
    let count = PEOPLE_DIGITS
        .captures(text)
        .and_then(|caps| parse_u32(&caps, 1))
        .or_else(|| {
            PEOPLE_WORDS
                .captures(text)
                .and_then(|caps| number_word(&caps[1]))
        })
        .or_else(|| {
            PEOPLE_COLLECTIVE
                .captures(text)
                .and_then(|caps| collective(&caps[1]))
        })?;
    (1..=MAX_PARTY).contains(&count).then_some(count)
}

fn parse_u32(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn hhmm(hour: u32, minute: u32) -> Option<String> {
    (hour < 24 && minute < 60).then(|| format!("{hour:02}:{minute:02}"))
}

fn number_word(word: &str) -> Option<u32> {
    Some(match word {
        "один" | "одного" => 1,
        "два" | "две" | "двух" => 2,
        "три" | "трёх" | "трех" => 3,
        "четыре" | "четырёх" | "четырех" => 4,
        "пять" | "пяти" => 5,
        "шесть" | "шести" => 6,
        "семь" | "семи" => 7,
        "восемь" | "восьми" => 8,
        "девять" | "девяти" => 9,
        "десять" | "десяти" => 10,
        _ => return None,
    })
}

fn collective(word: &str) -> Option<u32> {
    Some(match word {
        "вдвоём" | "вдвоем" | "на двоих" | "двое" => 2,
        "втроём" | "втроем" | "на троих" | "трое" => 3,
        "вчетвером" | "на четверых" | "четверо" => 4,
        "впятером" | "на пятерых" | "пятеро" => 5,
        "вшестером" | "на шестерых" | "шестеро" => 6,
        "всемером" | "на семерых" | "семеро" => 7,
        _ => return None,
    })
}
