//! Long-lived profile facts: mining them from utterances and applying them
//! to the profile store field by field.

use chrono::{DateTime, Utc};
use maitre_core::error::ProfileError;
use maitre_core::{IntentKind, IntentResult, ProfileField, ProfileStore};
use regex_lite::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const MAX_FAVORITES: usize = 5;
pub const MAX_NOTES: usize = 10;

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:меня зовут|зовите меня|my name is)\s+([а-яёa-z][а-яёa-z\-]{1,29})")
        .expect("built-in pattern compiles")
});

static FAVORITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:^|[^а-яё])(?:люблю|обожаю|мой любимый|моя любимая|мое любимое|моё любимое|мои любимые)",
        r"\s+(?:ваш[иау]?\s+|ваше\s+)?([^.,!?;\n]{2,40})",
    ))
    .expect("built-in pattern compiles")
});

static ALLERGY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"у меня аллергия на\s+([^.,!?;\n]{2,40})").expect("built-in pattern compiles")
});

static AVOIDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^а-яё])я не (?:ем|пью)\s+([^.,!?;\n]{2,40})")
        .expect("built-in pattern compiles")
});

static DIET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^а-яё])я\s+(вегетарианец|вегетарианка|веган|веганка)(?:$|[^а-яё])")
        .expect("built-in pattern compiles")
});

const NOT_NAMES: &[&str] = &["не", "никак", "просто", "так"];

/// One change to a user's profile.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    SetName(String),
    SetPreferredVenue(String),
    AddFavorite(String),
    AddNote(String),
    RecordVisit { at: DateTime<Utc> },
}

/// Profile fields the prompt builder cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFacts {
    pub name: Option<String>,
    pub preferred_venue: Option<String>,
    pub favorite_items: Vec<String>,
    pub visit_count: u64,
    pub notes: Vec<String>,
}

impl ProfileFacts {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.preferred_venue.is_none()
            && self.favorite_items.is_empty()
            && self.visit_count == 0
            && self.notes.is_empty()
    }
}

/// Profile updates implied by one sanitized utterance.
pub fn mine(
    text: &str,
    intent: &IntentResult,
    new_session: bool,
    now: DateTime<Utc>,
) -> Vec<ProfileUpdate> {
    let lower = text.to_lowercase();
    let mut updates = Vec::new();

    if let Some(caps) = NAME.captures(&lower) {
        let name = caps[1].trim_matches('-');
        if !name.is_empty() && !NOT_NAMES.contains(&name) {
            updates.push(ProfileUpdate::SetName(capitalize(name)));
        }
    }

    if intent.intent == IntentKind::Booking
        && let Some(location) = &intent.entities.location
    {
        updates.push(ProfileUpdate::SetPreferredVenue(location.clone()));
    }

    for caps in FAVORITE.captures_iter(&lower) {
        let item = caps[1].trim();
        if !item.is_empty() {
            updates.push(ProfileUpdate::AddFavorite(item.to_string()));
        }
    }

    if let Some(caps) = ALLERGY.captures(&lower) {
        updates.push(ProfileUpdate::AddNote(format!("аллергия на {}", caps[1].trim())));
    }
    if let Some(caps) = AVOIDS.captures(&lower) {
        updates.push(ProfileUpdate::AddNote(format!("не ест {}", caps[1].trim())));
    }
    if let Some(caps) = DIET.captures(&lower) {
        updates.push(ProfileUpdate::AddNote(caps[1].to_string()));
    }

    if new_session {
        updates.push(ProfileUpdate::RecordVisit { at: now });
    }
    updates
}

fn capitalize(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Apply `updates` in order. Stops at the first store failure.
pub async fn apply_updates(
    store: &dyn ProfileStore,
    user_id: &str,
    updates: &[ProfileUpdate],
) -> Result<(), ProfileError> {
    for update in updates {
        match update {
            ProfileUpdate::SetName(name) => {
                store.put(user_id, ProfileField::Name, json!(name)).await?
            }
            ProfileUpdate::SetPreferredVenue(venue) => {
                store.put(user_id, ProfileField::PreferredVenue, json!(venue)).await?
            }
            ProfileUpdate::AddFavorite(item) => {
                push_ring(store, user_id, ProfileField::FavoriteItems, item, MAX_FAVORITES).await?
            }
            ProfileUpdate::AddNote(note) => {
                push_ring(store, user_id, ProfileField::Notes, note, MAX_NOTES).await?
            }
            ProfileUpdate::RecordVisit { at } => {
                let count = store
                    .get(user_id, ProfileField::VisitCount)
                    .await?
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                store.put(user_id, ProfileField::VisitCount, json!(count + 1)).await?;
                store
                    .put(user_id, ProfileField::LastVisit, json!(at.to_rfc3339()))
                    .await?;
            }
        }
    }
    debug!(user_id, updates = updates.len(), "Profile updated");
    Ok(())
}

async fn push_ring(
    store: &dyn ProfileStore,
    user_id: &str,
    field: ProfileField,
    item: &str,
    cap: usize,
) -> Result<(), ProfileError> {
    let mut items = string_list(store.get(user_id, field).await?);
    items.retain(|existing| existing != item);
    items.push(item.to_string());
    if items.len() > cap {
        items.drain(..items.len() - cap);
    }
    store.put(user_id, field, json!(items)).await
}

fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Read the facts used for prompting. Store failures yield empty facts.
pub async fn load_facts(store: &dyn ProfileStore, user_id: &str) -> ProfileFacts {
    match try_load_facts(store, user_id).await {
        Ok(facts) => facts,
        Err(e) => {
            warn!(user_id, error = %e, "Profile lookup failed, continuing without it");
            ProfileFacts::default()
        }
    }
}

async fn try_load_facts(
    store: &dyn ProfileStore,
    user_id: &str,
) -> Result<ProfileFacts, ProfileError> {
    let text = |v: Option<Value>| v.and_then(|v| v.as_str().map(str::to_string));
    Ok(ProfileFacts {
        name: text(store.get(user_id, ProfileField::Name).await?),
        preferred_venue: text(store.get(user_id, ProfileField::PreferredVenue).await?),
        favorite_items: string_list(store.get(user_id, ProfileField::FavoriteItems).await?),
        visit_count: store
            .get(user_id, ProfileField::VisitCount)
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        notes: string_list(store.get(user_id, ProfileField::Notes).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maitre_core::Entities;
    use maitre_memory::InMemoryProfileStore;

    fn general() -> IntentResult {
        IntentResult::new(IntentKind::General, 0.5)
    }

    #[test]
    fn mines_name() {
        let updates = mine("Привет, меня зовут анна-мария", &general(), false, Utc::now());
        assert_eq!(updates, vec![ProfileUpdate::SetName("Анна-Мария".into())]);

        assert!(mine("меня зовут не важно", &general(), false, Utc::now()).is_empty());
        assert_eq!(
            mine("My name is Oleg", &general(), false, Utc::now()),
            vec![ProfileUpdate::SetName("Oleg".into())]
        );
    }

    #[test]
    fn mines_preferences_and_notes() {
        let updates = mine(
            "Обожаю ваш тирамису! У меня аллергия на орехи, и я вегетарианка.",
            &general(),
            false,
            Utc::now(),
        );
        assert_eq!(
            updates,
            vec![
                ProfileUpdate::AddFavorite("тирамису".into()),
                ProfileUpdate::AddNote("аллергия на орехи".into()),
                ProfileUpdate::AddNote("вегетарианка".into()),
            ]
        );
    }

    #[test]
    fn booking_location_becomes_preferred_venue() {
        let intent = IntentResult::new(IntentKind::Booking, 0.95).with_entities(Entities {
            location: Some("terrace".into()),
            ..Entities::default()
        });
        let now = Utc::now();
        let updates = mine("стол на веранде", &intent, true, now);
        assert_eq!(
            updates,
            vec![
                ProfileUpdate::SetPreferredVenue("terrace".into()),
                ProfileUpdate::RecordVisit { at: now },
            ]
        );
    }

    #[tokio::test]
    async fn apply_keeps_rings_bounded() {
        let store = InMemoryProfileStore::new();
        for i in 0..12 {
            let updates = [
                ProfileUpdate::AddNote(format!("note {i}")),
                ProfileUpdate::AddFavorite(format!("dish {i}")),
            ];
            apply_updates(&store, "u1", &updates).await.unwrap();
        }
        // Re-adding an existing item moves it to the end instead of duplicating.
        apply_updates(&store, "u1", &[ProfileUpdate::AddFavorite("dish 8".into())])
            .await
            .unwrap();

        let facts = load_facts(&store, "u1").await;
        assert_eq!(facts.notes.len(), MAX_NOTES);
        assert_eq!(facts.notes[0], "note 2");
        assert_eq!(
            facts.favorite_items,
            vec!["dish 7", "dish 9", "dish 10", "dish 11", "dish 8"]
        );
    }

    #[tokio::test]
    async fn visits_accumulate() {
        let store = InMemoryProfileStore::new();
        let at = Utc::now();
        for _ in 0..3 {
            apply_updates(&store, "u1", &[ProfileUpdate::RecordVisit { at }])
                .await
                .unwrap();
        }
        apply_updates(&store, "u1", &[ProfileUpdate::SetName("Ирина".into())])
            .await
            .unwrap();

        let facts = load_facts(&store, "u1").await;
        assert_eq!(facts.visit_count, 3);
        assert_eq!(facts.name.as_deref(), Some("Ирина"));
        assert_eq!(
            store.get("u1", ProfileField::LastVisit).await.unwrap(),
            Some(json!(at.to_rfc3339()))
        );
        assert!(load_facts(&store, "nobody").await.is_empty());
    }
}
