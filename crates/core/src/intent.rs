//! Intent vocabulary shared by the classifier, the prompt builder and the
//! fallback catalog.

use serde::{Deserialize, Serialize};

/// A coarse category of user goal.
///
/// Closed on purpose: prompt augmentation and fallback selection match on
/// this enum, so adding a variant is a compile error until every table
/// handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Complaint,
    CancelBooking,
    Booking,
    Menu,
    Promotions,
    VenueInfo,
    Greeting,
    Thanks,
    General,
}

impl IntentKind {
    /// Every variant, most urgent first.
    pub const ALL: [IntentKind; 9] = [
        Self::Complaint,
        Self::CancelBooking,
        Self::Booking,
        Self::Menu,
        Self::Promotions,
        Self::VenueInfo,
        Self::Greeting,
        Self::Thanks,
        Self::General,
    ];

    /// Lower = more urgent.
    pub fn priority(self) -> u8 {
        match self {
            Self::Complaint => 0,
            Self::CancelBooking => 1,
            Self::Booking => 2,
            Self::Menu | Self::Promotions => 3,
            Self::VenueInfo => 4,
            Self::Greeting => 5,
            Self::Thanks => 6,
            Self::General => 99,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complaint => "complaint",
            Self::Booking => "booking",
            Self::CancelBooking => "cancel_booking",
            Self::Menu => "menu",
            Self::Promotions => "promotions",
            Self::VenueInfo => "venue_info",
            Self::Greeting => "greeting",
            Self::Thanks => "thanks",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured values pulled out of the utterance.
///
/// Absent fields mean "not mentioned", never "failed to parse".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Relative ("завтра") or absolute ("15 марта", "25.12") date, as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Normalized `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_count: Option<u32>,

    /// Canonical location tag resolved from an alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time.is_none()
            && self.people_count.is_none()
            && self.location.is_none()
    }
}

/// Output of the intent classifier. Produced per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentKind,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub entities: Entities,
    pub priority: u8,
}

impl IntentResult {
    pub fn new(intent: IntentKind, confidence: f32) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            entities: Entities::default(),
            priority: intent.priority(),
        }
    }

    pub fn with_entities(mut self, entities: Entities) -> Self {
        self.entities = entities;
        self
    }
}

/// Direct (one-to-one) vs group-style conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Direct,
    Group,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Group => write!(f, "group"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_complaint_first() {
        assert_eq!(IntentKind::Complaint.priority(), 0);
        assert_eq!(IntentKind::Greeting.priority(), 5);
        assert_eq!(IntentKind::General.priority(), 99);
        let mut sorted = IntentKind::ALL;
        sorted.sort_by_key(|k| k.priority());
        assert_eq!(sorted, IntentKind::ALL);
    }

    #[test]
    fn entities_serialize_as_sparse_map() {
        let entities = Entities {
            date: Some("завтра".into()),
            time: Some("19:30".into()),
            people_count: Some(4),
            location: None,
        };
        let json = serde_json::to_value(&entities).unwrap();
        assert_eq!(json["date"], "завтра");
        assert_eq!(json["people_count"], 4);
        assert!(json.get("location").is_none());
    }

    #[test]
    fn result_clamps_confidence() {
        let result = IntentResult::new(IntentKind::Booking, 1.4);
        assert!((result.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(result.priority, 2);
    }
}
