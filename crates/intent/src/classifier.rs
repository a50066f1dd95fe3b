//! Two-tier intent classifier with priority-based selection.

use crate::catalog::{CATALOG, IntentRule, negation_differs};
use crate::entities::EntityExtractor;
use crate::fuzzy::similarity;
use maitre_core::{IntentKind, IntentResult};
use tracing::debug;

/// Confidence of a literal phrase hit.
pub const PHRASE_CONFIDENCE: f32 = 0.95;
/// Floor for a fuzzy keyword hit above threshold.
pub const FUZZY_FLOOR: f32 = 0.7;
/// `General` when nothing matched.
pub const NO_MATCH_CONFIDENCE: f32 = 0.5;
/// `General` for empty input.
pub const EMPTY_CONFIDENCE: f32 = 0.3;

/// Which tier produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Phrase,
    Fuzzy,
}

/// One intent that matched the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: IntentKind,
    pub confidence: f32,
    pub tier: MatchTier,
}

impl Candidate {
    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }
}

/// Pick by priority ascending, then confidence descending. Earlier
/// candidates win exact ties.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().reduce(|best, c| {
        let better = c.priority() < best.priority()
            || (c.priority() == best.priority() && c.confidence > best.confidence);
        if better { c } else { best }
    })
}

/// Maps cleaned text to an intent, a confidence and entities.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    catalog: &'static [IntentRule],
    fuzzy_threshold: f32,
    min_token_chars: usize,
    extractor: EntityExtractor,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self {
            catalog: CATALOG,
            fuzzy_threshold: 0.75,
            min_token_chars: 4,
            extractor: EntityExtractor::default(),
        }
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f32) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_min_token_chars(mut self, chars: usize) -> Self {
        self.min_token_chars = chars;
        self
    }

    pub fn with_extractor(mut self, extractor: EntityExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn classify(&self, text: &str) -> IntentResult {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return IntentResult::new(IntentKind::General, EMPTY_CONFIDENCE);
        }

        let candidates = self.candidates_lower(&lower);
        let Some(best) = select_best(&candidates) else {
            debug!("No intent matched, falling back to general");
            return IntentResult::new(IntentKind::General, NO_MATCH_CONFIDENCE);
        };

        debug!(
            intent = %best.kind,
            confidence = best.confidence,
            tier = ?best.tier,
            candidates = candidates.len(),
            "Intent classified"
        );
        let entities = self.extractor.extract(&lower, best.kind);
        IntentResult::new(best.kind, best.confidence).with_entities(entities)
    }

    /// Every matching intent in catalog order.
    pub fn candidates(&self, text: &str) -> Vec<Candidate> {
        self.candidates_lower(&text.trim().to_lowercase())
    }

    fn candidates_lower(&self, lower: &str) -> Vec<Candidate> {
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= self.min_token_chars)
            .collect();

        self.catalog
            .iter()
            .filter_map(|rule| {
                let phrase = rule
                    .phrases
                    .iter()
                    .any(|p| lower.contains(p))
                    .then_some(PHRASE_CONFIDENCE);
                let fuzzy = self
                    .best_keyword_ratio(rule, &words)
                    .filter(|&ratio| ratio >= self.fuzzy_threshold)
                    .map(|ratio| ratio.max(FUZZY_FLOOR));

                match (phrase, fuzzy) {
                    (None, None) => None,
                    (Some(p), Some(f)) if f > p => Some(Candidate {
                        kind: rule.kind,
                        confidence: f,
                        tier: MatchTier::Fuzzy,
                    }),
                    (Some(p), _) => Some(Candidate {
                        kind: rule.kind,
                        confidence: p,
                        tier: MatchTier::Phrase,
                    }),
                    (None, Some(f)) => Some(Candidate {
                        kind: rule.kind,
                        confidence: f,
                        tier: MatchTier::Fuzzy,
                    }),
                }
            })
            .collect()
    }

    fn best_keyword_ratio(&self, rule: &IntentRule, words: &[&str]) -> Option<f32> {
        rule.keywords
            .iter()
            .filter(|kw| kw.chars().count() >= self.min_token_chars)
            .flat_map(|kw| {
                words
                    .iter()
                    .filter(move |w| !negation_differs(w, kw))
                    .map(move |w| similarity(w, kw))
            })
            .reduce(f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> IntentResult {
        IntentClassifier::new().classify(text)
    }

    #[test]
    fn booking_with_entities() {
        let result = classify("хочу стол на завтра в 19:30 на 4 человек");
        assert_eq!(result.intent, IntentKind::Booking);
        assert!(result.confidence >= PHRASE_CONFIDENCE);
        assert_eq!(result.entities.date.as_deref(), Some("завтра"));
        assert_eq!(result.entities.time.as_deref(), Some("19:30"));
        assert_eq!(result.entities.people_count, Some(4));
    }

    #[test]
    fn misspelling_still_books() {
        let result = classify("хочу забраниров на пятницу");
        assert_eq!(result.intent, IntentKind::Booking);
        assert!(result.confidence >= FUZZY_FLOOR);
    }

    #[test]
    fn empty_and_unknown_are_general() {
        let empty = classify("   ");
        assert_eq!(empty.intent, IntentKind::General);
        assert!((empty.confidence - EMPTY_CONFIDENCE).abs() < f32::EPSILON);

        let unknown = classify("какая сегодня погода");
        assert_eq!(unknown.intent, IntentKind::General);
        assert!((unknown.confidence - NO_MATCH_CONFIDENCE).abs() < f32::EPSILON);
        assert_eq!(unknown.priority, 99);
    }

    #[test]
    fn complaint_outranks_greeting() {
        let candidates = vec![
            Candidate {
                kind: IntentKind::Greeting,
                confidence: 0.95,
                tier: MatchTier::Phrase,
            },
            Candidate {
                kind: IntentKind::Complaint,
                confidence: 0.7,
                tier: MatchTier::Fuzzy,
            },
        ];
        assert_eq!(select_best(&candidates).unwrap().kind, IntentKind::Complaint);

        let result = classify("Добрый день! Хочу пожаловаться на официанта");
        assert_eq!(result.intent, IntentKind::Complaint);
    }

    #[test]
    fn equal_priority_prefers_confidence() {
        let candidates = vec![
            Candidate {
                kind: IntentKind::Menu,
                confidence: 0.8,
                tier: MatchTier::Fuzzy,
            },
            Candidate {
                kind: IntentKind::Promotions,
                confidence: 0.95,
                tier: MatchTier::Phrase,
            },
        ];
        assert_eq!(select_best(&candidates).unwrap().kind, IntentKind::Promotions);
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn cancel_beats_booking_keywords() {
        let result = classify("Отмените бронь на завтра, пожалуйста");
        assert_eq!(result.intent, IntentKind::CancelBooking);
        assert_eq!(result.entities.date.as_deref(), Some("завтра"));
    }

    #[test]
    fn celebrating_is_not_cancelling() {
        let result = classify("хотим отметить день рождения");
        assert_ne!(result.intent, IntentKind::CancelBooking);
    }

    #[test]
    fn compliments_are_not_complaints() {
        assert_eq!(classify("было очень вкусно, спасибо").intent, IntentKind::Thanks);
        for text in ["я очень доволен вечером", "мы очарованы вашим рестораном"] {
            assert_ne!(classify(text).intent, IntentKind::Complaint, "{text}");
        }
    }

    #[test]
    fn negated_praise_is_still_a_complaint() {
        assert_eq!(classify("суп был невкусный").intent, IntentKind::Complaint);
        assert_eq!(classify("я недовольна сервисом").intent, IntentKind::Complaint);
        assert_eq!(classify("всё было не вкусно").intent, IntentKind::Complaint);
        assert_eq!(classify("я разочарована").intent, IntentKind::Complaint);
    }

    #[test]
    fn excellent_is_not_cancelling() {
        let result = classify("хочу забронировать, всё отменно");
        assert_eq!(result.intent, IntentKind::Booking);
        assert_eq!(classify("хочу отменить бронь").intent, IntentKind::CancelBooking);
        assert_eq!(classify("нужна отмена брони").intent, IntentKind::CancelBooking);
    }

    #[test]
    fn thanks_and_greeting() {
        assert_eq!(classify("Спасибо большое!").intent, IntentKind::Thanks);
        assert_eq!(classify("Привет").intent, IntentKind::Greeting);
        assert_eq!(classify("Здраствуйте").intent, IntentKind::Greeting);
    }

    #[test]
    fn menu_with_location() {
        let result = classify("что есть в меню на веранде?");
        assert_eq!(result.intent, IntentKind::Menu);
        assert_eq!(result.entities.location.as_deref(), Some("terrace"));
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = IntentClassifier::new().with_fuzzy_threshold(0.95);
        assert_eq!(strict.classify("забраниров").intent, IntentKind::General);
        let loose = IntentClassifier::new();
        assert_eq!(loose.classify("забраниров").intent, IntentKind::Booking);
    }

    #[test]
    fn common_words_do_not_trigger_menu() {
        let result = classify("меня зовут анна");
        assert_eq!(result.intent, IntentKind::General);
    }

    #[test]
    fn short_words_skip_fuzzy_tier() {
        let default = IntentClassifier::new();
        assert!(default.candidates("брони").iter().any(|c| c.kind == IntentKind::Booking));

        let strict = IntentClassifier::new().with_min_token_chars(6);
        assert!(strict.candidates("брони").iter().all(|c| c.kind != IntentKind::Booking));
    }
}
