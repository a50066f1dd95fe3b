//! The static intent catalog.
//!
//! Phrases are matched as literal substrings of the lower-cased input.
//! Keywords are compared word by word with the fuzzy ratio, so every keyword
//! is at least four characters long. Cues whose near neighbours are common
//! words ("меню" ~ "меня", "отменить" ~ "отметить", "столик" ~ "столько")
//! live in `phrases` instead. Keywords that open with a negating prefix
//! ("не", "раз", "без") never fuzzy-match a word without that prefix, so
//! "невкусно" does not fire on "вкусно".

use maitre_core::IntentKind;

/// Matching cues for one intent.
#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub kind: IntentKind,
    pub keywords: &'static [&'static str],
    pub phrases: &'static [&'static str],
}

impl IntentRule {
    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }
}

/// Prefixes that flip a word's meaning.
pub const NEGATING_PREFIXES: &[&str] = &["не", "раз", "без"];

/// True when exactly one of the two words carries a negating prefix.
pub fn negation_differs(word: &str, keyword: &str) -> bool {
    NEGATING_PREFIXES
        .iter()
        .any(|p| word.starts_with(p) != keyword.starts_with(p))
}

/// Every intent except `General`, in selection tie-break order.
pub const CATALOG: &[IntentRule] = &[
    IntentRule {
        kind: IntentKind::Complaint,
        keywords: &[
            "жалоба",
            "жалобу",
            "пожаловаться",
            "ужасно",
            "ужасный",
            "отвратительно",
            "невкусно",
            "невкусный",
            "хамство",
            "нахамили",
            "грубый",
            "недоволен",
            "недовольна",
            "разочарован",
            "отравился",
            "отравилась",
            "испорчено",
            "complaint",
            "terrible",
        ],
        phrases: &[
            "хочу пожаловаться",
            "очень плохо",
            "ужасное обслуживание",
            "долго ждали",
            "не понравилось",
            "не вкусно",
            "не доволен",
            "не довольна",
            "верните деньги",
            "позовите менеджера",
            "это безобразие",
            "холодное блюдо",
        ],
    },
    IntentRule {
        kind: IntentKind::CancelBooking,
        keywords: &[],
        phrases: &[
            "отмени",
            "отмена",
            "отмену",
            "отменя",
            "снять бронь",
            "снимите бронь",
            "не придём",
            "не придем",
            "cancel",
        ],
    },
    IntentRule {
        kind: IntentKind::Booking,
        keywords: &[
            "забронировать",
            "забронируйте",
            "бронирование",
            "бронь",
            "зарезервировать",
            "резерв",
            "booking",
            "reserve",
            "reservation",
        ],
        phrases: &[
            "хочу стол",
            "заказать стол",
            "забронировать стол",
            "можно стол",
            "столик",
            "стол на",
            "book a table",
        ],
    },
    IntentRule {
        kind: IntentKind::Menu,
        keywords: &[
            "блюда",
            "блюдо",
            "кухня",
            "напитки",
            "десерт",
            "десерты",
            "вегетарианское",
        ],
        phrases: &[
            "меню",
            "menu",
            "поесть",
            "покушать",
            "какие блюда",
            "винная карта",
            "барная карта",
            "что посоветуете",
        ],
    },
    IntentRule {
        kind: IntentKind::Promotions,
        keywords: &[
            "акция",
            "акции",
            "акциях",
            "скидка",
            "скидки",
            "скидку",
            "промокод",
            "бонус",
            "бонусы",
            "предложения",
        ],
        phrases: &[
            "есть ли акции",
            "специальное предложение",
            "счастливые часы",
            "happy hour",
        ],
    },
    IntentRule {
        kind: IntentKind::VenueInfo,
        keywords: &[
            "адрес",
            "работаете",
            "открыты",
            "парковка",
            "телефон",
            "находитесь",
            "доехать",
            "добраться",
        ],
        phrases: &[
            "где вы",
            "как добраться",
            "до скольки",
            "во сколько открываетесь",
            "часы работы",
            "режим работы",
            "как вас найти",
        ],
    },
    IntentRule {
        kind: IntentKind::Greeting,
        keywords: &[
            "привет",
            "здравствуйте",
            "здравствуй",
            "приветствую",
            "hello",
        ],
        phrases: &["добрый день", "добрый вечер", "доброе утро", "всем привет"],
    },
    IntentRule {
        kind: IntentKind::Thanks,
        keywords: &["спасибо", "благодарю", "спасибки", "thanks"],
        phrases: &["большое спасибо", "thank you"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_intent_but_general() {
        for kind in IntentKind::ALL {
            let present = CATALOG.iter().any(|r| r.kind == kind);
            assert_eq!(present, kind != IntentKind::General, "{kind}");
        }
    }

    #[test]
    fn keywords_are_long_enough_for_fuzzy_tier() {
        for rule in CATALOG {
            for kw in rule.keywords {
                assert!(kw.chars().count() >= 4, "{kw} is too short");
            }
        }
    }

    #[test]
    fn negation_prefix_must_agree() {
        assert!(negation_differs("вкусно", "невкусно"));
        assert!(negation_differs("очарованы", "разочарован"));
        assert!(!negation_differs("недовольны", "недоволен"));
        assert!(!negation_differs("забронировать", "бронирование"));
    }

    #[test]
    fn cues_are_lowercase() {
        for rule in CATALOG {
            for cue in rule.keywords.iter().chain(rule.phrases) {
                assert_eq!(*cue, cue.to_lowercase());
            }
        }
    }
}
