//! Degraded-mode replies served when the generation backend is unavailable.
//!
//! Templates are keyed by intent and channel kind through an exhaustive
//! `match`, so a new [`IntentKind`] variant does not compile until it has
//! fallback text. Each key rotates through its templates.

use maitre_core::{ChannelKind, Entities, IntentKind};
use std::sync::atomic::{AtomicUsize, Ordering};

const KEYS: usize = IntentKind::ALL.len() * 2;

/// Canned replies with per-key rotation. Shared freely across requests.
#[derive(Debug)]
pub struct FallbackCatalog {
    cursors: [AtomicUsize; KEYS],
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self {
            cursors: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }
}

impl FallbackCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reply for `intent`, mentioning booking details when there are any.
    pub fn get_fallback(
        &self,
        intent: IntentKind,
        entities: &Entities,
        channel: ChannelKind,
    ) -> String {
        let options = templates(intent, channel);
        let turn = self.cursors[key(intent, channel)].fetch_add(1, Ordering::Relaxed);
        let base = options[turn % options.len()];

        match intent {
            IntentKind::Booking | IntentKind::CancelBooking => match details(entities) {
                Some(details) => format!("{base} Я записал: {details}."),
                None => base.to_string(),
            },
            _ => base.to_string(),
        }
    }
}

fn key(intent: IntentKind, channel: ChannelKind) -> usize {
    let index = IntentKind::ALL
        .iter()
        .position(|k| *k == intent)
        .unwrap_or(IntentKind::ALL.len() - 1);
    match channel {
        ChannelKind::Direct => index * 2,
        ChannelKind::Group => index * 2 + 1,
    }
}

fn details(entities: &Entities) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(date) = &entities.date {
        parts.push(date.clone());
    }
    if let Some(time) = &entities.time {
        parts.push(format!("в {time}"));
    }
    if let Some(people) = entities.people_count {
        parts.push(format!("гостей: {people}"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn templates(intent: IntentKind, channel: ChannelKind) -> &'static [&'static str] {
    use ChannelKind::{Direct, Group};
    match (intent, channel) {
        (IntentKind::Complaint, Direct) => &[
            "Мне очень жаль, что так вышло. Я передам вашу жалобу менеджеру, и с вами свяжутся в ближайшее время.",
            "Простите за неудобства. Ваше сообщение уже передано управляющему, мы обязательно разберёмся.",
        ],
        (IntentKind::Complaint, Group) => &[
            "Простите за неудобства. Напишите, пожалуйста, подробности в личные сообщения, менеджер свяжется с вами.",
        ],
        (IntentKind::CancelBooking, Direct) => &[
            "Понял, вы хотите отменить бронь. Администратор подтвердит отмену в ближайшее время.",
            "Запрос на отмену брони принят. Мы свяжемся с вами для подтверждения.",
        ],
        (IntentKind::CancelBooking, Group) => &[
            "Чтобы отменить бронь, напишите нам, пожалуйста, в личные сообщения.",
        ],
        (IntentKind::Booking, Direct) => &[
            "С радостью забронируем для вас стол! Администратор свяжется с вами, чтобы подтвердить детали.",
            "Спасибо за заявку на бронирование! Мы скоро перезвоним и всё подтвердим.",
            "Отличный выбор! Я передал заявку на бронь администратору, он подтвердит её в ближайшее время.",
        ],
        (IntentKind::Booking, Group) => &[
            "Чтобы забронировать стол, напишите нам в личные сообщения, и мы всё организуем.",
        ],
        (IntentKind::Menu, Direct) => &[
            "Наше меню можно посмотреть на сайте или попросить у официанта. Если подскажете, что вы любите, я помогу с выбором чуть позже.",
            "Сейчас не могу показать меню целиком, но официант с радостью расскажет о блюдах дня.",
        ],
        (IntentKind::Menu, Group) => &["Меню можно посмотреть на нашем сайте."],
        (IntentKind::Promotions, Direct) => &[
            "Актуальные акции и специальные предложения можно уточнить у администратора. Загляните к нам, будет выгодно!",
            "Про текущие акции лучше всего подскажет администратор, мы регулярно их обновляем.",
        ],
        (IntentKind::Promotions, Group) => {
            &["Актуальные акции публикуем на сайте и в наших соцсетях."]
        }
        (IntentKind::VenueInfo, Direct) => &[
            "Адрес и часы работы есть на нашем сайте. Если нужно, администратор подскажет, как лучше добраться.",
        ],
        (IntentKind::VenueInfo, Group) => &["Адрес и часы работы указаны на нашем сайте."],
        (IntentKind::Greeting, Direct) => &[
            "Здравствуйте! Рады вас видеть. Чем могу помочь?",
            "Добрый день! Подскажу с бронированием, меню или акциями.",
        ],
        (IntentKind::Greeting, Group) => &["Всем привет! Чем можем помочь?"],
        (IntentKind::Thanks, Direct) => &[
            "Спасибо вам! Будем рады видеть вас снова.",
            "Всегда пожалуйста! Хорошего дня.",
        ],
        (IntentKind::Thanks, Group) => &["Спасибо! Ждём вас в гости."],
        (IntentKind::General, Direct) => &[
            "Извините, сейчас я не могу ответить подробно. Попробуйте, пожалуйста, чуть позже или позвоните администратору.",
            "Секунду, у меня небольшая заминка. Напишите, пожалуйста, ещё раз через пару минут.",
        ],
        (IntentKind::General, Group) => {
            &["Извините, сейчас не получается ответить. Попробуйте чуть позже."]
        }
    }
}
