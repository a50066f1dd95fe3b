//! Prompt assembly.
//!
//! The system message is built from layers in a fixed order: persona,
//! channel framing, intent guidance, extracted entities, venue knowledge,
//! profile facts. Prior turns follow, then the current user message.
//! Assembly is deterministic for identical inputs.

use crate::profile::ProfileFacts;
use maitre_config::PersonaConfig;
use maitre_core::{ChannelKind, ChatMessage, Entities, IntentKind, IntentResult, Turn};

/// Everything the builder needs for one request.
pub struct PromptInput<'a> {
    pub intent: &'a IntentResult,
    pub channel: ChannelKind,
    pub knowledge: &'a str,
    pub profile: &'a ProfileFacts,
    pub history: &'a [Turn],
    pub user_text: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    persona: PersonaConfig,
}

impl PromptBuilder {
    pub fn new(persona: PersonaConfig) -> Self {
        Self { persona }
    }

    pub fn build(&self, input: &PromptInput<'_>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(input.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(input)));
        messages.extend(input.history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(input.user_text));
        messages
    }

    fn system_prompt(&self, input: &PromptInput<'_>) -> String {
        let mut sections = vec![self.persona_text()];
        sections.push(channel_framing(input.channel).to_string());
        sections.push(intent_guidance(input.intent.intent).to_string());

        if let Some(entities) = entity_section(&input.intent.entities) {
            sections.push(entities);
        }
        let knowledge = input.knowledge.trim();
        if !knowledge.is_empty() {
            sections.push(format!("Сведения о заведении:\n{knowledge}"));
        }
        if let Some(profile) = profile_section(input.profile) {
            sections.push(profile);
        }
        sections.join("\n\n")
    }

    fn persona_text(&self) -> String {
        match &self.persona.system_prompt {
            Some(custom) if !custom.trim().is_empty() => custom.trim().to_string(),
            _ => format!(
                "Ты вежливый администратор ресторана «{}». Отвечай по-русски, кратко и дружелюбно. \
                 Не выдумывай цены, адреса и наличие мест: если не знаешь, предложи уточнить у администратора.",
                self.persona.venue_name
            ),
        }
    }
}

fn channel_framing(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Direct => "Это личная переписка с гостем.",
        ChannelKind::Group => {
            "Это групповой чат: отвечай одним-двумя предложениями и не обсуждай личные данные гостя."
        }
    }
}

fn intent_guidance(intent: IntentKind) -> &'static str {
    match intent {
        IntentKind::Complaint => {
            "Гость недоволен. Извинись, прояви участие, не спорь и пообещай передать жалобу менеджеру."
        }
        IntentKind::CancelBooking => {
            "Гость хочет отменить бронь. Подтверди, что запрос принят, и уточни дату и время брони, если их нет."
        }
        IntentKind::Booking => {
            "Гость хочет забронировать стол. Уточни недостающее: дату, время и количество гостей."
        }
        IntentKind::Menu => "Гость интересуется меню. Опирайся только на сведения о заведении.",
        IntentKind::Promotions => "Гость спрашивает об акциях. Называй только известные акции.",
        IntentKind::VenueInfo => "Гость спрашивает об адресе, часах работы или как добраться.",
        IntentKind::Greeting => "Гость здоровается. Поприветствуй и предложи помощь.",
        IntentKind::Thanks => "Гость благодарит. Ответь тепло и коротко.",
        IntentKind::General => "Ответь по существу вопроса.",
    }
}

fn entity_section(entities: &Entities) -> Option<String> {
    if entities.is_empty() {
        return None;
    }
    let mut lines = vec!["Уже известно из сообщения:".to_string()];
    if let Some(date) = &entities.date {
        lines.push(format!("- дата: {date}"));
    }
    if let Some(time) = &entities.time {
        lines.push(format!("- время: {time}"));
    }
    if let Some(people) = entities.people_count {
        lines.push(format!("- гостей: {people}"));
    }
    if let Some(location) = &entities.location {
        lines.push(format!("- зона: {location}"));
    }
    Some(lines.join("\n"))
}

fn profile_section(profile: &ProfileFacts) -> Option<String> {
    if profile.is_empty() {
        return None;
    }
    let mut lines = vec!["О госте:".to_string()];
    if let Some(name) = &profile.name {
        lines.push(format!("- имя: {name}"));
    }
    if profile.visit_count > 0 {
        lines.push(format!("- визитов: {}", profile.visit_count));
    }
    if let Some(venue) = &profile.preferred_venue {
        lines.push(format!("- любимая зона: {venue}"));
    }
    if !profile.favorite_items.is_empty() {
        lines.push(format!("- любит: {}", profile.favorite_items.join(", ")));
    }
    if !profile.notes.is_empty() {
        lines.push(format!("- заметки: {}", profile.notes.join("; ")));
    }
    Some(lines.join("\n"))
}
