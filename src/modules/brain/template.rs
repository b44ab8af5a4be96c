use crate::config::bot_profile::GateConfig;
use crate::modules::brain::gate::{CODE_RE, PLACEHOLDER_RE};
use crate::modules::perception::NewsItem;
use crate::utils::text::{char_len, derive_hashtags, truncate_to_sentence, word_count};

const HEADLINE_SLOT: &str = "{headline}";
const TAGS_SLOT: &str = "{tags}";

/// Each skeleton carries at least 9 words of its own, so with the trailing
/// `#Crypto` the output always reaches 10 words.
const TEMPLATES: [&str; 3] = [
    "🚨 {headline}\n\nThis could move the market. What's your take? 👇\n\n{tags}",
    "📰 {headline}\n\nBullish or bearish? Drop your prediction below. 🔮\n\n{tags}",
    "⚡ Breaking: {headline}\n\nKeep an eye on the charts today. Thoughts? 💬\n\n{tags}",
];

const ALLOWED_PUNCT: &str = ".,!?'%$&-+/\"’";

/// Deterministic last-resort writer. Never fails, never touches the network.
#[derive(Debug, Clone)]
pub struct LocalTemplate {
    rules: GateConfig,
}

impl LocalTemplate {
    pub fn new(rules: GateConfig) -> Self {
        Self { rules }
    }

    pub fn generate(&self, item: &NewsItem) -> (String, Option<String>) {
        let template = TEMPLATES[template_index(&item.title)];
        let tags = derive_hashtags(&item.title).join(" ");

        let skeleton = render(template, "", &tags);
        let word_budget = self.rules.max_words.saturating_sub(word_count(&skeleton));
        let char_budget = self.rules.max_chars.saturating_sub(char_len(&skeleton));

        let headline = sanitize_headline(&item.title);
        let headline: Vec<&str> = headline.split_whitespace().take(word_budget).collect();
        let headline = truncate_to_sentence(&headline.join(" "), char_budget);

        let text = render(template, &headline, &tags);
        let follow_up = item
            .link
            .as_ref()
            .map(|link| format!("Source 👉 {}", link))
            .filter(|reply| char_len(reply) <= self.rules.max_chars);
        (text, follow_up)
    }
}

fn render(template: &str, headline: &str, tags: &str) -> String {
    template.replace(HEADLINE_SLOT, headline).replace(TAGS_SLOT, tags)
}

fn template_index(title: &str) -> usize {
    title.bytes().map(usize::from).sum::<usize>() % TEMPLATES.len()
}

/// Reduces a headline to words and plain punctuation: no links, markup,
/// placeholder or code fragments survive.
pub fn sanitize_headline(text: &str) -> String {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| !(w.contains("://") || w.to_lowercase().starts_with("www.")))
        .collect();
    let joined = words.join(" ");
    let joined = PLACEHOLDER_RE.replace_all(&joined, " ");
    let joined = CODE_RE.replace_all(&joined, " ");
    let mut clean: String = joined
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCT.contains(*c))
        .collect();

    loop {
        clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
        if !PLACEHOLDER_RE.is_match(&clean) && !CODE_RE.is_match(&clean) {
            return clean;
        }
        let pass = PLACEHOLDER_RE.replace_all(&clean, " ").into_owned();
        clean = CODE_RE.replace_all(&pass, " ").into_owned();
    }
}
