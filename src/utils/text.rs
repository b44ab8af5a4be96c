//! Small pure helpers shared by the post builders and the quality gate.

const ELLIPSIS: char = '…';

/// Coin names and tickers that map to a canonical hashtag.
const KNOWN_TAGS: &[(&str, &str)] = &[
    ("bitcoin", "#Bitcoin"),
    ("btc", "#BTC"),
    ("ethereum", "#Ethereum"),
    ("eth", "#ETH"),
    ("ripple", "#XRP"),
    ("xrp", "#XRP"),
    ("solana", "#Solana"),
    ("sol", "#SOL"),
    ("dogecoin", "#Dogecoin"),
    ("doge", "#DOGE"),
    ("cardano", "#Cardano"),
    ("ada", "#ADA"),
    ("pepe", "#PEPE"),
    ("shiba", "#SHIB"),
    ("bnb", "#BNB"),
    ("tether", "#USDT"),
    ("chainlink", "#LINK"),
];

/// All-caps words that look like tickers but aren't.
const NOT_TICKERS: &[&str] = &[
    "ETF", "ETFS", "SEC", "US", "USA", "UK", "EU", "CEO", "CFO", "CTO", "IPO", "AI", "FBI", "DOJ", "CFTC", "FED",
    "NEW", "THE", "AND", "FOR", "USD", "API", "NFT", "NFTS", "DAO", "DEFI",
];

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Comparison key for headlines: trimmed, single-spaced, lowercase.
pub fn headline_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Fits `text` into `max_chars`, preferring to end on a full sentence.
///
/// Falls back to the last word boundary plus an ellipsis, then to a hard cut.
pub fn truncate_to_sentence(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let prefix: String = text.chars().take(max_chars).collect();
    let rest = &text[prefix.len()..];

    let mut sentence_end = None;
    let mut iter = prefix.char_indices().peekable();
    while let Some((idx, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let next = iter.peek().map(|&(_, n)| n).or_else(|| rest.chars().next());
            if next.map_or(true, char::is_whitespace) {
                sentence_end = Some(idx + c.len_utf8());
            }
        }
    }
    if let Some(end) = sentence_end {
        return prefix[..end].to_string();
    }

    let budget = max_chars - 1;
    let head: String = text.chars().take(budget).collect();
    let next_is_space = text.chars().nth(budget).map_or(false, char::is_whitespace);
    let head = if next_is_space {
        head.trim_end()
    } else {
        match head.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => head[..pos].trim_end(),
            _ => head.as_str(),
        }
    };
    format!("{}{}", head, ELLIPSIS)
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

/// The word a post about `headline` is expected to mention.
pub fn subject_token(headline: &str) -> Option<String> {
    headline
        .split_whitespace()
        .map(trim_token)
        .find(|t| t.chars().filter(|c| c.is_alphanumeric()).count() >= 3)
        .map(str::to_string)
}

/// Hashtags for a headline: known coins first, otherwise the first
/// ticker-looking token, always closed by `#Crypto`.
pub fn derive_hashtags(headline: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let tokens: Vec<&str> = headline
        .split(|c: char| !(c.is_alphanumeric() || c == '$'))
        .map(|t| t.trim_start_matches('$'))
        .filter(|t| !t.is_empty())
        .collect();

    for token in &tokens {
        let lower = token.to_lowercase();
        if let Some((_, tag)) = KNOWN_TAGS.iter().find(|(key, _)| *key == lower) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.len() == 2 {
            break;
        }
    }

    if tags.is_empty() {
        let ticker = tokens.iter().find(|t| {
            (2..=5).contains(&t.len())
                && t.chars().all(|c| c.is_ascii_uppercase())
                && !NOT_TICKERS.contains(t)
        });
        if let Some(t) = ticker {
            tags.push(format!("#{}", t));
        }
    }

    tags.push("#Crypto".to_string());
    tags
}
