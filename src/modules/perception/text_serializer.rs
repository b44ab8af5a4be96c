use std::fmt;
use super::structs::CoinQuote;
use crate::utils::text::char_len;

const HEADER: &str = "📊 Crypto Market Update:";

impl fmt::Display for CoinQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.change_24h_pct >= 0.0 { "⬆️" } else { "⬇️" };
        write!(f, "#{} {:.2}% {}\n{}", self.tag(), self.change_24h_pct, arrow, self.price_label())
    }
}

/// Builds the market update post. Coins that would push it over `max_chars`
/// are left out whole rather than cut mid-line.
pub fn format_market_post(quotes: &[CoinQuote], max_chars: usize) -> Option<String> {
    let mut post = HEADER.to_string();
    let mut included = 0;

    for quote in quotes {
        let block = format!("\n{}\n", quote);
        if char_len(&post) + char_len(block.trim_end()) > max_chars {
            continue;
        }
        post.push_str(&block);
        included += 1;
    }

    if included == 0 {
        return None;
    }
    Some(post.trim_end().to_string())
}

/// Thread reply naming the best and worst performer of the set.
pub fn format_movers_follow_up(quotes: &[CoinQuote]) -> Option<String> {
    if quotes.len() < 2 {
        return None;
    }
    let by_change = |a: &&CoinQuote, b: &&CoinQuote| a.change_24h_pct.total_cmp(&b.change_24h_pct);
    let gainer = quotes.iter().max_by(by_change)?;
    let loser = quotes.iter().min_by(by_change)?;

    Some(format!(
        "🔥 Top gainer: #{} {:+.2}%\n🧊 Top loser: #{} {:+.2}%\n\nNot financial advice. #Crypto",
        gainer.tag(), gainer.change_24h_pct,
        loser.tag(), loser.change_24h_pct
    ))
}
