use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinQuote {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_24h_pct: f64,
    pub market_cap_rank: Option<u32>,
}

impl CoinQuote {
    /// Hashtag-safe upper-case name ("Shiba Inu" -> "SHIBAINU").
    pub fn tag(&self) -> String {
        let tag: String = self.name.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_uppercase();
        if tag.is_empty() { self.symbol.to_uppercase() } else { tag }
    }

    pub fn price_label(&self) -> String {
        if self.price > 0.001 {
            format!("${:.2}", self.price)
        } else {
            format!("${:.5}", self.price)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub source: String,
}

impl NewsItem {
    #[cfg(test)]
    pub fn headline(title: impl Into<String>) -> Self {
        Self { title: title.into(), link: None, summary: None, source: "manual".to_string() }
    }
}
