pub mod structs;
pub mod fetcher;
pub mod news;
pub mod text_serializer;

pub use structs::{CoinQuote, NewsItem};
pub use fetcher::{MarketDataFetcher, QuoteSource};
pub use news::{HeadlineSource, NewsSentinel};
