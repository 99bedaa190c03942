//! Historical bars and quotes from the Polygon REST API

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::market::{decimal_from_f64, millis_to_datetime, nanos_to_datetime, Bar, Quote};

/// Quotes fetched per request
const QUOTES_PAGE_LIMIT: usize = 50_000;

/// Pagination stops once this many quotes have been gathered
pub const MAX_QUOTES: usize = 100_000;

/// Source of historical bars and quotes for one symbol and time range
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    /// One-minute bars in `[start, end]`, oldest first
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    /// Quotes in `[start, end]`. Pagination failures keep what was gathered.
    async fn fetch_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Quote>>;
}

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Option<Vec<AggregateBar>>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
    #[serde(default)]
    n: Option<u64>,
}

impl AggregateBar {
    fn to_bar(&self) -> Option<Bar> {
        Some(Bar {
            time: millis_to_datetime(self.t)?,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
            vwap: self.vw.unwrap_or(self.c),
            trades: self.n.unwrap_or(0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    results: Option<Vec<QuoteRecord>>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteRecord {
    /// Nanoseconds
    participant_timestamp: Option<i64>,
    /// Nanoseconds
    sip_timestamp: Option<i64>,
    bid_price: Option<f64>,
    /// Round lots
    bid_size: Option<f64>,
    ask_price: Option<f64>,
    /// Round lots
    ask_size: Option<f64>,
    #[serde(default)]
    sequence_number: u64,
    #[serde(default)]
    tape: u8,
}

impl QuoteRecord {
    fn to_quote(&self) -> Option<Quote> {
        let timestamp = self
            .participant_timestamp
            .and_then(nanos_to_datetime)
            .or_else(|| self.sip_timestamp.and_then(nanos_to_datetime))?;

        let quote = Quote::from_lots(
            timestamp,
            decimal_from_f64(self.bid_price?)?,
            decimal_from_f64(self.bid_size?)?,
            decimal_from_f64(self.ask_price?)?,
            decimal_from_f64(self.ask_size?)?,
        )?;
        Some(quote.with_sequence(self.sequence_number, self.tape))
    }
}

/// Polygon REST client
#[derive(Debug, Clone)]
pub struct PolygonClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HistoricalData(format!(
                "HTTP {} from {}",
                status, url
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl HistoricalSource for PolygonClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/minute/{}/{}",
            self.base_url,
            symbol,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        info!(symbol = %symbol, "Fetching minute bars");

        let response: AggregatesResponse = self
            .get_json(&url, &[("adjusted", "true".to_string()), ("sort", "asc".to_string())])
            .await?;
        // No `results` key means no bars in the range
        let raw = response.results.unwrap_or_default();

        let mut bars: Vec<Bar> = raw.iter().filter_map(AggregateBar::to_bar).collect();
        let dropped = raw.len() - bars.len();
        if dropped > 0 {
            debug!(symbol = %symbol, dropped, "Dropped malformed bars");
        }
        bars.sort_by_key(|b| b.time);
        bars.dedup_by_key(|b| b.time);

        info!(symbol = %symbol, count = bars.len(), "Fetched minute bars");
        Ok(bars)
    }

    async fn fetch_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Quote>> {
        let first_url = format!("{}/v3/quotes/{}", self.base_url, symbol);
        let first_query = vec![
            (
                "timestamp.gte",
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (
                "timestamp.lte",
                end.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("order", "asc".to_string()),
            ("limit", QUOTES_PAGE_LIMIT.to_string()),
        ];

        let mut quotes = Vec::new();
        let mut dropped = 0usize;
        let mut next = Some((first_url, first_query));
        let mut pages = 0usize;

        while let Some((url, query)) = next.take() {
            let page: QuotesResponse = match self.get_json(&url, &query).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        page = pages,
                        gathered = quotes.len(),
                        error = %e,
                        "Quote pagination failed, keeping quotes gathered so far"
                    );
                    break;
                }
            };
            pages += 1;

            let records = page.results.unwrap_or_default();
            debug!(symbol = %symbol, page = pages, count = records.len(), "Fetched quote page");
            for record in &records {
                match record.to_quote() {
                    Some(q) => quotes.push(q),
                    None => dropped += 1,
                }
            }

            if quotes.len() >= MAX_QUOTES {
                warn!(symbol = %symbol, cap = MAX_QUOTES, "Quote cap reached, stopping pagination");
                break;
            }
            next = page.next_url.map(|url| (url, Vec::new()));
        }

        if dropped > 0 {
            debug!(symbol = %symbol, dropped, "Dropped malformed quotes");
        }
        quotes.sort_by_key(|q| q.timestamp);
        info!(symbol = %symbol, count = quotes.len(), pages, "Fetched quotes");
        Ok(quotes)
    }
}
