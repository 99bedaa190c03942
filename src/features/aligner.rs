//! Temporal alignment of quotes to bars

use std::borrow::Cow;
use std::ops::Range;

use chrono::Duration;

use crate::market::{Bar, Quote, BAR_INTERVAL_MS};

/// Assigns each bar the quotes in its trailing window `(time - window, time]`
#[derive(Debug, Clone, Copy)]
pub struct TemporalAligner {
    window: Duration,
}

impl Default for TemporalAligner {
    fn default() -> Self {
        Self::new(BAR_INTERVAL_MS)
    }
}

impl TemporalAligner {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window: Duration::milliseconds(window_ms),
        }
    }

    /// Align quotes to bars. Quotes need not be sorted; equal timestamps keep
    /// their input order.
    pub fn align<'a>(&self, bars: &'a [Bar], quotes: &'a [Quote]) -> AlignedSeries<'a> {
        let quotes: Cow<'a, [Quote]> = if quotes
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
        {
            Cow::Borrowed(quotes)
        } else {
            let mut sorted = quotes.to_vec();
            sorted.sort_by_key(|q| q.timestamp);
            Cow::Owned(sorted)
        };

        let windows = bars
            .iter()
            .map(|bar| {
                let start = bar.time - self.window;
                let lo = quotes.partition_point(|q| q.timestamp <= start);
                let hi = quotes.partition_point(|q| q.timestamp <= bar.time);
                lo..hi.max(lo)
            })
            .collect();

        AlignedSeries {
            bars,
            quotes,
            windows,
        }
    }
}

/// Bars paired with their quote windows
#[derive(Debug, Clone)]
pub struct AlignedSeries<'a> {
    bars: &'a [Bar],
    quotes: Cow<'a, [Quote]>,
    windows: Vec<Range<usize>>,
}

impl<'a> AlignedSeries<'a> {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    /// Quotes in bar `i`'s window, in time order
    pub fn window(&self, i: usize) -> &[Quote] {
        &self.quotes[self.windows[i].clone()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bar, &[Quote])> + '_ {
        self.bars
            .iter()
            .zip(&self.windows)
            .map(move |(bar, range)| (bar, &self.quotes[range.clone()]))
    }
}
