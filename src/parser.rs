//! Parser module for the market data stream
//!
//! Every inbound frame is a JSON array of event packets tagged by `ev`. Quote,
//! trade and minute-bar packets are converted to domain records; malformed packets
//! are dropped and counted without failing the rest of the frame.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::market::{decimal_from_f64, millis_to_datetime, Bar, Quote, TradePrint, LOT_SIZE};

/// Quote event packet
#[derive(Debug, Clone, Deserialize)]
pub struct QuotePacket {
    #[serde(rename = "sym")]
    pub symbol: String,

    #[serde(rename = "bp")]
    pub bid_price: Option<f64>,

    /// Bid size in round lots
    #[serde(rename = "bs")]
    pub bid_size: Option<f64>,

    #[serde(rename = "ap")]
    pub ask_price: Option<f64>,

    /// Ask size in round lots
    #[serde(rename = "as")]
    pub ask_size: Option<f64>,

    /// Quote time (milliseconds)
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,

    #[serde(rename = "q", default)]
    pub sequence: u64,

    #[serde(rename = "z", default)]
    pub tape: u8,
}

impl QuotePacket {
    /// Convert to a quote, `None` if a price, size or timestamp is missing or
    /// a size is out of range
    pub fn to_quote(&self) -> Option<Quote> {
        let timestamp = millis_to_datetime(self.timestamp?)?;
        let bid_price = decimal_from_f64(self.bid_price?)?;
        let bid_lots = decimal_from_f64(self.bid_size?)?;
        let ask_price = decimal_from_f64(self.ask_price?)?;
        let ask_lots = decimal_from_f64(self.ask_size?)?;

        let quote = Quote::from_lots(timestamp, bid_price, bid_lots, ask_price, ask_lots)?;
        Some(quote.with_sequence(self.sequence, self.tape))
    }
}

/// Trade event packet
#[derive(Debug, Clone, Deserialize)]
pub struct TradePacket {
    #[serde(rename = "sym")]
    pub symbol: String,

    #[serde(rename = "p")]
    pub price: Option<f64>,

    /// Size in round lots
    #[serde(rename = "s")]
    pub size: Option<f64>,

    /// Trade time (milliseconds)
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,

    #[serde(rename = "x", default)]
    pub exchange: u8,
}

impl TradePacket {
    pub fn to_trade(&self) -> Option<TradePrint> {
        let price = self.price.filter(|p| p.is_finite() && *p > 0.0)?;
        let size = self.size.filter(|s| s.is_finite())?;
        Some(TradePrint {
            price,
            size: size * LOT_SIZE as f64,
            timestamp: millis_to_datetime(self.timestamp?)?,
            exchange: self.exchange,
        })
    }
}

/// Minute aggregate packet
#[derive(Debug, Clone, Deserialize)]
pub struct MinuteBarPacket {
    #[serde(rename = "sym")]
    pub symbol: String,

    #[serde(rename = "o")]
    pub open: f64,

    #[serde(rename = "h")]
    pub high: f64,

    #[serde(rename = "l")]
    pub low: f64,

    #[serde(rename = "c")]
    pub close: f64,

    #[serde(rename = "v")]
    pub volume: f64,

    /// VWAP of the aggregate window
    #[serde(rename = "vw", default)]
    pub vwap: f64,

    /// Window start (milliseconds)
    #[serde(rename = "s")]
    pub start: i64,

    #[serde(rename = "n", default)]
    pub trades: u64,
}

impl MinuteBarPacket {
    pub fn to_bar(&self) -> Option<Bar> {
        Some(Bar {
            time: millis_to_datetime(self.start)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
            trades: self.trades,
        })
    }
}

/// Status packet (`connected`, `auth_success`, `auth_failed`, `success`, ...)
#[derive(Debug, Clone, Deserialize)]
pub struct StatusMessage {
    pub status: String,

    #[serde(default)]
    pub message: String,
}

/// Classified status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Connected,
    AuthSuccess,
    AuthFailed,
    Success,
    Other,
}

impl StatusMessage {
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "connected" => StatusKind::Connected,
            "auth_success" => StatusKind::AuthSuccess,
            "auth_failed" => StatusKind::AuthFailed,
            "success" => StatusKind::Success,
            _ => StatusKind::Other,
        }
    }
}

/// One demultiplexed event
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Quote { symbol: String, quote: Quote },
    Trade { symbol: String, trade: TradePrint },
    Bar { symbol: String, bar: Bar },
    Status(StatusMessage),
    /// Event tag that is not handled
    Unknown(String),
}

/// Result of parsing one inbound frame
#[derive(Debug, Clone, Default)]
pub struct ParsedFrame {
    pub events: Vec<StreamEvent>,
    /// Packets dropped as malformed
    pub dropped: usize,
}

impl ParsedFrame {
    /// Parse a raw frame
    ///
    /// Only a frame that is not JSON at all is an error.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let packets = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        let mut frame = ParsedFrame {
            events: Vec::with_capacity(packets.len()),
            dropped: 0,
        };
        for packet in packets {
            match parse_packet(packet) {
                Some(event) => frame.events.push(event),
                None => frame.dropped += 1,
            }
        }
        Ok(frame)
    }
}

fn parse_packet(packet: serde_json::Value) -> Option<StreamEvent> {
    let tag = packet.get("ev").and_then(|v| v.as_str()).map(str::to_owned);
    let Some(tag) = tag else {
        debug!(packet = %packet, "Packet without event tag");
        return None;
    };

    let event = match tag.as_str() {
        "Q" => serde_json::from_value::<QuotePacket>(packet)
            .ok()
            .and_then(|p| {
                let quote = p.to_quote()?;
                Some(StreamEvent::Quote {
                    symbol: p.symbol.to_uppercase(),
                    quote,
                })
            }),
        "T" => serde_json::from_value::<TradePacket>(packet)
            .ok()
            .and_then(|p| {
                let trade = p.to_trade()?;
                Some(StreamEvent::Trade {
                    symbol: p.symbol.to_uppercase(),
                    trade,
                })
            }),
        "AM" => serde_json::from_value::<MinuteBarPacket>(packet)
            .ok()
            .and_then(|p| {
                let bar = p.to_bar()?;
                Some(StreamEvent::Bar {
                    symbol: p.symbol.to_uppercase(),
                    bar,
                })
            }),
        "status" => serde_json::from_value::<StatusMessage>(packet)
            .ok()
            .map(StreamEvent::Status),
        _ => Some(StreamEvent::Unknown(tag.clone())),
    };

    if event.is_none() {
        debug!(ev = %tag, "Dropped malformed packet");
    }
    event
}

/// Outbound control frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "lowercase")]
pub enum ControlFrame {
    Auth(String),
    Subscribe(Vec<String>),
}

impl ControlFrame {
    pub fn subscribe(subscriptions: &[Subscription]) -> Self {
        ControlFrame::Subscribe(subscriptions.iter().map(|s| s.to_string()).collect())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Subscribable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    Quotes,
    Trades,
    MinuteBars,
}

impl Channel {
    pub fn prefix(&self) -> &'static str {
        match self {
            Channel::Quotes => "Q",
            Channel::Trades => "T",
            Channel::MinuteBars => "AM",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "Q" => Ok(Channel::Quotes),
            "T" => Ok(Channel::Trades),
            "AM" => Ok(Channel::MinuteBars),
            other => Err(format!("unknown channel prefix: {}", other)),
        }
    }
}

/// A (symbol, channel) pair, rendered as `<PREFIX>.<SYMBOL>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subscription {
    pub symbol: String,
    pub channel: Channel,
}

impl Subscription {
    pub fn new(symbol: &str, channel: Channel) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            channel,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.channel.prefix(), self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_quote() {
        let raw = r#"[{"ev":"Q","sym":"spy","bx":12,"bp":450.10,"bs":3,"ax":11,"ap":450.12,"as":1,"c":1,"t":1700000000000,"q":991,"z":3}]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        assert_eq!(frame.dropped, 0);
        match &frame.events[0] {
            StreamEvent::Quote { symbol, quote } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(quote.bid_price, dec!(450.10));
                assert_eq!(quote.bid_size, dec!(300));
                assert_eq!(quote.ask_size, dec!(100));
                assert_eq!(quote.sequence, 991);
                assert_eq!(quote.tape, 3);
                assert_eq!(quote.timestamp.timestamp_millis(), 1_700_000_000_000);
            }
            other => panic!("Expected Quote, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trade() {
        let raw = r#"[{"ev":"T","sym":"SPY","x":4,"i":"52983525029461","z":3,"p":450.11,"s":2,"c":[12],"t":1700000000100,"q":1063}]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        match &frame.events[0] {
            StreamEvent::Trade { symbol, trade } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(trade.price, 450.11);
                assert_eq!(trade.size, 200.0);
                assert_eq!(trade.exchange_code(), 'D');
            }
            other => panic!("Expected Trade, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_minute_bar() {
        let raw = r#"[{"ev":"AM","sym":"SPY","v":12000,"av":1500000,"op":449.0,"vw":450.02,"o":450.0,"c":450.05,"h":450.10,"l":449.95,"a":449.8,"z":50,"s":1700000040000,"e":1700000100000}]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        match &frame.events[0] {
            StreamEvent::Bar { symbol, bar } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(bar.close, 450.05);
                assert_eq!(bar.vwap, 450.02);
                assert_eq!(bar.time.timestamp_millis(), 1_700_000_040_000);
            }
            other => panic!("Expected Bar, got {:?}", other),
        }
    }

    #[test]
    fn test_status_and_unknown() {
        let raw = r#"[{"ev":"status","status":"auth_success","message":"authenticated"},{"ev":"LULD","sym":"SPY"}]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        assert_eq!(frame.events.len(), 2);
        match &frame.events[0] {
            StreamEvent::Status(status) => assert_eq!(status.kind(), StatusKind::AuthSuccess),
            other => panic!("Expected Status, got {:?}", other),
        }
        assert!(matches!(&frame.events[1], StreamEvent::Unknown(tag) if tag == "LULD"));
    }

    #[test]
    fn test_malformed_packets_dropped() {
        let raw = r#"[
            {"ev":"Q","sym":"SPY","bs":3,"ap":450.12,"as":1,"t":1700000000000},
            {"ev":"Q","sym":"SPY","bp":450.10,"bs":"three","ap":450.12,"as":1,"t":1700000000000},
            {"sym":"SPY"},
            {"ev":"Q","sym":"SPY","bp":450.10,"bs":3,"ap":450.12,"as":1,"t":1700000000000}
        ]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        assert_eq!(frame.dropped, 3);
        assert_eq!(frame.events.len(), 1);
    }

    #[test]
    fn test_oversized_quote_dropped() {
        let raw = r#"[
            {"ev":"Q","sym":"SPY","bp":100.0,"bs":1e27,"ap":100.02,"as":1,"t":1700000000000},
            {"ev":"Q","sym":"SPY","bp":100.0,"bs":1,"ap":100.02,"as":1e27,"t":1700000000000},
            {"ev":"Q","sym":"SPY","bp":100.0,"bs":2,"ap":100.02,"as":1,"t":1700000000000}
        ]"#;

        let frame = ParsedFrame::parse(raw).unwrap();
        assert_eq!(frame.dropped, 2);
        assert_eq!(frame.events.len(), 1);
        match &frame.events[0] {
            StreamEvent::Quote { quote, .. } => assert_eq!(quote.bid_size, dec!(200)),
            other => panic!("expected quote, got {:?}", other),
        }
    }

    #[test]
    fn test_single_object_frame() {
        let raw = r#"{"ev":"status","status":"connected","message":"Connected Successfully"}"#;
        let frame = ParsedFrame::parse(raw).unwrap();
        assert_eq!(frame.events.len(), 1);
        assert!(ParsedFrame::parse("not json").is_err());
    }

    #[test]
    fn test_control_frames() {
        let auth = ControlFrame::Auth("secret".to_string()).to_json().unwrap();
        assert_eq!(auth, r#"{"action":"auth","params":"secret"}"#);

        let subs = vec![
            Subscription::new("spy", Channel::Quotes),
            Subscription::new("SPY", Channel::Trades),
        ];
        let subscribe = ControlFrame::subscribe(&subs).to_json().unwrap();
        assert_eq!(subscribe, r#"{"action":"subscribe","params":["Q.SPY","T.SPY"]}"#);
    }

    #[test]
    fn test_channel_from_str() {
        assert_eq!("am".parse::<Channel>(), Ok(Channel::MinuteBars));
        assert!("X".parse::<Channel>().is_err());
    }
}
