//! Frames and acknowledgements exchanged with the hub.
//!
//! These are the SDK-side views of the wire types in [`rtgs_proto`]. The
//! engine only ever handles these; conversion happens at the transport edge.

use bytes::Bytes;
use rtgs_proto::{Header, RtgsMessage, RtgsMessageAcknowledgement};

/// Ordered key/value routing metadata attached to a frame.
///
/// Carries institution identifiers and, for signed flows, signature
/// material. Order is preserved and a key may repeat. [`insert`](Self::insert)
/// replaces the first value for a key in place; [`append`](Self::append) and
/// collecting from pairs keep every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header set.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    /// Add a header after the existing ones, even if the key is present.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Get the first value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for a key, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (key, value) in iter {
            headers.append(key, value);
        }
        headers
    }
}

impl From<Vec<Header>> for Headers {
    fn from(headers: Vec<Header>) -> Self {
        headers.into_iter().map(|h| (h.key, h.value)).collect()
    }
}

impl From<Headers> for Vec<Header> {
    fn from(headers: Headers) -> Self {
        headers
            .0
            .into_iter()
            .map(|(key, value)| Header { key, value })
            .collect()
    }
}

/// The unit of exchange on a message stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Identifies the payload kind. Empty when the sender omitted it.
    pub message_identifier: String,
    /// Ties the frame to its acknowledgement.
    pub correlation_id: String,
    /// Serialized message.
    pub payload: Bytes,
    pub headers: Headers,
}

impl Frame {
    /// Create a frame without headers.
    pub fn new(
        message_identifier: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            message_identifier: message_identifier.into(),
            correlation_id: correlation_id.into(),
            payload: payload.into(),
            headers: Headers::new(),
        }
    }
}

impl From<RtgsMessage> for Frame {
    fn from(message: RtgsMessage) -> Self {
        Self {
            message_identifier: message.message_identifier,
            correlation_id: message.correlation_id,
            payload: Bytes::from(message.data),
            headers: message.headers.into(),
        }
    }
}

impl From<Frame> for RtgsMessage {
    fn from(frame: Frame) -> Self {
        Self {
            correlation_id: frame.correlation_id,
            data: frame.payload.to_vec(),
            message_identifier: frame.message_identifier,
            headers: frame.headers.into(),
        }
    }
}

/// Outcome reported by the receiving side for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub correlation_id: String,
    pub success: bool,
    /// Reason given by the receiver, usually only on failure.
    pub reason: Option<String>,
    pub headers: Headers,
}

impl Acknowledgement {
    /// A positive acknowledgement.
    pub fn success(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: true,
            reason: None,
            headers: Headers::new(),
        }
    }

    /// A negative acknowledgement with a reason.
    pub fn failure(correlation_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: false,
            reason: Some(reason.into()),
            headers: Headers::new(),
        }
    }
}

impl From<RtgsMessageAcknowledgement> for Acknowledgement {
    fn from(ack: RtgsMessageAcknowledgement) -> Self {
        Self {
            correlation_id: ack.correlation_id,
            success: ack.success,
            reason: (!ack.message.is_empty()).then_some(ack.message),
            headers: ack.headers.into(),
        }
    }
}

impl From<Acknowledgement> for RtgsMessageAcknowledgement {
    fn from(ack: Acknowledgement) -> Self {
        Self {
            correlation_id: ack.correlation_id,
            success: ack.success,
            message: ack.reason.unwrap_or_default(),
            headers: ack.headers.into(),
        }
    }
}
