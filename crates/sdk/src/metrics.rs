//! Publisher and subscriber metrics

use metrics::Counter;

/// Publisher metrics
#[derive(Clone, Debug)]
pub(crate) struct PublisherMetrics {
    /// Number of sends that entered the gate
    sends_total: Counter,
    /// Number of sends acknowledged with success
    acknowledged_total: Counter,
    /// Number of sends acknowledged with failure
    rejected_total: Counter,
    /// Number of sends that timed out
    timeouts_total: Counter,
    /// Number of sends cancelled by the caller
    cancelled_total: Counter,
    /// Number of acknowledgements that matched no live send
    unexpected_acknowledgements_total: Counter,
    /// Number of publisher streams opened
    connections_total: Counter,
}

impl Default for PublisherMetrics {
    fn default() -> Self {
        Self {
            sends_total: metrics::counter!("rtgs.publisher.sends_total"),
            acknowledged_total: metrics::counter!("rtgs.publisher.acknowledged_total"),
            rejected_total: metrics::counter!("rtgs.publisher.rejected_total"),
            timeouts_total: metrics::counter!("rtgs.publisher.timeouts_total"),
            cancelled_total: metrics::counter!("rtgs.publisher.cancelled_total"),
            unexpected_acknowledgements_total: metrics::counter!(
                "rtgs.publisher.unexpected_acknowledgements_total"
            ),
            connections_total: metrics::counter!("rtgs.publisher.connections_total"),
        }
    }
}

impl PublisherMetrics {
    pub(crate) fn inc_sends(&self) {
        self.sends_total.increment(1);
    }

    pub(crate) fn inc_acknowledged(&self) {
        self.acknowledged_total.increment(1);
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected_total.increment(1);
    }

    pub(crate) fn inc_timeouts(&self) {
        self.timeouts_total.increment(1);
    }

    pub(crate) fn inc_cancelled(&self) {
        self.cancelled_total.increment(1);
    }

    pub(crate) fn inc_unexpected_acknowledgements(&self) {
        self.unexpected_acknowledgements_total.increment(1);
    }

    pub(crate) fn inc_connections(&self) {
        self.connections_total.increment(1);
    }
}

/// Subscriber metrics
#[derive(Clone, Debug)]
pub(crate) struct SubscriberMetrics {
    /// Number of frames read from the hub
    received_total: Counter,
    /// Number of messages whose handler completed
    handled_total: Counter,
    /// Number of messages that raised a non-fatal error
    failed_total: Counter,
    /// Number of runs stopped by a stream failure
    fatal_stops_total: Counter,
    /// Number of subscriber streams opened
    connections_total: Counter,
}

impl Default for SubscriberMetrics {
    fn default() -> Self {
        Self {
            received_total: metrics::counter!("rtgs.subscriber.received_total"),
            handled_total: metrics::counter!("rtgs.subscriber.handled_total"),
            failed_total: metrics::counter!("rtgs.subscriber.failed_total"),
            fatal_stops_total: metrics::counter!("rtgs.subscriber.fatal_stops_total"),
            connections_total: metrics::counter!("rtgs.subscriber.connections_total"),
        }
    }
}

impl SubscriberMetrics {
    pub(crate) fn inc_received(&self) {
        self.received_total.increment(1);
    }

    pub(crate) fn inc_handled(&self) {
        self.handled_total.increment(1);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed_total.increment(1);
    }

    pub(crate) fn inc_fatal_stops(&self) {
        self.fatal_stops_total.increment(1);
    }

    pub(crate) fn inc_connections(&self) {
        self.connections_total.increment(1);
    }
}
