//! Network-quality instrumentation: RTT, RFC 3550 jitter, loss,
//! bandwidth, and tick-time samples, retained in memory for the session.
//! Flushing to durable storage is an external collaborator — this
//! module only produces the JSON document, never writes a file.

use serde::Serialize;

/// One timestamped sample. `t` is seconds since the metrics logger was
/// created (caller-supplied, so the logger stays free of wall-clock
/// dependencies in tests).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Sample {
    pub t: f64,
    pub value: f64,
}

#[derive(Debug, Default)]
pub struct MetricsLogger {
    rtt: Vec<Sample>,
    jitter: Vec<Sample>,
    loss: Vec<Sample>,
    bandwidth_in: Vec<Sample>,
    bandwidth_out: Vec<Sample>,
    tick_time: Vec<Sample>,

    // RFC 3550 §A.8 running state.
    smoothed_jitter: f64,
    last_transit: Option<f64>,

    bytes_in_window: u64,
    bytes_out_window: u64,
}

impl MetricsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an RTT sample measured from a received PONG: `now -
    /// echoed_timestamp`, both in seconds.
    pub fn record_rtt(&mut self, t: f64, rtt_seconds: f64) {
        self.rtt.push(Sample { t, value: rtt_seconds });
    }

    /// Feeds one inter-arrival "transit time" sample (arrival_time -
    /// send_time, both in seconds) and updates the RFC 3550 §A.8 smoothed
    /// jitter: `J += (|D(i-1,i)| - J) / 16`.
    pub fn record_arrival_for_jitter(&mut self, t: f64, transit: f64) {
        if let Some(prev_transit) = self.last_transit {
            let d = (transit - prev_transit).abs();
            self.smoothed_jitter += (d - self.smoothed_jitter) / 16.0;
            self.jitter.push(Sample {
                t,
                value: self.smoothed_jitter,
            });
        }
        self.last_transit = Some(transit);
    }

    /// Records a loss-ratio sample: `lost_count / sent_count` over the
    /// window the caller chooses to measure (driven by
    /// `AckTracker::inferred_lost` and the tracker's `total_sent`).
    pub fn record_loss(&mut self, t: f64, lost_count: u64, sent_count: u64) {
        let ratio = if sent_count == 0 {
            0.0
        } else {
            lost_count as f64 / sent_count as f64
        };
        self.loss.push(Sample { t, value: ratio });
    }

    pub fn record_tick_time(&mut self, t: f64, duration_seconds: f64) {
        self.tick_time.push(Sample {
            t,
            value: duration_seconds,
        });
    }

    /// Accumulates bytes into the current one-second bandwidth window.
    pub fn add_bytes_in(&mut self, n: u64) {
        self.bytes_in_window += n;
    }

    pub fn add_bytes_out(&mut self, n: u64) {
        self.bytes_out_window += n;
    }

    /// Closes out the current one-second window, recording bandwidth
    /// samples and resetting the byte counters. Call once per second of
    /// wall-clock time.
    pub fn flush_bandwidth_window(&mut self, t: f64) {
        self.bandwidth_in.push(Sample {
            t,
            value: self.bytes_in_window as f64,
        });
        self.bandwidth_out.push(Sample {
            t,
            value: self.bytes_out_window as f64,
        });
        self.bytes_in_window = 0;
        self.bytes_out_window = 0;
    }

    /// Produces a newline-free JSON document suitable for appending to a
    /// log file, one line per flush.
    pub fn flush_json(&self) -> String {
        #[derive(Serialize)]
        struct Doc<'a> {
            rtt: &'a [Sample],
            jitter: &'a [Sample],
            loss: &'a [Sample],
            bandwidth_in: &'a [Sample],
            bandwidth_out: &'a [Sample],
            tick_time: &'a [Sample],
        }

        serde_json::to_string(&Doc {
            rtt: &self.rtt,
            jitter: &self.jitter,
            loss: &self.loss,
            bandwidth_in: &self.bandwidth_in,
            bandwidth_out: &self.bandwidth_out,
            tick_time: &self.tick_time,
        })
        .expect("metrics document is always serializable")
    }
}
