/// Highest percentage reported while the response is still outstanding.
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

/// Byte counters reported by the transport as the request body is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

impl TransferProgress {
    pub fn new(bytes_sent: u64, bytes_total: u64) -> Self {
        Self {
            bytes_sent,
            bytes_total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_sent >= self.bytes_total
    }

    /// Sent fraction as a percentage, capped below 100: the body being fully
    /// handed over says nothing about the response.
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return 0;
        }
        let sent = self.bytes_sent.min(self.bytes_total) as u128;
        let percent = sent * 100 / self.bytes_total as u128;
        (percent as u8).min(MAX_IN_FLIGHT_PERCENT)
    }
}

/// Filters transport reports down to a non-decreasing percentage sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTracker {
    last_percent: u8,
}

impl ProgressTracker {
    /// Returns the new percentage only when it moved forward.
    pub fn advance(&mut self, progress: TransferProgress) -> Option<u8> {
        let percent = progress.percent();
        if percent > self.last_percent {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}
