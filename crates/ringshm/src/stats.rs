use std::fmt;

/// Point-in-time view of a region's cursors and lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub head: usize,
    pub tail: usize,
    pub capacity: usize,
    pub free: usize,
    pub used: usize,
}

impl ChannelStats {
    /// Renders the stats line for a channel called `name`:
    /// `"<name> - Head:<h> Tail:<t> Capacity:<c> Free:<f> Used:<u>"`.
    pub fn describe(&self, name: &str) -> String {
        format!("{} - {}", name, self)
    }
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Head:{} Tail:{} Capacity:{} Free:{} Used:{}",
            self.head, self.tail, self.capacity, self.free, self.used
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_format() {
        let stats = ChannelStats {
            head: 6,
            tail: 0,
            capacity: 256,
            free: 249,
            used: 6,
        };
        assert_eq!(
            stats.describe("worker"),
            "worker - Head:6 Tail:0 Capacity:256 Free:249 Used:6"
        );
        assert_eq!(stats.describe(""), " - Head:6 Tail:0 Capacity:256 Free:249 Used:6");
    }
}
