//! Storage space usage reporting.

/// Used/allowed storage space, in bytes.
///
/// Negative values indicate the provider did not report that figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub used_bytes: i64,
    pub allowed_bytes: i64,
}

impl Quota {
    pub fn new(used_bytes: i64, allowed_bytes: i64) -> Self {
        Quota {
            used_bytes,
            allowed_bytes,
        }
    }

    /// Used space as a percentage, or `-1.0` if the inputs are unknown/invalid.
    pub fn percent_used(&self) -> f64 {
        if self.used_bytes >= 0 && self.allowed_bytes > 0 {
            self.used_bytes as f64 * 100.0 / self.allowed_bytes as f64
        } else {
            -1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_used_known() {
        let q = Quota::new(50, 200);
        assert_eq!(q.percent_used(), 25.0);
    }

    #[test]
    fn percent_used_unknown() {
        assert_eq!(Quota::new(-1, 200).percent_used(), -1.0);
        assert_eq!(Quota::new(50, 0).percent_used(), -1.0);
    }
}
