//! Event topic identifiers used by transports outside the bus itself.

/// Machine-friendly discriminator for external consumers (logs, metrics
/// labels, notification gating).
#[must_use]
pub const fn event_kind(event: &crate::Event) -> &'static str {
    event.kind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;

    #[test]
    fn event_kind_matches_event() {
        assert_eq!(
            event_kind(&Event::DiscDetected {
                item_id: 1,
                disc_title: "Alien".into(),
                disc_fingerprint: "fp".into(),
            }),
            "disc_detected"
        );
        assert_eq!(
            event_kind(&Event::StageFailed {
                item_id: 1,
                stage: "ripping",
                message: "boom".into(),
            }),
            "stage_failed"
        );
    }
}
