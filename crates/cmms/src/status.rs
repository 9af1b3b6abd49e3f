use gemba_core::domain::ticket::TicketStatus;

/// Numeric status code the external work-order system understands. The
/// codes come from its fixed vocabulary; several ticket statuses collapse
/// onto the same code because the external side has no notion of
/// escalation or pending L3 review.
pub fn external_status_code(status: TicketStatus) -> u8 {
    match status {
        TicketStatus::Open | TicketStatus::Accepted => 10,
        // Pending L3 review reads as "still open" externally until the
        // final decision lands.
        TicketStatus::RejectedPendingL3Review => 10,
        TicketStatus::Planed => 30,
        TicketStatus::InProgress
        | TicketStatus::Escalated
        | TicketStatus::ReopenedInProgress => 50,
        TicketStatus::Finished => 70,
        TicketStatus::Reviewed => 80,
        TicketStatus::RejectedFinal => 95,
        TicketStatus::Closed => 99,
    }
}

#[cfg(test)]
mod tests {
    use gemba_core::domain::ticket::TicketStatus;

    use super::external_status_code;

    #[test]
    fn codes_follow_the_external_vocabulary() {
        assert_eq!(external_status_code(TicketStatus::Open), 10);
        assert_eq!(external_status_code(TicketStatus::Accepted), 10);
        assert_eq!(external_status_code(TicketStatus::Planed), 30);
        assert_eq!(external_status_code(TicketStatus::InProgress), 50);
        assert_eq!(external_status_code(TicketStatus::Finished), 70);
        assert_eq!(external_status_code(TicketStatus::Reviewed), 80);
        assert_eq!(external_status_code(TicketStatus::Closed), 99);
        assert_eq!(external_status_code(TicketStatus::RejectedFinal), 95);
    }

    #[test]
    fn statuses_unknown_to_the_external_side_map_onto_nearest_codes() {
        assert_eq!(external_status_code(TicketStatus::RejectedPendingL3Review), 10);
        assert_eq!(external_status_code(TicketStatus::Escalated), 50);
        assert_eq!(external_status_code(TicketStatus::ReopenedInProgress), 50);
    }
}
