//! "Latest result wins" slots for asynchronous renders.
//!
//! Every change issues a fresh [`Ticket`]. A finished render is only
//! committed if its ticket is still the newest one issued, so a slow
//! render for an old view can never overwrite a newer one.

/// Identifies one render request for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// The raw generation number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Outcome of [`LatestOnly::commit`].
#[derive(Debug, PartialEq, Eq)]
pub enum Commit<T> {
    /// The value was stored; the value it replaced is returned.
    Accepted {
        /// Previously committed value, if any.
        previous: Option<T>,
    },
    /// A newer ticket exists; the value is handed back unstored.
    Stale(T),
}

impl<T> Commit<T> {
    /// Whether the value was stored.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// A value slot that only accepts results for the newest ticket.
#[derive(Debug)]
pub struct LatestOnly<T> {
    issued: u64,
    committed: Option<T>,
}

impl<T> Default for LatestOnly<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            committed: None,
        }
    }
}

impl<T> LatestOnly<T> {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one.
    pub const fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    /// Whether `ticket` is the newest one issued.
    #[must_use]
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.issued
    }

    /// Store `value` if `ticket` is still current.
    pub fn commit(&mut self, ticket: Ticket, value: T) -> Commit<T> {
        if !self.is_current(ticket) {
            return Commit::Stale(value);
        }
        let previous = self.committed.replace(value);
        Commit::Accepted { previous }
    }

    /// The committed value, if any.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.committed.as_ref()
    }

    /// Drop the committed value and supersede outstanding tickets.
    pub fn clear(&mut self) -> Option<T> {
        self.issued += 1;
        self.committed.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_ticket_commits() {
        let mut slot = LatestOnly::new();
        let t = slot.issue();
        assert_eq!(slot.commit(t, "a"), Commit::Accepted { previous: None });
        assert_eq!(slot.get(), Some(&"a"));
        assert!(slot.is_current(t));
    }

    #[test]
    fn superseded_ticket_is_stale() {
        let mut slot = LatestOnly::new();
        let old = slot.issue();
        let new = slot.issue();
        assert!(!slot.is_current(old));
        assert_eq!(slot.commit(old, 1), Commit::Stale(1));
        assert!(slot.get().is_none());
        assert!(slot.commit(new, 2).is_accepted());
        assert_eq!(slot.get(), Some(&2));
    }

    #[test]
    fn out_of_order_burst_keeps_last() {
        let mut slot = LatestOnly::new();
        let tickets: Vec<_> = (0..5).map(|_| slot.issue()).collect();
        // Finish in reverse: only the last-issued one sticks.
        for (i, t) in tickets.iter().enumerate().rev() {
            let _ = slot.commit(*t, i);
        }
        assert_eq!(slot.get(), Some(&4));
    }

    #[test]
    fn recommit_returns_previous() {
        let mut slot = LatestOnly::new();
        let t = slot.issue();
        let _ = slot.commit(t, 1);
        let t = slot.issue();
        assert_eq!(slot.commit(t, 2), Commit::Accepted { previous: Some(1) });
    }

    #[test]
    fn clear_invalidates_outstanding() {
        let mut slot = LatestOnly::new();
        let t = slot.issue();
        assert_eq!(slot.clear(), None);
        assert_eq!(slot.commit(t, 9), Commit::Stale(9));
    }
}
