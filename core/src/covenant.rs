use serde::{Deserialize, Serialize};

/// Covenant action attached to a transaction output. Each value is one step
/// of the name-auction lifecycle; discriminants match the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Covenant {
    None = 0,
    Claim = 1,
    Open = 2,
    Bid = 3,
    Reveal = 4,
    Redeem = 5,
    Register = 6,
    Update = 7,
    Renew = 8,
    Transfer = 9,
    Finalize = 10,
    Revoke = 11,
}

impl Covenant {
    pub fn from_type(value: u8) -> Option<Self> {
        Some(match value {
            0 => Covenant::None,
            1 => Covenant::Claim,
            2 => Covenant::Open,
            3 => Covenant::Bid,
            4 => Covenant::Reveal,
            5 => Covenant::Redeem,
            6 => Covenant::Register,
            7 => Covenant::Update,
            8 => Covenant::Renew,
            9 => Covenant::Transfer,
            10 => Covenant::Finalize,
            11 => Covenant::Revoke,
            _ => return None,
        })
    }

    /// Every covenant except NONE carries a name hash in `items[0]`.
    pub fn is_name(self) -> bool {
        self != Covenant::None
    }

    /// Covenants that start an auction and therefore carry the raw name
    /// in `items[2]`.
    pub fn opens_auction(self) -> bool {
        matches!(self, Covenant::Claim | Covenant::Open)
    }

    /// Human-readable action label used in name history listings.
    pub fn action_label(self) -> &'static str {
        match self {
            Covenant::None => "Transfer",
            Covenant::Claim => "Claimed",
            Covenant::Open => "Opened",
            Covenant::Bid => "Bid",
            Covenant::Reveal => "Reveal",
            Covenant::Redeem => "Redeem",
            Covenant::Register => "Register",
            Covenant::Update => "Update",
            Covenant::Renew => "Renew",
            Covenant::Transfer => "Transfer",
            Covenant::Finalize => "Finalize",
            Covenant::Revoke => "Revoke",
        }
    }

    /// Whether a history event for this covenant carries a value field.
    pub fn carries_value(self) -> bool {
        matches!(self, Covenant::Bid | Covenant::Reveal | Covenant::Redeem)
    }

    /// Wire-style action name, as the node prints it.
    pub fn action_name(self) -> &'static str {
        match self {
            Covenant::None => "NONE",
            Covenant::Claim => "CLAIM",
            Covenant::Open => "OPEN",
            Covenant::Bid => "BID",
            Covenant::Reveal => "REVEAL",
            Covenant::Redeem => "REDEEM",
            Covenant::Register => "REGISTER",
            Covenant::Update => "UPDATE",
            Covenant::Renew => "RENEW",
            Covenant::Transfer => "TRANSFER",
            Covenant::Finalize => "FINALIZE",
            Covenant::Revoke => "REVOKE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_discriminants() {
        for raw in 0u8..=11 {
            let cov = Covenant::from_type(raw).unwrap();
            assert_eq!(cov as u8, raw);
        }
        assert!(Covenant::from_type(12).is_none());
    }

    #[test]
    fn name_classification() {
        assert!(!Covenant::None.is_name());
        assert!(Covenant::Open.is_name());
        assert!(Covenant::Open.opens_auction());
        assert!(Covenant::Claim.opens_auction());
        assert!(!Covenant::Bid.opens_auction());
    }

    #[test]
    fn history_labels() {
        assert_eq!(Covenant::Open.action_label(), "Opened");
        assert_eq!(Covenant::Register.action_label(), "Register");
        assert!(Covenant::Bid.carries_value());
        assert!(!Covenant::Open.carries_value());
    }
}
