use num_enum::{FromPrimitive, IntoPrimitive};

/// Type of Number (TON) of an SME address. Values outside the table decode
/// as `Unknown`.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TypeOfNumber {
    #[default]
    Unknown = 0b0000_0000,
    International = 0b0000_0001,
    National = 0b0000_0010,
    NetworkSpecific = 0b0000_0011,
    SubscriberNumber = 0b0000_0100,
    Alphanumeric = 0b0000_0101,
    Abbreviated = 0b0000_0110,
}

/// Numeric Plan Indicator (NPI) of an SME address.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NumericPlanIndicator {
    #[default]
    Unknown = 0b0000_0000,
    Isdn = 0b0000_0001,
    Data = 0b0000_0011,
    Telex = 0b0000_0100,
    LandMobile = 0b0000_0110,
    National = 0b0000_1000,
    Private = 0b0000_1001,
    Ermes = 0b0000_1010,
    Internet = 0b0000_1110,
    WapClientId = 0b0001_0010,
}

impl TypeOfNumber {
    /// Guess the TON/NPI pair for an address the way most carriers expect it:
    /// a leading `+` is international E.164, anything with letters is
    /// alphanumeric, everything else is left to the SMSC.
    pub fn infer(address: &str) -> (TypeOfNumber, NumericPlanIndicator) {
        if address.starts_with('+') {
            (TypeOfNumber::International, NumericPlanIndicator::Isdn)
        } else if address.chars().any(|c| c.is_ascii_alphabetic()) {
            (TypeOfNumber::Alphanumeric, NumericPlanIndicator::Unknown)
        } else {
            (TypeOfNumber::Unknown, NumericPlanIndicator::Unknown)
        }
    }
}
