use num_enum::{FromPrimitive, IntoPrimitive};

/// The command_status field of an SMPP response PDU. Requests always carry
/// `Ok`. Codes the gateway does not name explicitly are preserved in `Other`
/// so a carrier's vendor-specific rejection still reaches the caller intact.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// No Error
    Ok = 0x0000_0000,
    /// Message Length is invalid
    InvalidMsgLength = 0x0000_0001,
    /// Command Length is invalid
    InvalidCommandLength = 0x0000_0002,
    /// Invalid Command ID
    InvalidCommandId = 0x0000_0003,
    /// Incorrect BIND Status for given command
    IncorrectBindStatus = 0x0000_0004,
    /// ESME Already in Bound State
    AlreadyBoundState = 0x0000_0005,
    /// System Error
    SystemError = 0x0000_0008,
    /// Invalid Source Address
    InvalidSourceAddress = 0x0000_000A,
    /// Invalid Dest Addr
    InvalidDestinationAddress = 0x0000_000B,
    /// Bind Failed
    BindFailed = 0x0000_000D,
    /// Invalid Password
    InvalidPassword = 0x0000_000E,
    /// Invalid System ID
    InvalidSystemId = 0x0000_000F,
    /// Message Queue Full
    MessageQueueFull = 0x0000_0014,
    /// submit_sm or submit_multi failed
    SubmitFailed = 0x0000_0045,
    /// Throttling error (ESME has exceeded allowed message limits)
    ThrottlingError = 0x0000_0058,
    /// Delivery Failure (used for data_sm_resp)
    DeliveryFailed = 0x0000_00FE,
    /// Unknown Error
    UnknownError = 0x0000_00FF,
    /// Any status code without a named variant
    #[num_enum(catch_all)]
    Other(u32),
}

impl CommandStatus {
    pub fn code(self) -> u32 {
        self.into()
    }

    /// Statuses that signal the SMSC is temporarily unable to take traffic
    /// rather than rejecting the message itself.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            CommandStatus::MessageQueueFull | CommandStatus::ThrottlingError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_round_trip_through_other() {
        let status = CommandStatus::from(0x0000_0400);
        assert_eq!(status, CommandStatus::Other(0x400));
        assert_eq!(status.code(), 0x400);
    }

    #[test]
    fn named_codes_decode() {
        assert_eq!(CommandStatus::from(0x0E), CommandStatus::InvalidPassword);
        assert!(CommandStatus::from(0x58).is_transient());
        assert!(!CommandStatus::InvalidDestinationAddress.is_transient());
    }
}
