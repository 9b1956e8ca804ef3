mod bind;
mod command_id;
mod command_status;
mod message;
mod numbering;
mod session;
pub mod tlv;

pub use bind::{Bind, BindKind, BindResponse, INTERFACE_VERSION_34};
pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use message::{
    DATA_CODING_DEFAULT, DATA_CODING_UCS2, DeliverSm, DeliverSmResponse,
    ESM_CLASS_DELIVERY_RECEIPT, MAX_SHORT_MESSAGE_LENGTH, MessageBody, SarInfo, SubmitSm,
    SubmitSmResponse,
};
pub use numbering::{NumericPlanIndicator, TypeOfNumber};
pub use session::{EnquireLink, EnquireLinkResponse, GenericNack, Unbind, UnbindResponse};
pub use tlv::{Tlv, find_tlv, tags};
