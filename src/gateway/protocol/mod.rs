mod tag;
mod message;
mod reader;
mod builder;
mod startup;
mod scram;
mod row_description;
pub mod types;
pub mod sqlstate;

pub use tag::{
    Tag, PROTOCOL_VERSION_3_0, SSL_REQUEST_CODE, GSSENC_REQUEST_CODE, CANCEL_REQUEST_CODE,
    SSL_ALLOWED, SSL_NOT_ALLOWED,
};
pub use message::{Header, Message, Messages, MessageIter, FrameReader, MIN_MESSAGE_LEN};
pub use reader::MessageReader;
pub use builder::{MessageBuilder, MessageErrorBuilder, ErrorSeverity, ErrorFieldTag, protocol_error_to_messages};
pub use startup::{StartupParams, ServerParams, AuthType, default_server_params};
pub use scram::{ScramServer, MECHANISM};
pub use row_description::{build_row_description, write_row_description_body, ColumnDescription};
